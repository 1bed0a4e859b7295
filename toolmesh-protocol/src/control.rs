//! Control frames shared by the daemon and proxy bridge over the same
//! newline-delimited JSON stream as MCP frames, tagged on `type`.
//!
//! A frame read off the wire is first probed against this enum; anything
//! that doesn't parse as a `ControlFrame` is forwarded verbatim as an MCP
//! JSON-RPC frame (see `toolmesh-daemon`/`toolmesh-proxy`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Hello {
        #[serde(default, rename = "clientId")]
        client_id: Option<String>,
        #[serde(default, rename = "sharedSecret")]
        shared_secret: Option<String>,
    },
    #[serde(rename = "helloAck")]
    HelloAck {
        #[serde(rename = "sessionId")]
        session_id: Uuid,
        #[serde(rename = "isOwner")]
        is_owner: bool,
    },
    Heartbeat,
    Goodbye,
    #[serde(rename = "ownerChanged")]
    OwnerChanged {
        #[serde(rename = "ownerSessionId")]
        owner_session_id: Uuid,
    },
    Error {
        message: String,
    },
}

impl ControlFrame {
    /// Attempts to parse a raw line as a control frame. MCP JSON-RPC
    /// frames always carry a `jsonrpc` field and never a recognized
    /// `type` tag, so a failed parse here means "forward as MCP" rather
    /// than "malformed".
    pub fn try_parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("control frame always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_roundtrips_through_json() {
        let hello = ControlFrame::Hello {
            client_id: Some("ide-1".to_string()),
            shared_secret: None,
        };
        let line = hello.to_line();
        assert!(line.contains("\"type\":\"hello\""));
        let back = ControlFrame::try_parse(&line).unwrap();
        assert_eq!(back, hello);
    }

    #[test]
    fn mcp_jsonrpc_frame_does_not_parse_as_control() {
        let mcp_line = r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#;
        assert!(ControlFrame::try_parse(mcp_line).is_none());
    }

    #[test]
    fn owner_changed_roundtrips() {
        let id = Uuid::new_v4();
        let frame = ControlFrame::OwnerChanged { owner_session_id: id };
        let line = frame.to_line();
        assert_eq!(ControlFrame::try_parse(&line), Some(frame));
    }

    #[test]
    fn hello_ack_tag_is_camel_case() {
        let frame = ControlFrame::HelloAck {
            session_id: Uuid::new_v4(),
            is_owner: true,
        };
        assert!(frame.to_line().contains("\"type\":\"helloAck\""));
    }

    #[test]
    fn owner_changed_tag_is_camel_case() {
        let frame = ControlFrame::OwnerChanged {
            owner_session_id: Uuid::new_v4(),
        };
        assert!(frame.to_line().contains("\"type\":\"ownerChanged\""));
    }
}
