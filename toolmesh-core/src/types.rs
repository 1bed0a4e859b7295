//! Domain types shared across the catalog, index, retriever and meta-tool
//! crates. Kept free of any storage or transport dependency so that every
//! downstream crate can depend on it without pulling in sqlx/reqwest/etc.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the upstream configuration map. The key this is stored
/// under (the "server-key") lives in the surrounding `HashMap`, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "kebab-case")]
pub enum UpstreamConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    HttpStream {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        credential: Option<CredentialDescriptor>,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

fn default_true() -> bool {
    true
}

impl UpstreamConfig {
    pub fn enabled(&self) -> bool {
        match self {
            UpstreamConfig::Stdio { enabled, .. } => *enabled,
            UpstreamConfig::HttpStream { enabled, .. } => *enabled,
        }
    }
}

/// An opaque reference to where upstream credentials live. The actual
/// OAuth/browser flow is out of scope; this is only the shape the core
/// needs to decide whether a non-interactive credential provider can be
/// attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    pub store_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Immutable snapshot of an upstream tool, already sanitized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogedTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub server_key: String,
}

impl CatalogedTool {
    pub fn qualified_name(&self) -> String {
        qualify(&self.server_key, &self.name)
    }
}

/// A read-only view of one `ServerConnection`, the shape catalog reads
/// (`getAllTools`, `getStatus`, ...) hand out. The owned transport/client
/// handles never leave the Cataloger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConnectionInfo {
    pub server_key: String,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    pub tools: Vec<CatalogedTool>,
    pub auth_pending: bool,
}

/// `<server-key>:<tool-name>`.
pub fn qualify(server_key: &str, tool_name: &str) -> String {
    format!("{server_key}:{tool_name}")
}

/// Splits a possibly-qualified name. Returns `Some((server_key,
/// tool_name))` when the input contains exactly one `:`; `None` when the
/// input is bare (no colon at all). Inputs with more than one colon are
/// treated as bare (an upstream tool name legitimately containing a colon
/// would otherwise be mis-split).
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.splitn(2, ':');
    let first = parts.next()?;
    let rest = parts.next()?;
    if rest.contains(':') {
        return None;
    }
    Some((first, rest))
}

/// Canonicalizes an unordered pair of qualified names by lexicographic
/// order, so `(a, b)` and `(b, a)` always produce the same key.
pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Detail level requested of `find_tools`/`describe_tools` output shaping.
/// Declaration order doubles as the natural ordering (L0 < L1 < L2) so
/// shaping code can write `if detail >= DetailLevel::L1` instead of
/// matching on strings (§9 "detail-level formatting is a pure function
/// over a tagged enum").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DetailLevel {
    L0,
    #[default]
    L1,
    L2,
}

/// Search mode requested of the retriever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Fast,
    Semantic,
    Hybrid,
}

/// Row persisted in the index store: a `CatalogedTool` plus bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedTool {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub server_key: String,
    pub schema_hash: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexedTool {
    pub fn qualified_name(&self) -> String {
        qualify(&self.server_key, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_and_split_roundtrip() {
        let q = qualify("fs", "read_file");
        assert_eq!(q, "fs:read_file");
        assert_eq!(split_qualified(&q), Some(("fs", "read_file")));
    }

    #[test]
    fn split_qualified_rejects_bare_and_multi_colon() {
        assert_eq!(split_qualified("read_file"), None);
        assert_eq!(split_qualified("a:b:c"), None);
    }

    #[test]
    fn canonical_pair_is_order_independent() {
        assert_eq!(
            canonical_pair("fs:read_file", "github:list_issues"),
            canonical_pair("github:list_issues", "fs:read_file")
        );
    }
}
