//! Per-connection protocol state machine (§4.10): unauthenticated until
//! a matching `hello`, then wired to a `SessionServer` and forwarding
//! MCP frames both ways until `goodbye`, EOF, or a heartbeat-sweep
//! cancellation.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use toolmesh_protocol::ControlFrame;
use toolmesh_session::SessionServer;

use crate::listener::{BoxedReader, BoxedWriter};
use crate::server::Shared;
use crate::session::DaemonSession;

pub async fn handle_connection(reader: BoxedReader, writer: BoxedWriter, shared: Arc<Shared>) {
    let mut reader = BufReader::new(reader);
    let mut writer = writer;
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let client_id = match handshake(&mut reader, &outbound_tx, &shared).await {
        Some(client_id) => client_id,
        None => {
            drop(outbound_tx);
            let _ = writer_task.await;
            return;
        }
    };

    let session_id = Uuid::new_v4();
    let now = Utc::now();
    let cancel = Arc::new(Notify::new());
    let session = Arc::new(DaemonSession {
        session_id,
        client_id,
        connected_at: now,
        last_seen: parking_lot::Mutex::new(now),
        outbound: outbound_tx.clone(),
        cancel: cancel.clone(),
    });

    shared.sessions.write().await.insert(session_id, session.clone());
    shared.activity.notify_waiters();
    let owner = shared.elect_owner().await;

    let hello_ack = ControlFrame::HelloAck {
        session_id,
        is_owner: owner == Some(session_id),
    };
    let _ = outbound_tx.send(hello_ack.to_line());

    let session_server = SessionServer::new(shared.tools.clone(), shared.find_tools_config.clone());
    let mut line = String::new();

    loop {
        line.clear();
        tokio::select! {
            _ = cancel.notified() => break,
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => break,
                    Err(_) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match ControlFrame::try_parse(trimmed) {
                            Some(ControlFrame::Heartbeat) => session.touch(),
                            Some(ControlFrame::Goodbye) => break,
                            Some(_) => {}
                            None => {
                                if let Some(response) = session_server.handle_line(trimmed).await {
                                    let _ = outbound_tx.send(response);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    shared.sessions.write().await.remove(&session_id);
    shared.activity.notify_waiters();
    shared.elect_owner().await;

    drop(outbound_tx);
    let _ = writer_task.await;
}

/// Reads lines until a `hello` control frame arrives (or the connection
/// dies first). Validates the shared secret if one is configured.
/// Returns the negotiated `clientId` on success.
async fn handshake(
    reader: &mut BufReader<BoxedReader>,
    outbound_tx: &mpsc::UnboundedSender<String>,
    shared: &Shared,
) -> Option<Option<String>> {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match ControlFrame::try_parse(trimmed) {
                    Some(ControlFrame::Hello { client_id, shared_secret }) => {
                        if let Some(expected) = &shared.daemon_config.shared_secret {
                            if shared_secret.as_deref() != Some(expected.as_str()) {
                                let _ = outbound_tx.send(
                                    ControlFrame::Error {
                                        message: "invalid shared secret".to_string(),
                                    }
                                    .to_line(),
                                );
                                return None;
                            }
                        }
                        return Some(client_id);
                    }
                    _ => {
                        let _ = outbound_tx.send(
                            ControlFrame::Error {
                                message: "expected hello as the first frame".to_string(),
                            }
                            .to_line(),
                        );
                        return None;
                    }
                }
            }
        }
    }
}
