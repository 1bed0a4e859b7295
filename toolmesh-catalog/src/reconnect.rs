//! Bounded background reconnection for upstreams whose initial `connect`
//! failed outright. The component spec only covers the connect-timeout
//! path; retry behavior on top of that is a supplemented feature, reusing
//! `toolmesh_resilience`'s backoff math with the defaults captured in
//! SPEC_FULL: 10 attempts, 500ms initial delay, 30s cap, 2.0 multiplier,
//! 0.1 jitter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use toolmesh_core::{ConnectionStatus, UpstreamConfig};
use toolmesh_resilience::{BackoffCalculator, BackoffStrategy};

use crate::connection::ServerConnection;
use crate::mcp_link::McpLink;
use crate::transport::{HttpStreamTransport, StdioTransport, Transport};
use toolmesh_core::CatalogedTool;
use toolmesh_sanitize::sanitize_description;

const MAX_ATTEMPTS: u32 = 10;

pub fn spawn_reconnect_task(
    connections: Arc<RwLock<HashMap<String, ServerConnection>>>,
    server_key: String,
    config: UpstreamConfig,
    connect_timeout: Duration,
) {
    tokio::spawn(async move {
        let calculator = BackoffCalculator::new(
            BackoffStrategy::Exponential { base: 2.0 },
            Duration::from_millis(500),
            Duration::from_secs(30),
            true,
        );

        for attempt in 1..=MAX_ATTEMPTS {
            // Stop early if someone else reconnected or removed the entry.
            {
                let guard = connections.read().await;
                match guard.get(&server_key) {
                    Some(conn) if conn.status == ConnectionStatus::Error => {}
                    _ => return,
                }
            }

            tokio::time::sleep(calculator.calculate_delay(attempt)).await;

            tracing::info!(server_key = %server_key, attempt, "attempting upstream reconnect");

            match tokio::time::timeout(
                connect_timeout,
                establish(&server_key, &config),
            )
            .await
            {
                Ok(Ok(connected)) => {
                    let mut guard = connections.write().await;
                    if let Some(conn) = guard.get_mut(&server_key) {
                        *conn = connected;
                        tracing::info!(server_key = %server_key, attempt, "upstream reconnected");
                    }
                    return;
                }
                Ok(Err(crate::error::CatalogError::AuthRequired { message, .. })) => {
                    tracing::warn!(server_key = %server_key, "upstream requires authorization, giving up on reconnect: {message}");
                    let mut guard = connections.write().await;
                    if let Some(conn) = guard.get_mut(&server_key) {
                        conn.last_error = Some(message);
                        conn.auth_pending = true;
                    }
                    return;
                }
                Ok(Err(err)) => {
                    tracing::warn!(server_key = %server_key, attempt, error = %err, "reconnect attempt failed");
                }
                Err(_) => {
                    tracing::warn!(server_key = %server_key, attempt, "reconnect attempt timed out");
                }
            }
        }

        tracing::error!(server_key = %server_key, attempts = MAX_ATTEMPTS, "giving up on upstream reconnect");
    });
}

async fn establish(
    server_key: &str,
    config: &UpstreamConfig,
) -> crate::error::CatalogResult<ServerConnection> {
    let transport: Box<dyn Transport> = match config {
        UpstreamConfig::Stdio {
            command,
            args,
            env,
            cwd,
            ..
        } => Box::new(StdioTransport::spawn(command, args, env, cwd.as_deref()).await?),
        UpstreamConfig::HttpStream {
            url,
            headers,
            credential,
            ..
        } => {
            let token = credential.as_ref().map(|c| c.store_key.clone());
            Box::new(HttpStreamTransport::new(
                server_key.to_string(),
                url.clone(),
                headers.clone(),
                token,
            )?)
        }
    };

    let mut link = McpLink::new(transport);
    let init = link.initialize().await?;
    let tools = link.list_tools().await?;

    let cataloged: Vec<CatalogedTool> = tools
        .into_iter()
        .map(|tool| CatalogedTool {
            name: tool.name,
            description: sanitize_description(Some(&tool.description)),
            input_schema: tool.input_schema,
            server_key: server_key.to_string(),
        })
        .collect();

    Ok(ServerConnection {
        server_key: server_key.to_string(),
        status: ConnectionStatus::Connected,
        last_error: None,
        server_name: Some(init.server_info.name),
        server_version: Some(init.server_info.version),
        tools: cataloged,
        auth_pending: false,
        link: Some(link),
    })
}
