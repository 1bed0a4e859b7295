//! Connects to every configured upstream MCP server, sanitizes and
//! caches what it reports, and resolves/dispatches tool calls against
//! whichever upstream is currently connected.

mod connection;
mod error;
mod mcp_link;
mod reconnect;
mod transport;

pub use connection::ServerConnection;
pub use error::{CatalogError, CatalogResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;

use toolmesh_core::{
    split_qualified, CatalogedTool, ConnectionStatus, ServerConnectionInfo, UpstreamConfig,
};
use toolmesh_sanitize::sanitize_description;

use mcp_link::McpLink;
use reconnect::spawn_reconnect_task;
use transport::{HttpStreamTransport, StdioTransport, Transport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of resolving a possibly-bare tool name against the connected
/// upstream set, per §4.4 `find_tool`.
pub enum FindToolResult {
    Found {
        server_key: String,
        tool: CatalogedTool,
    },
    Ambiguous {
        alternatives: Vec<String>,
    },
    NotFound,
}

pub struct Cataloger {
    connections: Arc<RwLock<HashMap<String, ServerConnection>>>,
    connect_timeout: Duration,
}

impl Default for Cataloger {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Cataloger {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            connect_timeout,
        }
    }

    /// Launches connections for every `enabled` entry in parallel.
    /// Individual failures never cancel peers (§4.4).
    pub async fn connect_all(&self, configs: &HashMap<String, UpstreamConfig>) {
        let enabled: Vec<_> = configs
            .iter()
            .filter(|(_, cfg)| cfg.enabled())
            .map(|(key, cfg)| (key.clone(), cfg.clone()))
            .collect();

        futures::future::join_all(
            enabled
                .into_iter()
                .map(|(key, cfg)| async move { self.connect(&key, &cfg).await }),
        )
        .await;
    }

    pub async fn connect(&self, server_key: &str, config: &UpstreamConfig) {
        if self.connections.read().await.contains_key(server_key) {
            self.disconnect(server_key).await;
        }

        self.connections.write().await.insert(
            server_key.to_string(),
            ServerConnection::placeholder(server_key.to_string()),
        );

        match tokio::time::timeout(self.connect_timeout, self.establish(server_key, config)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(CatalogError::AuthRequired { message, .. })) => {
                // Non-interactive credential provider: not fatal, and not
                // retried blindly — a background reconnect loop cannot
                // obtain credentials a human hasn't supplied (§4.4 step 6).
                tracing::warn!(server_key, "upstream requires authorization: {message}");
                self.mark_error(server_key, &message, true).await;
            }
            Ok(Err(err)) => {
                self.mark_error(server_key, &err.to_string(), false).await;
                spawn_reconnect_task(
                    self.connections.clone(),
                    server_key.to_string(),
                    config.clone(),
                    self.connect_timeout,
                );
            }
            Err(_) => {
                tracing::warn!(server_key, "upstream connect timed out");
                self.mark_error(server_key, "Connection timeout", false)
                    .await;
                spawn_reconnect_task(
                    self.connections.clone(),
                    server_key.to_string(),
                    config.clone(),
                    self.connect_timeout,
                );
            }
        }
    }

    async fn establish(&self, server_key: &str, config: &UpstreamConfig) -> CatalogResult<()> {
        let transport = self.build_transport(server_key, config).await?;
        let mut link = McpLink::new(transport);
        let init = link.initialize().await;

        let init = match init {
            Ok(init) => init,
            Err(err) => {
                let _ = link.close().await;
                return Err(err);
            }
        };

        let tools = match link.list_tools().await {
            Ok(tools) => tools,
            Err(err) => {
                let _ = link.close().await;
                return Err(err);
            }
        };

        let cataloged: Vec<CatalogedTool> = tools
            .into_iter()
            .map(|tool| CatalogedTool {
                name: tool.name,
                description: sanitize_description(Some(&tool.description)),
                input_schema: tool.input_schema,
                server_key: server_key.to_string(),
            })
            .collect();

        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get_mut(server_key) {
            conn.status = ConnectionStatus::Connected;
            conn.server_name = Some(init.server_info.name);
            conn.server_version = Some(init.server_info.version);
            conn.tools = cataloged;
            conn.last_error = None;
            conn.auth_pending = false;
            conn.link = Some(link);
        }
        Ok(())
    }

    async fn build_transport(
        &self,
        server_key: &str,
        config: &UpstreamConfig,
    ) -> CatalogResult<Box<dyn Transport>> {
        match config {
            UpstreamConfig::Stdio {
                command,
                args,
                env,
                cwd,
                ..
            } => {
                let transport =
                    StdioTransport::spawn(command, args, env, cwd.as_deref()).await?;
                Ok(Box::new(transport))
            }
            UpstreamConfig::HttpStream {
                url,
                headers,
                credential,
                ..
            } => {
                let token = credential.as_ref().map(|c| c.store_key.clone());
                let transport = HttpStreamTransport::new(
                    server_key.to_string(),
                    url.clone(),
                    headers.clone(),
                    token,
                )?;
                Ok(Box::new(transport))
            }
        }
    }

    async fn mark_error(&self, server_key: &str, message: &str, auth_pending: bool) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.get_mut(server_key) {
            conn.status = ConnectionStatus::Error;
            conn.last_error = Some(message.to_string());
            conn.auth_pending = auth_pending;
            conn.tools.clear();
        }
    }

    /// Closes transport then client (idempotent), marks disconnected,
    /// empties tools, removes the map entry (§4.4, §9 close ordering).
    pub async fn disconnect(&self, server_key: &str) {
        let removed = self.connections.write().await.remove(server_key);
        if let Some(mut conn) = removed {
            if let Some(mut link) = conn.link.take() {
                let _ = link.close().await;
            }
        }
    }

    pub async fn disconnect_all(&self) {
        let keys: Vec<String> = self.connections.read().await.keys().cloned().collect();
        for key in keys {
            self.disconnect(&key).await;
        }
    }

    /// Snapshots filtered to `status = connected` (§4.4).
    pub async fn get_all_tools(&self) -> Vec<CatalogedTool> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.status == ConnectionStatus::Connected)
            .flat_map(|c| c.tools.clone())
            .collect()
    }

    pub async fn get_status(&self) -> Vec<ServerConnectionInfo> {
        self.connections
            .read()
            .await
            .values()
            .map(|c| c.to_info())
            .collect()
    }

    pub async fn find_tool(&self, name: &str) -> FindToolResult {
        let connections = self.connections.read().await;

        if let Some((server_key, tool_name)) = split_qualified(name) {
            if let Some(conn) = connections.get(server_key) {
                if conn.status == ConnectionStatus::Connected {
                    if let Some(tool) = conn.tools.iter().find(|t| t.name == tool_name) {
                        return FindToolResult::Found {
                            server_key: server_key.to_string(),
                            tool: tool.clone(),
                        };
                    }
                }
            }
            return FindToolResult::NotFound;
        }

        let matches: Vec<(&str, &CatalogedTool)> = connections
            .values()
            .filter(|c| c.status == ConnectionStatus::Connected)
            .flat_map(|c| {
                c.tools
                    .iter()
                    .filter(move |t| t.name == name)
                    .map(move |t| (c.server_key.as_str(), t))
            })
            .collect();

        match matches.len() {
            0 => FindToolResult::NotFound,
            1 => {
                let (server_key, tool) = matches[0];
                FindToolResult::Found {
                    server_key: server_key.to_string(),
                    tool: tool.clone(),
                }
            }
            _ => {
                let mut alternatives: Vec<String> = matches
                    .iter()
                    .map(|(sk, t)| toolmesh_core::qualify(sk, &t.name))
                    .collect();
                alternatives.sort();
                FindToolResult::Ambiguous { alternatives }
            }
        }
    }

    /// Bare names that appear under two or more connected servers.
    pub async fn get_conflicting_tools(&self) -> Vec<String> {
        let connections = self.connections.read().await;
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for conn in connections
            .values()
            .filter(|c| c.status == ConnectionStatus::Connected)
        {
            for tool in &conn.tools {
                *counts.entry(tool.name.as_str()).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> CatalogResult<Value> {
        let resolved = self.find_tool(name).await;
        let (server_key, tool) = match resolved {
            FindToolResult::Found { server_key, tool } => (server_key, tool),
            FindToolResult::Ambiguous { alternatives } => {
                return Err(CatalogError::Invocation {
                    qualified_name: name.to_string(),
                    message: format!("ambiguous tool name, candidates: {}", alternatives.join(", ")),
                })
            }
            FindToolResult::NotFound => {
                return Err(CatalogError::Invocation {
                    qualified_name: name.to_string(),
                    message: "tool not found".to_string(),
                })
            }
        };

        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&server_key)
            .ok_or_else(|| CatalogError::NotConnected {
                server_key: server_key.clone(),
            })?;
        let link = conn
            .link
            .as_mut()
            .ok_or_else(|| CatalogError::NotConnected {
                server_key: server_key.clone(),
            })?;

        let result = link.call_tool(&tool.name, arguments).await?;
        serde_json::to_value(result).map_err(CatalogError::Serialization)
    }

    /// Re-fetches and re-sanitizes one upstream's tool list. Failure
    /// marks `status = error` but leaves the previous tools slice intact
    /// (§4.4 `refresh_tools`).
    pub async fn refresh_tools(&self, server_key: &str) -> CatalogResult<()> {
        let tools = {
            let mut connections = self.connections.write().await;
            let conn = connections
                .get_mut(server_key)
                .ok_or_else(|| CatalogError::NotConnected {
                    server_key: server_key.to_string(),
                })?;
            let link = conn
                .link
                .as_mut()
                .ok_or_else(|| CatalogError::NotConnected {
                    server_key: server_key.to_string(),
                })?;
            link.list_tools().await
        };

        match tools {
            Ok(tools) => {
                let cataloged: Vec<CatalogedTool> = tools
                    .into_iter()
                    .map(|tool| CatalogedTool {
                        name: tool.name,
                        description: sanitize_description(Some(&tool.description)),
                        input_schema: tool.input_schema,
                        server_key: server_key.to_string(),
                    })
                    .collect();
                let mut connections = self.connections.write().await;
                if let Some(conn) = connections.get_mut(server_key) {
                    conn.tools = cataloged;
                    conn.status = ConnectionStatus::Connected;
                    conn.last_error = None;
                }
                Ok(())
            }
            Err(err) => {
                self.mark_error(server_key, &err.to_string(), false).await;
                Err(err)
            }
        }
    }

    pub async fn refresh_all_tools(&self) {
        let keys: Vec<String> = self.connections.read().await.keys().cloned().collect();
        futures::future::join_all(keys.iter().map(|key| async move {
            if let Err(err) = self.refresh_tools(key).await {
                tracing::warn!(server_key = %key, error = %err, "refresh failed, keeping previous snapshot");
            }
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connected(server_key: &str, tool_names: &[&str]) -> ServerConnection {
        ServerConnection {
            server_key: server_key.to_string(),
            status: ConnectionStatus::Connected,
            last_error: None,
            server_name: Some("test".to_string()),
            server_version: Some("0.0.0".to_string()),
            tools: tool_names
                .iter()
                .map(|name| CatalogedTool {
                    name: name.to_string(),
                    description: Some("a tool".to_string()),
                    input_schema: json!({"type": "object"}),
                    server_key: server_key.to_string(),
                })
                .collect(),
            auth_pending: false,
            link: None,
        }
    }

    #[tokio::test]
    async fn bare_name_unique_across_servers_resolves() {
        let cataloger = Cataloger::default();
        cataloger
            .connections
            .write()
            .await
            .insert("fs".to_string(), connected("fs", &["read_file"]));

        match cataloger.find_tool("read_file").await {
            FindToolResult::Found { server_key, tool } => {
                assert_eq!(server_key, "fs");
                assert_eq!(tool.name, "read_file");
            }
            _ => panic!("expected a unique match"),
        }
    }

    #[tokio::test]
    async fn bare_name_on_two_servers_is_ambiguous() {
        let cataloger = Cataloger::default();
        {
            let mut conns = cataloger.connections.write().await;
            conns.insert("fs".to_string(), connected("fs", &["search"]));
            conns.insert("web".to_string(), connected("web", &["search"]));
        }

        match cataloger.find_tool("search").await {
            FindToolResult::Ambiguous { alternatives } => {
                assert_eq!(alternatives.len(), 2);
            }
            _ => panic!("expected ambiguity"),
        }
    }

    #[tokio::test]
    async fn qualified_name_bypasses_ambiguity() {
        let cataloger = Cataloger::default();
        {
            let mut conns = cataloger.connections.write().await;
            conns.insert("fs".to_string(), connected("fs", &["search"]));
            conns.insert("web".to_string(), connected("web", &["search"]));
        }

        match cataloger.find_tool("fs:search").await {
            FindToolResult::Found { server_key, .. } => assert_eq!(server_key, "fs"),
            _ => panic!("expected qualified lookup to resolve directly"),
        }
    }

    #[tokio::test]
    async fn unknown_name_is_not_found() {
        let cataloger = Cataloger::default();
        assert!(matches!(
            cataloger.find_tool("nothing").await,
            FindToolResult::NotFound
        ));
    }

    #[tokio::test]
    async fn conflicting_tools_lists_names_on_multiple_servers() {
        let cataloger = Cataloger::default();
        {
            let mut conns = cataloger.connections.write().await;
            conns.insert("fs".to_string(), connected("fs", &["search", "read_file"]));
            conns.insert("web".to_string(), connected("web", &["search"]));
        }

        let conflicts = cataloger.get_conflicting_tools().await;
        assert_eq!(conflicts, vec!["search".to_string()]);
    }

    #[tokio::test]
    async fn disconnected_servers_are_excluded_from_snapshots() {
        let cataloger = Cataloger::default();
        let mut conn = connected("fs", &["read_file"]);
        conn.status = ConnectionStatus::Error;
        cataloger.connections.write().await.insert("fs".to_string(), conn);

        assert!(cataloger.get_all_tools().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_removes_the_connection_entry() {
        let cataloger = Cataloger::default();
        cataloger
            .connections
            .write()
            .await
            .insert("fs".to_string(), connected("fs", &["read_file"]));

        cataloger.disconnect("fs").await;
        assert!(cataloger.get_status().await.is_empty());
    }
}
