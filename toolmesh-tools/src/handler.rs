//! `MetaTools`: composes the sanitizer (already applied upstream by the
//! cataloger), the policy engine, the index/retriever, and the selection
//! tracker into the five fixed-surface handlers described in §4.8.
//!
//! One `MetaTools` is shared by every session (it wraps only `Arc`s to
//! the process-wide catalog/index/policy state); the per-session
//! `SelectionTracker` is passed in by the caller on every `execute`/
//! `clear_selection_cache` call rather than owned here, since C9 holds
//! no session-specific state beyond its handler closures (§4.9) and the
//! tracker is exactly that session-specific state.

use std::sync::Arc;

use serde_json::json;

use toolmesh_catalog::{Cataloger, FindToolResult};
use toolmesh_config::{FindToolsConfig, SelectionCacheConfig};
use toolmesh_core::{qualify, ConnectionStatus, DetailLevel, SearchMode};
use toolmesh_index::IndexStore;
use toolmesh_policy::{Decision, PolicyEngine};
use toolmesh_protocol::mcp::ToolsCallResult;
use toolmesh_retriever::Retriever;
use toolmesh_selection::SelectionTracker;

use crate::detail::shape_tool;
use crate::error::{ToolsError, ToolsResult};

pub struct MetaTools {
    retriever: Arc<Retriever>,
    cataloger: Arc<Cataloger>,
    policy: Arc<PolicyEngine>,
    store: Arc<IndexStore>,
    find_tools_config: FindToolsConfig,
    selection_cache_config: SelectionCacheConfig,
}

impl MetaTools {
    pub fn new(
        retriever: Arc<Retriever>,
        cataloger: Arc<Cataloger>,
        policy: Arc<PolicyEngine>,
        store: Arc<IndexStore>,
        find_tools_config: FindToolsConfig,
        selection_cache_config: SelectionCacheConfig,
    ) -> Self {
        Self {
            retriever,
            cataloger,
            policy,
            store,
            find_tools_config,
            selection_cache_config,
        }
    }

    /// §4.8 `find_tools`. Candidates are fetched up to `max_limit` so
    /// policy filtering has a stable window to work over, then the
    /// filtered set is truncated to the caller's requested `limit`;
    /// `total_matches` is the filtered count within that window.
    pub async fn find_tools(
        &self,
        query: &str,
        limit: Option<u32>,
        mode: Option<SearchMode>,
        detail_level: Option<DetailLevel>,
    ) -> ToolsResult<ToolsCallResult> {
        let requested_limit = limit.unwrap_or(self.find_tools_config.default_limit as u32);
        if requested_limit == 0 || requested_limit as usize > self.find_tools_config.max_limit {
            return Err(ToolsError::InvalidParams(format!(
                "limit must be between 1 and {}",
                self.find_tools_config.max_limit
            )));
        }
        let mode = mode.unwrap_or(self.find_tools_config.default_mode);
        let detail_level = detail_level.unwrap_or(self.find_tools_config.default_detail_level);

        let window = self.find_tools_config.max_limit as u32;
        let search = self.retriever.search(query, window, mode).await?;

        let mut visible = Vec::new();
        for tool in search.tools {
            let visibility = self
                .policy
                .get_tool_visibility(&tool.server_key, &tool.name);
            if visibility.visible {
                visible.push((tool, visibility.requires_confirmation));
            }
        }

        let total_matches = visible.len() as u64;
        visible.truncate(requested_limit as usize);

        let keys: Vec<String> = visible
            .iter()
            .map(|(tool, _)| tool.qualified_name())
            .collect();

        // L2's input schema is looked up live from the Cataloger rather
        // than reused from the index snapshot (§4.8): the index can lag
        // the catalog between refresh cycles, and L2 is the detail level
        // callers use right before deciding how to call a tool.
        let mut shaped = Vec::with_capacity(visible.len());
        for (tool, requires_confirmation) in &visible {
            let live_schema = if detail_level >= DetailLevel::L2 {
                match self.cataloger.find_tool(&tool.qualified_name()).await {
                    FindToolResult::Found { tool: live, .. } => Some(live.input_schema),
                    _ => None,
                }
            } else {
                None
            };
            shaped.push(shape_tool(tool, detail_level, *requires_confirmation, live_schema));
        }

        let mut body = json!({
            "query": query,
            "totalMatches": total_matches,
            "detailLevel": detail_level,
            "tools": shaped,
        });

        if self.selection_cache_config.enabled && self.selection_cache_config.max_bundle_suggestions > 0 && !keys.is_empty() {
            let bundles = self
                .store
                .get_suggested_bundles(
                    &keys,
                    self.selection_cache_config.min_cooccurrence_threshold as i64,
                    self.selection_cache_config.max_bundle_suggestions as u32,
                )
                .await?;
            if !bundles.is_empty() {
                body["suggestedTools"] = json!(bundles
                    .into_iter()
                    .map(|b| json!({"tools": [b.qualified_name], "frequency": b.count}))
                    .collect::<Vec<_>>());
            }
        }

        Ok(ToolsCallResult::json(&body, false))
    }

    /// §4.8 `describe_tools`.
    pub async fn describe_tools(&self, tool_names: &[String]) -> ToolsResult<ToolsCallResult> {
        if tool_names.is_empty() || tool_names.len() > 20 {
            return Err(ToolsError::InvalidParams(
                "tool_names must contain between 1 and 20 entries".to_string(),
            ));
        }

        let mut schemas = Vec::new();
        let mut ambiguous = Vec::new();
        let mut not_found = Vec::new();
        let mut blocked = Vec::new();

        for name in tool_names {
            match self.cataloger.find_tool(name).await {
                FindToolResult::Found { server_key, tool } => {
                    let visibility = self.policy.get_tool_visibility(&server_key, &tool.name);
                    if !visibility.visible {
                        blocked.push(name.clone());
                        continue;
                    }
                    let mut entry = json!({
                        "name": tool.name,
                        "qualifiedName": qualify(&server_key, &tool.name),
                        "description": tool.description,
                        "serverKey": server_key,
                        "inputSchema": tool.input_schema,
                    });
                    if visibility.requires_confirmation {
                        entry["requiresConfirmation"] = json!(true);
                    }
                    schemas.push(entry);
                }
                FindToolResult::Ambiguous { alternatives } => {
                    ambiguous.push(json!({"name": name, "alternatives": alternatives}));
                }
                FindToolResult::NotFound => not_found.push(name.clone()),
            }
        }

        let mut body = json!({"schemas": schemas});
        if !ambiguous.is_empty() {
            body["ambiguous"] = json!(ambiguous);
        }
        if !not_found.is_empty() {
            body["notFound"] = json!(not_found);
        }
        if !blocked.is_empty() {
            body["blocked"] = json!(blocked);
        }

        Ok(ToolsCallResult::json(&body, false))
    }

    /// §4.8 `execute`. Every failure path is folded in-band per §7;
    /// nothing here propagates past a storage error on the flush.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        confirmation_token: Option<&str>,
        selection: &SelectionTracker,
    ) -> ToolsResult<ToolsCallResult> {
        let (server_key, tool) = match self.cataloger.find_tool(tool_name).await {
            FindToolResult::Found { server_key, tool } => (server_key, tool),
            FindToolResult::Ambiguous { alternatives } => {
                return Ok(ToolsCallResult::json(
                    &json!({
                        "error": format!(
                            "Ambiguous tool name \"{tool_name}\". Use a qualified name."
                        ),
                        "alternatives": alternatives,
                    }),
                    true,
                ));
            }
            FindToolResult::NotFound => {
                return Ok(ToolsCallResult::json(
                    &json!({"error": format!("Tool \"{tool_name}\" not found")}),
                    true,
                ));
            }
        };

        match self
            .policy
            .evaluate_policy(&server_key, &tool.name, confirmation_token)
        {
            Decision::Block { reason } => {
                return Ok(ToolsCallResult::json(
                    &json!({"error": reason, "blocked": true}),
                    true,
                ));
            }
            Decision::Confirm {
                reason,
                confirmation_token,
            } => {
                // §6/§8 scenario 2 spell these two fields snake_case on the
                // wire, unlike the rest of this handler's camelCase bodies.
                return Ok(ToolsCallResult::json(
                    &json!({
                        "requires_confirmation": true,
                        "confirmation_token": confirmation_token,
                        "message": reason,
                    }),
                    false,
                ));
            }
            Decision::Allow { .. } => {}
        }

        let qualified = qualify(&server_key, &tool.name);
        match self.cataloger.call_tool(&qualified, arguments).await {
            Ok(result) => {
                let is_error = result
                    .get("isError")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);

                if !is_error && self.selection_cache_config.enabled {
                    selection.track(&qualified);
                    if selection.session_tool_count() >= 2 {
                        if let Err(err) = selection.flush_to_store(&self.store).await {
                            tracing::warn!(
                                error = %err,
                                "failed to flush selection co-occurrences"
                            );
                        }
                    }
                }

                Ok(ToolsCallResult::json(&result, is_error))
            }
            Err(err) => Ok(ToolsCallResult::json(&json!({"error": err.to_string()}), true)),
        }
    }

    /// §4.8 `list_namespaces`.
    pub async fn list_namespaces(&self, include_tools: bool) -> ToolsResult<ToolsCallResult> {
        let statuses = self.cataloger.get_status().await;

        let namespaces: Vec<_> = statuses
            .iter()
            .map(|info| {
                let mut entry = json!({
                    "name": info.server_key,
                    "status": info.status,
                    "toolCount": info.tools.len(),
                });
                if let Some(error) = &info.last_error {
                    entry["error"] = json!(error);
                }
                if include_tools && !info.tools.is_empty() {
                    entry["tools"] = json!(info
                        .tools
                        .iter()
                        .map(|t| t.name.clone())
                        .collect::<Vec<_>>());
                }
                entry
            })
            .collect();

        let connected_count = statuses
            .iter()
            .filter(|s| s.status == ConnectionStatus::Connected)
            .count();

        let mut body = json!({
            "namespaces": namespaces,
            "totalNamespaces": statuses.len(),
            "connectedCount": connected_count,
        });

        let conflicts = self.cataloger.get_conflicting_tools().await;
        if !conflicts.is_empty() {
            body["conflictNote"] = json!(format!(
                "{} tool name(s) are ambiguous across connected servers; use a qualified \
                 \"server:tool\" name to disambiguate.",
                conflicts.len()
            ));
            body["conflictingTools"] = json!(conflicts);
        }

        Ok(ToolsCallResult::json(&body, false))
    }

    /// §4.8 `clear_selection_cache`.
    pub async fn clear_selection_cache(
        &self,
        selection: &SelectionTracker,
    ) -> ToolsResult<ToolsCallResult> {
        let patterns_removed = self.store.clear_cooccurrences().await?;
        selection.reset();
        Ok(ToolsCallResult::json(
            &json!({
                "message": "selection cache cleared",
                "patternsRemoved": patterns_removed,
            }),
            false,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json as j;
    use std::time::Duration;
    use toolmesh_core::CatalogedTool;
    use toolmesh_policy::PolicyConfig;

    async fn fixture() -> (MetaTools, Arc<Cataloger>, Arc<IndexStore>) {
        let store = Arc::new(IndexStore::open(None).await.unwrap());
        let cataloger = Arc::new(Cataloger::new(Duration::from_secs(5)));
        let retriever = Arc::new(Retriever::new(store.clone(), cataloger.clone()));
        let (policy_config, _) = PolicyConfig::parse(&[], &[], &["*:*".to_string()]);
        let policy = Arc::new(PolicyEngine::new(policy_config));

        store
            .index_tool(&CatalogedTool {
                name: "read_file".to_string(),
                description: Some("Reads a file from disk".to_string()),
                input_schema: j!({"type": "object"}),
                server_key: "fs".to_string(),
            })
            .await
            .unwrap();

        let tools = MetaTools::new(
            retriever,
            cataloger.clone(),
            policy,
            store.clone(),
            FindToolsConfig::default(),
            SelectionCacheConfig::default(),
        );
        (tools, cataloger, store)
    }

    #[tokio::test]
    async fn find_tools_rejects_out_of_range_limit() {
        let (tools, _, _) = fixture().await;
        let err = tools
            .find_tools("read", Some(1000), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolsError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn find_tools_shapes_default_detail_level() {
        let (tools, _, _) = fixture().await;
        let result = tools.find_tools("read", None, None, None).await.unwrap();
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn describe_tools_rejects_empty_and_oversized_batches() {
        let (tools, _, _) = fixture().await;
        assert!(tools.describe_tools(&[]).await.is_err());
        let too_many: Vec<String> = (0..21).map(|i| format!("tool{i}")).collect();
        assert!(tools.describe_tools(&too_many).await.is_err());
    }

    #[tokio::test]
    async fn describe_tools_partitions_not_found() {
        let (tools, _, _) = fixture().await;
        let result = tools
            .describe_tools(&["does_not_exist".to_string()])
            .await
            .unwrap();
        let text = match &result.content[0] {
            toolmesh_protocol::mcp::ToolContent::Text { text } => text.clone(),
        };
        let body: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["notFound"][0], j!("does_not_exist"));
    }

    #[tokio::test]
    async fn execute_on_unknown_tool_is_in_band_error() {
        let (tools, _, _) = fixture().await;
        let selection = SelectionTracker::new();
        let result = tools
            .execute("nonexistent", j!({}), None, &selection)
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn list_namespaces_reports_empty_catalog() {
        let (tools, _, _) = fixture().await;
        let result = tools.list_namespaces(false).await.unwrap();
        let text = match &result.content[0] {
            toolmesh_protocol::mcp::ToolContent::Text { text } => text.clone(),
        };
        let body: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["totalNamespaces"], j!(0));
    }

    #[tokio::test]
    async fn clear_selection_cache_resets_tracker_and_reports_count() {
        let (tools, _, store) = fixture().await;
        store
            .record_cooccurrences(&["fs:read_file".to_string(), "fs:write_file".to_string()])
            .await
            .unwrap();
        let selection = SelectionTracker::new();
        selection.track("fs:read_file");

        let result = tools.clear_selection_cache(&selection).await.unwrap();
        assert_eq!(selection.session_tool_count(), 0);
        let text = match &result.content[0] {
            toolmesh_protocol::mcp::ToolContent::Text { text } => text.clone(),
        };
        let body: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["patternsRemoved"], j!(1));
    }
}
