//! Thin orchestrator wrapping one Index Store and a reference to the
//! Cataloger: keeps the store's catalog snapshot fresh and answers the
//! meta-tool handlers' search/lookup requests.

mod error;

pub use error::{RetrieverError, RetrieverResult};

use std::sync::Arc;

use serde::Serialize;

use toolmesh_catalog::Cataloger;
use toolmesh_core::{IndexedTool, SearchMode};
use toolmesh_index::IndexStore;

/// Converts query text into a fixed-length unit-norm vector. Optional:
/// when absent, `semantic`/`hybrid` search silently falls back to `fast`.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub total_matches: u64,
    pub tools: Vec<IndexedTool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetToolsResponse {
    pub tools: Vec<IndexedTool>,
    pub ambiguous: Vec<String>,
}

pub struct Retriever {
    store: Arc<IndexStore>,
    cataloger: Arc<Cataloger>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl Retriever {
    pub fn new(store: Arc<IndexStore>, cataloger: Arc<Cataloger>) -> Self {
        Self {
            store,
            cataloger,
            embedder: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Upserts every currently-connected tool into the index store.
    pub async fn sync_from_cataloger(&self) -> RetrieverResult<()> {
        let tools = self.cataloger.get_all_tools().await;
        self.store.index_tools(&tools).await?;
        Ok(())
    }

    pub async fn sync_server_from_cataloger(&self, server_key: &str) -> RetrieverResult<()> {
        let tools: Vec<_> = self
            .cataloger
            .get_all_tools()
            .await
            .into_iter()
            .filter(|t| t.server_key == server_key)
            .collect();
        self.store.index_tools(&tools).await?;
        Ok(())
    }

    pub async fn search(
        &self,
        query: &str,
        limit: u32,
        mode: SearchMode,
    ) -> RetrieverResult<SearchResponse> {
        if query.trim().is_empty() {
            return Ok(SearchResponse {
                query: query.to_string(),
                mode,
                total_matches: 0,
                tools: Vec::new(),
            });
        }

        let effective_mode = match mode {
            SearchMode::Fast => SearchMode::Fast,
            SearchMode::Semantic | SearchMode::Hybrid if self.embedder.is_none() => {
                tracing::debug!(
                    requested_mode = ?mode,
                    "no embedding provider configured, falling back to fast search"
                );
                SearchMode::Fast
            }
            other => other,
        };

        match effective_mode {
            SearchMode::Fast => {
                let hits = self.store.search(query, limit).await?;
                let total = self.store.search_count(query).await?;
                Ok(SearchResponse {
                    query: query.to_string(),
                    mode: SearchMode::Fast,
                    total_matches: total,
                    tools: hits.into_iter().map(|h| h.tool).collect(),
                })
            }
            SearchMode::Semantic => {
                let Some(embedder) = &self.embedder else {
                    unreachable!("fallback already handled above");
                };
                let Some(vector) = embedder.embed(query) else {
                    return Ok(SearchResponse {
                        query: query.to_string(),
                        mode: SearchMode::Semantic,
                        total_matches: 0,
                        tools: Vec::new(),
                    });
                };
                let hits = self.store.search_semantic(&vector, limit).await?;
                Ok(SearchResponse {
                    query: query.to_string(),
                    mode: SearchMode::Semantic,
                    total_matches: hits.len() as u64,
                    tools: hits.into_iter().map(|h| h.tool).collect(),
                })
            }
            SearchMode::Hybrid => {
                let Some(embedder) = &self.embedder else {
                    unreachable!("fallback already handled above");
                };
                let candidate_pool = (limit as usize).saturating_mul(4).max(50) as u32;
                let candidates = self.store.search(query, candidate_pool).await?;
                let total = self.store.search_count(query).await?;

                let mut ranked: Vec<_> = match embedder.embed(query) {
                    Some(vector) => candidates
                        .into_iter()
                        .map(|hit| {
                            let score = hit
                                .tool
                                .embedding
                                .as_ref()
                                .map(|embedding| {
                                    toolmesh_index::cosine_similarity(&vector, embedding) as f64
                                })
                                .unwrap_or(hit.score);
                            (score, hit.tool)
                        })
                        .collect(),
                    None => candidates.into_iter().map(|h| (h.score, h.tool)).collect(),
                };
                ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                ranked.truncate(limit as usize);

                Ok(SearchResponse {
                    query: query.to_string(),
                    mode: SearchMode::Hybrid,
                    total_matches: total,
                    tools: ranked.into_iter().map(|(_, tool)| tool).collect(),
                })
            }
        }
    }

    /// Resolves a batch of possibly-bare names through the Cataloger's
    /// `find_tool` semantics, then loads the persisted rows for whatever
    /// resolved unambiguously.
    pub async fn get_tools(&self, names: &[String]) -> RetrieverResult<GetToolsResponse> {
        let mut tools = Vec::new();
        let mut ambiguous = Vec::new();

        for name in names {
            match self.cataloger.find_tool(name).await {
                toolmesh_catalog::FindToolResult::Found { server_key, tool } => {
                    if let Some(indexed) = self.store.get_tool(&tool.name, &server_key).await? {
                        tools.push(indexed);
                    }
                }
                toolmesh_catalog::FindToolResult::Ambiguous { .. } => {
                    ambiguous.push(name.clone());
                }
                toolmesh_catalog::FindToolResult::NotFound => {}
            }
        }

        Ok(GetToolsResponse { tools, ambiguous })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use toolmesh_core::CatalogedTool;

    struct FixedEmbedder;
    impl EmbeddingProvider for FixedEmbedder {
        fn embed(&self, text: &str) -> Option<Vec<f32>> {
            if text.is_empty() {
                None
            } else {
                Some(vec![1.0, 0.0])
            }
        }
    }

    async fn seeded_retriever() -> Retriever {
        let store = Arc::new(IndexStore::open(None).await.unwrap());
        let cataloger = Arc::new(Cataloger::new(Duration::from_secs(5)));
        store
            .index_tool(&CatalogedTool {
                name: "read_file".to_string(),
                description: Some("Reads a file".to_string()),
                input_schema: json!({"type": "object"}),
                server_key: "fs".to_string(),
            })
            .await
            .unwrap();
        Retriever::new(store, cataloger)
    }

    #[tokio::test]
    async fn empty_query_preserves_requested_mode_with_no_results() {
        let retriever = seeded_retriever().await;
        let result = retriever.search("", 10, SearchMode::Semantic).await.unwrap();
        assert_eq!(result.mode, SearchMode::Semantic);
        assert!(result.tools.is_empty());
    }

    #[tokio::test]
    async fn semantic_search_without_embedder_falls_back_to_fast() {
        let retriever = seeded_retriever().await;
        let result = retriever.search("read", 10, SearchMode::Semantic).await.unwrap();
        assert_eq!(result.mode, SearchMode::Fast);
        assert_eq!(result.tools.len(), 1);
    }

    #[tokio::test]
    async fn semantic_search_with_embedder_and_embeddings_finds_match() {
        let retriever = seeded_retriever().await.with_embedder(Arc::new(FixedEmbedder));
        retriever
            .store()
            .update_embedding("read_file", "fs", &[1.0, 0.0])
            .await
            .unwrap();
        let result = retriever.search("read", 10, SearchMode::Semantic).await.unwrap();
        assert_eq!(result.mode, SearchMode::Semantic);
        assert_eq!(result.tools.len(), 1);
    }
}
