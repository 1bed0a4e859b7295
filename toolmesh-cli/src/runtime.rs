//! Wires one shared C3/C4/C5/C7 runtime plus the C8 meta-tool handlers
//! from a loaded `ToolmeshConfig`. Shared between `serve` (many sessions
//! over the daemon) and `mcp` (one session directly over stdio) since
//! both need the identical catalog/index/policy/retriever stack; only
//! what sits on top of it (a daemon socket vs. a bare stdio loop)
//! differs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sha2::{Digest, Sha256};

use toolmesh_catalog::Cataloger;
use toolmesh_config::ToolmeshConfig;
use toolmesh_index::IndexStore;
use toolmesh_policy::{PolicyConfig, PolicyEngine};
use toolmesh_refresh::Refresher;
use toolmesh_retriever::Retriever;
use toolmesh_tools::MetaTools;

pub struct Runtime {
    pub store: Arc<IndexStore>,
    pub cataloger: Arc<Cataloger>,
    pub retriever: Arc<Retriever>,
    pub tools: Arc<MetaTools>,
    pub refresher: Arc<Refresher>,
}

impl Runtime {
    /// Builds every shared component and connects to every configured
    /// upstream, but does not start the background refresher — callers
    /// decide whether their lifetime warrants one (a one-shot `mcp`
    /// session typically does not).
    pub async fn build(config: &ToolmeshConfig) -> Result<Self> {
        let db_path = config.index.database_path.as_ref().map(Path::new);
        let store = Arc::new(IndexStore::open(db_path).await?);

        let cataloger = Arc::new(Cataloger::default());
        cataloger.connect_all(&config.upstreams).await;

        let retriever = Arc::new(Retriever::new(store.clone(), cataloger.clone()));
        retriever.sync_from_cataloger().await?;

        let (policy_config, errors) = PolicyConfig::parse(
            &config.security.block,
            &config.security.confirm,
            &config.security.allow,
        );
        for error in &errors {
            tracing::warn!(error = %error, "dropping malformed security pattern");
        }
        let policy = Arc::new(PolicyEngine::new(policy_config));

        let tools = Arc::new(MetaTools::new(
            retriever.clone(),
            cataloger.clone(),
            policy,
            store.clone(),
            config.find_tools.clone(),
            config.selection_cache.clone(),
        ));

        let refresher = Arc::new(Refresher::new(
            cataloger.clone(),
            retriever.clone(),
            store.clone(),
            Duration::from_millis(config.index.refresh_interval_ms),
        ));

        Ok(Self {
            store,
            cataloger,
            retriever,
            tools,
            refresher,
        })
    }

    pub async fn shutdown(&self) {
        self.refresher.stop();
        self.cataloger.disconnect_all().await;
    }
}

/// A stable identifier for this configuration, used to scope the daemon
/// registry file so two differently-configured daemons on the same
/// `daemon_dir` don't clobber each other (§3 `configHash`).
pub fn config_hash(config: &ToolmeshConfig) -> Option<String> {
    let canonical = serde_json::to_vec(config).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    let digest = format!("{:x}", hasher.finalize());
    Some(digest[..16].to_string())
}
