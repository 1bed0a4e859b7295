//! Background re-sync: a periodic timer that re-snapshots the upstream
//! catalog, diffs it against what the index store already has, and
//! applies the delta. At most one refresh runs at a time; overlapping
//! `force_refresh` calls coalesce onto the one already in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use toolmesh_catalog::Cataloger;
use toolmesh_core::split_qualified;
use toolmesh_index::IndexStore;
use toolmesh_retriever::Retriever;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl RefreshDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RefreshEvent {
    Start,
    Complete { diff: RefreshDiff },
    Error { message: String },
}

pub struct Refresher {
    cataloger: Arc<Cataloger>,
    retriever: Arc<Retriever>,
    store: Arc<IndexStore>,
    interval: Duration,
    events: broadcast::Sender<RefreshEvent>,
    in_flight: Mutex<Option<Arc<Notify>>>,
    last_diff: Mutex<RefreshDiff>,
    stopped: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Refresher {
    pub fn new(
        cataloger: Arc<Cataloger>,
        retriever: Arc<Retriever>,
        store: Arc<IndexStore>,
        interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            cataloger,
            retriever,
            store,
            interval,
            events,
            in_flight: Mutex::new(None),
            last_diff: Mutex::new(RefreshDiff::default()),
            stopped: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    /// Starts the periodic tick loop. A no-op if already running.
    pub fn start(self: &Arc<Self>) {
        if self.handle.lock().is_some() {
            return;
        }
        self.stopped.store(false, Ordering::SeqCst);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if this.stopped.load(Ordering::SeqCst) {
                    return;
                }
                let _ = this.force_refresh().await;
            }
        });
        *self.handle.lock() = Some(handle);
    }

    /// Cancels future ticks. A refresh already in progress completes.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    pub async fn force_refresh(&self) -> Result<RefreshDiff, toolmesh_retriever::RetrieverError> {
        let notify = {
            let mut guard = self.in_flight.lock();
            if let Some(existing) = guard.as_ref() {
                Some(existing.clone())
            } else {
                *guard = Some(Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
            return Ok(self.last_diff.lock().clone());
        }

        let _ = self.events.send(RefreshEvent::Start);
        let result = self.run_refresh().await;

        match &result {
            Ok(diff) => {
                *self.last_diff.lock() = diff.clone();
                let _ = self.events.send(RefreshEvent::Complete { diff: diff.clone() });
            }
            Err(err) => {
                let _ = self.events.send(RefreshEvent::Error {
                    message: err.to_string(),
                });
            }
        }

        let waiter = self.in_flight.lock().take();
        if let Some(notify) = waiter {
            notify.notify_waiters();
        }

        result
    }

    async fn run_refresh(&self) -> Result<RefreshDiff, toolmesh_retriever::RetrieverError> {
        let before: HashMap<String, String> = self
            .store
            .get_all_tools()
            .await
            .map_err(toolmesh_index::IndexError::from)?
            .into_iter()
            .map(|tool| (tool.qualified_name(), tool.schema_hash))
            .collect();

        self.cataloger.refresh_all_tools().await;
        let after_tools = self.cataloger.get_all_tools().await;

        let mut after: HashMap<String, String> = HashMap::with_capacity(after_tools.len());
        for tool in &after_tools {
            after.insert(
                tool.qualified_name(),
                IndexStore::schema_hash(&tool.input_schema),
            );
        }

        let mut diff = RefreshDiff::default();
        for (key, hash) in &after {
            match before.get(key) {
                None => diff.added.push(key.clone()),
                Some(old_hash) if old_hash != hash => diff.modified.push(key.clone()),
                _ => {}
            }
        }
        for key in before.keys() {
            if !after.contains_key(key) {
                diff.removed.push(key.clone());
            }
        }

        self.retriever.sync_from_cataloger().await?;

        for key in &diff.removed {
            if let Some((server_key, tool_name)) = split_qualified(key) {
                self.store
                    .remove_tool(tool_name, server_key)
                    .await
                    .map_err(toolmesh_index::IndexError::from)?;
            }
        }

        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolmesh_core::CatalogedTool;

    #[tokio::test]
    async fn empty_catalog_produces_empty_diff() {
        let store = Arc::new(IndexStore::open(None).await.unwrap());
        let cataloger = Arc::new(Cataloger::new(Duration::from_secs(5)));
        let retriever = Arc::new(Retriever::new(store.clone(), cataloger.clone()));
        let refresher = Refresher::new(cataloger, retriever, store, DEFAULT_REFRESH_INTERVAL);

        let diff = refresher.force_refresh().await.unwrap();
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn removed_tool_is_deleted_from_store() {
        let store = Arc::new(IndexStore::open(None).await.unwrap());
        let cataloger = Arc::new(Cataloger::new(Duration::from_secs(5)));
        let retriever = Arc::new(Retriever::new(store.clone(), cataloger.clone()));

        store
            .index_tool(&CatalogedTool {
                name: "stale_tool".to_string(),
                description: Some("no longer connected".to_string()),
                input_schema: json!({"type": "object"}),
                server_key: "fs".to_string(),
            })
            .await
            .unwrap();

        let refresher = Refresher::new(cataloger, retriever, store.clone(), DEFAULT_REFRESH_INTERVAL);
        let diff = refresher.force_refresh().await.unwrap();

        assert_eq!(diff.removed, vec!["fs:stale_tool".to_string()]);
        assert!(store.get_tool("stale_tool", "fs").await.unwrap().is_none());
    }
}
