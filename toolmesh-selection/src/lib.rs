//! Per-session in-memory set of qualified tool names, flushed into the
//! index store's co-occurrence table once a session has selected two or
//! more distinct tools.

use std::collections::HashSet;

use parking_lot::RwLock;
use toolmesh_index::IndexStore;

pub struct SelectionTracker {
    tools: RwLock<HashSet<String>>,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashSet::new()),
        }
    }

    pub fn track(&self, qualified_name: &str) {
        self.tools.write().insert(qualified_name.to_string());
    }

    pub fn session_tool_count(&self) -> usize {
        self.tools.read().len()
    }

    pub fn has(&self, qualified_name: &str) -> bool {
        self.tools.read().contains(qualified_name)
    }

    pub fn session_tools(&self) -> Vec<String> {
        self.tools.read().iter().cloned().collect()
    }

    /// Records every pairing among the tracked tools. Requires at least
    /// two tracked tools; a no-op otherwise.
    pub async fn flush_to_store(
        &self,
        store: &IndexStore,
    ) -> Result<(), toolmesh_index::IndexError> {
        let keys = self.session_tools();
        if keys.len() < 2 {
            return Ok(());
        }
        store.record_cooccurrences(&keys).await
    }

    pub fn reset(&self) {
        self.tools.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_is_idempotent() {
        let tracker = SelectionTracker::new();
        tracker.track("fs:read_file");
        tracker.track("fs:read_file");
        assert_eq!(tracker.session_tool_count(), 1);
    }

    #[test]
    fn reset_clears_tracked_tools() {
        let tracker = SelectionTracker::new();
        tracker.track("fs:read_file");
        tracker.reset();
        assert_eq!(tracker.session_tool_count(), 0);
        assert!(!tracker.has("fs:read_file"));
    }

    #[tokio::test]
    async fn flush_requires_at_least_two_tracked_tools() {
        let store = IndexStore::open(None).await.unwrap();
        let tracker = SelectionTracker::new();
        tracker.track("fs:read_file");
        tracker.flush_to_store(&store).await.unwrap();
        assert!(store
            .get_related_tools("fs:read_file", 1, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn flush_records_all_pairs_among_tracked_tools() {
        let store = IndexStore::open(None).await.unwrap();
        let tracker = SelectionTracker::new();
        tracker.track("fs:read_file");
        tracker.track("github:list_issues");
        tracker.flush_to_store(&store).await.unwrap();
        let related = store.get_related_tools("fs:read_file", 1, 10).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].qualified_name, "github:list_issues");
    }
}
