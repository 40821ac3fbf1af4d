//! Node registry client trait and implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use nodemeta_core::{Error, Node, Result};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Capacity of the change feed before slow watchers start lagging.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// Notification that the node stored under `key` changed or was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeChange {
    /// Name of the node that changed.
    pub key: String,
}

/// Client for the node registry.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Fetch the current snapshot of a node, `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<Node>>;

    /// List every node.
    async fn list(&self) -> Result<Vec<Node>>;

    /// Replace a previously fetched node.
    ///
    /// Fails with [`Error::Conflict`] when `node.resource_version` is stale.
    async fn update(&self, node: Node) -> Result<Node>;

    /// Subscribe to change notifications.
    fn watch(&self) -> broadcast::Receiver<NodeChange>;
}

/// In-memory node registry for testing and standalone runs.
pub struct InMemoryNodeRegistry {
    nodes: RwLock<HashMap<String, Node>>,
    changes: broadcast::Sender<NodeChange>,
    writes: AtomicU64,
    failures_to_inject: AtomicU32,
}

impl Default for InMemoryNodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            nodes: RwLock::new(HashMap::new()),
            changes,
            writes: AtomicU64::new(0),
            failures_to_inject: AtomicU32::new(0),
        }
    }

    /// Create an empty registry wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a node. The stored copy starts at resource version 1.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if a node with the same name exists.
    pub async fn create(&self, node: Node) -> Result<Node> {
        let mut nodes = self.nodes.write().await;
        if nodes.contains_key(&node.name) {
            return Err(Error::already_exists(node.name));
        }
        let stored = node.with_resource_version(1);
        nodes.insert(stored.name.clone(), stored.clone());
        drop(nodes);

        self.notify(&stored.name);
        Ok(stored)
    }

    /// Delete a node, returning the last stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if no such node exists.
    pub async fn delete(&self, name: &str) -> Result<Node> {
        let removed = self
            .nodes
            .write()
            .await
            .remove(name)
            .ok_or_else(|| Error::node_not_found(name))?;

        self.notify(name);
        Ok(removed)
    }

    /// Number of successful updates since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make the next `count` updates fail with [`Error::RegistryUnavailable`].
    pub fn inject_update_failures(&self, count: u32) {
        self.failures_to_inject.store(count, Ordering::Relaxed);
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_to_inject
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    fn notify(&self, key: &str) {
        debug!(key, "Publishing node change");
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(NodeChange {
            key: key.to_string(),
        });
    }
}

#[async_trait]
impl NodeClient for InMemoryNodeRegistry {
    async fn get(&self, name: &str) -> Result<Option<Node>> {
        Ok(self.nodes.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Node>> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .values()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .cloned()
            .collect_vec())
    }

    async fn update(&self, node: Node) -> Result<Node> {
        if self.take_injected_failure() {
            return Err(Error::registry_unavailable("injected update failure"));
        }

        let mut nodes = self.nodes.write().await;
        let current = nodes
            .get(&node.name)
            .map(|n| n.resource_version)
            .ok_or_else(|| Error::node_not_found(&node.name))?;

        if current != node.resource_version {
            return Err(Error::conflict(node.name, node.resource_version, current));
        }

        let stored = node.with_resource_version(current.saturating_add(1));
        nodes.insert(stored.name.clone(), stored.clone());
        drop(nodes);

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.notify(&stored.name);
        Ok(stored)
    }

    fn watch(&self) -> broadcast::Receiver<NodeChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_first_version() {
        let registry = InMemoryNodeRegistry::new();
        let stored = registry.create(Node::new("n1")).await;
        assert_eq!(stored.ok().map(|n| n.resource_version), Some(1));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let registry = InMemoryNodeRegistry::new();
        let _ = registry.create(Node::new("n1")).await;
        let again = registry.create(Node::new("n1")).await;
        assert!(matches!(again, Err(Error::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_counts_write() {
        let registry = InMemoryNodeRegistry::new();
        let created = registry.create(Node::new("n1")).await;
        assert!(created.is_ok());

        let snapshot = registry.get("n1").await.ok().flatten();
        let updated = match snapshot {
            Some(node) => registry.update(node.with_label("k", "v")).await,
            None => Err(Error::node_not_found("n1")),
        };

        assert_eq!(updated.as_ref().ok().map(|n| n.resource_version), Some(2));
        assert_eq!(
            updated.ok().and_then(|n| n.label("k").map(str::to_string)),
            Some("v".to_string())
        );
        assert_eq!(registry.write_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let registry = InMemoryNodeRegistry::new();
        let _ = registry.create(Node::new("n1")).await;

        let stale = Node::new("n1").with_resource_version(7);
        let result = registry.update(stale).await;

        assert!(result.as_ref().err().is_some_and(Error::is_conflict));
        assert_eq!(registry.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_node() {
        let registry = InMemoryNodeRegistry::new();
        let result = registry.update(Node::new("ghost")).await;
        assert!(matches!(result, Err(Error::NodeNotFound { .. })));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let registry = InMemoryNodeRegistry::new();
        let _ = registry.create(Node::new("n1")).await;
        registry.inject_update_failures(1);

        let first = registry.update(Node::new("n1").with_resource_version(1)).await;
        assert!(matches!(first, Err(Error::RegistryUnavailable { .. })));

        let second = registry.update(Node::new("n1").with_resource_version(1)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_watch_sees_create_and_delete() {
        let registry = InMemoryNodeRegistry::new();
        let mut changes = registry.watch();

        let _ = registry.create(Node::new("n1")).await;
        let _ = registry.delete("n1").await;

        assert_eq!(changes.recv().await.ok().map(|c| c.key), Some("n1".to_string()));
        assert_eq!(changes.recv().await.ok().map(|c| c.key), Some("n1".to_string()));
        assert!(registry.get("n1").await.ok().flatten().is_none());
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let registry = InMemoryNodeRegistry::new();
        let _ = registry.create(Node::new("b")).await;
        let _ = registry.create(Node::new("a")).await;

        let names = registry
            .list()
            .await
            .map(|nodes| nodes.into_iter().map(|n| n.name).collect_vec());
        assert_eq!(names.ok(), Some(vec!["a".to_string(), "b".to_string()]));
    }
}
