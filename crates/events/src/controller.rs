//! Node controller: fans registry changes out to registered handlers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use itertools::Itertools;
use nodemeta_core::{Node, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, RwLock};
use tokio::time::Interval;
use tracing::{debug, info, warn};

use crate::queue::WorkQueue;
use crate::registry::NodeClient;

/// Callback invoked for every node change.
#[async_trait]
pub trait NodeChangeHandler: Send + Sync {
    /// Handle a change for `key`. `node` is `None` when the node was deleted.
    ///
    /// The returned node is passed to the next registered handler.
    async fn on_change(&self, key: &str, node: Option<Node>) -> Result<Option<Node>>;
}

/// Configuration for the node controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of concurrent worker tasks.
    pub workers: usize,
    /// Re-enqueue every node on this period, if set.
    pub resync_period: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            resync_period: None,
        }
    }
}

/// Dispatches node changes to handlers through a per-key work queue.
pub struct NodeController {
    client: Arc<dyn NodeClient>,
    queue: WorkQueue,
    handlers: RwLock<BTreeMap<String, Arc<dyn NodeChangeHandler>>>,
    config: ControllerConfig,
}

impl NodeController {
    /// Create a controller with a fresh work queue.
    pub fn new(client: Arc<dyn NodeClient>, config: ControllerConfig) -> Self {
        Self {
            client,
            queue: WorkQueue::new(),
            handlers: RwLock::new(BTreeMap::new()),
            config,
        }
    }

    /// Register `handler` under a stable subscriber id.
    ///
    /// Registering an id that is already present replaces its handler rather
    /// than adding a second subscription. Returns `true` on replacement.
    pub async fn on_change(
        &self,
        subscriber_id: impl Into<String>,
        handler: Arc<dyn NodeChangeHandler>,
    ) -> bool {
        let subscriber_id = subscriber_id.into();
        let replaced = self
            .handlers
            .write()
            .await
            .insert(subscriber_id.clone(), handler)
            .is_some();
        debug!(subscriber = %subscriber_id, replaced, "Registered node change handler");
        replaced
    }

    /// Ids of every registered handler, in dispatch order.
    pub async fn subscribers(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect_vec()
    }

    /// Queue a key for immediate processing.
    pub fn enqueue(&self, key: &str) {
        self.queue.add(key);
    }

    /// Queue a key for processing after `delay`.
    pub fn enqueue_after(&self, key: &str, delay: Duration) {
        self.queue.add_after(key, delay);
    }

    /// The controller's work queue.
    pub const fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// The registry client handlers should write through.
    pub const fn client(&self) -> &Arc<dyn NodeClient> {
        &self.client
    }

    /// Queue every node currently in the registry.
    ///
    /// # Errors
    ///
    /// Returns the registry error if listing fails.
    pub async fn enqueue_all(&self) -> Result<usize> {
        let nodes = self.client.list().await?;
        nodes.iter().for_each(|node| self.queue.add(&node.name));
        Ok(nodes.len())
    }

    /// Run the handler chain for one key against its current snapshot.
    async fn sync_key(&self, key: &str) -> Result<()> {
        let mut node = self.client.get(key).await?;
        let handlers = self.handlers.read().await.values().cloned().collect_vec();

        for handler in handlers {
            node = handler.on_change(key, node).await?;
        }
        Ok(())
    }

    /// Process one key from the queue.
    ///
    /// Returns `false` once the queue has been shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        match self.sync_key(&key).await {
            Ok(()) => self.queue.forget(&key),
            Err(e) => {
                warn!(
                    key = %key,
                    error = %e,
                    failures = self.queue.failures(&key),
                    "Failed to sync node, requeueing with backoff"
                );
                self.queue.add_rate_limited(&key);
            }
        }

        self.queue.done(&key);
        true
    }

    async fn worker(&self, id: usize) {
        debug!(worker = id, "Worker started");
        while self.process_next().await {}
        debug!(worker = id, "Worker stopped");
    }

    async fn relist(&self, reason: &str) {
        match self.enqueue_all().await {
            Ok(count) => debug!(count, reason, "Enqueued all nodes"),
            Err(e) => warn!(error = %e, reason, "Failed to list nodes"),
        }
    }

    /// Run workers and the change pump until `stop` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns the registry error if the initial listing fails.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) -> Result<()> {
        let workers = self.config.workers.max(1);
        info!(
            workers,
            resync_period = ?self.config.resync_period,
            "Starting node controller"
        );

        // Subscribe before listing so no change slips between the two.
        let mut changes = self.client.watch();
        self.enqueue_all().await?;

        let handles = (0..workers)
            .map(|id| {
                let controller = Arc::clone(&self);
                tokio::spawn(async move { controller.worker(id).await })
            })
            .collect_vec();

        // A zero period means no resync; `interval` rejects it.
        let mut resync = self
            .config
            .resync_period
            .filter(|period| !period.is_zero())
            .map(|period| {
                let mut interval = tokio::time::interval(period);
                interval.reset();
                interval
            });

        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Ok(change) => self.queue.add(&change.key),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed lagged, relisting");
                        self.relist("lagged").await;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Change feed closed");
                        break;
                    }
                },
                () = tick(resync.as_mut()) => self.relist("resync").await,
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }

        self.queue.shut_down();
        join_all(handles).await;
        info!("Node controller stopped");
        Ok(())
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
