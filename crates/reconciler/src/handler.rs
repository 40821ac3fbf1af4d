//! Node change handler applying reconciliation directives.

use std::sync::Arc;

use async_trait::async_trait;
use nodemeta_core::{Error, Node, Result};
use nodemeta_events::{DeferredDelivery, NodeChangeHandler, NodeClient, NodeController};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::identity::IdentityProvider;
use crate::reconciler::{Directive, MetadataReconciler};

/// Stable subscriber id of the metadata handler.
pub const CONTROLLER_NAME: &str = "managed-etcd-metadata-controller";

/// Applies [`MetadataReconciler`] directives against the node registry.
///
/// Each call performs at most one write. Write failures are returned as-is;
/// retrying them is the dispatcher's job.
pub struct MetadataHandler {
    reconciler: MetadataReconciler,
    client: Arc<dyn NodeClient>,
    deferred: Arc<dyn DeferredDelivery>,
    cancel: watch::Receiver<bool>,
}

impl MetadataHandler {
    /// Create a handler.
    ///
    /// `cancel` flipping to `true` aborts an in-flight write.
    pub fn new(
        reconciler: MetadataReconciler,
        client: Arc<dyn NodeClient>,
        deferred: Arc<dyn DeferredDelivery>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reconciler,
            client,
            deferred,
            cancel,
        }
    }

    /// Reconcile the snapshot delivered for `key`.
    ///
    /// Returns the input node when nothing was written, or the stored node
    /// after a write.
    ///
    /// # Errors
    ///
    /// Returns the registry error if the update fails, or
    /// [`Error::Cancelled`] if cancellation interrupts it.
    pub async fn sync(&self, key: &str, node: Option<Node>) -> Result<Option<Node>> {
        let directive = self.reconciler.reconcile(key, node.as_ref());
        if !directive.is_no_action() {
            debug!(key, directive = %directive.description(), "Applying directive");
        }

        match directive {
            Directive::NoAction => Ok(node),
            Directive::RequeueAfter(delay) => {
                self.deferred.redeliver_after(key, delay);
                Ok(node)
            }
            Directive::Update(desired) => self.submit(desired).await.map(Some),
        }
    }

    async fn submit(&self, node: Node) -> Result<Node> {
        let mut cancel = self.cancel.clone();
        if *cancel.borrow_and_update() {
            return Err(Error::cancelled("update node"));
        }

        debug!(node = %node.name, resource_version = node.resource_version, "Updating node");
        tokio::select! {
            result = self.client.update(node) => result,
            () = cancelled(&mut cancel) => Err(Error::cancelled("update node")),
        }
    }
}

/// Resolve once `cancel` reads `true`. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[async_trait]
impl NodeChangeHandler for MetadataHandler {
    async fn on_change(&self, key: &str, node: Option<Node>) -> Result<Option<Node>> {
        self.sync(key, node).await
    }
}

/// Register the metadata handler on `controller` under [`CONTROLLER_NAME`].
///
/// Writes go through the controller's client and identity requeues through
/// its work queue.
pub async fn register_metadata_handlers(
    controller: &NodeController,
    identity: Arc<dyn IdentityProvider>,
    cancel: watch::Receiver<bool>,
) -> Arc<MetadataHandler> {
    let handler = Arc::new(MetadataHandler::new(
        MetadataReconciler::new(identity),
        Arc::clone(controller.client()),
        Arc::new(controller.queue().clone()),
        cancel,
    ));

    info!("Starting managed etcd node metadata controller");
    controller
        .on_change(CONTROLLER_NAME, Arc::clone(&handler) as Arc<dyn NodeChangeHandler>)
        .await;
    handler
}
