//! Managed etcd node metadata reconciliation.
//!
//! Keeps the local node's etcd membership metadata in line with local
//! configuration:
//!
//! - **Etcd member**: `etcd.k3s.cattle.io/node-name` and
//!   `etcd.k3s.cattle.io/node-address` annotations carry the member identity,
//!   and the `node-role.kubernetes.io/etcd` label is `"true"`
//! - **Not a member**: all three are removed
//!
//! # Key Concepts
//!
//! ## Reconciliation
//!
//! [`MetadataReconciler::reconcile`] is a pure function of the delivered
//! snapshot and the injected [`IdentityProvider`]. It returns a
//! [`Directive`]:
//!
//! - `NoAction` - deleted node, another node, or already converged
//! - `Update` - replacement node with only the managed keys changed
//! - `RequeueAfter` - node name not assigned yet, try again in 5s
//!
//! ## Handling
//!
//! [`MetadataHandler`] applies the directive: at most one registry write per
//! delivery, errors handed back to the dispatcher unchanged.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nodemeta_events::{ControllerConfig, InMemoryNodeRegistry, NodeController};
//! use nodemeta_reconciler::{register_metadata_handlers, EnvIdentityProvider, MemberIdentity};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = InMemoryNodeRegistry::new_arc();
//!     let controller = Arc::new(NodeController::new(registry, ControllerConfig::default()));
//!     let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//!
//!     let identity = Arc::new(EnvIdentityProvider::new(Some(MemberIdentity::new(
//!         "node-1-5f2c",
//!         "https://10.0.0.1:2380",
//!     ))));
//!     register_metadata_handlers(&controller, identity, stop_rx.clone()).await;
//!
//!     // controller.run(stop_rx).await;
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod handler;
pub mod identity;
pub mod metadata;
pub mod reconciler;

// Re-export main types
pub use handler::{register_metadata_handlers, MetadataHandler, CONTROLLER_NAME};
pub use identity::{
    EnvIdentityProvider, IdentityProvider, LocalIdentity, MemberIdentity, StaticIdentityProvider,
    NODE_NAME_ENV,
};
pub use metadata::{
    DesiredMetadata, ETCD_ROLE_LABEL, ETCD_ROLE_VALUE, NODE_ADDRESS_ANNOTATION,
    NODE_NAME_ANNOTATION,
};
pub use nodemeta_core::{Error, Result};
pub use reconciler::{Directive, MetadataReconciler, IDENTITY_REQUEUE_DELAY};
