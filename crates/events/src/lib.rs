//! Node change notification source.
//!
//! This crate delivers node changes to handlers the way a Kubernetes
//! controller runtime does:
//!
//! - **Registry**: [`NodeClient`] reads, lists, updates and watches nodes
//! - **Queue**: [`WorkQueue`] serializes work per key, supports deferred
//!   delivery and rate-limited retry
//! - **Controller**: [`NodeController`] pumps changes into the queue and runs
//!   the registered [`NodeChangeHandler`]s from worker tasks
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nodemeta_events::{ControllerConfig, InMemoryNodeRegistry, NodeController};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = InMemoryNodeRegistry::new_arc();
//!     let controller = Arc::new(NodeController::new(registry, ControllerConfig::default()));
//!     let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//!
//!     // controller.on_change("my-handler", handler).await;
//!     let handle = tokio::spawn(controller.run(stop_rx));
//!     let _ = stop_tx.send(true);
//!     let _ = handle.await;
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod controller;
pub mod queue;
pub mod registry;

pub use controller::{ControllerConfig, NodeChangeHandler, NodeController};
pub use queue::{Backoff, DeferredDelivery, WorkQueue};
pub use registry::{InMemoryNodeRegistry, NodeChange, NodeClient};
