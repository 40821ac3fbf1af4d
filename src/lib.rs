#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # nodemeta
//!
//! Managed etcd node metadata controller.
//!
//! This library holds the process wiring used by the `nodemeta` binary and
//! re-exports the workspace crates for convenience.

pub use nodemeta_core;
pub use nodemeta_events;
pub use nodemeta_reconciler;

pub mod cli;
pub mod config;
