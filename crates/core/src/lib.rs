//! Core types, errors, and utilities for nodemeta.
//!
//! - [`Node`]: snapshot of a node resource with optional annotation/label maps
//! - [`Error`] / [`Result`]: typed errors shared by every crate in the workspace

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod node;
pub mod result;

pub use error::Error;
pub use node::{Metadata, Node};
pub use result::Result;
