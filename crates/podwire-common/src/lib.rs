//! # podwire-common
//!
//! Shared utilities and types for the podwire attachment orchestrator.
//!
//! This crate provides functionality used by both the network core and
//! the node daemon:
//! - Container ID handling
//! - Standard filesystem paths
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod paths;

pub use error::{PodwireError, PodwireResult};
pub use id::ContainerId;
pub use paths::PodwirePaths;
