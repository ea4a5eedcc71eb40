//! podwired - podwire node daemon.
//!
//! Serves the remote CNI gRPC API consumed by the CNI plugin binary and a
//! small HTTP status API, both backed by one attachment engine.

pub mod api;
pub mod config;
pub mod grpc;

pub use config::{DaemonConfig, LinkBackend, LogFormat, MirrorKind, SwitchBackend};
