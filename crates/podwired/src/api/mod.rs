//! HTTP status API.

pub mod server;
