//! Router serving engine status.

use std::sync::Arc;

use axum::extract::State;
use axum::{Json, Router, routing::get};
use podwire_network::AttachmentEngine;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

/// Build the status router.
pub fn app(engine: Arc<AttachmentEngine>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/version", get(version))
        .route("/attachments", get(attachments))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "podwired running" }))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn attachments(State(engine): State<Arc<AttachmentEngine>>) -> Json<Value> {
    let state = engine.snapshot().await;
    Json(json!({
        "phase": state.phase(),
        "counter": state.counter,
        "gateway_initialized": state.gateway_initialized,
        "active_ports": state.active_ports,
        "fabric": engine.config(),
    }))
}
