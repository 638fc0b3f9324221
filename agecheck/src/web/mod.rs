//! Web server module for the webhook receiver.
//!
//! This module provides a small receiver that:
//! - Accepts VerifyMyAge completion callbacks on /callback
//! - Stores every payload verbatim, in memory and in a JSON file
//! - Exposes the received history on /webhooks for operators and polling
//!
//! Interpreting the results happens in the submit CLI, not here.

pub mod handlers;

use axum::{
    routing::{any, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    callback, clear_webhooks, health, list_webhooks, root, AppState, CallbackAck, HealthResponse,
};

/// Build the receiver's router with all routes attached.
///
/// The callback route takes every method; the handler sorts out deliveries
/// from validation probes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/callback", any(callback))
        .route("/webhooks", get(list_webhooks))
        .route("/webhooks/clear", post(clear_webhooks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
