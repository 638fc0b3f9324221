//! Webhook endpoint handlers.
//!
//! The receiver's only job is to catch what the vendor sends and show it
//! back. Handlers therefore:
//! 1. Store the payload verbatim (no schema validation, no deduplication)
//! 2. Answer the vendor's validation probes
//! 3. Expose the received history to operators
//!
//! Interpreting the results happens in the submit CLI, not here.

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::store::CallbackStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: CallbackStore,
}

impl AppState {
    pub fn new(store: CallbackStore) -> Self {
        Self { store }
    }
}

// =============================================================================
// Health Check & Status
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Health check endpoint. Static body, no side effects.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "webhook-server",
    })
}

/// Root endpoint: service banner with the route map and a received count.
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "VerifyMyAge Webhook Server",
        "status": "online",
        "timestamp": Utc::now().to_rfc3339(),
        "endpoints": {
            "/": "Server status",
            "/callback": "Webhook endpoint for VerifyMyAge",
            "/webhooks": "View all received webhooks",
            "/health": "Health check endpoint"
        },
        "callbacks_received": state.store.len().await,
    }))
}

// =============================================================================
// Callback
// =============================================================================

/// Acknowledgment for a stored (or failed) callback.
#[derive(Serialize)]
pub struct CallbackAck {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<usize>,
}

/// Callback endpoint.
///
/// One handler for every method, matching how the vendor exercises the URL:
/// 1. POST carries an actual delivery
/// 2. GET is the validation probe sent around registration
/// 3. HEAD and OPTIONS are connection checks and CORS preflights
pub async fn callback(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    match method {
        Method::POST => store_callback(state, body).await,
        Method::GET => validation_probe(state).await,
        Method::HEAD => ([("x-webhook-status", "active")], ()).into_response(),
        Method::OPTIONS => (
            [
                ("access-control-allow-origin", "*"),
                ("access-control-allow-methods", "GET, POST, HEAD, OPTIONS"),
                ("access-control-allow-headers", "Content-Type, Authorization"),
            ],
            (),
        )
            .into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Store one delivery verbatim and acknowledge it.
async fn store_callback(state: AppState, body: Bytes) -> Response {
    // The vendor is not trusted to send clean JSON: an unparseable body is
    // kept as raw text, an empty one becomes an empty object.
    let payload: Value = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(_) => json!({ "raw_data": String::from_utf8_lossy(&body).into_owned() }),
        }
    };

    info!(
        body_length = body.len(),
        batch_id = payload.get("batch_id").and_then(|v| v.as_str()).unwrap_or(""),
        "callback_received"
    );

    if let Some((adults, minors)) = summarize_results(&payload) {
        info!(
            total = adults + minors,
            adults = adults,
            minors = minors,
            "batch_results_summary"
        );
    }

    match state.store.append(payload).await {
        Ok(callback_id) => (
            StatusCode::OK,
            Json(CallbackAck {
                status: "success",
                message: "Callback received and processed".to_string(),
                callback_id: Some(callback_id),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "callback_store_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CallbackAck {
                    status: "error",
                    message: e.to_string(),
                    callback_id: None,
                }),
            )
                .into_response()
        }
    }
}

/// Answer a GET validation probe with the receiver's readiness.
async fn validation_probe(state: AppState) -> Response {
    let count = state.store.len().await;
    info!(callbacks_count = count, "callback_validation_probe");

    Json(json!({
        "status": "ready",
        "message": "Webhook is active and ready to receive callbacks",
        "callbacks_count": count,
    }))
    .into_response()
}

/// Count adult/minor verdicts when a payload carries inline results.
///
/// Returns `None` for payloads without a `results` array, which is the
/// common case: production callbacks point at a report instead.
fn summarize_results(payload: &Value) -> Option<(usize, usize)> {
    let results = payload.get("results")?.as_array()?;

    let adults = results
        .iter()
        .filter(|r| r.get("is_adult").and_then(Value::as_bool).unwrap_or(false))
        .count();

    Some((adults, results.len() - adults))
}

// =============================================================================
// Webhook History
// =============================================================================

/// Full callback history as a bare JSON array, in arrival order.
pub async fn list_webhooks(State(state): State<AppState>) -> Json<Vec<Value>> {
    Json(state.store.all().await)
}

/// Reset the history and remove the backing file.
pub async fn clear_webhooks(State(state): State<AppState>) -> Response {
    match state.store.clear().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "cleared",
                "message": "All webhooks cleared",
            })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "webhooks_clear_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
