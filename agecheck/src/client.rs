//! VerifyMyAge API client.
//!
//! Wraps the two vendor endpoints the tools use: single email estimation and
//! batch estimation with a completion webhook. Vendor replies are
//! vendor-defined JSON and are passed through as `serde_json::Value` rather
//! than pinned to a schema that has shifted between API revisions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::signature::{auth_header, sign_payload};

/// Single email estimation endpoint.
pub const ESTIMATE_ENDPOINT: &str = "/api/v1/estimate";

/// Batch estimation endpoint (hosted CSV plus callback URL).
pub const BATCH_ESTIMATE_ENDPOINT: &str = "/api/v1/estimate/batch";

/// Timeout for the webhook reachability preflight.
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error for a vendor reply with a non-success status.
///
/// Carried inside `anyhow::Error`; callers that care about the status can
/// downcast to it.
#[derive(Debug, Error)]
#[error("{endpoint} returned status {status}: {body}")]
pub struct ApiRejection {
    /// Endpoint path that was called
    pub endpoint: &'static str,
    /// HTTP status code from the vendor
    pub status: u16,
    /// Raw response body
    pub body: String,
}

/// Batch estimation request body.
#[derive(Debug, Serialize)]
pub struct BatchRequest {
    /// Public URL of the CSV with emails to verify
    pub file_url: String,
    /// Publicly reachable endpoint for the completion callback
    pub callback_url: String,
}

/// Single estimation request body.
#[derive(Debug, Serialize)]
pub struct EstimateRequest {
    /// Email address to estimate
    pub email: String,
}

/// Client for the VerifyMyAge email verification API.
pub struct VerifyMyAgeClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl VerifyMyAgeClient {
    /// Build a client from the application configuration.
    ///
    /// Fails when the API credentials are not configured.
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("VERIFYMYAGE_API_KEY is not set")?;
        let api_secret = config
            .api_secret
            .clone()
            .context("VERIFYMYAGE_API_SECRET is not set")?;

        Self::with_credentials(
            config.base_url.clone(),
            api_key,
            api_secret,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// Build a client against an explicit base URL and credential pair.
    pub fn with_credentials(
        base_url: String,
        api_key: String,
        api_secret: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
        })
    }

    /// Create a batch verification job for a hosted CSV.
    ///
    /// Issues exactly one POST. Retrying on failure would risk double
    /// submission, so errors are handed straight back to the caller.
    pub async fn create_batch_job(&self, file_url: &str, callback_url: &str) -> Result<Value> {
        let request = BatchRequest {
            file_url: file_url.to_string(),
            callback_url: callback_url.to_string(),
        };
        let body = serde_json::to_string(&request).context("Failed to serialize batch request")?;

        info!(
            file_url = %file_url,
            callback_url = %callback_url,
            "batch_job_submitting"
        );

        let ack = self.post_signed(BATCH_ESTIMATE_ENDPOINT, body).await?;

        info!(
            batch_id = %batch_id_of(&ack),
            status = ack.get("status").and_then(|v| v.as_str()).unwrap_or("N/A"),
            "batch_job_created"
        );

        Ok(ack)
    }

    /// Estimate the age of a single email address.
    pub async fn estimate(&self, email: &str) -> Result<Value> {
        let request = EstimateRequest {
            email: email.to_string(),
        };
        let body =
            serde_json::to_string(&request).context("Failed to serialize estimate request")?;

        info!(email = %email, "estimate_submitting");
        self.post_signed(ESTIMATE_ENDPOINT, body).await
    }

    /// Check whether the public webhook URL answers at all.
    ///
    /// A failed preflight is advisory: the vendor may still reach the tunnel
    /// even when this process cannot, so callers warn and move on.
    pub async fn webhook_reachable(&self, webhook_url: &str) -> bool {
        let result = self
            .http
            .get(webhook_url)
            .timeout(PREFLIGHT_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(url = %webhook_url, "webhook_preflight_ok");
                true
            }
            Ok(response) => {
                warn!(
                    url = %webhook_url,
                    status = response.status().as_u16(),
                    "webhook_preflight_bad_status"
                );
                false
            }
            Err(e) => {
                warn!(url = %webhook_url, error = %e, "webhook_preflight_unreachable");
                false
            }
        }
    }

    /// Sign `body` and POST it to `endpoint`, returning the parsed JSON reply.
    ///
    /// The signature covers the exact string that is sent, so the body is
    /// attached verbatim instead of being re-serialized by the HTTP layer.
    async fn post_signed(&self, endpoint: &'static str, body: String) -> Result<Value> {
        let signature = sign_payload(&self.api_secret, &body);
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, auth_header(&self.api_key, &signature))
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                endpoint = endpoint,
                status = status.as_u16(),
                body = %body,
                "vendor_request_rejected"
            );
            return Err(ApiRejection {
                endpoint,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        response
            .json()
            .await
            .context("Failed to parse vendor response as JSON")
    }
}

/// Extract the batch identifier from a vendor acknowledgment.
///
/// The vendor has answered with `batch_id` or `id` depending on the API
/// revision; falls back to "N/A" when neither is present.
pub fn batch_id_of(ack: &Value) -> String {
    ack.get("batch_id")
        .or_else(|| ack.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string()
}

/// Write the submitted job's record next to the working directory.
///
/// The record keeps everything needed to match a later callback to this
/// submission: the vendor acknowledgment, the CSV and callback URLs, and a
/// timestamp.
pub fn save_job_details(
    out_dir: &Path,
    ack: &Value,
    csv_url: &str,
    callback_url: &str,
) -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = out_dir.join(format!("batch_job_{}.json", timestamp));

    let record = serde_json::json!({
        "batch_id": batch_id_of(ack),
        "job_info": ack,
        "csv_url": csv_url,
        "callback_url": callback_url,
        "timestamp": timestamp,
    });

    std::fs::write(&path, serde_json::to_vec_pretty(&record)?)
        .with_context(|| format!("Failed to write job record {}", path.display()))?;

    info!(path = %path.display(), "batch_job_record_saved");
    Ok(path)
}
