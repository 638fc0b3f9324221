//! SendGrid batch email erasure.
//!
//! Cleanup companion for the verification flow: once a test batch is done,
//! the addresses are purged from SendGrid through the Recipients' Data
//! Erasure API. Each configured key (an "integration") is verified and
//! processed on its own; one failing key is recorded in the run report
//! instead of aborting the others.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// SendGrid API base.
const SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";

/// Timeout for erase calls; the job touches every address in the batch.
const ERASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one erase attempt for one integration.
///
/// Always produced, success or not, so the run report covers every
/// integration that was tried.
#[derive(Debug, Serialize)]
pub struct EraseOutcome {
    /// Whether SendGrid accepted the erasure job
    pub success: bool,
    /// HTTP status, when a response was received at all
    pub status_code: Option<u16>,
    /// Acceptance message or extracted error
    pub message: String,
    /// Request and job identifiers harvested from the response
    pub request_ids: BTreeMap<String, String>,
}

/// Client for SendGrid's Recipients' Data Erasure API.
pub struct SendGridClient {
    http: Client,
    base_url: String,
}

impl SendGridClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(SENDGRID_BASE_URL.to_string())
    }

    /// Build a client against an explicit base URL (tests point this at a
    /// local mock).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(ERASE_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Verify an API key by fetching the account profile.
    pub async fn test_connection(&self, api_key: &str, integration: &str) -> bool {
        let url = format!("{}/v3/user/profile", self.base_url);

        match self.http.get(&url).bearer_auth(api_key).send().await {
            Ok(response) if response.status().is_success() => {
                info!(integration = integration, "sendgrid_connection_ok");
                true
            }
            Ok(response) => {
                warn!(
                    integration = integration,
                    status = response.status().as_u16(),
                    "sendgrid_connection_rejected"
                );
                false
            }
            Err(e) => {
                warn!(integration = integration, error = %e, "sendgrid_connection_failed");
                false
            }
        }
    }

    /// Submit an erasure job for `emails`.
    ///
    /// Erasure is irreversible on SendGrid's side, so nothing is retried;
    /// transport errors and rejections become failed outcomes.
    pub async fn erase_emails(&self, api_key: &str, emails: &[String]) -> EraseOutcome {
        let url = format!("{}/v3/recipients/erasejob", self.base_url);
        let body = json!({ "email_addresses": emails });

        info!(emails = emails.len(), "sendgrid_erase_submitting");

        let response = match self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "sendgrid_erase_request_failed");
                return EraseOutcome {
                    success: false,
                    status_code: None,
                    message: format!("request failed: {}", e),
                    request_ids: BTreeMap::new(),
                };
            }
        };

        let status = response.status().as_u16();
        let mut request_ids = harvest_header_ids(response.headers());
        let text = response.text().await.unwrap_or_default();

        if let Ok(parsed) = serde_json::from_str::<Value>(&text) {
            harvest_body_ids(&parsed, &mut request_ids);
        }

        // 201 = job created, 202 = accepted; the API has answered with both.
        if matches!(status, 200 | 201 | 202 | 204) {
            info!(
                status = status,
                emails = emails.len(),
                request_ids = ?request_ids,
                "sendgrid_erase_accepted"
            );
            EraseOutcome {
                success: true,
                status_code: Some(status),
                message: format!("Successfully initiated erasure for {} emails", emails.len()),
                request_ids,
            }
        } else {
            let message = extract_error_message(&text);
            warn!(status = status, error = %message, "sendgrid_erase_rejected");
            EraseOutcome {
                success: false,
                status_code: Some(status),
                message,
                request_ids,
            }
        }
    }
}

/// Pull request and trace identifiers out of the response headers.
fn harvest_header_ids(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut ids = BTreeMap::new();
    for (header, key) in [
        ("x-request-id", "x_request_id"),
        ("x-message-id", "x_message_id"),
        ("x-trace-id", "x_trace_id"),
    ] {
        if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
            ids.insert(key.to_string(), value.to_string());
        }
    }
    ids
}

/// Pull job identifiers out of the response body.
fn harvest_body_ids(body: &Value, ids: &mut BTreeMap<String, String>) {
    for (field, key) in [
        ("job_id", "job_id"),
        ("id", "erasure_job_id"),
        ("request_id", "request_id"),
    ] {
        if let Some(value) = body.get(field).and_then(id_to_string) {
            ids.insert(key.to_string(), value);
        }
    }
}

/// Identifiers arrive as strings or bare numbers depending on the endpoint.
fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turn an error response body into a displayable message.
fn extract_error_message(text: &str) -> String {
    if text.is_empty() {
        return "Unknown error".to_string();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map
            .get("errors")
            .or_else(|| map.get("message"))
            .map(|v| v.to_string())
            .unwrap_or_else(|| "Unknown error".to_string()),
        Ok(other) => other.to_string(),
        Err(_) => text.to_string(),
    }
}

/// Read and clean email addresses from a CSV or plain text file.
///
/// CSV input takes the first column of every row; any entry without an `@`
/// is dropped, which also takes care of header rows.
pub fn read_emails_from_file(path: &Path) -> Result<Vec<String>> {
    let mut emails = Vec::new();

    if path.extension().and_then(|e| e.to_str()) == Some("csv") {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        for record in reader.records() {
            let record = record.context("Failed to read CSV record")?;
            if let Some(field) = record.get(0) {
                let email = field.trim();
                if email.contains('@') {
                    emails.push(email.to_string());
                }
            }
        }
    } else {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        for line in content.lines() {
            let email = line.trim();
            if email.contains('@') {
                emails.push(email.to_string());
            }
        }
    }

    info!(path = %path.display(), emails = emails.len(), "emails_loaded");
    Ok(emails)
}

/// Write the JSON record and Markdown report for an erasure run.
///
/// Returns the two paths (record, report).
pub fn write_reports(
    out_dir: &Path,
    emails: &[String],
    results: &BTreeMap<String, EraseOutcome>,
) -> Result<(PathBuf, PathBuf)> {
    let now = Local::now();
    let stamp = now.format("%Y%m%d_%H%M%S");

    let record_path = out_dir.join(format!("erasure_record_{}.json", stamp));
    let report_path = out_dir.join(format!("erasure_report_{}.md", stamp));

    let record = json!({
        "timestamp": now.to_rfc3339(),
        "emails_count": emails.len(),
        "emails": emails,
        "results": results,
    });
    std::fs::write(&record_path, serde_json::to_vec_pretty(&record)?)
        .with_context(|| format!("Failed to write {}", record_path.display()))?;

    let mut report = String::new();
    report.push_str("# SendGrid Email Erasure Report\n\n");
    report.push_str(&format!("**Generated**: {}\n\n", now.to_rfc3339()));

    report.push_str("## Summary\n\n");
    report.push_str(&format!("- **Total Emails Processed**: {}\n", emails.len()));
    report.push_str(&format!("- **Integrations Tested**: {}\n\n", results.len()));

    report.push_str("## Emails Processed\n\n");
    for (i, email) in emails.iter().enumerate() {
        report.push_str(&format!("{}. {}\n", i + 1, email));
    }

    report.push_str("\n## Results by Integration\n\n");
    for (integration, outcome) in results {
        report.push_str(&format!("### {}\n\n", integration));
        report.push_str(&format!(
            "- **Status**: {}\n",
            if outcome.success { "Success" } else { "Failed" }
        ));
        report.push_str(&format!(
            "- **Status Code**: {}\n",
            outcome
                .status_code
                .map_or("N/A".to_string(), |s| s.to_string())
        ));
        report.push_str(&format!("- **Message**: {}\n", outcome.message));
        if !outcome.request_ids.is_empty() {
            report.push_str("\n#### Request IDs\n\n");
            for (kind, value) in &outcome.request_ids {
                report.push_str(&format!("- **{}**: `{}`\n", kind, value));
            }
        }
        report.push('\n');
    }

    report.push_str("## Notes\n\n");
    report.push_str(
        "- Jobs go through the Recipients' Data Erasure API (POST /v3/recipients/erasejob)\n",
    );
    report.push_str("- Status 201/202 means the job was created or accepted\n");
    report.push_str("- Status 403 means the key lacks the erasure permission\n");
    report.push_str("- Erased addresses cannot be recovered\n");

    std::fs::write(&report_path, report)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    info!(
        record = %record_path.display(),
        report = %report_path.display(),
        "erasure_reports_written"
    );
    Ok((record_path, report_path))
}
