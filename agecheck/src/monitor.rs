//! Result monitoring for the submit CLI.
//!
//! The vendor calls back asynchronously, so after submitting a batch the CLI
//! polls the local receiver's public URL until something shows up, then
//! fetches the result report the callback points at. Both helpers take the
//! HTTP client and timing from the caller so they stay usable against test
//! servers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

/// Poll `{webhook_url}/webhooks` until the receiver reports a callback.
///
/// Returns the newest payload, or `None` once `max_wait` elapses. Transient
/// polling errors are logged and retried on the next tick; the receiver may
/// simply not be up yet.
pub async fn poll_for_callbacks(
    client: &Client,
    webhook_url: &str,
    max_wait: Duration,
    interval: Duration,
) -> Option<Value> {
    let url = format!("{}/webhooks", webhook_url.trim_end_matches('/'));
    let mut elapsed = Duration::ZERO;

    info!(url = %url, max_wait_secs = max_wait.as_secs(), "monitor_started");

    while elapsed < max_wait {
        sleep(interval).await;
        elapsed += interval;

        let mut callbacks = match fetch_history(client, &url).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "monitor_poll_failed");
                continue;
            }
        };

        if let Some(latest) = callbacks.pop() {
            info!(elapsed_secs = elapsed.as_secs(), "monitor_callback_arrived");
            return Some(latest);
        }
    }

    info!(max_wait_secs = max_wait.as_secs(), "monitor_timed_out");
    None
}

/// Fetch the receiver's history array.
async fn fetch_history(client: &Client, url: &str) -> Result<Vec<Value>> {
    let response = client.get(url).send().await.context("poll request failed")?;

    let status = response.status();
    if !status.is_success() {
        bail!("receiver answered with status {}", status);
    }

    response
        .json()
        .await
        .context("receiver answered with a non-array body")
}

/// Download the result report CSV and save it under `out_dir`.
///
/// The report is written as-is; only a data row count is derived for the
/// log line, the rows themselves are never interpreted here.
pub async fn download_report(client: &Client, report_url: &str, out_dir: &Path) -> Result<PathBuf> {
    info!(url = %report_url, "report_downloading");

    let response = client
        .get(report_url)
        .send()
        .await
        .context("Failed to fetch result report")?;

    let status = response.status();
    if !status.is_success() {
        bail!("report download returned status {}", status);
    }

    let text = response.text().await.context("Failed to read report body")?;
    let data_rows = text.lines().count().saturating_sub(1);

    let path = out_dir.join(format!(
        "batch_results_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    std::fs::write(&path, &text).with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), data_rows = data_rows, "report_saved");
    Ok(path)
}
