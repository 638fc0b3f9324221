//! AgeCheck Submit - verification job submitter.
//!
//! Submits the hosted email CSV to the VerifyMyAge batch estimation endpoint
//! with a signed request, then optionally watches the local receiver's
//! public URL for the completion callback and downloads the result report.
//! A single-address `estimate` subcommand exists for quick credential and
//! connectivity checks.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use agecheck::client::{batch_id_of, save_job_details};
use agecheck::{monitor, Config, VerifyMyAgeClient};

/// Pause between polls of the receiver while waiting for results.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "agecheck-submit", version, about = "Submit email age verification jobs to VerifyMyAge")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a batch job for a hosted CSV of email addresses
    Batch {
        /// Public URL of the webhook receiver (defaults to https://$NGROK_DOMAIN)
        webhook_url: Option<String>,
        /// Hosted CSV to verify (defaults to the GitHub raw URL from the environment)
        #[arg(long)]
        csv_url: Option<String>,
        /// Seconds to wait for the completion callback (0 skips monitoring)
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },
    /// Estimate the age of a single email address
    Estimate {
        /// Email address to estimate
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let client = VerifyMyAgeClient::new(&config)
        .context("VerifyMyAge credentials missing; set VERIFYMYAGE_API_KEY and VERIFYMYAGE_API_SECRET")?;

    match cli.command {
        Commands::Batch {
            webhook_url,
            csv_url,
            wait,
        } => run_batch(&config, &client, webhook_url, csv_url, wait).await,
        Commands::Estimate { email } => run_estimate(&client, &email).await,
    }
}

/// Submit a batch job, then monitor for results when asked to.
async fn run_batch(
    config: &Config,
    client: &VerifyMyAgeClient,
    webhook_url: Option<String>,
    csv_url: Option<String>,
    wait: u64,
) -> Result<()> {
    let webhook_url = match webhook_url.or_else(|| config.default_webhook_url()) {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => bail!("no webhook URL given; pass one or set NGROK_DOMAIN"),
    };

    // The vendor only calls back over HTTP(S)
    let parsed = Url::parse(&webhook_url).context("webhook URL is not a valid URL")?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        bail!("webhook URL must start with http:// or https://");
    }

    let csv_url = match csv_url.or_else(|| config.csv_url()) {
        Some(url) => url,
        None => bail!("no CSV URL given; pass --csv-url or set GITHUB_USERNAME"),
    };

    let callback_url = format!("{}/callback", webhook_url);

    info!(csv_url = %csv_url, callback_url = %callback_url, "batch_submit_starting");

    // Reachability check only; an offline tunnel is worth a warning, not an
    // abort, because the vendor's network path is not ours.
    if !client.webhook_reachable(&webhook_url).await {
        warn!(url = %webhook_url, "webhook_unreachable_continuing");
        println!(
            "warning: webhook at {} is not answering; check the tunnel (results may still arrive)",
            webhook_url
        );
    }

    let ack = client.create_batch_job(&csv_url, &callback_url).await?;

    println!("batch job created");
    println!("  batch id: {}", batch_id_of(&ack));
    println!(
        "  status:   {}",
        ack.get("status").and_then(Value::as_str).unwrap_or("N/A")
    );

    let record = save_job_details(Path::new("."), &ack, &csv_url, &callback_url)?;
    println!("  job record: {}", record.display());

    if wait == 0 {
        return Ok(());
    }

    println!("waiting up to {}s for the completion callback...", wait);
    let poller = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to create HTTP client")?;

    let found = monitor::poll_for_callbacks(
        &poller,
        &webhook_url,
        Duration::from_secs(wait),
        POLL_INTERVAL,
    )
    .await;

    match found {
        Some(payload) => report_results(&payload).await,
        None => {
            println!(
                "no results after {}s; the batch may still be processing, check the receiver's /webhooks",
                wait
            );
            Ok(())
        }
    }
}

/// Print the callback and fetch the report it points at.
async fn report_results(payload: &Value) -> Result<()> {
    let Some(report_url) = payload.get("report_url").and_then(Value::as_str) else {
        println!("callback arrived without a report_url: {}", payload);
        return Ok(());
    };

    println!("results received");
    println!("  report url: {}", report_url);
    if let Some(expiry) = payload.get("expires_in_minutes") {
        println!("  expires in: {} minutes", expiry);
    }

    // The poll client's 5 s cap must not apply here; reports can be large
    let downloader = reqwest::Client::builder()
        .build()
        .context("Failed to create HTTP client")?;
    let saved = monitor::download_report(&downloader, report_url, Path::new(".")).await?;
    println!("  report saved: {}", saved.display());
    Ok(())
}

/// Estimate one address and print the vendor's reply.
async fn run_estimate(client: &VerifyMyAgeClient, email: &str) -> Result<()> {
    let reply = client.estimate(email).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}
