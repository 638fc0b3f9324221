//! AgeCheck Erase - SendGrid batch email cleanup.
//!
//! Reads addresses from a local CSV or text file and files a Recipients'
//! Data Erasure job for every configured SendGrid integration, then writes a
//! JSON record and a Markdown report of the run. Erasure is irreversible, so
//! every attempt and its outcome lands in the report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agecheck::sendgrid::{read_emails_from_file, write_reports, SendGridClient};
use agecheck::Config;

#[derive(Parser, Debug)]
#[command(name = "agecheck-erase", version, about = "Erase batch test emails from SendGrid")]
struct Cli {
    /// CSV or text file with the addresses to erase
    #[arg(default_value = "emails.csv")]
    file: PathBuf,
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

    let integrations: Vec<(&str, &String)> = [
        ("Integration 1", config.sendgrid_api_key_1.as_ref()),
        ("Integration 2", config.sendgrid_api_key_2.as_ref()),
    ]
    .into_iter()
    .filter_map(|(name, key)| key.map(|k| (name, k)))
    .collect();

    if integrations.is_empty() {
        bail!("no API keys configured; set SENDGRID_API_KEY_1 and/or SENDGRID_API_KEY_2");
    }

    let emails = read_emails_from_file(&cli.file)?;
    if emails.is_empty() {
        bail!("no valid emails found in {}", cli.file.display());
    }

    println!(
        "found {} valid email addresses in {}",
        emails.len(),
        cli.file.display()
    );
    for (i, email) in emails.iter().enumerate() {
        println!("  {}. {}", i + 1, email);
    }

    let client = SendGridClient::new()?;
    let mut results = BTreeMap::new();

    for (name, key) in integrations {
        info!(integration = name, "erase_integration_starting");

        // A key that cannot even read the profile will not be allowed to
        // erase; skip it rather than file a doomed job.
        if !client.test_connection(key, name).await {
            println!("{}: API connection failed, skipping", name);
            continue;
        }

        let outcome = client.erase_emails(key, &emails).await;
        if outcome.success {
            println!("{}: {}", name, outcome.message);
            for (kind, value) in &outcome.request_ids {
                println!("    {}: {}", kind, value);
            }
        } else {
            println!(
                "{}: failed (status {}): {}",
                name,
                outcome
                    .status_code
                    .map_or("N/A".to_string(), |s| s.to_string()),
                outcome.message
            );
        }
        results.insert(name.to_string(), outcome);
    }

    let (record, report) = write_reports(Path::new("."), &emails, &results)?;
    println!("record saved: {}", record.display());
    println!("report saved: {}", report.display());

    Ok(())
}
