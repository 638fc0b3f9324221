//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables, matching the layout of
//! the deployment's .env file. Credentials stay optional here; the binaries
//! that need them fail with a pointed message instead of every tool refusing
//! to start.

use std::env;
use tracing::warn;

/// Production VerifyMyAge email verification endpoint.
pub const PRODUCTION_URL: &str = "https://email.verification.verifymyage.com";

/// Sandbox VerifyMyAge email verification endpoint.
pub const SANDBOX_URL: &str = "https://email.sandbox.verifymyage.com";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// VerifyMyAge API key
    pub api_key: Option<String>,

    /// VerifyMyAge API secret used for HMAC request signing
    pub api_secret: Option<String>,

    /// Vendor API base URL (production or sandbox)
    pub base_url: String,

    /// HTTP request timeout in milliseconds for vendor calls
    pub request_timeout_ms: u64,

    /// Port for the webhook receiver to listen on
    pub webhook_port: u16,

    /// Path of the JSON file the receiver mirrors callbacks into
    pub callbacks_file: String,

    /// Optional ngrok domain the receiver is exposed on
    pub ngrok_domain: Option<String>,

    /// GitHub account hosting the email CSV
    pub github_username: Option<String>,

    /// GitHub repository hosting the email CSV
    pub github_repo: String,

    /// CSV file name inside the GitHub repository
    pub csv_filename: String,

    /// SendGrid API key for the first integration
    pub sendgrid_api_key_1: Option<String>,

    /// SendGrid API key for the second integration
    pub sendgrid_api_key_2: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            api_key: non_empty("VERIFYMYAGE_API_KEY"),

            api_secret: non_empty("VERIFYMYAGE_API_SECRET"),

            base_url: non_empty("VERIFYMYAGE_ENVIRONMENT")
                .unwrap_or_else(|| PRODUCTION_URL.to_string()),

            request_timeout_ms: parse_number("REQUEST_TIMEOUT_MS", 10_000),

            webhook_port: parse_number("WEBHOOK_PORT", 5002),

            callbacks_file: env::var("CALLBACKS_FILE")
                .unwrap_or_else(|_| "verifymyage_callbacks.json".to_string()),

            ngrok_domain: non_empty("NGROK_DOMAIN"),

            github_username: non_empty("GITHUB_USERNAME"),

            github_repo: env::var("GITHUB_REPO")
                .unwrap_or_else(|_| "email-batch-tests".to_string()),

            csv_filename: env::var("CSV_FILENAME")
                .unwrap_or_else(|_| "emails_to_verify.csv".to_string()),

            sendgrid_api_key_1: non_empty("SENDGRID_API_KEY_1"),

            sendgrid_api_key_2: non_empty("SENDGRID_API_KEY_2"),
        }
    }

    /// Raw URL of the hosted email CSV, built from the GitHub settings.
    ///
    /// `None` when no GitHub account is configured.
    pub fn csv_url(&self) -> Option<String> {
        self.github_username.as_ref().map(|user| {
            format!(
                "https://raw.githubusercontent.com/{}/{}/main/{}",
                user, self.github_repo, self.csv_filename
            )
        })
    }

    /// Default public webhook URL derived from the ngrok domain.
    pub fn default_webhook_url(&self) -> Option<String> {
        self.ngrok_domain
            .as_ref()
            .map(|domain| format!("https://{}", domain))
    }
}

/// Read an environment variable, treating an empty value as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a numeric environment variable, warning when the value is bad.
fn parse_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
            default
        }
    }
}
