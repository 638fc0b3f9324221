//! AgeCheck - batch email age verification demo.
//!
//! This library provides shared modules for the three AgeCheck binaries:
//! - `agecheck-webhook`: Receiver for VerifyMyAge completion callbacks
//! - `agecheck-submit`: Submitter for batch and single verification jobs
//! - `agecheck-erase`: SendGrid cleanup for processed batch emails
//!
//! ## Flow
//!
//! ```text
//! submit → VerifyMyAge API → (async) → /callback → receiver → JSON file
//!                                                      ↑
//!                                  submit polls /webhooks for the report
//! ```

pub mod client;
pub mod config;
pub mod monitor;
pub mod sendgrid;
pub mod signature;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use client::VerifyMyAgeClient;
pub use config::Config;
pub use sendgrid::SendGridClient;
pub use store::CallbackStore;
pub use web::AppState;
