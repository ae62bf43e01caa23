//! Error handling for the calendar scraper
//!
//! Defines the scrape failure taxonomy and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use chrono::NaiveDate;
use thiserror::Error;

/// Failures the scrape core distinguishes between.
///
/// "No events for a day" and "record without a title" are not errors: the
/// first is `Extraction::Empty`, the second a dropped-record count.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("browser session setup failed: {0}")]
    SessionSetup(String),

    #[error("browser session invalidated: {0}")]
    SessionInvalidated(String),

    #[error("verification page did not clear for {url}")]
    VerificationTimeout { url: String },

    #[error("navigation failed for {url} after {attempts} attempt(s)")]
    NavigationFailed { url: String, attempts: u32 },

    #[error("no working browser session could be created for {start}..={end}")]
    NoSessionAvailable { start: NaiveDate, end: NaiveDate },

    #[error("config error: {0}")]
    Config(String),

    #[error("record sink error: {0}")]
    Sink(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for scraper operations
pub type Result<T> = anyhow::Result<T>;

/// Error text fragments that mean the remote browser session is gone
const INVALID_SESSION_MARKERS: &[&str] = &[
    "invalid session id",
    "session deleted",
    // CDP wording for the same condition
    "no such target",
    "target closed",
    "connection is closed",
];

/// True when the error chain reports an invalidated browser session
pub fn is_invalid_session(err: &anyhow::Error) -> bool {
    let message = format!("{:#}", err).to_lowercase();
    INVALID_SESSION_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}
