//! Typed errors for the crawler.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match on
//! the failure taxonomy and route work accordingly.

use std::time::Duration;

use thiserror::Error;

use crate::ratelimit::FailureKind;

/// Errors raised while crawling a company's career site.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Connection reset, DNS failure, non-2xx response and the like.
    #[error("transient network failure for {url}: {reason}")]
    TransientNetwork { url: String, reason: String },

    /// Request exceeded its deadline.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// The site explicitly asked us to slow down (HTTP 429 or equivalent).
    #[error("rate limited by {url}")]
    RateLimited { url: String },

    /// The page loaded without any structured-data block. Often a page that
    /// was served before its scripts ran, so worth another fetch.
    #[error("no JSON-LD block at {url}")]
    MissingStructuredData { url: String },

    /// A structured-data block is present but malformed or incomplete.
    #[error("structured data mismatch at {url}: {reason}")]
    StructuralMismatch { url: String, reason: String },

    /// Browser rendering could not produce a record.
    #[error("render failed for {url}: {reason}")]
    RenderFailure { url: String, reason: String },

    /// Discovered fewer URLs than the site declared, even after retrying.
    #[error("discovery incomplete: found {found} of {declared} declared jobs")]
    DiscoveryIncomplete { found: usize, declared: usize },

    /// No browser session became available in time.
    #[error("no browser session available after {waited:?}")]
    SessionExhausted { waited: Duration },

    /// No listing page could be loaded; fatal for the company's run.
    #[error("listing unavailable at {url} after {attempts} attempts: {reason}")]
    ListingUnavailable {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The requested company is not registered in the store.
    #[error("unknown company: {0}")]
    UnknownCompany(i64),

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Browser driver failure
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl CrawlError {
    /// Classify this error for rate limiter feedback.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            CrawlError::RateLimited { .. } => FailureKind::RateLimited,
            CrawlError::Timeout { .. } => FailureKind::Timeout,
            CrawlError::Browser(BrowserError::Timeout { .. }) => FailureKind::Timeout,
            _ => FailureKind::Other,
        }
    }

    /// Whether the fast path should retry the same URL after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrawlError::TransientNetwork { .. }
                | CrawlError::Timeout { .. }
                | CrawlError::RateLimited { .. }
        )
    }
}

/// Errors reported by a browser-automation driver.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Could not start a browser session
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Navigation to a URL failed
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Waiting for an element or page load timed out
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// DOM read or script evaluation failed
    #[error("script error: {0}")]
    Script(String),

    /// The session is no longer usable
    #[error("browser session closed")]
    Closed,
}

/// Errors raised by job store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A persisted row could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Company referenced by an operation does not exist
    #[error("unknown company: {0}")]
    UnknownCompany(i64),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(Box::new(e))
    }
}

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Value present but unparsable
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Result type alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result type alias for browser operations.
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
