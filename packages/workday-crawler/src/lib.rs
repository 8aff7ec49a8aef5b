//! Workday Career Site Crawler
//!
//! Turns Workday-hosted career sites into a deduplicated, status-tracked set
//! of job records.
//!
//! # Pipeline
//!
//! 1. **Discover** every detail URL by paginating the listing in a pooled
//!    browser session, checking the count against the site's declared total
//! 2. **Extract** each URL over plain HTTP at high concurrency, parsing the
//!    embedded schema.org `JobPosting` JSON-LD
//! 3. **Fall back** to browser rendering only for URLs the fast path missed
//! 4. **Reconcile**: jobs not re-observed accumulate misses and go stale
//!
//! # Usage
//!
//! ```rust,ignore
//! use workday_crawler::{CrawlRunner, CrawlerConfig, JobFilter, MemoryStore};
//! use workday_crawler::testing::{FakeLauncher, FakeSite, MockFetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! let runner = CrawlRunner::new(
//!     MemoryStore::new(),
//!     MockFetcher::new(),
//!     FakeLauncher::new(FakeSite::new()),
//!     CrawlerConfig::from_env()?,
//! );
//! let acme = runner
//!     .register_company("Acme", "https://acme.wd1.myworkdayjobs.com/en-US/careers")
//!     .await?;
//!
//! let summary = runner.run_crawl(acme.id, CancellationToken::new()).await?;
//! let open = runner.query_jobs(&JobFilter::for_company(acme.id).active()).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Capabilities the crawler consumes (browser, HTTP, store)
//! - [`types`] - Job records, configuration, filters and run summaries
//! - [`pipeline`] - Discovery, extraction, fallback, reconciliation, runner
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`fetchers`] - HTTP fetcher implementations
//! - [`testing`] - Mock fetcher and fake browser for tests

pub mod context;
pub mod error;
pub mod fetchers;
pub mod jsonld;
pub mod pipeline;
pub mod ratelimit;
pub mod retry;
pub mod session;
pub mod stores;
pub mod telemetry;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use context::RunContext;
pub use error::{BrowserError, ConfigError, CrawlError, CrawlResult, StoreError, StoreResult};
pub use traits::{
    browser::{BrowserLauncher, BrowserSession},
    fetcher::{FetchedPage, PageFetcher},
    store::JobStore,
};
pub use types::{
    config::{
        CrawlerConfig, DetailSelectors, DiscoveryConfig, ExtractorConfig, FallbackConfig,
        ListingSelectors, RateLimiterConfig, ReconcileConfig, SessionPoolConfig,
    },
    filter::JobFilter,
    job::{
        Company, EmploymentType, ExtractedJob, JobRecord, JobStatus, MissOutcome,
        StatusHistoryEntry, UpsertOutcome,
    },
    outcome::{CandidateUrl, ExtractionOutcome},
    summary::{CompletenessWarning, CrawlSummary, ExtractionStats},
};

// Re-export pipeline components
pub use pipeline::{
    CrawlRunner, DetailExtractor, DiscoveryReport, ReconcileReport, Reconciler, RenderFallback,
    UrlDiscoverer,
};
pub use ratelimit::{AdaptiveRateLimiter, FailureKind, RateLimiterRegistry, RateLimiterStats};
pub use retry::BackoffPolicy;
pub use session::{PoolStats, SessionLease, SessionPool};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

pub use fetchers::ReqwestFetcher;

// Re-export testing utilities
pub use testing::{FakeLauncher, FakeSite, MockFetcher};
