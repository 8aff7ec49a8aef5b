//! The crawl pipeline.
//!
//! Phases, in order:
//! - Discovery (paginate the listing in a browser session, verify the count)
//! - Fast path (concurrent HTTP fetch + JSON-LD parse)
//! - Render fallback (browser extraction for URLs the fast path missed)
//! - Reconciliation (age out jobs that were not re-observed)

pub mod discover;
pub mod extract;
pub mod fallback;
pub mod reconcile;
pub mod run;

pub use discover::{listing_url_variants, parse_declared_total, DiscoveryReport, UrlDiscoverer};
pub use extract::DetailExtractor;
pub use fallback::{job_id_from_url, RenderFallback};
pub use reconcile::{ReconcileReport, Reconciler};
pub use run::CrawlRunner;
