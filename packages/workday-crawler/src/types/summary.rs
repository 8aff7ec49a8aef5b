//! Per-run accounting reported to collaborators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::outcome::ExtractionOutcome;

/// Counts of fast-path outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub succeeded: usize,
    pub needs_fallback: usize,
    pub failed: usize,
}

impl ExtractionStats {
    pub fn record(&mut self, outcome: &ExtractionOutcome) {
        match outcome {
            ExtractionOutcome::Success(_) => self.succeeded += 1,
            ExtractionOutcome::NeedsFallback(_) => self.needs_fallback += 1,
            ExtractionOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.needs_fallback + self.failed
    }

    /// Fraction of URLs that did not succeed; 0.0 when nothing was processed.
    pub fn loss_fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.needs_fallback + self.failed) as f64 / total as f64
    }
}

/// Why a run's results should be treated with reduced confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletenessWarning {
    /// Fewer URLs discovered than the site declared, beyond tolerance
    DiscoveryShortfall { found: usize, declared: usize },
    /// Too many discovered URLs produced no record
    ExtractionLoss { lost: usize, discovered: usize },
}

impl std::fmt::Display for CompletenessWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletenessWarning::DiscoveryShortfall { found, declared } => {
                write!(f, "discovered {} of {} declared jobs", found, declared)
            }
            CompletenessWarning::ExtractionLoss { lost, discovered } => {
                write!(f, "{} of {} discovered jobs could not be extracted", lost, discovered)
            }
        }
    }
}

/// Outcome of one company's crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub run_id: Uuid,
    pub company_id: i64,
    /// Unique detail URLs found by discovery
    pub discovered: usize,
    pub new_jobs: usize,
    pub updated_jobs: usize,
    pub reactivated_jobs: usize,
    pub stale_jobs: usize,
    /// URLs the fast path missed but the browser recovered
    pub fallback_recovered: usize,
    /// URLs that produced no record this run
    pub failed_urls: Vec<String>,
    /// Requisition ids first seen in this run, for notification layers
    pub new_job_ids: Vec<String>,
    pub completeness_warning: Option<CompletenessWarning>,
    /// Run was cancelled; reconciliation was skipped
    pub aborted: bool,
}

impl CrawlSummary {
    pub fn new(run_id: Uuid, company_id: i64) -> Self {
        Self {
            run_id,
            company_id,
            discovered: 0,
            new_jobs: 0,
            updated_jobs: 0,
            reactivated_jobs: 0,
            stale_jobs: 0,
            fallback_recovered: 0,
            failed_urls: Vec::new(),
            new_job_ids: Vec::new(),
            completeness_warning: None,
            aborted: false,
        }
    }

    pub fn has_warning(&self) -> bool {
        self.completeness_warning.is_some()
    }
}
