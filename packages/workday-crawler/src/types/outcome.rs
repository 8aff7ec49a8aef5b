//! Per-URL values flowing between discovery, extraction and fallback.

use serde::{Deserialize, Serialize};

use super::job::ExtractedJob;

/// A detail-page URL found during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub url: String,
    /// Listing page (0-based) the URL was first seen on
    pub page_index: usize,
}

impl CandidateUrl {
    pub fn new(url: impl Into<String>, page_index: usize) -> Self {
        Self {
            url: url.into(),
            page_index,
        }
    }
}

/// Result of trying to turn one URL into a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Success(ExtractedJob),
    /// Fast path could not resolve the page; the browser may
    NeedsFallback(String),
    Failed(String),
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ExtractionOutcome::Success(_) => None,
            ExtractionOutcome::NeedsFallback(r) | ExtractionOutcome::Failed(r) => Some(r),
        }
    }
}
