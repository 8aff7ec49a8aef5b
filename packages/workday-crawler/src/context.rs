//! Per-run context carried into every component.
//!
//! Replaces module-level logger state: each crawl run gets an id, and all
//! log lines emitted by its concurrent workers are correlated through the
//! run span.

use tracing::Span;
use uuid::Uuid;

use crate::types::job::Company;

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub company_id: i64,
    pub company_name: String,
    span: Span,
}

impl RunContext {
    pub fn new(company_id: i64, company_name: impl Into<String>) -> Self {
        let run_id = Uuid::now_v7();
        let company_name = company_name.into();
        let span = tracing::info_span!(
            "crawl_run",
            run_id = %run_id,
            company_id,
            company = %company_name
        );
        Self {
            run_id,
            company_id,
            company_name,
            span,
        }
    }

    pub fn for_company(company: &Company) -> Self {
        Self::new(company.id, company.name.clone())
    }

    /// Span to attach (`.instrument(ctx.span())`) to work done for this run.
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}
