//! Durable job storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::types::{
    filter::JobFilter,
    job::{Company, ExtractedJob, JobRecord, MissOutcome, StatusHistoryEntry, UpsertOutcome},
};

/// Persistence for companies, jobs and their status history.
///
/// Every mutating call is one atomic unit. Calls for distinct
/// `(job_id, company_id)` keys may run concurrently; calls for the same key
/// serialize, last writer wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Get-or-create a company by its unique name.
    async fn ensure_company(&self, name: &str, base_url: &str) -> StoreResult<Company>;

    async fn company(&self, id: i64) -> StoreResult<Option<Company>>;

    async fn companies(&self) -> StoreResult<Vec<Company>>;

    /// Insert a new job or refresh an existing one.
    ///
    /// Re-observation refreshes mutable fields, sets `last_seen_at`, and
    /// resets `missed_scrapes`. History is appended only on a status change
    /// (first observation, or a stale job reappearing).
    async fn upsert(
        &self,
        company_id: i64,
        job: &ExtractedJob,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome>;

    async fn job(&self, company_id: i64, job_id: &str) -> StoreResult<Option<JobRecord>>;

    /// Requisition ids of the company's currently active jobs.
    async fn active_job_ids(&self, company_id: i64) -> StoreResult<Vec<String>>;

    /// Count one missed observation for an active job.
    ///
    /// When the incremented count reaches `stale_after`, the job transitions
    /// to stale and a history entry is appended in the same transaction.
    async fn record_miss(
        &self,
        company_id: i64,
        job_id: &str,
        stale_after: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<MissOutcome>;

    /// Jobs matching `filter`, most recently seen first.
    async fn query(&self, filter: &JobFilter) -> StoreResult<Vec<JobRecord>>;

    /// Status history for one job in the order it was appended.
    async fn history(&self, company_id: i64, job_id: &str) -> StoreResult<Vec<StatusHistoryEntry>>;
}
