//! Post-run sweep that ages out jobs no longer listed.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::CrawlResult;
use crate::traits::store::JobStore;
use crate::types::config::ReconcileConfig;

/// What one sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Active jobs that were not observed this run
    pub missed: usize,
    /// Jobs that went stale in this sweep
    pub staled: Vec<String>,
}

/// Counts misses for unobserved active jobs and stales them at the threshold.
///
/// Must only run against a complete observation set; an aborted run would
/// stale jobs that were simply not reached.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    pub async fn reconcile<S: JobStore + ?Sized>(
        &self,
        store: &S,
        company_id: i64,
        observed: &HashSet<String>,
    ) -> CrawlResult<ReconcileReport> {
        let threshold = self.config.stale_after_misses.max(1);
        let now = Utc::now();
        let mut report = ReconcileReport::default();

        for job_id in store.active_job_ids(company_id).await? {
            if observed.contains(&job_id) {
                continue;
            }
            let outcome = store.record_miss(company_id, &job_id, threshold, now).await?;
            report.missed += 1;
            debug!(
                job_id = %job_id,
                missed_scrapes = outcome.missed_scrapes,
                "Job not observed this run"
            );
            if outcome.became_stale {
                report.staled.push(job_id);
            }
        }

        info!(
            observed = observed.len(),
            missed = report.missed,
            staled = report.staled.len(),
            "Reconciliation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::types::job::{EmploymentType, ExtractedJob, JobStatus};

    fn job(id: &str) -> ExtractedJob {
        ExtractedJob {
            job_id: id.to_string(),
            title: format!("Role {}", id),
            description: None,
            date_posted: None,
            employment_type: EmploymentType::FullTime,
            location: None,
            hiring_organization: None,
            url: format!("https://acme.wd1.myworkdayjobs.com/job/Role_{}", id),
        }
    }

    fn observed(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_observed_jobs_are_untouched() {
        let store = MemoryStore::new();
        let company = store.ensure_company("Acme", "https://acme.example").await.unwrap();
        store.upsert(company.id, &job("R1"), Utc::now()).await.unwrap();

        let report = Reconciler::default()
            .reconcile(&store, company.id, &observed(&["R1"]))
            .await
            .unwrap();

        assert_eq!(report, ReconcileReport::default());
        let record = store.job(company.id, "R1").await.unwrap().unwrap();
        assert_eq!(record.missed_scrapes, 0);
    }

    #[tokio::test]
    async fn test_second_miss_stales_job() {
        let store = MemoryStore::new();
        let company = store.ensure_company("Acme", "https://acme.example").await.unwrap();
        store.upsert(company.id, &job("R1"), Utc::now()).await.unwrap();
        store.upsert(company.id, &job("R2"), Utc::now()).await.unwrap();
        let reconciler = Reconciler::default();

        let first = reconciler
            .reconcile(&store, company.id, &observed(&["R2"]))
            .await
            .unwrap();
        assert_eq!(first.missed, 1);
        assert!(first.staled.is_empty());

        let second = reconciler
            .reconcile(&store, company.id, &observed(&["R2"]))
            .await
            .unwrap();
        assert_eq!(second.staled, vec!["R1".to_string()]);

        let record = store.job(company.id, "R1").await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Stale);

        // Stale jobs are no longer swept.
        let third = reconciler
            .reconcile(&store, company.id, &observed(&["R2"]))
            .await
            .unwrap();
        assert_eq!(third.missed, 0);
    }

    #[tokio::test]
    async fn test_other_companies_are_not_swept() {
        let store = MemoryStore::new();
        let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();
        let globex = store.ensure_company("Globex", "https://globex.example").await.unwrap();
        store.upsert(globex.id, &job("R1"), Utc::now()).await.unwrap();

        let report = Reconciler::default()
            .reconcile(&store, acme.id, &HashSet::new())
            .await
            .unwrap();

        assert_eq!(report.missed, 0);
    }
}
