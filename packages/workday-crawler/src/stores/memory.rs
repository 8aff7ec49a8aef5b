//! In-memory storage implementation for testing and ephemeral runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::JobStore;
use crate::types::{
    filter::JobFilter,
    job::{
        missed_reason, Company, ExtractedJob, JobRecord, JobStatus, MissOutcome,
        StatusHistoryEntry, UpsertOutcome, REASON_INITIAL, REASON_REAPPEARED,
    },
};

#[derive(Default)]
struct State {
    companies: Vec<Company>,
    jobs: HashMap<(i64, String), JobRecord>,
    history: Vec<StatusHistoryEntry>,
}

/// In-memory job store.
///
/// Same semantics as the SQLite store. Data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn job_count(&self) -> usize {
        self.state().jobs.len()
    }

    pub fn history_count(&self) -> usize {
        self.state().history.len()
    }
}

fn append_history(state: &mut State, job: &JobRecord, at: DateTime<Utc>, reason: String) {
    state.history.push(StatusHistoryEntry {
        job_id: job.job_id.clone(),
        company_id: job.company_id,
        status: job.status,
        changed_at: at,
        reason,
    });
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn ensure_company(&self, name: &str, base_url: &str) -> StoreResult<Company> {
        let mut state = self.state();
        if let Some(existing) = state.companies.iter().find(|c| c.name == name) {
            return Ok(existing.clone());
        }
        let company = Company {
            id: state.companies.len() as i64 + 1,
            name: name.to_string(),
            base_url: base_url.to_string(),
            created_at: Utc::now(),
        };
        state.companies.push(company.clone());
        Ok(company)
    }

    async fn company(&self, id: i64) -> StoreResult<Option<Company>> {
        Ok(self.state().companies.iter().find(|c| c.id == id).cloned())
    }

    async fn companies(&self) -> StoreResult<Vec<Company>> {
        Ok(self.state().companies.clone())
    }

    async fn upsert(
        &self,
        company_id: i64,
        job: &ExtractedJob,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        let mut guard = self.state();
        let state = &mut *guard;
        if !state.companies.iter().any(|c| c.id == company_id) {
            return Err(StoreError::UnknownCompany(company_id));
        }

        let key = (company_id, job.job_id.clone());
        let (outcome, record) = match state.jobs.get_mut(&key) {
            Some(existing) => {
                let was_stale = existing.status == JobStatus::Stale;
                existing.refresh(job, seen_at);
                let outcome = if was_stale {
                    UpsertOutcome::Reactivated
                } else {
                    UpsertOutcome::Refreshed
                };
                (outcome, existing.clone())
            }
            None => {
                let record = JobRecord::from_extracted(company_id, job, seen_at);
                state.jobs.insert(key, record.clone());
                (UpsertOutcome::Inserted, record)
            }
        };

        match outcome {
            UpsertOutcome::Inserted => {
                append_history(state, &record, seen_at, REASON_INITIAL.to_string())
            }
            UpsertOutcome::Reactivated => {
                append_history(state, &record, seen_at, REASON_REAPPEARED.to_string())
            }
            UpsertOutcome::Refreshed => {}
        }

        Ok(outcome)
    }

    async fn job(&self, company_id: i64, job_id: &str) -> StoreResult<Option<JobRecord>> {
        Ok(self
            .state()
            .jobs
            .get(&(company_id, job_id.to_string()))
            .cloned())
    }

    async fn active_job_ids(&self, company_id: i64) -> StoreResult<Vec<String>> {
        let state = self.state();
        let mut ids: Vec<String> = state
            .jobs
            .values()
            .filter(|j| j.company_id == company_id && j.status == JobStatus::Active)
            .map(|j| j.job_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn record_miss(
        &self,
        company_id: i64,
        job_id: &str,
        stale_after: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<MissOutcome> {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(record) = state.jobs.get_mut(&(company_id, job_id.to_string())) else {
            return Ok(MissOutcome {
                missed_scrapes: 0,
                became_stale: false,
            });
        };
        if record.status != JobStatus::Active {
            return Ok(MissOutcome {
                missed_scrapes: record.missed_scrapes,
                became_stale: false,
            });
        }

        record.missed_scrapes += 1;
        let missed = record.missed_scrapes;
        let became_stale = missed >= stale_after;
        if became_stale {
            record.status = JobStatus::Stale;
            let snapshot = record.clone();
            append_history(state, &snapshot, at, missed_reason(missed));
        }

        Ok(MissOutcome {
            missed_scrapes: missed,
            became_stale,
        })
    }

    async fn query(&self, filter: &JobFilter) -> StoreResult<Vec<JobRecord>> {
        let state = self.state();

        let company_id = match &filter.company_name {
            Some(name) => match state.companies.iter().find(|c| &c.name == name) {
                Some(c) => Some(c.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut jobs: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .filter(|j| company_id.map_or(true, |id| id == j.company_id))
            .cloned()
            .collect();

        jobs.sort_by(|a, b| {
            b.last_seen_at
                .cmp(&a.last_seen_at)
                .then(b.first_seen_at.cmp(&a.first_seen_at))
                .then(a.job_id.cmp(&b.job_id))
        });
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn history(&self, company_id: i64, job_id: &str) -> StoreResult<Vec<StatusHistoryEntry>> {
        Ok(self
            .state()
            .history
            .iter()
            .filter(|h| h.company_id == company_id && h.job_id == job_id)
            .cloned()
            .collect())
    }
}
