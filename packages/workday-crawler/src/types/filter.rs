//! Query filter for the job store's read API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::job::{JobRecord, JobStatus};

/// Filter for [`JobStore::query`](crate::traits::store::JobStore::query).
///
/// Results are always ordered most recently seen first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFilter {
    pub company_id: Option<i64>,
    /// Exact company name; resolved by the store
    pub company_name: Option<String>,
    pub status: Option<JobStatus>,
    /// Case-insensitive substring of the location
    pub location: Option<String>,
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    /// Only postings dated on or after this day
    pub posted_since: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl JobFilter {
    /// Create an empty filter (matches all).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_company(company_id: i64) -> Self {
        Self {
            company_id: Some(company_id),
            ..Default::default()
        }
    }

    pub fn with_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn active(self) -> Self {
        self.with_status(JobStatus::Active)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn posted_since(mut self, date: NaiveDate) -> Self {
        self.posted_since = Some(date);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes every field filter except `company_name`,
    /// which needs the company table.
    pub fn matches(&self, job: &JobRecord) -> bool {
        if self.company_id.is_some_and(|id| id != job.company_id) {
            return false;
        }
        if self.status.is_some_and(|s| s != job.status) {
            return false;
        }
        if let Some(needle) = &self.location {
            let hay = job.location.as_deref().unwrap_or_default();
            if !contains_ignore_case(hay, needle) {
                return false;
            }
        }
        if let Some(needle) = &self.title {
            if !contains_ignore_case(&job.title, needle) {
                return false;
            }
        }
        if let Some(since) = self.posted_since {
            match job.date_posted {
                Some(posted) if posted >= since => {}
                _ => return false,
            }
        }
        true
    }
}

fn contains_ignore_case(hay: &str, needle: &str) -> bool {
    hay.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::job::{EmploymentType, ExtractedJob};
    use chrono::Utc;

    fn record(title: &str, location: Option<&str>) -> JobRecord {
        let job = ExtractedJob {
            job_id: "R1".into(),
            title: title.into(),
            description: None,
            date_posted: NaiveDate::from_ymd_opt(2025, 3, 1),
            employment_type: EmploymentType::FullTime,
            location: location.map(str::to_string),
            hiring_organization: None,
            url: "https://acme.example/job/R1".into(),
        };
        JobRecord::from_extracted(1, &job, Utc::now())
    }

    #[test]
    fn test_substring_filters_ignore_case() {
        let job = record("Senior Data Analyst", Some("Minneapolis, MN"));

        assert!(JobFilter::new().with_title("data analyst").matches(&job));
        assert!(JobFilter::new().with_location("minneapolis").matches(&job));
        assert!(!JobFilter::new().with_location("St. Paul").matches(&job));
    }

    #[test]
    fn test_location_filter_excludes_unknown_location() {
        let job = record("Analyst", None);
        assert!(!JobFilter::new().with_location("MN").matches(&job));
        assert!(JobFilter::new().matches(&job));
    }

    #[test]
    fn test_posted_since() {
        let job = record("Analyst", None);
        let before = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();

        assert!(JobFilter::new().posted_since(before).matches(&job));
        assert!(!JobFilter::new().posted_since(after).matches(&job));
    }

    #[test]
    fn test_company_and_status() {
        let job = record("Analyst", None);
        assert!(JobFilter::for_company(1).active().matches(&job));
        assert!(!JobFilter::for_company(2).matches(&job));
        assert!(!JobFilter::new().with_status(JobStatus::Stale).matches(&job));
    }
}
