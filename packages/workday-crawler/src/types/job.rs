//! Job, company and status-history records.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Stale,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Stale => "stale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(JobStatus::Active),
            "stale" => Some(JobStatus::Stale),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Employment category as published by the posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contractor,
    Temporary,
    Intern,
    Volunteer,
    PerDiem,
    Other,
    #[default]
    Unspecified,
}

impl EmploymentType {
    /// Parse the many spellings sites use (`FULL_TIME`, `Full time`, `full-time`).
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "" => EmploymentType::Unspecified,
            "fulltime" | "regular" | "permanent" => EmploymentType::FullTime,
            "parttime" => EmploymentType::PartTime,
            "contractor" | "contract" | "fixedterm" => EmploymentType::Contractor,
            "temporary" | "temp" | "seasonal" => EmploymentType::Temporary,
            "intern" | "internship" => EmploymentType::Intern,
            "volunteer" => EmploymentType::Volunteer,
            "perdiem" => EmploymentType::PerDiem,
            _ => EmploymentType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "full_time",
            EmploymentType::PartTime => "part_time",
            EmploymentType::Contractor => "contractor",
            EmploymentType::Temporary => "temporary",
            EmploymentType::Intern => "intern",
            EmploymentType::Volunteer => "volunteer",
            EmploymentType::PerDiem => "per_diem",
            EmploymentType::Other => "other",
            EmploymentType::Unspecified => "unspecified",
        }
    }

    /// Inverse of [`as_str`](Self::as_str), used when reading persisted rows.
    pub fn from_stored(s: &str) -> Option<Self> {
        Some(match s {
            "full_time" => EmploymentType::FullTime,
            "part_time" => EmploymentType::PartTime,
            "contractor" => EmploymentType::Contractor,
            "temporary" => EmploymentType::Temporary,
            "intern" => EmploymentType::Intern,
            "volunteer" => EmploymentType::Volunteer,
            "per_diem" => EmploymentType::PerDiem,
            "other" => EmploymentType::Other,
            "unspecified" => EmploymentType::Unspecified,
            _ => return None,
        })
    }
}

/// Fields extracted from a job detail page, before persistence.
///
/// Produced identically by the HTTP fast path and the render fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedJob {
    /// Site-native requisition identifier
    pub job_id: String,
    pub title: String,
    pub description: Option<String>,
    pub date_posted: Option<NaiveDate>,
    pub employment_type: EmploymentType,
    pub location: Option<String>,
    pub hiring_organization: Option<String>,
    pub url: String,
}

/// A persisted job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub company_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub date_posted: Option<NaiveDate>,
    pub employment_type: EmploymentType,
    pub location: Option<String>,
    /// Employer named by the posting, when it differs from the crawled company
    pub hiring_organization: Option<String>,
    pub url: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Consecutive runs in which the job was expected but not re-observed
    pub missed_scrapes: u32,
}

impl JobRecord {
    /// Build a fresh active record from an extraction.
    pub fn from_extracted(company_id: i64, job: &ExtractedJob, seen_at: DateTime<Utc>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            company_id,
            title: job.title.clone(),
            description: job.description.clone(),
            date_posted: job.date_posted,
            employment_type: job.employment_type,
            location: job.location.clone(),
            hiring_organization: job.hiring_organization.clone(),
            url: job.url.clone(),
            first_seen_at: seen_at,
            last_seen_at: seen_at,
            status: JobStatus::Active,
            missed_scrapes: 0,
        }
    }

    /// Overwrite the mutable fields with a fresh observation.
    pub fn refresh(&mut self, job: &ExtractedJob, seen_at: DateTime<Utc>) {
        self.title = job.title.clone();
        self.description = job.description.clone();
        self.date_posted = job.date_posted;
        self.employment_type = job.employment_type;
        self.location = job.location.clone();
        self.hiring_organization = job.hiring_organization.clone();
        self.url = job.url.clone();
        self.last_seen_at = seen_at;
        self.missed_scrapes = 0;
        self.status = JobStatus::Active;
    }
}

/// A company whose career site is crawled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit entry for a job status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub job_id: String,
    pub company_id: i64,
    pub status: JobStatus,
    pub changed_at: DateTime<Utc>,
    pub reason: String,
}

/// History reason for a job seen for the first time.
pub const REASON_INITIAL: &str = "initial observation";

/// History reason for a stale job found again.
pub const REASON_REAPPEARED: &str = "reappeared in listings";

/// History reason for a job going stale.
pub fn missed_reason(missed: u32) -> String {
    format!("missed {} consecutive scrapes", missed)
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First observation of this `(job_id, company_id)`
    Inserted,
    /// Already active; fields and `last_seen_at` refreshed
    Refreshed,
    /// Was stale, now active again
    Reactivated,
}

/// Result of recording a missed observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissOutcome {
    pub missed_scrapes: u32,
    pub became_stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_employment_type_parse_is_tolerant() {
        assert_eq!(EmploymentType::parse("FULL_TIME"), EmploymentType::FullTime);
        assert_eq!(EmploymentType::parse("Full time"), EmploymentType::FullTime);
        assert_eq!(EmploymentType::parse("part-time"), EmploymentType::PartTime);
        assert_eq!(EmploymentType::parse("PER_DIEM"), EmploymentType::PerDiem);
        assert_eq!(EmploymentType::parse(""), EmploymentType::Unspecified);
        assert_eq!(EmploymentType::parse("Apprentice"), EmploymentType::Other);
    }

    #[test]
    fn test_employment_type_storage_names() {
        for ty in [
            EmploymentType::FullTime,
            EmploymentType::PerDiem,
            EmploymentType::Unspecified,
        ] {
            assert_eq!(EmploymentType::from_stored(ty.as_str()), Some(ty));
        }
        assert_eq!(EmploymentType::from_stored("FULL_TIME"), None);
    }

    #[test]
    fn test_refresh_resets_misses_and_reactivates() {
        let t0 = Utc::now();
        let job = ExtractedJob {
            job_id: "R1".into(),
            title: "Analyst".into(),
            description: None,
            date_posted: None,
            employment_type: EmploymentType::FullTime,
            location: Some("Minneapolis".into()),
            hiring_organization: None,
            url: "https://acme.example/job/Analyst_R1".into(),
        };
        let mut record = JobRecord::from_extracted(7, &job, t0);
        record.missed_scrapes = 2;
        record.status = JobStatus::Stale;

        let t1 = t0 + chrono::Duration::hours(1);
        let reposted = ExtractedJob {
            hiring_organization: Some("Acme Health".into()),
            ..job
        };
        record.refresh(&reposted, t1);

        assert_eq!(record.hiring_organization.as_deref(), Some("Acme Health"));
        assert_eq!(record.missed_scrapes, 0);
        assert_eq!(record.status, JobStatus::Active);
        assert_eq!(record.first_seen_at, t0);
        assert_eq!(record.last_seen_at, t1);
    }
}
