//! SQLite storage implementation.
//!
//! Durable job store for single-host deployments. Runs in WAL mode with a
//! busy timeout so concurrent upserts from the extraction workers serialize
//! on SQLite's write lock instead of failing. Every mutating call is one
//! transaction whose first statement is a write, so a transaction never has
//! to upgrade from a read snapshot.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::JobStore;
use crate::types::{
    filter::JobFilter,
    job::{
        missed_reason, Company, EmploymentType, ExtractedJob, JobRecord, JobStatus, MissOutcome,
        StatusHistoryEntry, UpsertOutcome, REASON_INITIAL, REASON_REAPPEARED,
    },
};

/// SQLite-backed job store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

const JOB_COLUMNS: &str = "job_id, company_id, title, description, date_posted, employment_type, \
     location, hiring_organization, url, first_seen_at, last_seen_at, status, missed_scrapes";

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url`.
    ///
    /// # Example URLs
    /// - `sqlite://workday_jobs.db` - file in the working directory
    /// - `sqlite::memory:` - use [`SqliteStore::in_memory`] instead
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    ///
    /// Uses a single long-lived connection, since each `:memory:` connection
    /// is a separate database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                base_url TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                company_id INTEGER NOT NULL REFERENCES companies(id),
                title TEXT NOT NULL,
                description TEXT,
                date_posted TEXT,
                employment_type TEXT NOT NULL,
                location TEXT,
                hiring_organization TEXT,
                url TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                last_seen_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                missed_scrapes INTEGER NOT NULL DEFAULT 0,
                UNIQUE(job_id, company_id)
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_location ON jobs(location);
            CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs(company_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_last_seen ON jobs(last_seen_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                company_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                reason TEXT NOT NULL,
                FOREIGN KEY (job_id, company_id) REFERENCES jobs(job_id, company_id)
            );

            CREATE INDEX IF NOT EXISTS idx_history_job ON job_status_history(company_id, job_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp {:?}: {}", raw, e)))
}

fn unknown_company_or(e: sqlx::Error, company_id: i64) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::UnknownCompany(company_id)
        }
        _ => e.into(),
    }
}

#[derive(Debug, FromRow)]
struct CompanyRow {
    id: i64,
    name: String,
    base_url: String,
    created_at: String,
}

impl CompanyRow {
    fn into_company(self) -> StoreResult<Company> {
        Ok(Company {
            id: self.id,
            name: self.name,
            base_url: self.base_url,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    job_id: String,
    company_id: i64,
    title: String,
    description: Option<String>,
    date_posted: Option<String>,
    employment_type: String,
    location: Option<String>,
    hiring_organization: Option<String>,
    url: String,
    first_seen_at: String,
    last_seen_at: String,
    status: String,
    missed_scrapes: i64,
}

impl JobRow {
    fn into_record(self) -> StoreResult<JobRecord> {
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("invalid status {:?}", self.status)))?;
        let employment_type = EmploymentType::from_stored(&self.employment_type)
            .unwrap_or(EmploymentType::Other);
        let date_posted = self
            .date_posted
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        Ok(JobRecord {
            job_id: self.job_id,
            company_id: self.company_id,
            title: self.title,
            description: self.description,
            date_posted,
            employment_type,
            location: self.location,
            hiring_organization: self.hiring_organization,
            url: self.url,
            first_seen_at: parse_ts(&self.first_seen_at)?,
            last_seen_at: parse_ts(&self.last_seen_at)?,
            status,
            missed_scrapes: self.missed_scrapes.max(0) as u32,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    job_id: String,
    company_id: i64,
    status: String,
    changed_at: String,
    reason: String,
}

impl HistoryRow {
    fn into_entry(self) -> StoreResult<StatusHistoryEntry> {
        Ok(StatusHistoryEntry {
            status: JobStatus::parse(&self.status)
                .ok_or_else(|| StoreError::Corrupt(format!("invalid status {:?}", self.status)))?,
            changed_at: parse_ts(&self.changed_at)?,
            job_id: self.job_id,
            company_id: self.company_id,
            reason: self.reason,
        })
    }
}

async fn append_history(
    conn: &mut sqlx::SqliteConnection,
    company_id: i64,
    job_id: &str,
    status: JobStatus,
    at: DateTime<Utc>,
    reason: &str,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO job_status_history (job_id, company_id, status, changed_at, reason) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(job_id)
    .bind(company_id)
    .bind(status.as_str())
    .bind(ts(at))
    .bind(reason)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn ensure_company(&self, name: &str, base_url: &str) -> StoreResult<Company> {
        sqlx::query(
            "INSERT INTO companies (name, base_url, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(base_url)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        let row: CompanyRow =
            sqlx::query_as("SELECT id, name, base_url, created_at FROM companies WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        row.into_company()
    }

    async fn company(&self, id: i64) -> StoreResult<Option<Company>> {
        let row: Option<CompanyRow> =
            sqlx::query_as("SELECT id, name, base_url, created_at FROM companies WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(CompanyRow::into_company).transpose()
    }

    async fn companies(&self) -> StoreResult<Vec<Company>> {
        let rows: Vec<CompanyRow> =
            sqlx::query_as("SELECT id, name, base_url, created_at FROM companies ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(CompanyRow::into_company).collect()
    }

    async fn upsert(
        &self,
        company_id: i64,
        job: &ExtractedJob,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let seen = ts(seen_at);
        let date_posted = job.date_posted.map(|d| d.format("%Y-%m-%d").to_string());

        let inserted = sqlx::query(
            "INSERT INTO jobs (job_id, company_id, title, description, date_posted, \
             employment_type, location, hiring_organization, url, first_seen_at, last_seen_at, \
             status, missed_scrapes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', 0) \
             ON CONFLICT(job_id, company_id) DO NOTHING",
        )
        .bind(&job.job_id)
        .bind(company_id)
        .bind(&job.title)
        .bind(&job.description)
        .bind(&date_posted)
        .bind(job.employment_type.as_str())
        .bind(&job.location)
        .bind(&job.hiring_organization)
        .bind(&job.url)
        .bind(&seen)
        .bind(&seen)
        .execute(&mut *tx)
        .await
        .map_err(|e| unknown_company_or(e, company_id))?
        .rows_affected()
            == 1;

        if inserted {
            append_history(
                &mut tx,
                company_id,
                &job.job_id,
                JobStatus::Active,
                seen_at,
                REASON_INITIAL,
            )
            .await?;
            tx.commit().await?;
            return Ok(UpsertOutcome::Inserted);
        }

        let previous: String =
            sqlx::query_scalar("SELECT status FROM jobs WHERE job_id = ? AND company_id = ?")
                .bind(&job.job_id)
                .bind(company_id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            "UPDATE jobs SET title = ?, description = ?, date_posted = ?, employment_type = ?, \
             location = ?, hiring_organization = ?, url = ?, last_seen_at = ?, status = 'active', \
             missed_scrapes = 0 \
             WHERE job_id = ? AND company_id = ?",
        )
        .bind(&job.title)
        .bind(&job.description)
        .bind(&date_posted)
        .bind(job.employment_type.as_str())
        .bind(&job.location)
        .bind(&job.hiring_organization)
        .bind(&job.url)
        .bind(&seen)
        .bind(&job.job_id)
        .bind(company_id)
        .execute(&mut *tx)
        .await?;

        let outcome = if previous == JobStatus::Stale.as_str() {
            append_history(
                &mut tx,
                company_id,
                &job.job_id,
                JobStatus::Active,
                seen_at,
                REASON_REAPPEARED,
            )
            .await?;
            UpsertOutcome::Reactivated
        } else {
            UpsertOutcome::Refreshed
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn job(&self, company_id: i64, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE company_id = ? AND job_id = ?",
            JOB_COLUMNS
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(company_id)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_record).transpose()
    }

    async fn active_job_ids(&self, company_id: i64) -> StoreResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT job_id FROM jobs WHERE company_id = ? AND status = 'active' ORDER BY job_id",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn record_miss(
        &self,
        company_id: i64,
        job_id: &str,
        stale_after: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<MissOutcome> {
        let mut tx = self.pool.begin().await?;

        let missed: Option<i64> = sqlx::query_scalar(
            "UPDATE jobs SET missed_scrapes = missed_scrapes + 1 \
             WHERE company_id = ? AND job_id = ? AND status = 'active' \
             RETURNING missed_scrapes",
        )
        .bind(company_id)
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(missed) = missed else {
            tx.commit().await?;
            return Ok(MissOutcome {
                missed_scrapes: 0,
                became_stale: false,
            });
        };
        let missed = missed.max(0) as u32;
        let became_stale = missed >= stale_after;

        if became_stale {
            sqlx::query("UPDATE jobs SET status = 'stale' WHERE company_id = ? AND job_id = ?")
                .bind(company_id)
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            append_history(
                &mut tx,
                company_id,
                job_id,
                JobStatus::Stale,
                at,
                &missed_reason(missed),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(MissOutcome {
            missed_scrapes: missed,
            became_stale,
        })
    }

    async fn query(&self, filter: &JobFilter) -> StoreResult<Vec<JobRecord>> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT j.job_id, j.company_id, j.title, j.description, j.date_posted, \
             j.employment_type, j.location, j.hiring_organization, j.url, j.first_seen_at, \
             j.last_seen_at, j.status, j.missed_scrapes \
             FROM jobs j JOIN companies c ON c.id = j.company_id WHERE 1 = 1",
        );

        if let Some(company_id) = filter.company_id {
            qb.push(" AND j.company_id = ").push_bind(company_id);
        }
        if let Some(name) = &filter.company_name {
            qb.push(" AND c.name = ").push_bind(name.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND j.status = ").push_bind(status.as_str());
        }
        if let Some(since) = filter.posted_since {
            qb.push(" AND j.date_posted >= ")
                .push_bind(since.format("%Y-%m-%d").to_string());
        }

        // SQLite's lower() only folds ASCII, so substring filters run through
        // JobFilter::matches to stay identical to the memory store.
        let text_filtered = filter.location.is_some() || filter.title.is_some();

        qb.push(" ORDER BY j.last_seen_at DESC, j.first_seen_at DESC, j.job_id ASC");
        if let (Some(limit), false) = (filter.limit, text_filtered) {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows: Vec<JobRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.into_record()?;
            if text_filtered && !filter.matches(&record) {
                continue;
            }
            records.push(record);
            if filter.limit.is_some_and(|limit| records.len() >= limit) {
                break;
            }
        }
        Ok(records)
    }

    async fn history(&self, company_id: i64, job_id: &str) -> StoreResult<Vec<StatusHistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT job_id, company_id, status, changed_at, reason FROM job_status_history \
             WHERE company_id = ? AND job_id = ? ORDER BY id ASC",
        )
        .bind(company_id)
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HistoryRow::into_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str, title: &str) -> ExtractedJob {
        ExtractedJob {
            job_id: id.into(),
            title: title.into(),
            description: Some("Work on things".into()),
            date_posted: NaiveDate::from_ymd_opt(2025, 3, 1),
            employment_type: EmploymentType::PartTime,
            location: Some("Minneapolis, MN".into()),
            hiring_organization: None,
            url: format!("https://acme.example/job/{}", id),
        }
    }

    #[tokio::test]
    async fn test_round_trips_job_fields() {
        let store = SqliteStore::in_memory().await.unwrap();
        let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();
        let seen = Utc::now();

        store.upsert(acme.id, &job("R1", "Analyst"), seen).await.unwrap();
        let record = store.job(acme.id, "R1").await.unwrap().unwrap();

        assert_eq!(record.title, "Analyst");
        assert_eq!(record.employment_type, EmploymentType::PartTime);
        assert_eq!(record.date_posted, NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(record.status, JobStatus::Active);
        assert_eq!(record.first_seen_at.timestamp_micros(), seen.timestamp_micros());
    }

    #[tokio::test]
    async fn test_repeated_upserts_keep_one_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();

        let first = store.upsert(acme.id, &job("R1", "Analyst"), Utc::now()).await.unwrap();
        let second = store
            .upsert(acme.id, &job("R1", "Senior Analyst"), Utc::now())
            .await
            .unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Refreshed);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.history(acme.id, "R1").await.unwrap().len(), 1);
        assert_eq!(
            store.job(acme.id, "R1").await.unwrap().unwrap().title,
            "Senior Analyst"
        );
    }

    #[tokio::test]
    async fn test_same_job_id_is_distinct_per_company() {
        let store = SqliteStore::in_memory().await.unwrap();
        let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();
        let globex = store.ensure_company("Globex", "https://globex.example").await.unwrap();

        store.upsert(acme.id, &job("R1", "Analyst"), Utc::now()).await.unwrap();
        let outcome = store.upsert(globex.id, &job("R1", "Analyst"), Utc::now()).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert_eq!(store.query(&JobFilter::new()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_company_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store
            .upsert(42, &job("R1", "Analyst"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownCompany(42)));
    }

    #[tokio::test]
    async fn test_miss_then_stale_then_reactivate() {
        let store = SqliteStore::in_memory().await.unwrap();
        let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();
        store.upsert(acme.id, &job("R1", "Analyst"), Utc::now()).await.unwrap();

        let first = store.record_miss(acme.id, "R1", 2, Utc::now()).await.unwrap();
        assert_eq!(first.missed_scrapes, 1);
        assert!(!first.became_stale);

        let second = store.record_miss(acme.id, "R1", 2, Utc::now()).await.unwrap();
        assert!(second.became_stale);
        assert!(store.active_job_ids(acme.id).await.unwrap().is_empty());

        let again = store.record_miss(acme.id, "R1", 2, Utc::now()).await.unwrap();
        assert!(!again.became_stale);

        let outcome = store.upsert(acme.id, &job("R1", "Analyst"), Utc::now()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Reactivated);

        let reasons: Vec<_> = store
            .history(acme.id, "R1")
            .await
            .unwrap()
            .into_iter()
            .map(|h| (h.status, h.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (JobStatus::Active, "initial observation".to_string()),
                (JobStatus::Stale, "missed 2 consecutive scrapes".to_string()),
                (JobStatus::Active, "reappeared in listings".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_query_filters() {
        let store = SqliteStore::in_memory().await.unwrap();
        let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();
        let t0 = Utc::now();

        let mut nurse = job("R2", "Registered Nurse");
        nurse.location = Some("St. Paul, MN".into());
        nurse.date_posted = NaiveDate::from_ymd_opt(2025, 5, 1);

        store.upsert(acme.id, &job("R1", "Data Analyst"), t0).await.unwrap();
        store
            .upsert(acme.id, &nurse, t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();

        let all = store.query(&JobFilter::for_company(acme.id)).await.unwrap();
        assert_eq!(all[0].job_id, "R2");

        let st_paul = store
            .query(&JobFilter::new().with_location("st. paul"))
            .await
            .unwrap();
        assert_eq!(st_paul.len(), 1);

        let analysts = store
            .query(&JobFilter::new().with_company_name("Acme").with_title("ANALYST").active())
            .await
            .unwrap();
        assert_eq!(analysts.len(), 1);
        assert_eq!(analysts[0].job_id, "R1");

        let recent = store
            .query(&JobFilter::new().posted_since(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);

        let limited = store.query(&JobFilter::new().with_limit(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_text_filters_match_memory_store() {
        let sqlite = SqliteStore::in_memory().await.unwrap();
        let memory = crate::stores::MemoryStore::new();

        let mut nurse = job("R1", "ÄRZTIN Notaufnahme");
        nurse.location = Some("MÜNCHEN".into());
        let mut remote = job("R2", "Analyst");
        remote.location = None;
        let mut analyst = job("R3", "Senior Analyst");
        analyst.location = Some("Duluth, MN".into());

        let t0 = Utc::now();
        for store in [&sqlite as &dyn JobStore, &memory as &dyn JobStore] {
            let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();
            for (i, j) in [&nurse, &remote, &analyst].into_iter().enumerate() {
                let seen = t0 + chrono::Duration::seconds(i as i64);
                store.upsert(acme.id, j, seen).await.unwrap();
            }
        }

        let filters = [
            JobFilter::new().with_title("ärztin"),
            JobFilter::new().with_location("münchen"),
            JobFilter::new().with_location(""),
            JobFilter::new().with_title("analyst").with_limit(1),
        ];
        for filter in &filters {
            let ids = |records: Vec<JobRecord>| {
                let mut ids: Vec<String> = records.into_iter().map(|r| r.job_id).collect();
                ids.sort();
                ids
            };
            assert_eq!(
                ids(sqlite.query(filter).await.unwrap()),
                ids(memory.query(filter).await.unwrap()),
                "filter {:?}",
                filter
            );
        }

        assert_eq!(sqlite.query(&filters[0]).await.unwrap().len(), 1);
        assert_eq!(sqlite.query(&filters[2]).await.unwrap().len(), 3);
        assert_eq!(sqlite.query(&filters[3]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hiring_organization_is_persisted() {
        let store = SqliteStore::in_memory().await.unwrap();
        let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();
        let mut posting = job("R1", "Analyst");
        posting.hiring_organization = Some("Acme Health".into());

        store.upsert(acme.id, &posting, Utc::now()).await.unwrap();
        let record = store.job(acme.id, "R1").await.unwrap().unwrap();
        assert_eq!(record.hiring_organization.as_deref(), Some("Acme Health"));

        posting.hiring_organization = None;
        store.upsert(acme.id, &posting, Utc::now()).await.unwrap();
        let record = store.job(acme.id, "R1").await.unwrap().unwrap();
        assert_eq!(record.hiring_organization, None);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!("workday-{}.db", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}", path.display());

        {
            let store = SqliteStore::new(&url).await.unwrap();
            let acme = store.ensure_company("Acme", "https://acme.example").await.unwrap();
            store.upsert(acme.id, &job("R1", "Analyst"), Utc::now()).await.unwrap();
            store.pool().close().await;
        }

        let reopened = SqliteStore::new(&url).await.unwrap();
        let companies = reopened.companies().await.unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(reopened.active_job_ids(companies[0].id).await.unwrap(), vec!["R1"]);
        reopened.pool().close().await;

        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
