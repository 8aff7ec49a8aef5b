//! End-to-end crawl runs against a fake career site.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use workday_crawler::jsonld;
use workday_crawler::testing::{
    job_page_without_jsonld, job_posting_html, FakeDetail, FakeLauncher, FakeSite, MockFetcher,
};
use workday_crawler::{
    BackoffPolicy, CrawlRunner, CrawlerConfig, DiscoveryConfig, ExtractorConfig, JobFilter,
    JobRecord, JobStatus, JobStore, MemoryStore, RateLimiterConfig,
};

#[cfg(feature = "sqlite")]
use workday_crawler::SqliteStore;

const LISTING: &str = "https://acme.wd1.myworkdayjobs.com/en-US/careers";

fn config() -> CrawlerConfig {
    CrawlerConfig::default()
        .with_discovery(DiscoveryConfig::default().with_settle_delay(Duration::ZERO))
        .with_extractor(ExtractorConfig::default().with_backoff(BackoffPolicy::immediate()))
        .with_rate_limiter(RateLimiterConfig::default().with_bounds(Duration::ZERO, Duration::ZERO))
}

fn detail_url(i: usize) -> String {
    format!("{}/job/Minneapolis/Role-{}_R{}", LISTING, i, i)
}

/// Acme: 40 declared jobs on two pages of 20. The fast path resolves 38;
/// the last two pages have no JSON-LD over HTTP. The browser renders the
/// block for one of them and nothing for the other.
fn acme() -> (FakeSite, MockFetcher) {
    let page_one: Vec<String> = (0..20).map(detail_url).collect();
    let page_two: Vec<String> = (20..40).map(detail_url).collect();

    let mut fetcher = MockFetcher::new();
    for i in 0..38 {
        fetcher = fetcher.with_page(
            detail_url(i),
            job_posting_html(&format!("R{}", i), &format!("Role {}", i)),
        );
    }
    fetcher = fetcher
        .with_page(detail_url(38), job_page_without_jsonld("Role 38"))
        .with_page(detail_url(39), job_page_without_jsonld("Role 39"));

    let site = FakeSite::new()
        .with_listing(LISTING, Some(40), vec![page_one, page_two])
        .with_detail(&detail_url(38), FakeDetail::json_ld("R38", "Role 38"));

    (site, fetcher)
}

async fn history_rows<S: JobStore>(store: &S, company_id: i64) -> usize {
    let mut total = 0;
    for job in store.query(&JobFilter::for_company(company_id)).await.unwrap() {
        total += store.history(company_id, &job.job_id).await.unwrap().len();
    }
    total
}

async fn run_acme_twice<S: JobStore>(store: S) {
    let (site, fetcher) = acme();
    let runner = CrawlRunner::new(store, fetcher, FakeLauncher::new(site), config());
    let company = runner.register_company("Acme", LISTING).await.unwrap();

    let first = runner
        .run_crawl(company.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.discovered, 40);
    assert_eq!(first.new_jobs, 39);
    assert_eq!(first.fallback_recovered, 1);
    assert_eq!(first.failed_urls, vec![detail_url(39)]);
    assert!(first.completeness_warning.is_none());
    assert!(!first.aborted);

    let active = runner
        .query_jobs(&JobFilter::for_company(company.id).active())
        .await
        .unwrap();
    assert_eq!(active.len(), 39);
    assert_eq!(history_rows(runner.store(), company.id).await, 39);

    // Nothing changed on the site: no new history, everything refreshed.
    let second = runner
        .run_crawl(company.id, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.new_jobs, 0);
    assert_eq!(second.updated_jobs, 39);
    assert_eq!(second.stale_jobs, 0);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(history_rows(runner.store(), company.id).await, 39);

    let all = runner
        .query_jobs(&JobFilter::for_company(company.id))
        .await
        .unwrap();
    assert_eq!(all.len(), 39);
}

#[tokio::test]
async fn test_acme_scenario_memory_store() {
    workday_crawler::telemetry::init_tracing("warn");
    run_acme_twice(MemoryStore::new()).await;
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_acme_scenario_sqlite_store() {
    run_acme_twice(SqliteStore::in_memory().await.unwrap()).await;
}

#[tokio::test]
async fn test_fallback_record_matches_fast_path_record() {
    let (site, fetcher) = acme();
    let runner = CrawlRunner::new(MemoryStore::new(), fetcher, FakeLauncher::new(site), config());
    let company = runner.register_company("Acme", LISTING).await.unwrap();

    runner
        .run_crawl(company.id, CancellationToken::new())
        .await
        .unwrap();

    let recovered = runner.store().job(company.id, "R38").await.unwrap().unwrap();

    // What the fast path would have stored had the page carried its JSON-LD.
    let direct = jsonld::parse_html(&job_posting_html("R38", "Role 38"), &detail_url(38)).unwrap();
    let expected = JobRecord::from_extracted(company.id, &direct, recovered.first_seen_at);

    assert_eq!(recovered, expected);
}

#[tokio::test]
async fn test_delisted_job_goes_stale_on_second_missed_run() {
    let hrefs: Vec<String> = (0..3).map(detail_url).collect();
    let mut fetcher = MockFetcher::new();
    for i in 0..3 {
        fetcher = fetcher.with_page(detail_url(i), job_posting_html(&format!("R{}", i), "Role"));
    }
    let site = FakeSite::new().with_listing(LISTING, Some(3), vec![hrefs.clone()]);
    let runner = CrawlRunner::new(
        MemoryStore::new(),
        fetcher,
        FakeLauncher::new(site.clone()),
        config(),
    );
    let company = runner.register_company("Acme", LISTING).await.unwrap();
    runner
        .run_crawl(company.id, CancellationToken::new())
        .await
        .unwrap();

    // R2 is taken down.
    site.set_listing(LISTING, Some(2), vec![hrefs[..2].to_vec()]);

    let second = runner
        .run_crawl(company.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.stale_jobs, 0);
    let job = runner.store().job(company.id, "R2").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Active);
    assert_eq!(job.missed_scrapes, 1);

    let third = runner
        .run_crawl(company.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(third.stale_jobs, 1);
    let job = runner.store().job(company.id, "R2").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Stale);

    // Reposted: back to active.
    site.set_listing(LISTING, Some(3), vec![hrefs]);
    let fourth = runner
        .run_crawl(company.id, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(fourth.reactivated_jobs, 1);
    assert_eq!(fourth.new_jobs, 0);
    let active = runner
        .query_jobs(&JobFilter::for_company(company.id).active())
        .await
        .unwrap();
    assert_eq!(active.len(), 3);
}
