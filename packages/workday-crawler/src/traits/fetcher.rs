//! Plain HTTP fetch capability used by the fast path.

use async_trait::async_trait;

use crate::error::CrawlResult;

/// Raw HTTP response for a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests for detail pages.
///
/// Non-2xx responses are returned as pages, not errors; only transport-level
/// problems (DNS, reset, timeout) are `Err`.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str) -> CrawlResult<FetchedPage>;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    async fn get(&self, url: &str) -> CrawlResult<FetchedPage> {
        (**self).get(url).await
    }
}
