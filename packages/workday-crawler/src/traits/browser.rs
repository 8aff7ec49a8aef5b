//! Browser automation capability.
//!
//! Discovery and the render fallback only need four verbs: navigate, wait
//! for a selector, read rendered text/attributes, and click. Any driver
//! (CDP, WebDriver, a remote rendering service) can sit behind these traits,
//! and tests use the in-memory fake from [`crate::testing`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserResult;

/// A single live browser tab/context.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load a URL and wait for the document to be interactive.
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    /// Wait until `selector` matches at least one element.
    ///
    /// Returns `Ok(false)` if the timeout elapses first.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration)
        -> BrowserResult<bool>;

    /// Text content of every element matching `selector`, in document order.
    async fn read_texts(&mut self, selector: &str) -> BrowserResult<Vec<String>>;

    /// Value of `attribute` on every matching element that has it.
    async fn read_attributes(&mut self, selector: &str, attribute: &str)
        -> BrowserResult<Vec<String>>;

    /// Click the first element matching `selector`.
    ///
    /// Returns `Ok(false)` when nothing matched.
    async fn click(&mut self, selector: &str) -> BrowserResult<bool>;

    /// URL currently loaded.
    async fn current_url(&mut self) -> BrowserResult<String>;

    /// Cheap liveness probe (e.g. evaluate `document.readyState`).
    async fn is_responsive(&mut self) -> bool;

    /// Tear down the session.
    async fn close(&mut self) -> BrowserResult<()>;

    /// Text of the first element matching `selector`, if any.
    async fn read_text(&mut self, selector: &str) -> BrowserResult<Option<String>> {
        Ok(self.read_texts(selector).await?.into_iter().next())
    }
}

/// Creates browser sessions for the [`SessionPool`](crate::session::SessionPool).
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession + 'static;

    /// Start a new session. Expected to be slow.
    async fn launch(&self) -> BrowserResult<Self::Session>;
}
