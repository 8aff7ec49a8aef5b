//! Page fetcher implementations.
//!
//! - `ReqwestFetcher` - production HTTP client
//! - `MockFetcher` (in [`crate::testing`]) - scripted responses for tests

pub mod http;

pub use http::ReqwestFetcher;
