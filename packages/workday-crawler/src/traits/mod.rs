//! Capability traits the crawler consumes.
//!
//! The crawler does not drive a browser, speak HTTP, or own a database
//! itself; it is handed implementations of these traits.

pub mod browser;
pub mod fetcher;
pub mod store;
