//! Domain types for the crawler.

pub mod config;
pub mod filter;
pub mod job;
pub mod outcome;
pub mod summary;
