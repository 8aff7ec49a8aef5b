//! Tracing subscriber setup for binaries and tests embedding the crawler.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_directives` (e.g. `"info,workday_crawler=debug"`)
/// when `RUST_LOG` is unset or invalid. Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing(default_directives: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .try_init()
        .is_ok()
}
