//! Adaptive per-site rate limiting.
//!
//! [`AdaptiveRateLimiter`] spaces outbound requests by a current delay that
//! grows on failure and shrinks after a streak of successes. One instance is
//! shared by every worker hitting the same site, so the feedback reflects the
//! aggregate load. An optional `governor` quota adds a hard request-rate cap
//! on top.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use governor::{Quota, RateLimiter};
use tokio::time::Instant;

use crate::types::config::RateLimiterConfig;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Failure classes fed back into the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// HTTP 429 or explicit "rate limit" text
    RateLimited,
    Timeout,
    Other,
}

/// Snapshot of limiter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub current_delay: Duration,
    pub total_requests: u64,
    pub total_wait: Duration,
    pub success_streak: u32,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct LimiterState {
    current_delay: Duration,
    /// Earliest instant the next request may be sent
    next_slot: Option<Instant>,
    success_streak: u32,
    consecutive_failures: u32,
    total_requests: u64,
    total_wait: Duration,
}

/// Delay controller shared by all requests to one site.
pub struct AdaptiveRateLimiter {
    config: RateLimiterConfig,
    state: Mutex<LimiterState>,
    cap: Option<DirectLimiter>,
}

impl std::fmt::Debug for AdaptiveRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimiter")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl AdaptiveRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let initial = config
            .initial_delay
            .unwrap_or(config.min_delay)
            .clamp(config.min_delay, config.max_delay.max(config.min_delay));

        let cap = config
            .max_requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Self {
            config,
            state: Mutex::new(LimiterState {
                current_delay: initial,
                next_slot: None,
                success_streak: 0,
                consecutive_failures: 0,
                total_requests: 0,
                total_wait: Duration::ZERO,
            }),
            cap,
        }
    }

    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until it is safe to send the next request.
    ///
    /// Each caller reserves the next slot under a short lock and sleeps
    /// outside it, so concurrent callers are spaced by the current delay.
    /// Returns how long this caller waited for its slot.
    pub async fn wait(&self) -> Duration {
        let (slot, waited) = {
            let mut state = self.state();
            let now = Instant::now();
            let slot = match state.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            state.next_slot = Some(slot + state.current_delay);
            state.total_requests += 1;
            let waited = slot - now;
            state.total_wait += waited;
            (slot, waited)
        };

        if !waited.is_zero() {
            tracing::trace!(delay_ms = waited.as_millis() as u64, "Rate limiter waiting");
            tokio::time::sleep_until(slot).await;
        }

        if let Some(cap) = &self.cap {
            cap.until_ready().await;
        }

        waited
    }

    /// Record a successful request.
    pub fn success(&self) {
        let mut state = self.state();
        state.consecutive_failures = 0;
        state.success_streak += 1;

        if state.success_streak >= self.config.success_streak {
            let reduced = state
                .current_delay
                .div_f64(self.config.decrease_divisor.max(1.0));
            let old = state.current_delay;
            state.current_delay = reduced.max(self.config.min_delay);
            state.success_streak = 0;
            if state.current_delay != old {
                tracing::debug!(
                    delay_ms = state.current_delay.as_millis() as u64,
                    "Rate limiter decreasing delay"
                );
            }
        }
    }

    /// Record a failed request.
    ///
    /// The delay is multiplied by `factor(kind) ^ min(consecutive_failures, 3)`
    /// and clamped to the ceiling.
    pub fn failure(&self, kind: FailureKind) {
        let mut state = self.state();
        state.success_streak = 0;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let factor = match kind {
            FailureKind::RateLimited => self.config.rate_limit_factor,
            FailureKind::Timeout => self.config.timeout_factor,
            FailureKind::Other => self.config.backoff_factor,
        }
        .max(1.0);
        let exponent = state.consecutive_failures.min(3) as i32;

        let ceiling = self.config.max_delay.as_secs_f64();
        let next = (state.current_delay.as_secs_f64() * factor.powi(exponent)).min(ceiling);
        state.current_delay = Duration::from_secs_f64(next).max(state.current_delay.min(self.config.max_delay));

        tracing::warn!(
            kind = ?kind,
            consecutive_failures = state.consecutive_failures,
            delay_ms = state.current_delay.as_millis() as u64,
            "Rate limiter increasing delay"
        );
    }

    pub fn current_delay(&self) -> Duration {
        self.state().current_delay
    }

    pub fn stats(&self) -> RateLimiterStats {
        let state = self.state();
        RateLimiterStats {
            current_delay: state.current_delay,
            total_requests: state.total_requests,
            total_wait: state.total_wait,
            success_streak: state.success_streak,
            consecutive_failures: state.consecutive_failures,
        }
    }
}

/// One [`AdaptiveRateLimiter`] per target host, created on first use.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    config: RateLimiterConfig,
    limiters: Mutex<HashMap<String, Arc<AdaptiveRateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter for the host of `url`. Unparsable URLs share one limiter keyed by the raw string.
    pub fn for_url(&self, url: &str) -> Arc<AdaptiveRateLimiter> {
        let key = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_else(|| url.to_string());
        self.for_host(&key)
    }

    pub fn for_host(&self, host: &str) -> Arc<AdaptiveRateLimiter> {
        let mut limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
        limiters
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(AdaptiveRateLimiter::new(self.config.clone())))
            .clone()
    }

    /// Stats for every host seen so far.
    pub fn stats(&self) -> Vec<(String, RateLimiterStats)> {
        let limiters = self.limiters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = limiters
            .iter()
            .map(|(host, limiter)| (host.clone(), limiter.stats()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
