//! Bounded pool of reusable browser sessions.
//!
//! Cold browser startup is expensive, so sessions are kept in an arena of
//! `max_sessions` slots and handed out as [`SessionLease`] guards. Each slot
//! is explicitly `Expired` (no live session), `Idle` or `InUse`. A semaphore
//! with one permit per slot bounds concurrent leases.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::{BrowserError, CrawlError, CrawlResult};
use crate::traits::browser::{BrowserLauncher, BrowserSession};
use crate::types::config::SessionPoolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Expired,
    Idle,
    InUse,
}

struct Slot<S> {
    state: SlotState,
    /// Present only while `Idle`; a lease owns it while `InUse`
    session: Option<S>,
    created_at: Instant,
    last_used: Instant,
}

impl<S> Slot<S> {
    fn empty() -> Self {
        let now = Instant::now();
        Self {
            state: SlotState::Expired,
            session: None,
            created_at: now,
            last_used: now,
        }
    }
}

struct Slots<S> {
    slots: Mutex<Vec<Slot<S>>>,
}

impl<S> Slots<S> {
    fn lock(&self) -> MutexGuard<'_, Vec<Slot<S>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Live sessions (idle + in use)
    pub total: usize,
    pub in_use: usize,
    pub idle: usize,
    pub max: usize,
}

/// Pool of browser sessions created by a [`BrowserLauncher`].
pub struct SessionPool<L: BrowserLauncher> {
    launcher: L,
    config: SessionPoolConfig,
    slots: Arc<Slots<L::Session>>,
    permits: Arc<Semaphore>,
}

enum Checkout<S> {
    Reuse(S),
    Launch,
}

impl<L: BrowserLauncher> SessionPool<L> {
    pub fn new(launcher: L, config: SessionPoolConfig) -> Self {
        let max = config.max_sessions.max(1);
        let slots = (0..max).map(|_| Slot::empty()).collect();
        Self {
            launcher,
            config,
            slots: Arc::new(Slots {
                slots: Mutex::new(slots),
            }),
            permits: Arc::new(Semaphore::new(max)),
        }
    }

    pub fn config(&self) -> &SessionPoolConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Get a ready session, waiting as long as it takes.
    ///
    /// While blocked, a warning is logged every `wait_timeout`.
    pub async fn acquire(&self) -> CrawlResult<SessionLease<L::Session>> {
        let started = Instant::now();
        let acquire = self.permits.clone().acquire_owned();
        tokio::pin!(acquire);

        let permit = loop {
            tokio::select! {
                permit = &mut acquire => {
                    break permit.map_err(|_| BrowserError::Closed)?;
                }
                _ = tokio::time::sleep(self.config.wait_timeout) => {
                    let waited = started.elapsed();
                    tracing::warn!(
                        error = %CrawlError::SessionExhausted { waited },
                        max_sessions = self.config.max_sessions,
                        "Still waiting for a browser session"
                    );
                }
            }
        };

        self.checkout(permit).await
    }

    /// Get a ready session, failing with `SessionExhausted` after `timeout`.
    pub async fn acquire_within(&self, timeout: Duration) -> CrawlResult<SessionLease<L::Session>> {
        let permit = match tokio::time::timeout(timeout, self.permits.clone().acquire_owned()).await
        {
            Ok(permit) => permit.map_err(|_| BrowserError::Closed)?,
            Err(_) => return Err(CrawlError::SessionExhausted { waited: timeout }),
        };
        self.checkout(permit).await
    }

    /// Return a lease to the pool. Equivalent to dropping it.
    pub fn release(&self, lease: SessionLease<L::Session>) {
        drop(lease);
    }

    async fn checkout(
        &self,
        permit: OwnedSemaphorePermit,
    ) -> CrawlResult<SessionLease<L::Session>> {
        // From here until the lease exists, the claim owns the slot, so a
        // dropped acquire future expires the slot instead of stranding it.
        let (claim, checkout, mut to_close) = self.claim_slot(permit)?;
        let index = claim.index;

        for mut session in to_close.drain(..) {
            if let Err(e) = session.close().await {
                tracing::debug!(error = %e, "Error closing recycled session");
            }
        }

        let session = match checkout {
            Checkout::Reuse(mut session) => {
                if session.is_responsive().await {
                    Some(session)
                } else {
                    tracing::info!(slot = index, "Discarding unresponsive browser session");
                    if let Err(e) = session.close().await {
                        tracing::debug!(error = %e, "Error closing unresponsive session");
                    }
                    None
                }
            }
            Checkout::Launch => None,
        };

        let session = match session {
            Some(session) => session,
            None => {
                let session = self.launcher.launch().await?;
                tracing::debug!(slot = index, "Launched browser session");
                let now = Instant::now();
                let mut slots = self.slots.lock();
                slots[index].created_at = now;
                slots[index].last_used = now;
                session
            }
        };

        Ok(claim.into_lease(session))
    }

    /// Sweep expired idle sessions and mark one slot `InUse`.
    #[allow(clippy::type_complexity)]
    fn claim_slot(
        &self,
        permit: OwnedSemaphorePermit,
    ) -> CrawlResult<(SlotClaim<L::Session>, Checkout<L::Session>, Vec<L::Session>)> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let mut to_close = Vec::new();

        for slot in slots.iter_mut() {
            if slot.state != SlotState::Idle {
                continue;
            }
            let idle_expired = now.duration_since(slot.last_used) > self.config.idle_timeout;
            let too_old = self
                .config
                .max_age
                .is_some_and(|age| now.duration_since(slot.created_at) > age);
            if idle_expired || too_old {
                if let Some(session) = slot.session.take() {
                    to_close.push(session);
                }
                slot.state = SlotState::Expired;
            }
        }
        if !to_close.is_empty() {
            tracing::info!(recycled = to_close.len(), "Recycling expired browser sessions");
        }

        let (index, checkout) = match slots.iter().position(|s| s.state == SlotState::Idle) {
            Some(index) => {
                let session = slots[index].session.take().ok_or(BrowserError::Closed)?;
                (index, Checkout::Reuse(session))
            }
            None => {
                // Holding a permit guarantees a non-InUse slot exists.
                let index = slots
                    .iter()
                    .position(|s| s.state == SlotState::Expired)
                    .ok_or(BrowserError::Closed)?;
                (index, Checkout::Launch)
            }
        };
        slots[index].state = SlotState::InUse;

        let claim = SlotClaim {
            slots: self.slots.clone(),
            index,
            permit: Some(permit),
        };
        Ok((claim, checkout, to_close))
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock();
        let in_use = slots.iter().filter(|s| s.state == SlotState::InUse).count();
        let idle = slots.iter().filter(|s| s.state == SlotState::Idle).count();
        PoolStats {
            total: in_use + idle,
            in_use,
            idle,
            max: slots.len(),
        }
    }

    /// Close every idle session. Leased sessions are unaffected.
    pub async fn close_all(&self) {
        let sessions: Vec<_> = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .filter(|s| s.state == SlotState::Idle)
                .filter_map(|s| {
                    s.state = SlotState::Expired;
                    s.session.take()
                })
                .collect()
        };
        for mut session in sessions {
            if let Err(e) = session.close().await {
                tracing::debug!(error = %e, "Error closing browser session");
            }
        }
    }
}

/// A slot marked `InUse` whose session is not yet handed out.
///
/// Dropped before [`SlotClaim::into_lease`], it expires the slot and then
/// releases the permit.
struct SlotClaim<S> {
    slots: Arc<Slots<S>>,
    index: usize,
    permit: Option<OwnedSemaphorePermit>,
}

impl<S: BrowserSession> SlotClaim<S> {
    fn into_lease(mut self, session: S) -> SessionLease<S> {
        SessionLease {
            slots: self.slots.clone(),
            index: self.index,
            session: Some(session),
            _permit: self.permit.take(),
        }
    }
}

impl<S> Drop for SlotClaim<S> {
    fn drop(&mut self) {
        if self.permit.is_some() {
            self.slots.lock()[self.index].state = SlotState::Expired;
        }
    }
}

/// Exclusive use of one pooled session.
///
/// Dropping the lease returns the session to the pool as idle.
pub struct SessionLease<S: BrowserSession> {
    slots: Arc<Slots<S>>,
    index: usize,
    session: Option<S>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl<S: BrowserSession> SessionLease<S> {
    /// Close the session and expire its slot instead of returning it.
    pub async fn discard(mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!(error = %e, "Error closing discarded session");
            }
        }
    }

    pub fn slot(&self) -> usize {
        self.index
    }
}

impl<S: BrowserSession> Deref for SessionLease<S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
            .as_ref()
            .expect("lease holds its session until dropped")
    }
}

impl<S: BrowserSession> DerefMut for SessionLease<S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
            .as_mut()
            .expect("lease holds its session until dropped")
    }
}

impl<S: BrowserSession> Drop for SessionLease<S> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        let slot = &mut slots[self.index];
        match self.session.take() {
            Some(session) => {
                slot.session = Some(session);
                slot.state = SlotState::Idle;
                slot.last_used = Instant::now();
            }
            None => {
                slot.state = SlotState::Expired;
            }
        }
    }
}
