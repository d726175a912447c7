//! Serialization of refresh operations.
//!
//! A [`RefreshGuard`] admits one refresh at a time. Readers never touch it;
//! only operations that replace pod state (pull, activation) do. The guard
//! can be told to stay busy after a failed refresh, which turns it into a
//! circuit breaker that blocks further refreshes until someone calls
//! [`RefreshGuard::reset`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Admits one refresh at a time, with a configurable failure policy.
#[derive(Debug)]
pub struct RefreshGuard {
    semaphore: Arc<Semaphore>,
    started: AtomicBool,
    retained: Arc<AtomicBool>,
    release_on_failure: bool,
}

impl RefreshGuard {
    /// Creates a guard.
    ///
    /// With `release_on_failure = true` (the default policy) a failed
    /// refresh frees the guard for the next caller. With `false`, a failed
    /// refresh keeps the guard busy until [`RefreshGuard::reset`].
    #[must_use]
    pub fn new(release_on_failure: bool) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            started: AtomicBool::new(false),
            retained: Arc::new(AtomicBool::new(false)),
            release_on_failure,
        }
    }

    /// Claims the guard, waiting while another refresh holds it.
    ///
    /// The very first caller proceeds immediately; the guard starts out
    /// available rather than waiting for an initial completion.
    pub async fn acquire(&self) -> RefreshPermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("refresh semaphore never closes");
        self.started.store(true, Ordering::SeqCst);
        RefreshPermit {
            permit,
            retained: self.retained.clone(),
            release_on_failure: self.release_on_failure,
        }
    }

    /// Frees a guard that a failed refresh retained.
    ///
    /// No-op unless the guard is currently retained, so an in-flight refresh
    /// can never be undermined by a stray reset.
    pub fn reset(&self) {
        if self.retained.swap(false, Ordering::SeqCst) {
            self.semaphore.add_permits(1);
            debug!("Refresh guard reset");
        }
    }

    /// Returns `true` while a refresh holds the guard or a failure retains it.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Returns `true` if a failed refresh is holding the guard busy.
    #[must_use]
    pub fn is_retained(&self) -> bool {
        self.retained.load(Ordering::SeqCst)
    }

    /// Returns `true` once any refresh has been attempted.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns the configured failure policy.
    #[must_use]
    pub fn release_on_failure(&self) -> bool {
        self.release_on_failure
    }
}

impl Default for RefreshGuard {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Exclusive hold on a [`RefreshGuard`] for the duration of one refresh.
///
/// Dropping the permit without calling [`RefreshPermit::release`] frees the
/// guard, so a refresh cancelled mid-flight cannot wedge later refreshes.
/// The failure policy only applies to refreshes that ran to completion and
/// reported their outcome.
#[derive(Debug)]
pub struct RefreshPermit {
    permit: OwnedSemaphorePermit,
    retained: Arc<AtomicBool>,
    release_on_failure: bool,
}

impl RefreshPermit {
    /// Reports the refresh outcome and releases or retains the guard.
    pub fn release(self, succeeded: bool) {
        if succeeded || self.release_on_failure {
            drop(self.permit);
        } else {
            self.retained.store(true, Ordering::SeqCst);
            self.permit.forget();
            warn!("Refresh failed; guard retained until reset");
        }
    }
}
