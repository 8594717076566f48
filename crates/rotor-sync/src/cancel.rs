//! Cooperative cancellation.
//!
//! A [`CancelToken`] carries a sticky cancelled flag plus a registry of the
//! wait points its holder is currently parked on. `cancel()` sets the flag
//! and wakes every registered wait point, so a blocked `Semaphore::acquire`
//! observes the flag and returns `Cancelled` instead of sleeping forever.
//!
//! Cancellation is observed only at cancellable suspension points. Code that
//! acquires a lock or semaphore uninterruptibly simply never consults the
//! token, which is how deferred cancellation inside protocol bookkeeping is
//! realized.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// A parked-waiter wake target. Implementations must take their own state
/// lock before notifying so a waiter between its flag check and its park
/// cannot miss the wakeup.
pub(crate) trait WaitPoint: Send + Sync {
    fn wake_all(&self);
}

struct TokenInner {
    cancelled: AtomicBool,
    wait_points: Mutex<Vec<Weak<dyn WaitPoint>>>,
}

/// Cooperative cancellation token.
///
/// Cloning is cheap and clones share the flag: cancelling any clone cancels
/// the operation everywhere the token is observed. A fresh token is never
/// cancelled, so `Cube::rotate` and friends can run uncancellable calls
/// through the same code path with a throwaway token.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                wait_points: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Whether `cancel` has been called on this token or any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel the token: set the sticky flag and wake every wait point a
    /// holder is currently parked on. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let wait_points = self.inner.wait_points.lock();
        tracing::trace!(
            target: "rotor.sync",
            wait_points = wait_points.len(),
            "cancel"
        );
        for wp in wait_points.iter() {
            if let Some(wp) = wp.upgrade() {
                wp.wake_all();
            }
        }
    }

    /// Register a wait point the calling thread is about to park on.
    /// The returned guard deregisters on drop.
    pub(crate) fn register(&self, wait_point: Weak<dyn WaitPoint>) -> CancelRegistration<'_> {
        self.inner.wait_points.lock().push(wait_point.clone());
        CancelRegistration {
            token: self,
            wait_point,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// RAII guard removing one wait-point registration.
pub(crate) struct CancelRegistration<'a> {
    token: &'a CancelToken,
    wait_point: Weak<dyn WaitPoint>,
}

impl Drop for CancelRegistration<'_> {
    fn drop(&mut self) {
        let mut wait_points = self.token.inner.wait_points.lock();
        if let Some(pos) = wait_points
            .iter()
            .position(|wp| Weak::ptr_eq(wp, &self.wait_point))
        {
            wait_points.swap_remove(pos);
        }
    }
}
