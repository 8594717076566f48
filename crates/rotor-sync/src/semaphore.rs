//! Counting semaphore with cancellable acquisition and batch release.
//!
//! ## Protocol
//!
//! 1. `acquire` registers the caller's [`CancelToken`] as a wait point, then
//!    parks until a permit is available or the token is cancelled.
//! 2. Cancellation wins over an available permit: a cancelled `acquire`
//!    returns `Cancelled` *without* consuming a permit, so a permit raised
//!    for a since-cancelled waiter stays on the semaphore for that waiter to
//!    drain explicitly with `acquire_uncancellable`.
//! 3. `release_many(n)` raises `n` permits atomically and wakes all waiters,
//!    which is what lets an admission cohort be released as one batch.

use std::sync::Arc;
use std::sync::Weak;

use parking_lot::{Condvar, Mutex};
use rotor_error::{Result, RotorError};

use crate::cancel::{CancelToken, WaitPoint};

struct SemState {
    permits: usize,
}

struct SemShared {
    state: Mutex<SemState>,
    available: Condvar,
}

impl WaitPoint for SemShared {
    fn wake_all(&self) {
        // Taking the state lock orders this wake against a waiter that has
        // checked the flag but not yet parked.
        let _state = self.state.lock();
        self.available.notify_all();
    }
}

/// Counting semaphore. No acquisition fairness: waiters are released in
/// batches by the protocol above this, so ordering within a batch is moot.
pub struct Semaphore {
    shared: Arc<SemShared>,
}

impl Semaphore {
    /// Create a semaphore holding `permits` initial permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            shared: Arc::new(SemShared {
                state: Mutex::new(SemState { permits }),
                available: Condvar::new(),
            }),
        }
    }

    /// Acquire one permit, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`RotorError::Cancelled`] if `token` is cancelled before or
    /// while waiting. No permit is consumed in that case.
    pub fn acquire(&self, token: &CancelToken) -> Result<()> {
        let wait_point: Weak<dyn WaitPoint> = Arc::downgrade(&self.shared) as Weak<dyn WaitPoint>;
        let _registration = token.register(wait_point);

        let mut state = self.shared.state.lock();
        loop {
            if token.is_cancelled() {
                return Err(RotorError::Cancelled);
            }
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }
            self.shared.available.wait(&mut state);
        }
    }

    /// Acquire one permit, blocking until one is available, ignoring
    /// cancellation.
    pub fn acquire_uncancellable(&self) {
        let mut state = self.shared.state.lock();
        while state.permits == 0 {
            self.shared.available.wait(&mut state);
        }
        state.permits -= 1;
    }

    /// Take a permit if one is immediately available.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.permits > 0 {
            state.permits -= 1;
            true
        } else {
            false
        }
    }

    /// Release one permit.
    pub fn release(&self) {
        self.release_many(1);
    }

    /// Release `n` permits at once and wake all waiters.
    pub fn release_many(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut state = self.shared.state.lock();
        state.permits += n;
        self.shared.available.notify_all();
    }

    /// Current permit count (diagnostics and tests).
    #[must_use]
    pub fn permits(&self) -> usize {
        self.shared.state.lock().permits
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("permits", &self.permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn initial_permits_are_acquirable() {
        let sem = Semaphore::new(2);
        let token = CancelToken::new();
        sem.acquire(&token).unwrap();
        sem.acquire(&token).unwrap();
        assert_eq!(sem.permits(), 0);
        assert!(!sem.try_acquire());
    }

    #[test]
    fn release_wakes_blocked_acquirer() {
        let sem = StdArc::new(Semaphore::new(0));
        let acquired = StdArc::new(AtomicBool::new(false));

        let s = StdArc::clone(&sem);
        let a = StdArc::clone(&acquired);
        let handle = thread::spawn(move || {
            s.acquire(&CancelToken::new()).unwrap();
            a.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        sem.release();
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn batch_release_wakes_whole_cohort() {
        let sem = StdArc::new(Semaphore::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let s = StdArc::clone(&sem);
            handles.push(thread::spawn(move || s.acquire(&CancelToken::new())));
        }
        thread::sleep(Duration::from_millis(50));
        sem.release_many(4);
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(sem.permits(), 0);
    }

    #[test]
    fn cancel_wakes_blocked_acquirer_with_error() {
        let sem = StdArc::new(Semaphore::new(0));
        let token = CancelToken::new();

        let s = StdArc::clone(&sem);
        let t = token.clone();
        let handle = thread::spawn(move || s.acquire(&t));

        thread::sleep(Duration::from_millis(50));
        token.cancel();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(RotorError::Cancelled)));
    }

    #[test]
    fn cancelled_acquire_does_not_consume_a_raised_permit() {
        // A permit raised for a waiter that is then cancelled must survive
        // the failed acquire, so the waiter can drain it explicitly.
        let sem = Semaphore::new(0);
        let token = CancelToken::new();
        sem.release();
        token.cancel();
        assert!(matches!(sem.acquire(&token), Err(RotorError::Cancelled)));
        assert_eq!(sem.permits(), 1);
        sem.acquire_uncancellable();
        assert_eq!(sem.permits(), 0);
    }

    #[test]
    fn acquire_uncancellable_ignores_token_state() {
        let sem = Semaphore::new(1);
        sem.acquire_uncancellable();
        assert_eq!(sem.permits(), 0);
    }

    #[test]
    fn cancel_before_acquire_fails_fast() {
        let sem = Semaphore::new(1);
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(sem.acquire(&token), Err(RotorError::Cancelled)));
        assert_eq!(sem.permits(), 1, "permit untouched");
    }

    #[test]
    fn concurrent_cancel_and_release_never_hangs() {
        // Race a cancel against a release repeatedly; the waiter must always
        // return promptly with one of the two legal outcomes.
        for _ in 0..200 {
            let sem = StdArc::new(Semaphore::new(0));
            let token = CancelToken::new();

            let s = StdArc::clone(&sem);
            let t = token.clone();
            let waiter = thread::spawn(move || s.acquire(&t));

            let s = StdArc::clone(&sem);
            let releaser = thread::spawn(move || s.release());
            let t = token.clone();
            let canceller = thread::spawn(move || t.cancel());

            releaser.join().unwrap();
            canceller.join().unwrap();
            match waiter.join().unwrap() {
                Ok(()) => assert_eq!(sem.permits(), 0),
                Err(RotorError::Cancelled) => assert_eq!(sem.permits(), 1),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }
}
