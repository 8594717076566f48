//! FIFO binary semaphore.
//!
//! The admission gate of the controller must be strictly first-come
//! first-served: a flood of same-group newcomers may never win the admission
//! race against an older waiter of a different group. Neither `std` nor
//! `parking_lot` mutexes guarantee that, and both tie the unlock to the
//! acquiring thread via a guard, which rules them out here — the protocol
//! hands the gate from an exiting thread to a woken cohort, whose *last*
//! member releases it.
//!
//! The implementation is a ticket queue: each `acquire` takes the next
//! ticket, parks until its ticket is at the head *and* the permit is
//! available, then consumes both. `release` may be called from any thread.
//! Acquisition is deliberately uninterruptible; cancellation raised while
//! queued here is deferred to the next cancellable wait point.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct FairState {
    /// Binary permit.
    available: bool,
    /// Tickets of threads queued for the permit, oldest first.
    queue: VecDeque<u64>,
    next_ticket: u64,
}

/// Strictly FIFO binary semaphore with cross-thread release.
pub struct FairSemaphore {
    state: Mutex<FairState>,
    turn: Condvar,
}

impl FairSemaphore {
    /// Create the gate with its permit available.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FairState {
                available: true,
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            turn: Condvar::new(),
        }
    }

    /// Acquire the permit, blocking in strict arrival order. Not cancellable.
    pub fn acquire(&self) {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);
        while !(state.available && state.queue.front() == Some(&ticket)) {
            self.turn.wait(&mut state);
        }
        state.queue.pop_front();
        state.available = false;
    }

    /// Release the permit. May be called by a thread other than the acquirer.
    pub fn release(&self) {
        let mut state = self.state.lock();
        debug_assert!(!state.available, "release of an already-available permit");
        state.available = true;
        self.turn.notify_all();
    }
}

impl Default for FairSemaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FairSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FairSemaphore")
            .field("available", &state.available)
            .field("queued", &state.queue.len())
            .finish()
    }
}
