//! The admission controller for cube operations.
//!
//! Requests fall into four conflict groups: one per rotation direction
//! (0..=2) and one for snapshots (3). Requests of the same group may overlap
//! (rotations additionally need distinct planes); requests of different
//! groups are mutually exclusive.
//!
//! ## Protocol
//!
//! Entry takes the FIFO admission gate, then consults the shared state under
//! the state mutex: with no waiters anywhere and the cube idle or occupied by
//! the caller's own group, the caller is admitted immediately. Otherwise it
//! parks on its group gate — any waiter anywhere forces newcomers to queue,
//! which is what prevents starvation.
//!
//! Exit decrements the in-flight count; the last one out scans the waiting
//! groups round-robin from `next_priority` and releases the first non-empty
//! group *as a whole batch*, so same-group requests parallelize maximally on
//! admission. Between two admissions of any group, at most three other
//! groups can be served ahead of it.
//!
//! ## Admission-gate inheritance
//!
//! A wake pulse is a critical section on the admission gate spanning the
//! waking thread and the entire woken cohort: the exiting thread does *not*
//! release the gate when it wakes a group. Whichever cohort member is last
//! to react — by resuming, or by being cancelled and draining its own raised
//! permit — either hands the gate to a further cohort or releases it. While
//! the pulse is in flight the FIFO gate bars all new arrivals, so the cohort
//! fully repopulates the in-flight count before any newcomer can consult the
//! skip-waiting test. A naive release-then-signal would re-admit barging.
//!
//! Rotations additionally serialize per plane on a dedicated gate acquired
//! after group admission and released before group exit, so the lock order
//! admission gate → state mutex → (park) stays acyclic.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rotor_error::{Result, RotorError};
use rotor_sync::{CancelToken, FairSemaphore, Semaphore};
use serde::Serialize;

/// Number of conflict groups: three rotation directions plus snapshot.
pub(crate) const GROUPS: usize = 4;

/// Group index reserved for snapshots.
pub(crate) const SNAPSHOT_GROUP: usize = 3;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct MonitorState {
    /// Requests past admission and not yet exited.
    working: u32,
    /// Group occupying the cube. Meaningful only while `working > 0` or a
    /// wake pulse is in flight.
    active_group: usize,
    /// Group favored by the next wake scan; advances past each woken group.
    next_priority: usize,
    /// Requests parked at each group gate.
    waiting: [u32; GROUPS],
    /// Woken requests that have not yet resumed past their gate.
    woken: u32,
}

impl MonitorState {
    /// Whether a newcomer of `group` may be admitted without parking.
    fn can_skip_waiting(&self, group: usize) -> bool {
        self.waiting.iter().all(|&w| w == 0)
            && (self.working == 0 || self.active_group == group)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Per-monitor counters, updated lock-free on the admission paths.
struct MonitorCounters {
    admitted_total: [AtomicU64; GROUPS],
    wake_pulses_total: AtomicU64,
    woken_total: AtomicU64,
    cancelled_waits_total: AtomicU64,
}

impl MonitorCounters {
    const fn new() -> Self {
        Self {
            admitted_total: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
            wake_pulses_total: AtomicU64::new(0),
            woken_total: AtomicU64::new(0),
            cancelled_waits_total: AtomicU64::new(0),
        }
    }
}

/// Snapshot of a monitor's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonitorMetrics {
    /// Admissions per rotation direction.
    pub admitted_rotations: [u64; 3],
    /// Snapshot admissions.
    pub admitted_snapshots: u64,
    /// Wake pulses issued by exiting requesters.
    pub wake_pulses_total: u64,
    /// Requesters released across all wake pulses.
    pub woken_total: u64,
    /// Waits that ended in cancellation instead of admission.
    pub cancelled_waits_total: u64,
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// The concurrency monitor deciding who may touch the cube and when.
pub struct Monitor {
    /// FIFO admission gate; inherited by wake cohorts (see module docs).
    big: FairSemaphore,
    /// Guards every read and write of the shared counters.
    state: Mutex<MonitorState>,
    /// Parks each group's waiters; permits raised in batches.
    group_gate: [Semaphore; GROUPS],
    /// One binary gate per plane; serializes the plane slot inside a cohort.
    plane_gate: Vec<Semaphore>,
    counters: MonitorCounters,
}

impl Monitor {
    /// A monitor for a cube with `size` planes per direction.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            big: FairSemaphore::new(),
            state: Mutex::new(MonitorState {
                working: 0,
                active_group: 0,
                next_priority: 0,
                waiting: [0; GROUPS],
                woken: 0,
            }),
            group_gate: std::array::from_fn(|_| Semaphore::new(0)),
            plane_gate: (0..size).map(|_| Semaphore::new(1)).collect(),
            counters: MonitorCounters::new(),
        }
    }

    /// Enter for a rotation in `direction` on `plane`.
    ///
    /// # Errors
    ///
    /// Returns [`RotorError::Cancelled`] if `token` is cancelled while parked
    /// at the group gate (controller state restored, nothing admitted) or at
    /// the plane gate (group admission rolled back via the exit protocol).
    pub fn enter_rotate(&self, direction: usize, plane: usize, token: &CancelToken) -> Result<()> {
        self.enter_group(direction, token)?;

        // Already admitted to the group; a cancelled plane wait must undo
        // that admission before propagating.
        if let Err(err) = self.plane_gate[plane].acquire(token) {
            self.counters
                .cancelled_waits_total
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                target: "rotor.monitor",
                direction,
                plane,
                "cancelled_on_plane_gate"
            );
            self.exit_group(direction);
            return Err(err);
        }
        Ok(())
    }

    /// Exit after a rotation in `direction` on `plane`. Infallible.
    ///
    /// The plane frees before the shared exit block so same-direction peers
    /// parked on their own planes proceed as soon as possible.
    pub fn exit_rotate(&self, direction: usize, plane: usize) {
        self.plane_gate[plane].release();
        self.exit_group(direction);
    }

    /// Enter for a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RotorError::Cancelled`] if `token` is cancelled while parked.
    pub fn enter_snapshot(&self, token: &CancelToken) -> Result<()> {
        self.enter_group(SNAPSHOT_GROUP, token)
    }

    /// Exit after a snapshot. Infallible.
    pub fn exit_snapshot(&self) {
        self.exit_group(SNAPSHOT_GROUP);
    }

    /// Read the monitor's counters.
    #[must_use]
    pub fn metrics(&self) -> MonitorMetrics {
        MonitorMetrics {
            admitted_rotations: [
                self.counters.admitted_total[0].load(Ordering::Relaxed),
                self.counters.admitted_total[1].load(Ordering::Relaxed),
                self.counters.admitted_total[2].load(Ordering::Relaxed),
            ],
            admitted_snapshots: self.counters.admitted_total[SNAPSHOT_GROUP]
                .load(Ordering::Relaxed),
            wake_pulses_total: self.counters.wake_pulses_total.load(Ordering::Relaxed),
            woken_total: self.counters.woken_total.load(Ordering::Relaxed),
            cancelled_waits_total: self.counters.cancelled_waits_total.load(Ordering::Relaxed),
        }
    }

    // -----------------------------------------------------------------------
    // Shared entry/exit protocol
    // -----------------------------------------------------------------------

    fn enter_group(&self, group: usize, token: &CancelToken) -> Result<()> {
        self.big.acquire();
        let mut state = self.state.lock();

        if state.can_skip_waiting(group) {
            state.working += 1;
            state.active_group = group;
            drop(state);
            self.big.release();
            self.counters.admitted_total[group].fetch_add(1, Ordering::Relaxed);
            tracing::trace!(target: "rotor.monitor", group, "admitted_direct");
            return Ok(());
        }

        state.waiting[group] += 1;
        tracing::trace!(
            target: "rotor.monitor",
            group,
            waiting = state.waiting[group],
            "parked"
        );
        drop(state);
        self.big.release();

        match self.group_gate[group].acquire(token) {
            Ok(()) => {
                // Resumed by a wake pulse; the admission gate is inherited
                // until the whole cohort has reacted.
                let mut state = self.state.lock();
                state.waiting[group] -= 1;
                state.woken -= 1;
                state.working += 1;
                if state.woken == 0 {
                    self.big.release();
                }
                drop(state);
                self.counters.admitted_total[group].fetch_add(1, Ordering::Relaxed);
                tracing::trace!(target: "rotor.monitor", group, "admitted_after_wake");
                Ok(())
            }
            Err(err) => {
                let mut state = self.state.lock();
                state.waiting[group] -= 1;
                if state.woken > 0 && state.active_group == group {
                    // Cancelled inside the wake-pulse window: the permit has
                    // already been raised for this thread, so drain it here
                    // or it would admit a stranger outside the cohort.
                    state.woken -= 1;
                    self.group_gate[group].acquire_uncancellable();
                    if state.woken == 0 {
                        // Last cohort member to react owns the inherited
                        // gate: pass it to a further cohort or release it.
                        if state.working > 0 || !self.try_wake_next_group(&mut state) {
                            self.big.release();
                        }
                    }
                    tracing::debug!(
                        target: "rotor.monitor",
                        group,
                        "cancelled_inside_wake_pulse"
                    );
                } else {
                    tracing::debug!(target: "rotor.monitor", group, "cancelled_while_parked");
                }
                drop(state);
                self.counters
                    .cancelled_waits_total
                    .fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    fn exit_group(&self, group: usize) {
        self.big.acquire();
        let mut state = self.state.lock();
        state.working -= 1;
        // The gate is handed over only when a wake pulse actually starts.
        if state.working > 0 || !self.try_wake_next_group(&mut state) {
            self.big.release();
        }
        drop(state);
        tracing::trace!(target: "rotor.monitor", group, "exited");
    }

    /// Round-robin scan from `next_priority`; wakes the first non-empty group
    /// as one batch. Returns whether a pulse was issued. Must run under the
    /// state mutex.
    fn try_wake_next_group(&self, state: &mut MonitorState) -> bool {
        let mut group = state.next_priority;
        let mut group_to_wake = None;
        loop {
            if state.waiting[group] > 0 {
                group_to_wake = Some(group);
            }
            group = (group + 1) % GROUPS;
            if group == state.next_priority || group_to_wake.is_some() {
                break;
            }
        }
        // When a group was found, priority lands just past it; otherwise the
        // scan wrapped and priority is unchanged.
        state.next_priority = group;

        let Some(woken_group) = group_to_wake else {
            return false;
        };
        state.active_group = woken_group;
        state.woken = state.waiting[woken_group];
        self.group_gate[woken_group].release_many(state.woken as usize);

        self.counters.wake_pulses_total.fetch_add(1, Ordering::Relaxed);
        self.counters
            .woken_total
            .fetch_add(u64::from(state.woken), Ordering::Relaxed);
        tracing::debug!(
            target: "rotor.monitor",
            group = woken_group,
            cohort = state.woken,
            "wake_pulse"
        );
        true
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Monitor")
            .field("working", &state.working)
            .field("active_group", &state.active_group)
            .field("waiting", &state.waiting)
            .field("woken", &state.woken)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn solo_rotate_enter_exit() {
        let monitor = Monitor::new(3);
        let token = CancelToken::new();
        monitor.enter_rotate(0, 1, &token).unwrap();
        monitor.exit_rotate(0, 1);
        let metrics = monitor.metrics();
        assert_eq!(metrics.admitted_rotations, [1, 0, 0]);
        assert_eq!(metrics.wake_pulses_total, 0);
    }

    #[test]
    fn solo_snapshot_enter_exit() {
        let monitor = Monitor::new(3);
        monitor.enter_snapshot(&CancelToken::new()).unwrap();
        monitor.exit_snapshot();
        assert_eq!(monitor.metrics().admitted_snapshots, 1);
    }

    #[test]
    fn same_direction_distinct_planes_overlap() {
        let monitor = Arc::new(Monitor::new(3));
        let in_flight = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for plane in 0..3 {
            let m = Arc::clone(&monitor);
            let inf = Arc::clone(&in_flight);
            let pk = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                m.enter_rotate(0, plane, &CancelToken::new()).unwrap();
                let now = inf.fetch_add(1, Ordering::SeqCst) + 1;
                pk.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                inf.fetch_sub(1, Ordering::SeqCst);
                m.exit_rotate(0, plane);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 3, "all three planes in flight");
    }

    #[test]
    fn same_plane_rotations_serialize() {
        let monitor = Arc::new(Monitor::new(3));
        let in_flight = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let m = Arc::clone(&monitor);
            let inf = Arc::clone(&in_flight);
            let pk = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                m.enter_rotate(1, 2, &CancelToken::new()).unwrap();
                let now = inf.fetch_add(1, Ordering::SeqCst) + 1;
                pk.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                inf.fetch_sub(1, Ordering::SeqCst);
                m.exit_rotate(1, 2);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1, "one plane slot at a time");
    }

    #[test]
    fn different_groups_exclude() {
        let monitor = Arc::new(Monitor::new(2));
        let rotating = Arc::new(AtomicU32::new(0));
        let violations = Arc::new(AtomicU32::new(0));

        let m = Arc::clone(&monitor);
        let r = Arc::clone(&rotating);
        let rotator = thread::spawn(move || {
            m.enter_rotate(2, 0, &CancelToken::new()).unwrap();
            r.store(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(80));
            r.store(0, Ordering::SeqCst);
            m.exit_rotate(2, 0);
        });

        thread::sleep(Duration::from_millis(20));
        let m = Arc::clone(&monitor);
        let r = Arc::clone(&rotating);
        let v = Arc::clone(&violations);
        let shower = thread::spawn(move || {
            m.enter_snapshot(&CancelToken::new()).unwrap();
            if r.load(Ordering::SeqCst) > 0 {
                v.fetch_add(1, Ordering::SeqCst);
            }
            m.exit_snapshot();
        });

        rotator.join().unwrap();
        shower.join().unwrap();
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelled_group_wait_leaves_monitor_consistent() {
        let monitor = Arc::new(Monitor::new(2));
        monitor.enter_rotate(0, 0, &CancelToken::new()).unwrap();

        let token = CancelToken::new();
        let m = Arc::clone(&monitor);
        let t = token.clone();
        let waiter = thread::spawn(move || m.enter_snapshot(&t));

        thread::sleep(Duration::from_millis(50));
        token.cancel();
        assert!(matches!(
            waiter.join().unwrap(),
            Err(RotorError::Cancelled)
        ));

        monitor.exit_rotate(0, 0);
        // The controller must still admit a fresh request of every kind.
        monitor.enter_snapshot(&CancelToken::new()).unwrap();
        monitor.exit_snapshot();
        monitor.enter_rotate(1, 1, &CancelToken::new()).unwrap();
        monitor.exit_rotate(1, 1);
        assert_eq!(monitor.metrics().cancelled_waits_total, 1);
    }

    #[test]
    fn cancelled_plane_wait_rolls_back_group_admission() {
        let monitor = Arc::new(Monitor::new(2));
        monitor.enter_rotate(0, 0, &CancelToken::new()).unwrap();

        // Same group, same plane: admitted to the group, parks on the plane.
        let token = CancelToken::new();
        let m = Arc::clone(&monitor);
        let t = token.clone();
        let waiter = thread::spawn(move || m.enter_rotate(0, 0, &t));
        thread::sleep(Duration::from_millis(50));
        token.cancel();
        assert!(matches!(
            waiter.join().unwrap(),
            Err(RotorError::Cancelled)
        ));

        monitor.exit_rotate(0, 0);
        // The plane the cancelled request wanted must still be free.
        monitor.enter_rotate(0, 0, &CancelToken::new()).unwrap();
        monitor.exit_rotate(0, 0);
    }

    #[test]
    fn wake_pulse_releases_whole_cohort() {
        let monitor = Arc::new(Monitor::new(4));
        monitor.enter_snapshot(&CancelToken::new()).unwrap();

        let mut handles = Vec::new();
        for plane in 0..3 {
            let m = Arc::clone(&monitor);
            handles.push(thread::spawn(move || {
                m.enter_rotate(1, plane, &CancelToken::new()).unwrap();
                thread::sleep(Duration::from_millis(30));
                m.exit_rotate(1, plane);
            }));
        }

        thread::sleep(Duration::from_millis(50));
        monitor.exit_snapshot();
        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = monitor.metrics();
        assert_eq!(metrics.wake_pulses_total, 1, "one batch wake");
        assert_eq!(metrics.woken_total, 3, "whole cohort released together");
    }
}
