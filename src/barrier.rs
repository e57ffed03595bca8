//! A phased barrier for a *dynamic* participant count, with two
//! condition variables indexed by a one-bit phase.
//!
//! This is the classic double-CV barrier: a thread that has just
//! returned from [`PhasedBarrier::wait`] cannot loop around and
//! re-consume its own broadcast, because by the time it could re-enter
//! it would be waiting on the *other* phase's condition variable. A
//! single-CV barrier is vulnerable to exactly that re-entry race under
//! contention and is not an acceptable substitute.
//!
//! [`PhasedBarrier::done`] additionally supports a participant
//! permanently leaving mid-run (a node finishing its workload early
//! while peers still need synchronized ticks): if removing it drops the
//! expected count down to the number of threads already waiting, those
//! stragglers are released immediately rather than waiting forever for
//! a participant that will never arrive.

use std::sync::{Condvar, Mutex};

struct State {
    phase: usize,
    arrived: usize,
    max: usize,
}

/// A barrier for `N` participants, where `N` may shrink via [`done`](PhasedBarrier::done).
pub struct PhasedBarrier {
    state: Mutex<State>,
    cv: [Condvar; 2],
}

impl PhasedBarrier {
    /// Initialize a barrier expecting `n` participants.
    pub fn new(n: usize) -> Self {
        PhasedBarrier {
            state: Mutex::new(State {
                phase: 0,
                arrived: 0,
                max: n,
            }),
            cv: [Condvar::new(), Condvar::new()],
        }
    }

    /// Block until every current participant has called `wait`.
    ///
    /// The last arriver resets the count, flips the phase, and wakes
    /// everyone who was waiting on the phase just closed.
    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        let my_phase = state.phase;
        state.arrived += 1;

        if state.arrived < state.max {
            while state.phase == my_phase {
                state = self.cv[my_phase].wait(state).unwrap();
            }
        } else {
            state.arrived = 0;
            state.phase ^= 1;
            self.cv[my_phase].notify_all();
        }
    }

    /// Permanently remove one participant (a node that has finished its
    /// workload and will not call `wait` again).
    ///
    /// If every participant still expected is already waiting, this
    /// releases them, exactly as the last arriver in [`wait`](Self::wait)
    /// would.
    pub fn done(&self) {
        let mut state = self.state.lock().unwrap();
        if state.max > 0 {
            state.max -= 1;
        }
        if state.max > 0 && state.arrived == state.max {
            let my_phase = state.phase;
            state.arrived = 0;
            state.phase ^= 1;
            self.cv[my_phase].notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn releases_all_waiters_once_everyone_arrives() {
        let barrier = Arc::new(PhasedBarrier::new(4));
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let b = barrier.clone();
            let c = counter.clone();
            handles.push(thread::spawn(move || {
                c.fetch_add(1, Ordering::SeqCst);
                b.wait();
                // Every thread should observe that all 4 arrived by the
                // time any one of them returns from wait().
                assert_eq!(c.load(Ordering::SeqCst), 4);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn barrier_is_reusable_across_ticks() {
        let barrier = Arc::new(PhasedBarrier::new(3));
        let tick = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let b = barrier.clone();
            let t = tick.clone();
            handles.push(thread::spawn(move || {
                for expected in 0..50 {
                    b.wait();
                    // After the barrier, every thread is on the same tick.
                    t.fetch_max(expected, Ordering::SeqCst);
                    b.wait();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn done_releases_stragglers_when_n_shrinks_to_match() {
        let barrier = Arc::new(PhasedBarrier::new(3));
        let released = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let b = barrier.clone();
            let r = released.clone();
            handles.push(thread::spawn(move || {
                b.wait();
                r.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // Give the two waiters time to block.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(released.load(Ordering::SeqCst), 0);

        // The third participant departs instead of arriving: the two
        // stragglers must be released, not stranded.
        barrier.done();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn done_on_idle_barrier_just_shrinks_max() {
        let barrier = PhasedBarrier::new(2);
        barrier.done();
        // Now behaves like a barrier of 1: a single wait() releases immediately.
        barrier.wait();
    }
}
