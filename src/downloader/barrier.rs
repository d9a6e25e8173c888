//! Rotation barrier
//!
//! Tracks launched transfers and terminal completions. When a completion
//! lands on a positive multiple of the interval, the task that produced it is
//! elected coordinator for that multiple. While any rotation is pending no new
//! transfer may register. A coordinator waits until nothing is in flight and
//! every earlier rotation has finished, rotates, then releases the gate.
//!
//! A completing task is counted as terminal before the election, so the
//! coordinator never waits on itself.

use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct BarrierState {
    /// Registered transfers that have not reached a terminal state
    in_flight: usize,

    /// Terminal transfers (completed or failed)
    completed: u64,

    /// Highest multiple that already has a coordinator
    last_elected: u64,

    /// Highest multiple whose rotation has finished
    done_through: u64,

    /// Elected rotations not yet finished
    pending: usize,

    rotating: bool,
}

/// What a finishing transfer must do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Continue,

    /// This task coordinates the rotation for `multiple`
    Coordinate { multiple: u64 },
}

#[derive(Debug)]
pub struct RotationBarrier {
    interval: u64,
    state: Mutex<BarrierState>,
    changed: Notify,
}

impl RotationBarrier {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            state: Mutex::new(BarrierState::default()),
            changed: Notify::new(),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Waits for the gate to be open, then registers one launched transfer
    pub async fn register(&self) {
        self.wait_until(|state| {
            if state.pending > 0 || state.rotating {
                return false;
            }
            state.in_flight += 1;
            true
        })
        .await;
    }

    /// Records a terminal transfer and elects a coordinator on a multiple
    pub fn complete(&self) -> Completion {
        let completion = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.completed += 1;

            let completed = state.completed;
            if completed % self.interval == 0 && completed > state.last_elected {
                state.last_elected = completed;
                state.pending += 1;
                Completion::Coordinate {
                    multiple: completed,
                }
            } else {
                Completion::Continue
            }
        };

        self.changed.notify_waiters();
        completion
    }

    /// Waits until nothing is in flight and every earlier rotation has
    /// finished, then marks the rotation for `multiple` running
    pub async fn begin_rotation(&self, multiple: u64) {
        let previous = multiple.saturating_sub(self.interval);

        self.wait_until(|state| {
            if state.in_flight > 0 || state.rotating || state.done_through != previous {
                return false;
            }
            state.rotating = true;
            true
        })
        .await;
    }

    /// Marks the rotation for `multiple` finished and reopens the gate
    pub fn finish_rotation(&self, multiple: u64) {
        {
            let mut state = self.lock();
            state.rotating = false;
            state.done_through = multiple;
            state.pending = state.pending.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    /// Runs `step` under the lock each time the state changes until it returns true
    async fn wait_until<F>(&self, mut step: F)
    where
        F: FnMut(&mut BarrierState) -> bool,
    {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if step(&mut self.lock()) {
                return;
            }

            changed.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
