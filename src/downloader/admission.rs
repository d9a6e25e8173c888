//! Per-mirror admission control
//!
//! Every mirror name has a counter bounded by the same ceiling. Checking the
//! ceiling and incrementing happen under one lock, so no mirror ever has more
//! than `ceiling` admitted transfers. Releasing a slot wakes every waiter on
//! `released`, and each re-checks the mirrors it is interested in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

#[derive(Debug, Default, Clone, Copy)]
struct SlotCounter {
    in_use: usize,
    peak: usize,
}

/// Bounded admission counters keyed by mirror name
#[derive(Debug)]
pub struct MirrorAdmission {
    ceiling: usize,
    slots: Mutex<HashMap<String, SlotCounter>>,
    released: Notify,
}

impl MirrorAdmission {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
            slots: Mutex::new(HashMap::new()),
            released: Notify::new(),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Takes a slot without waiting, if one is free
    ///
    /// The slot is held by the returned permit and released when it drops.
    pub fn try_acquire(self: &Arc<Self>, mirror: &str) -> Option<AdmissionPermit> {
        self.try_admit(mirror).then(|| AdmissionPermit {
            admission: Arc::clone(self),
            mirror: mirror.to_string(),
        })
    }

    /// Resolves at the next slot release on any mirror
    ///
    /// Enable the returned future before checking for a free slot so a
    /// release between the check and the wait is not missed.
    pub fn released(&self) -> Notified<'_> {
        self.released.notified()
    }

    /// Slots currently held for `mirror`
    pub fn in_use(&self, mirror: &str) -> usize {
        self.lock().get(mirror).map(|c| c.in_use).unwrap_or(0)
    }

    /// Highest number of slots ever held at once for `mirror`
    pub fn peak(&self, mirror: &str) -> usize {
        self.lock().get(mirror).map(|c| c.peak).unwrap_or(0)
    }

    fn try_admit(&self, mirror: &str) -> bool {
        let mut slots = self.lock();
        let counter = slots.entry(mirror.to_string()).or_default();

        if counter.in_use >= self.ceiling {
            return false;
        }

        counter.in_use += 1;
        counter.peak = counter.peak.max(counter.in_use);
        true
    }

    fn release(&self, mirror: &str) {
        {
            let mut slots = self.lock();
            if let Some(counter) = slots.get_mut(mirror) {
                counter.in_use = counter.in_use.saturating_sub(1);
            }
        }
        self.released.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SlotCounter>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One admitted slot for a mirror
#[derive(Debug)]
pub struct AdmissionPermit {
    admission: Arc<MirrorAdmission>,
    mirror: String,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.admission.release(&self.mirror);
    }
}
