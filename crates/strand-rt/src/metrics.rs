// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lock-free lifecycle counters.
//!
//! Useful diagnostics from a snapshot:
//! - leaked strands:
//!   `created - rejected - finished_ok - finished_err - cancelled - live`
//!   should be 0
//! - peak concurrency: `peak_live`

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub created: AtomicU64,
    pub rejected: AtomicU64,
    pub dispatched: AtomicU64,
    pub parked: AtomicU64,
    pub resumed: AtomicU64,
    pub finished_ok: AtomicU64,
    pub finished_err: AtomicU64,
    pub cancelled: AtomicU64,
    pub peak_live: AtomicUsize,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_live(&self, live: usize) {
        self.peak_live.fetch_max(live, Ordering::Relaxed);
    }

    pub fn snapshot(&self, live: usize, queued: usize, running: usize) -> SchedulerStats {
        SchedulerStats {
            created: self.created.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            parked: self.parked.load(Ordering::Relaxed),
            resumed: self.resumed.load(Ordering::Relaxed),
            finished_ok: self.finished_ok.load(Ordering::Relaxed),
            finished_err: self.finished_err.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            peak_live: self.peak_live.load(Ordering::Relaxed),
            live,
            queued,
            running,
        }
    }
}

/// Point-in-time view of scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub created: u64,
    pub rejected: u64,
    /// Run segments started (a strand that parks twice is dispatched 3 times).
    pub dispatched: u64,
    pub parked: u64,
    pub resumed: u64,
    pub finished_ok: u64,
    pub finished_err: u64,
    pub cancelled: u64,
    pub peak_live: usize,
    /// Strands created and not yet terminal.
    pub live: usize,
    pub queued: usize,
    /// Strands on a worker right now.
    pub running: usize,
}

impl SchedulerStats {
    pub fn finished(&self) -> u64 {
        self.finished_ok + self.finished_err
    }
}
