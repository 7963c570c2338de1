// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler lifecycle phase.
//!
//! One atomic word moves `Open -> Draining` (graceful) or `Open -> Cancelling`
//! (immediate), once. Bodies observe cancellation through
//! `StrandContext::is_cancelled` at their own suspension points; nothing is
//! preempted.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Accepting work.
    Open = 0,
    /// Graceful shutdown: no new external strands, running work finishes.
    Draining = 1,
    /// Immediate shutdown: no further continuations run.
    Cancelling = 2,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    phase: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Open as u8),
        }
    }

    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Acquire) {
            0 => Phase::Open,
            1 => Phase::Draining,
            _ => Phase::Cancelling,
        }
    }

    /// Leave `Open` for `to`. Only the first caller succeeds.
    pub fn begin_shutdown(&self, to: Phase) -> bool {
        self.phase
            .compare_exchange(Phase::Open as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_stopping(&self) -> bool {
        self.phase() != Phase::Open
    }

    pub fn is_cancelling(&self) -> bool {
        self.phase() == Phase::Cancelling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_begins_once() {
        let l = Lifecycle::new();
        assert!(!l.is_stopping());
        assert!(l.begin_shutdown(Phase::Cancelling));
        assert!(!l.begin_shutdown(Phase::Draining));
        assert!(l.is_stopping());
        assert!(l.is_cancelling());
    }

    #[test]
    fn draining_is_not_cancelling() {
        let l = Lifecycle::new();
        assert!(l.begin_shutdown(Phase::Draining));
        assert_eq!(l.phase(), Phase::Draining);
        assert!(!l.is_cancelling());
    }
}
