// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Completion bridge: one-shot handoff that resumes a parked strand.
//!
//! `PENDING -> COMPLETED` via a single compare-and-set. Racing completers
//! (a real result and a timeout, say) resolve first-writer-wins; losers'
//! payloads are dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{SchedError, StrandError};
use crate::timeout::{self, Timer};

use super::raw::{RawStrand, StrandId, Wakeup};
use super::scheduler::Shared;

pub(crate) struct BridgeInner<V> {
    strand: Arc<RawStrand<V>>,
    completed: AtomicBool,
    slot: Mutex<Option<Wakeup<V>>>,
    shared: Weak<Shared<V>>,
}

impl<V> BridgeInner<V> {
    /// Take the delivered payload. `None` while still pending.
    pub fn take_payload(&self) -> Option<Wakeup<V>> {
        if !self.completed.load(Ordering::Acquire) {
            return None;
        }
        self.slot.lock().take()
    }

    /// Claim the bridge without delivering anything. Used when the strand
    /// is being cancelled, so late completers are rejected.
    pub fn close(&self) -> bool {
        self.completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Handle used by an asynchronous producer to deliver a strand's result.
///
/// Cloning is allowed so a timeout can race the real completer; only the
/// first completion takes effect.
pub struct CompletionBridge<V> {
    pub(crate) inner: Arc<BridgeInner<V>>,
}

impl<V> Clone for CompletionBridge<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> fmt::Debug for CompletionBridge<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBridge")
            .field("strand", &self.inner.strand.id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<V> CompletionBridge<V> {
    /// The strand this bridge resumes.
    pub fn strand_id(&self) -> StrandId {
        self.inner.strand.id
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }
}

impl<V: Send + 'static> CompletionBridge<V> {
    pub(crate) fn new(strand: Arc<RawStrand<V>>, shared: Weak<Shared<V>>) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                strand,
                completed: AtomicBool::new(false),
                slot: Mutex::new(None),
                shared,
            }),
        }
    }

    /// Deliver a value or error and make the strand runnable again.
    ///
    /// A second completion is rejected with `AlreadyCompleted` and logged.
    /// Completing a bridge that shutdown already closed returns `ShutDown`.
    pub fn complete(&self, result: Result<V, StrandError>) -> Result<(), SchedError> {
        self.deliver(Wakeup::Completed(result))
    }

    /// Like `complete`, but losing the race is expected: returns false
    /// instead of reporting a protocol violation.
    pub fn try_complete(&self, result: Result<V, StrandError>) -> bool {
        if !self.claim() {
            return false;
        }
        if let Err(e) = self.publish(Wakeup::Completed(result)) {
            debug!(strand = %self.strand_id(), error = %e, "completion after strand went away");
        }
        true
    }

    /// Race this bridge against a timer. If nothing completes it within
    /// `duration`, it completes with a `TimedOut` error.
    pub fn complete_after(&self, duration: Duration) -> Timer {
        timeout::arm(self.clone(), duration)
    }

    pub(crate) fn deliver(&self, wakeup: Wakeup<V>) -> Result<(), SchedError> {
        let id = self.strand_id();
        if !self.claim() {
            // Shutdown closes outstanding bridges; a late completion is
            // expected then, not a protocol violation.
            let shut_down = self
                .inner
                .shared
                .upgrade()
                .map_or(true, |s| s.is_shut_down());
            if shut_down {
                debug!(strand = %id, "completion lost to shutdown");
                return Err(SchedError::ShutDown);
            }
            warn!(strand = %id, "protocol violation: completion bridge completed twice");
            return Err(SchedError::AlreadyCompleted { id });
        }
        self.publish(wakeup)
    }

    fn claim(&self) -> bool {
        self.inner
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn publish(&self, wakeup: Wakeup<V>) -> Result<(), SchedError> {
        *self.inner.slot.lock() = Some(wakeup);
        match self.inner.shared.upgrade() {
            Some(shared) => shared.resume(&self.inner.strand),
            None => Err(SchedError::ShutDown),
        }
    }
}
