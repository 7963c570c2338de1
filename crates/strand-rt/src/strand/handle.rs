// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Strand handle: observe and join a strand from outside the scheduler.

use std::fmt;
use std::sync::Arc;

use crate::error::StrandError;

use super::raw::{RawStrand, StrandId, StrandState};

/// Handle to a strand created with `Scheduler::spawn`.
///
/// Dropping it does not affect the strand.
pub struct StrandHandle<V> {
    raw: Arc<RawStrand<V>>,
}

impl<V> fmt::Debug for StrandHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrandHandle")
            .field("id", &self.raw.id)
            .field("state", &self.raw.state())
            .finish()
    }
}

impl<V> StrandHandle<V> {
    pub(crate) fn new(raw: Arc<RawStrand<V>>) -> Self {
        Self { raw }
    }

    pub(crate) fn raw(&self) -> &Arc<RawStrand<V>> {
        &self.raw
    }

    pub fn id(&self) -> StrandId {
        self.raw.id
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.name.as_deref()
    }

    pub fn state(&self) -> StrandState {
        self.raw.state()
    }

    /// True once the strand reached a terminal state and its outcome was
    /// published.
    pub fn is_finished(&self) -> bool {
        self.raw.is_complete()
    }

    /// Block the calling OS thread until the strand finishes.
    ///
    /// Not for use inside a strand body: it would hold a worker. Use
    /// `spawn_child` + `Step::Await` there instead.
    pub fn join(self) -> Result<V, StrandError> {
        self.raw.wait_complete();
        self.raw.take_outcome()?
    }

    /// The outcome if the strand already finished; the handle stays usable
    /// only if it had not.
    pub fn try_join(self) -> Result<Result<V, StrandError>, Self> {
        if !self.raw.is_complete() {
            return Err(self);
        }
        Ok(self.raw.take_outcome().map_err(StrandError::from).and_then(|r| r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strand::raw::from_call;

    #[test]
    fn try_join_before_and_after_completion() {
        let raw: Arc<RawStrand<i32>> = RawStrand::new(Box::new(from_call(|| Ok(1))), None, None, None);
        let h = StrandHandle::new(raw.clone());
        let h = match h.try_join() {
            Err(h) => h,
            Ok(_) => panic!("strand has not run"),
        };
        raw.mark_complete(Some(Ok(9)));
        assert!(h.is_finished());
        assert_eq!(h.try_join().unwrap(), Ok(9));
    }
}
