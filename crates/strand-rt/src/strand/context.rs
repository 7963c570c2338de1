// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! A body's view of the scheduler during one run segment.

use std::sync::Arc;

use crate::error::{SchedError, StrandError};
use crate::invoke::{self, Callable, Concurrency};

use super::bridge::CompletionBridge;
use super::handle::StrandHandle;
use super::raw::{ParentLink, RawStrand, StrandBody, StrandId, Wakeup};
use super::scheduler::{Admission, Shared, SpawnOptions};

/// Passed to `StrandBody::resume`. Only valid for the segment it was
/// created for.
pub struct StrandContext<'a, V> {
    strand: &'a Arc<RawStrand<V>>,
    shared: &'a Arc<Shared<V>>,
}

impl<'a, V: Send + 'static> StrandContext<'a, V> {
    pub(crate) fn new(strand: &'a Arc<RawStrand<V>>, shared: &'a Arc<Shared<V>>) -> Self {
        Self { strand, shared }
    }

    pub fn id(&self) -> StrandId {
        self.strand.id
    }

    pub fn name(&self) -> Option<&str> {
        self.strand.name.as_deref()
    }

    /// True once immediate shutdown began. Long segments should check it
    /// and return.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelling()
    }

    /// Get the bridge that will resume this strand. Return `Step::Park`
    /// after handing it to whatever produces the result.
    pub fn park(&mut self) -> Result<CompletionBridge<V>, SchedError> {
        self.shared.park(self.strand)
    }

    /// Spawn a child this strand can wait on with `Step::Await`.
    pub fn spawn_child<B: StrandBody<V>>(&mut self, body: B) -> Result<StrandId, SchedError> {
        let group = self.strand.child_group();
        group.add_child();
        let mut opts = SpawnOptions::new(Admission::Internal);
        opts.parent = Some(ParentLink {
            parent: Arc::downgrade(self.strand),
            group: group.clone(),
        });
        match self.shared.spawn(Box::new(body), opts) {
            Ok(child) => Ok(child.id),
            Err(e) => {
                group.remove_child();
                Err(e)
            }
        }
    }

    /// Children spawned and not yet settled.
    pub fn outstanding_children(&self) -> usize {
        self.strand
            .children
            .lock()
            .as_ref()
            .map_or(0, |g| g.outstanding())
    }

    /// Spawn an unrelated strand; nobody waits on it unless the handle is
    /// joined.
    pub fn spawn<B: StrandBody<V>>(&mut self, body: B) -> Result<StrandHandle<V>, SchedError> {
        let raw = self
            .shared
            .spawn(Box::new(body), SpawnOptions::new(Admission::Internal))?;
        Ok(StrandHandle::new(raw))
    }

    /// Start an iterative invocation and park on it. Return `Step::Park`;
    /// the strand resumes with `Wakeup::Mapped`.
    pub fn invoke_iteratively<C: Callable<V>>(
        &mut self,
        inputs: Vec<V>,
        callable: C,
        concurrency: Concurrency,
    ) -> Result<(), SchedError> {
        let bridge = self.park()?;
        invoke::drive(
            self.shared,
            inputs,
            Arc::new(callable),
            concurrency,
            move |result: Result<Vec<V>, StrandError>| {
                let _ = bridge.deliver(Wakeup::Mapped(result));
            },
        );
        Ok(())
    }
}
