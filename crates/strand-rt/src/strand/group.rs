// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Parent/child wait groups (wait-all / wait-any).
//!
//! Each strand that spawns children owns one group. Children report into it
//! when they finish; the parent arms it with a bridge when it awaits. Whoever
//! observes the wait condition first (the arming worker or the last child)
//! completes the bridge, exactly once.

use std::mem;

use parking_lot::Mutex;

use crate::error::StrandError;

use super::bridge::CompletionBridge;
use super::raw::{StrandId, Wakeup};

/// How a parent waits on its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Resume once every outstanding child settled; deliver every outcome.
    All,
    /// Like `All`, but if any child failed deliver the first recorded error
    /// instead of the outcome list.
    AllOk,
    /// Resume as soon as one child settled.
    Any,
}

/// One settled child.
#[derive(Debug)]
pub struct ChildOutcome<V> {
    pub id: StrandId,
    pub result: Result<V, StrandError>,
}

pub(crate) struct ChildGroup<V> {
    inner: Mutex<GroupInner<V>>,
}

struct GroupInner<V> {
    outstanding: usize,
    settled: Vec<ChildOutcome<V>>,
    first_error: Option<StrandError>,
    waiter: Option<(WaitMode, CompletionBridge<V>)>,
    /// The parent finished; nothing will await this group again.
    closed: bool,
}

impl<V> ChildGroup<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GroupInner {
                outstanding: 0,
                settled: Vec::new(),
                first_error: None,
                waiter: None,
                closed: false,
            }),
        }
    }

    pub fn add_child(&self) {
        self.inner.lock().outstanding += 1;
    }

    /// Undo `add_child` for a child that was never created.
    pub fn remove_child(&self) {
        let mut g = self.inner.lock();
        g.outstanding = g.outstanding.saturating_sub(1);
    }

    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// The parent reached a terminal state. Drops any armed bridge and
    /// returns the outcomes it never consumed; later children get their
    /// outcome handed back by `child_finished`.
    pub fn close(&self) -> Vec<ChildOutcome<V>> {
        let mut g = self.inner.lock();
        g.closed = true;
        g.waiter = None;
        g.first_error = None;
        mem::take(&mut g.settled)
    }
}

impl<V: Send + 'static> ChildGroup<V> {
    /// Record a finished child, resuming the parent if its wait is satisfied.
    ///
    /// Returns the outcome unchanged if the parent already finished.
    pub fn child_finished(
        &self,
        id: StrandId,
        result: Result<V, StrandError>,
    ) -> Option<Result<V, StrandError>> {
        let ready = {
            let mut g = self.inner.lock();
            g.outstanding = g.outstanding.saturating_sub(1);
            if g.closed {
                return Some(result);
            }
            if let Err(e) = &result {
                if g.first_error.is_none() {
                    g.first_error = Some(e.clone());
                }
            }
            g.settled.push(ChildOutcome { id, result });
            g.take_ready()
        };
        fire(ready);
        None
    }

    /// The parent parked awaiting its children. Resumes it right away if
    /// the condition already holds.
    pub fn arm(&self, mode: WaitMode, bridge: CompletionBridge<V>) {
        let ready = {
            let mut g = self.inner.lock();
            g.waiter = Some((mode, bridge));
            g.take_ready()
        };
        fire(ready);
    }
}

impl<V> GroupInner<V> {
    fn take_ready(&mut self) -> Option<(CompletionBridge<V>, Wakeup<V>)> {
        let (mode, _) = self.waiter.as_ref()?;
        let ready = match mode {
            WaitMode::All | WaitMode::AllOk => self.outstanding == 0,
            WaitMode::Any => !self.settled.is_empty() || self.outstanding == 0,
        };
        if !ready {
            return None;
        }
        let (mode, bridge) = self.waiter.take()?;
        let settled = mem::take(&mut self.settled);
        let first_error = self.first_error.take();
        let result = match (mode, first_error) {
            (WaitMode::AllOk, Some(e)) => Err(e),
            _ => Ok(settled),
        };
        Some((bridge, Wakeup::Children(result)))
    }
}

fn fire<V: Send + 'static>(ready: Option<(CompletionBridge<V>, Wakeup<V>)>) {
    if let Some((bridge, wakeup)) = ready {
        // The bridge is private to the group, so only shutdown can beat us.
        let _ = bridge.deliver(wakeup);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_group_hands_outcomes_back() {
        let g: ChildGroup<i32> = ChildGroup::new();
        g.add_child();
        g.add_child();
        assert_eq!(g.child_finished(StrandId::next(), Err(StrandError::failed("early"))), None);
        let unconsumed = g.close();
        assert_eq!(unconsumed.len(), 1);
        assert_eq!(unconsumed[0].result, Err(StrandError::failed("early")));
        assert_eq!(
            g.child_finished(StrandId::next(), Err(StrandError::failed("late"))),
            Some(Err(StrandError::failed("late")))
        );
        assert_eq!(g.outstanding(), 0);
    }
}
