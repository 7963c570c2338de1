// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Strand representation and state machine.
//!
//! A strand is an explicit continuation object (`StrandBody`) plus a state
//! word. Workers borrow the body for one run segment; park/resume operate on
//! the state word and the strand's single outstanding bridge.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::error::{SchedError, StrandError};

use super::bridge::BridgeInner;
use super::context::StrandContext;
use super::group::{ChildGroup, ChildOutcome, WaitMode};

/// Process-unique strand identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrandId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl StrandId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StrandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Strand lifecycle states.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrandState {
    /// In the ready queue, waiting for a worker.
    Runnable = 0,
    /// Being resumed by exactly one worker.
    Running = 1,
    /// Parked on a completion bridge.
    Blocked = 2,
    /// Finished with a value.
    DoneOk = 3,
    /// Finished with an error (including cancellation).
    DoneError = 4,
}

/// Low bits hold the lifecycle state.
const STATE_MASK: u8 = 0b0111;
/// Set when a bridge completes while its strand is still Running; the
/// park commit then re-enqueues instead of blocking.
const NOTIFIED: u8 = 0b1000;

impl StrandState {
    fn from_u8(v: u8) -> Self {
        match v & STATE_MASK {
            0 => Self::Runnable,
            1 => Self::Running,
            2 => Self::Blocked,
            3 => Self::DoneOk,
            _ => Self::DoneError,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DoneOk | Self::DoneError)
    }
}

/// Why a body is being resumed.
#[derive(Debug)]
pub enum Wakeup<V> {
    /// First run segment.
    Start,
    /// Resumed after `Step::Yield`.
    Yielded,
    /// A completion bridge delivered a value or error.
    Completed(Result<V, StrandError>),
    /// Awaited children settled. Under `WaitMode::AllOk` a child failure
    /// replaces the outcome list with the first recorded error.
    Children(Result<Vec<ChildOutcome<V>>, StrandError>),
    /// An awaited iterative invocation finished.
    Mapped(Result<Vec<V>, StrandError>),
}

/// What a body wants after a run segment.
#[derive(Debug)]
pub enum Step<V> {
    /// Go to the back of the ready queue.
    Yield,
    /// Block on the bridge obtained from `StrandContext::park` (or
    /// `invoke_iteratively`) during this segment.
    Park,
    /// Block until children spawned with `spawn_child` settle.
    Await(WaitMode),
    /// Finish the strand.
    Done(Result<V, StrandError>),
}

/// A resumable strand computation.
///
/// `resume` runs one segment: it must return instead of blocking the worker
/// thread, and is never called concurrently for the same strand.
pub trait StrandBody<V>: Send + 'static {
    fn resume(&mut self, cx: &mut StrandContext<'_, V>, wakeup: Wakeup<V>) -> Step<V>;
}

/// Body built from a closure that is resumed with each wakeup.
pub struct FromFn<F>(F);

/// Create a body from a resumable closure.
pub fn from_fn<V, F>(f: F) -> FromFn<F>
where
    F: FnMut(&mut StrandContext<'_, V>, Wakeup<V>) -> Step<V> + Send + 'static,
{
    FromFn(f)
}

impl<V, F> StrandBody<V> for FromFn<F>
where
    F: FnMut(&mut StrandContext<'_, V>, Wakeup<V>) -> Step<V> + Send + 'static,
{
    fn resume(&mut self, cx: &mut StrandContext<'_, V>, wakeup: Wakeup<V>) -> Step<V> {
        (self.0)(cx, wakeup)
    }
}

/// Body that runs a plain function to completion in its first segment.
pub struct FromCall<F>(Option<F>);

/// Create a single-segment body from a function.
pub fn from_call<V, F>(f: F) -> FromCall<F>
where
    F: FnOnce() -> Result<V, StrandError> + Send + 'static,
{
    FromCall(Some(f))
}

impl<V, F> StrandBody<V> for FromCall<F>
where
    F: FnOnce() -> Result<V, StrandError> + Send + 'static,
{
    fn resume(&mut self, _cx: &mut StrandContext<'_, V>, _wakeup: Wakeup<V>) -> Step<V> {
        match self.0.take() {
            Some(f) => Step::Done(f()),
            None => Step::Done(Err(StrandError::failed("call body resumed twice"))),
        }
    }
}

pub(crate) type FinishHook<V> = Box<dyn FnOnce(Result<V, StrandError>) + Send>;

/// Weak link from a child to the parent awaiting it.
pub(crate) struct ParentLink<V> {
    pub parent: Weak<RawStrand<V>>,
    pub group: Arc<ChildGroup<V>>,
}

/// Result of trying to make a blocked strand runnable again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notify {
    /// Strand moved Blocked -> Runnable; the caller must enqueue it.
    Enqueue,
    /// Strand is still Running; its park commit will re-enqueue it.
    Deferred,
    /// Strand already finished.
    Terminal,
    /// Strand was not waiting on anything.
    Spurious,
}

/// The strand object shared by the scheduler, its bridges, and handles.
pub(crate) struct RawStrand<V> {
    pub id: StrandId,
    pub name: Option<Arc<str>>,
    state: AtomicU8,
    /// Taken by the worker for the duration of a run segment.
    pub body: Mutex<Option<Box<dyn StrandBody<V>>>>,
    /// Wakeup for the next segment when no bridge is involved.
    pub next_wakeup: Mutex<Option<Wakeup<V>>>,
    /// The single outstanding bridge, if parked (or parking).
    pub bridge: Mutex<Option<Arc<BridgeInner<V>>>>,
    pub parent: Option<ParentLink<V>>,
    /// Children spawned by this strand via `spawn_child`.
    pub children: Mutex<Option<Arc<ChildGroup<V>>>>,
    pub on_finish: Mutex<Option<FinishHook<V>>>,
    outcome: Mutex<Option<Result<V, StrandError>>>,
    done: (Mutex<bool>, Condvar),
}

impl<V> fmt::Debug for RawStrand<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawStrand")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl<V: Send + 'static> RawStrand<V> {
    pub fn new(
        body: Box<dyn StrandBody<V>>,
        name: Option<Arc<str>>,
        parent: Option<ParentLink<V>>,
        on_finish: Option<FinishHook<V>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: StrandId::next(),
            name,
            state: AtomicU8::new(StrandState::Runnable as u8),
            body: Mutex::new(Some(body)),
            next_wakeup: Mutex::new(Some(Wakeup::Start)),
            bridge: Mutex::new(None),
            parent,
            children: Mutex::new(None),
            on_finish: Mutex::new(on_finish),
            outcome: Mutex::new(None),
            done: (Mutex::new(false), Condvar::new()),
        })
    }
}

impl<V> RawStrand<V> {
    pub fn state(&self) -> StrandState {
        StrandState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Runnable -> Running. Fails if the strand was cancelled while queued.
    pub fn begin_dispatch(&self) -> bool {
        self.state
            .compare_exchange(
                StrandState::Runnable as u8,
                StrandState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Running -> Runnable after a voluntary yield.
    pub fn commit_yield(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (StrandState::from_u8(cur) == StrandState::Running)
                    .then_some(StrandState::Runnable as u8)
            })
            .is_ok()
    }

    /// Running -> Blocked at the end of a segment that parked.
    ///
    /// Returns true if a completion already arrived during the segment; the
    /// strand is then Runnable and the caller must enqueue it.
    pub fn commit_park(&self) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            if StrandState::from_u8(cur) != StrandState::Running {
                return false;
            }
            let (next, wake) = if cur & NOTIFIED != 0 {
                (StrandState::Runnable as u8, true)
            } else {
                (StrandState::Blocked as u8, false)
            };
            match self
                .state
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return wake,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Blocked -> Runnable, or record the wake if the strand is still Running.
    pub fn notify(&self) -> Notify {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            let (next, outcome) = match StrandState::from_u8(cur) {
                StrandState::Blocked => (StrandState::Runnable as u8, Notify::Enqueue),
                StrandState::Running => (cur | NOTIFIED, Notify::Deferred),
                StrandState::Runnable => return Notify::Spurious,
                StrandState::DoneOk | StrandState::DoneError => return Notify::Terminal,
            };
            match self
                .state
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return outcome,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Move any live state to DoneError. Returns false if already terminal.
    pub fn force_cancel(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (!StrandState::from_u8(cur).is_terminal())
                    .then_some(StrandState::DoneError as u8)
            })
            .is_ok()
    }

    /// Running -> DoneOk / DoneError.
    pub fn commit_finish(&self, ok: bool) -> bool {
        let terminal = if ok {
            StrandState::DoneOk
        } else {
            StrandState::DoneError
        };
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (StrandState::from_u8(cur) == StrandState::Running).then_some(terminal as u8)
            })
            .is_ok()
    }

    pub fn has_bridge(&self) -> bool {
        self.bridge.lock().is_some()
    }

    /// The child group this strand waits on, created on first use.
    pub fn child_group(&self) -> Arc<ChildGroup<V>> {
        self.children
            .lock()
            .get_or_insert_with(|| Arc::new(ChildGroup::new()))
            .clone()
    }

    /// Store the outcome (if nobody consumed it) and release joiners.
    pub fn mark_complete(&self, outcome: Option<Result<V, StrandError>>) {
        if let Some(outcome) = outcome {
            *self.outcome.lock() = Some(outcome);
        }
        let (lock, cvar) = &self.done;
        let mut done = lock.lock();
        *done = true;
        cvar.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        *self.done.0.lock()
    }

    /// Block the calling OS thread until the strand finished.
    pub fn wait_complete(&self) {
        let (lock, cvar) = &self.done;
        let mut done = lock.lock();
        while !*done {
            cvar.wait(&mut done);
        }
    }

    pub fn take_outcome(&self) -> Result<Result<V, StrandError>, SchedError> {
        self.outcome
            .lock()
            .take()
            .ok_or(SchedError::ResultTaken { id: self.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy() -> Arc<RawStrand<i32>> {
        RawStrand::new(Box::new(from_call(|| Ok(1))), None, None, None)
    }

    #[test]
    fn ids_are_unique() {
        let a = dummy();
        let b = dummy();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn dispatch_only_from_runnable() {
        let s = dummy();
        assert_eq!(s.state(), StrandState::Runnable);
        assert!(s.begin_dispatch());
        assert!(!s.begin_dispatch());
        assert_eq!(s.state(), StrandState::Running);
    }

    #[test]
    fn park_then_notify_enqueues() {
        let s = dummy();
        s.begin_dispatch();
        assert!(!s.commit_park());
        assert_eq!(s.state(), StrandState::Blocked);
        assert_eq!(s.notify(), Notify::Enqueue);
        assert_eq!(s.state(), StrandState::Runnable);
    }

    #[test]
    fn notify_while_running_is_deferred_to_commit() {
        let s = dummy();
        s.begin_dispatch();
        assert_eq!(s.notify(), Notify::Deferred);
        // Still Running from the outside.
        assert_eq!(s.state(), StrandState::Running);
        assert!(s.commit_park());
        assert_eq!(s.state(), StrandState::Runnable);
    }

    #[test]
    fn no_transition_out_of_terminal() {
        let s = dummy();
        s.begin_dispatch();
        assert!(s.commit_finish(true));
        assert_eq!(s.state(), StrandState::DoneOk);
        assert_eq!(s.notify(), Notify::Terminal);
        assert!(!s.force_cancel());
        assert!(!s.commit_yield());
        assert!(!s.begin_dispatch());
    }

    #[test]
    fn cancel_from_blocked() {
        let s = dummy();
        s.begin_dispatch();
        s.commit_park();
        assert!(s.force_cancel());
        assert_eq!(s.state(), StrandState::DoneError);
    }

    #[test]
    fn outcome_taken_once() {
        let s = dummy();
        s.mark_complete(Some(Ok(5)));
        assert!(s.is_complete());
        assert_eq!(s.take_outcome().unwrap(), Ok(5));
        assert!(matches!(s.take_outcome(), Err(SchedError::ResultTaken { .. })));
    }
}
