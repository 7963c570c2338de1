// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Iterative async invocation (the array `map` pattern).
//!
//! A job owns a result buffer pre-sized to the input length. Each index is
//! claimed once from an atomic cursor, runs on its own strand, and writes
//! only its own slot; the remaining-count and the first-error slot are the
//! only shared synchronization. When the count reaches zero the final
//! callback fires once, with the ordered buffer or the first recorded error.
//!
//! Failure policy: run to completion, then report the first error. A failed
//! sub-invocation does not cancel the others; their results are discarded.
//! "First" means first recorded in time, not lowest index.

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{SchedError, StrandError};
use crate::strand::raw::{FinishHook, StrandBody};
use crate::strand::scheduler::{Admission, Shared, SpawnOptions};

/// A callable value invoked once per element.
pub trait Callable<V>: Send + Sync + 'static {
    /// Build the body that invokes the callable on `arg`, element `index`.
    fn invoke(&self, index: usize, arg: V) -> Box<dyn StrandBody<V>>;
}

impl<V, F, B> Callable<V> for F
where
    F: Fn(V) -> B + Send + Sync + 'static,
    B: StrandBody<V>,
{
    fn invoke(&self, _index: usize, arg: V) -> Box<dyn StrandBody<V>> {
        Box::new(self(arg))
    }
}

/// How many sub-invocations may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// One strand per element, all created up front.
    Unbounded,
    /// At most `n` strands at a time; each finished one claims the next
    /// index. `Bounded(0)` behaves as `Bounded(1)`.
    Bounded(usize),
}

type CompletionFn<V> = Box<dyn FnOnce(Result<Vec<V>, StrandError>) + Send>;

enum Slot<V> {
    Empty,
    Value(V),
    Failed,
    /// Value moved into the final buffer.
    Taken,
}

struct JobInner<V> {
    /// Each slot is written by exactly one sub-invocation.
    slots: Box<[Mutex<Slot<V>>]>,
    next_index: AtomicUsize,
    remaining: AtomicUsize,
    first_error: OnceLock<(usize, StrandError)>,
    on_complete: Mutex<Option<CompletionFn<V>>>,
    done: (Mutex<bool>, Condvar),
}

/// Shared handle to an iterative invocation.
pub struct InvocationJob<V> {
    inner: Arc<JobInner<V>>,
}

impl<V> Clone for InvocationJob<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> fmt::Debug for InvocationJob<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationJob")
            .field("len", &self.inner.slots.len())
            .field("remaining", &self.inner.remaining.load(Ordering::Acquire))
            .field("callback_pending", &self.inner.on_complete.lock().is_some())
            .finish()
    }
}

impl<V: Send + 'static> InvocationJob<V> {
    /// A job over `len` indices. With `len == 0` the callback fires
    /// immediately with an empty buffer.
    pub fn new<F>(len: usize, on_complete: F) -> Self
    where
        F: FnOnce(Result<Vec<V>, StrandError>) + Send + 'static,
    {
        let job = Self {
            inner: Arc::new(JobInner {
                slots: (0..len).map(|_| Mutex::new(Slot::Empty)).collect(),
                next_index: AtomicUsize::new(0),
                remaining: AtomicUsize::new(len),
                first_error: OnceLock::new(),
                on_complete: Mutex::new(Some(Box::new(on_complete))),
                done: (Mutex::new(false), Condvar::new()),
            }),
        };
        if len == 0 {
            job.finish();
        }
        job
    }

    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    /// Indices not yet resolved.
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    /// True once the final callback has run.
    pub fn is_complete(&self) -> bool {
        *self.inner.done.0.lock()
    }

    /// The first recorded failure and its index, if any.
    pub fn first_error(&self) -> Option<(usize, StrandError)> {
        self.inner.first_error.get().cloned()
    }

    /// Claim the next unclaimed index.
    pub fn claim_next(&self) -> Option<usize> {
        let index = self.inner.next_index.fetch_add(1, Ordering::AcqRel);
        (index < self.len()).then_some(index)
    }

    /// Resolve `index` with a value or error. Each index accepts exactly
    /// one result; the last one triggers the final callback on this thread.
    pub fn submit_result(
        &self,
        index: usize,
        result: Result<V, StrandError>,
    ) -> Result<(), SchedError> {
        let len = self.len();
        let slot = self
            .inner
            .slots
            .get(index)
            .ok_or(SchedError::IndexOutOfRange { index, len })?;
        {
            let mut slot = slot.lock();
            if !matches!(*slot, Slot::Empty) {
                warn!(index, "protocol violation: invocation slot resolved twice");
                return Err(SchedError::SlotResolved { index });
            }
            *slot = match result {
                Ok(v) => Slot::Value(v),
                Err(e) => {
                    if self.inner.first_error.set((index, e)).is_ok() {
                        debug!(index, "first sub-invocation error recorded");
                    }
                    Slot::Failed
                }
            };
        }
        let prev = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.finish();
        }
        Ok(())
    }

    /// Block the calling OS thread until the final callback has run.
    pub fn wait(&self) {
        let (lock, cvar) = &self.inner.done;
        let mut done = lock.lock();
        while !*done {
            cvar.wait(&mut done);
        }
    }

    fn finish(&self) {
        let result = match self.inner.first_error.get() {
            Some((_, e)) => Err(e.clone()),
            None => self.take_values(),
        };
        let on_complete = self.inner.on_complete.lock().take();
        if let Some(on_complete) = on_complete {
            if panic::catch_unwind(AssertUnwindSafe(|| on_complete(result))).is_err() {
                warn!("iterative invocation callback panicked");
            }
        }
        let (lock, cvar) = &self.inner.done;
        *lock.lock() = true;
        cvar.notify_all();
    }

    fn take_values(&self) -> Result<Vec<V>, StrandError> {
        self.inner
            .slots
            .iter()
            .map(|slot| match mem::replace(&mut *slot.lock(), Slot::Taken) {
                Slot::Value(v) => Some(v),
                Slot::Empty | Slot::Failed | Slot::Taken => None,
            })
            .collect::<Option<Vec<V>>>()
            .ok_or_else(|| StrandError::failed("invocation finished with an unresolved slot"))
    }
}

/// Spawns one strand per claimed index and feeds results into the job.
struct Driver<V, C> {
    job: InvocationJob<V>,
    inputs: Box<[Mutex<Option<V>>]>,
    callable: Arc<C>,
    shared: Weak<Shared<V>>,
    /// Bounded mode: each finished sub-invocation launches the next.
    chained: bool,
}

impl<V: Send + 'static, C: Callable<V>> Driver<V, C> {
    /// Claim indices until one is successfully dispatched (or none are
    /// left). Indices that cannot be dispatched resolve with the error.
    fn launch_next(self: &Arc<Self>) {
        while let Some(index) = self.job.claim_next() {
            match self.launch(index) {
                Ok(()) => return,
                Err(e) => {
                    debug!(index, error = %e, "sub-invocation rejected");
                    let _ = self.job.submit_result(index, Err(e));
                    if !self.chained {
                        return;
                    }
                }
            }
        }
    }

    fn launch(self: &Arc<Self>, index: usize) -> Result<(), StrandError> {
        let arg = self.inputs[index]
            .lock()
            .take()
            .ok_or_else(|| StrandError::failed(format!("input {} claimed twice", index)))?;
        let shared = self.shared.upgrade().ok_or_else(|| StrandError::from(SchedError::ShutDown))?;
        let body = self.callable.invoke(index, arg);

        let driver = self.clone();
        let hook: FinishHook<V> = Box::new(move |outcome| {
            let _ = driver.job.submit_result(index, outcome);
            if driver.chained {
                driver.launch_next();
            }
        });
        let mut opts = SpawnOptions::new(Admission::Bypass);
        opts.on_finish = Some(hook);
        shared.spawn(body, opts)?;
        Ok(())
    }
}

/// Start an iterative invocation on `shared`.
pub(crate) fn drive<V, C, F>(
    shared: &Arc<Shared<V>>,
    inputs: Vec<V>,
    callable: Arc<C>,
    concurrency: Concurrency,
    on_complete: F,
) -> InvocationJob<V>
where
    V: Send + 'static,
    C: Callable<V>,
    F: FnOnce(Result<Vec<V>, StrandError>) + Send + 'static,
{
    let len = inputs.len();
    let job = InvocationJob::new(len, on_complete);
    let (initial, chained) = match concurrency {
        Concurrency::Unbounded => (len, false),
        Concurrency::Bounded(n) => (n.max(1).min(len), true),
    };
    let driver = Arc::new(Driver {
        job: job.clone(),
        inputs: inputs.into_iter().map(|v| Mutex::new(Some(v))).collect(),
        callable,
        shared: Arc::downgrade(shared),
        chained,
    });
    debug!(len, ?concurrency, "iterative invocation started");
    for _ in 0..initial {
        driver.launch_next();
    }
    job
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn collecting_job(len: usize) -> (InvocationJob<i32>, mpsc::Receiver<Result<Vec<i32>, StrandError>>) {
        let (tx, rx) = mpsc::channel();
        let job = InvocationJob::new(len, move |r| {
            let _ = tx.send(r);
        });
        (job, rx)
    }

    #[test]
    fn results_land_at_their_index() {
        let (job, rx) = collecting_job(3);
        job.submit_result(2, Ok(30)).unwrap();
        job.submit_result(0, Ok(10)).unwrap();
        assert!(rx.try_recv().is_err());
        job.submit_result(1, Ok(20)).unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(vec![10, 20, 30]));
        assert!(job.is_complete());
    }

    #[test]
    fn empty_job_completes_immediately() {
        let (job, rx) = collecting_job(0);
        assert_eq!(rx.recv().unwrap(), Ok(vec![]));
        assert!(job.is_complete());
        assert_eq!(job.claim_next(), None);
    }

    #[test]
    fn first_recorded_error_wins() {
        let (job, rx) = collecting_job(3);
        job.submit_result(2, Err(StrandError::failed("late index"))).unwrap();
        job.submit_result(0, Err(StrandError::failed("low index"))).unwrap();
        job.submit_result(1, Ok(1)).unwrap();
        let err = rx.recv().unwrap().unwrap_err();
        assert_eq!(err.message, "late index");
        assert_eq!(job.first_error().map(|(i, _)| i), Some(2));
    }

    #[test]
    fn double_submit_is_rejected() {
        let (job, rx) = collecting_job(2);
        job.submit_result(0, Ok(1)).unwrap();
        assert_eq!(
            job.submit_result(0, Ok(2)),
            Err(SchedError::SlotResolved { index: 0 })
        );
        job.submit_result(1, Ok(2)).unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(vec![1, 2]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resubmit_after_completion_is_rejected() {
        let (job, rx) = collecting_job(2);
        job.submit_result(0, Ok(1)).unwrap();
        job.submit_result(1, Ok(2)).unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(vec![1, 2]));
        assert_eq!(
            job.submit_result(1, Ok(9)),
            Err(SchedError::SlotResolved { index: 1 })
        );
        assert_eq!(job.remaining(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn callback_may_inspect_its_job() {
        let (tx, rx) = mpsc::channel();
        let slot: Arc<OnceLock<InvocationJob<i32>>> = Arc::new(OnceLock::new());
        let seen = slot.clone();
        let job = InvocationJob::new(1, move |r: Result<Vec<i32>, StrandError>| {
            let debug = seen.get().map(|j| format!("{:?}", j));
            let _ = tx.send((r, debug));
        });
        let _ = slot.set(job.clone());
        job.submit_result(0, Ok(5)).unwrap();
        let (r, debug) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(r, Ok(vec![5]));
        assert!(debug.unwrap().contains("callback_pending: false"));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let (job, _rx) = collecting_job(1);
        assert_eq!(
            job.submit_result(5, Ok(0)),
            Err(SchedError::IndexOutOfRange { index: 5, len: 1 })
        );
        assert_eq!(job.remaining(), 1);
    }

    #[test]
    fn claim_hands_out_each_index_once() {
        let (job, _rx) = collecting_job(3);
        assert_eq!(job.claim_next(), Some(0));
        assert_eq!(job.claim_next(), Some(1));
        assert_eq!(job.claim_next(), Some(2));
        assert_eq!(job.claim_next(), None);
    }

    #[test]
    fn concurrent_submitters_fire_callback_once() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let job = InvocationJob::new(64, move |r: Result<Vec<i32>, StrandError>| {
            assert_eq!(r.unwrap().len(), 64);
            f.fetch_add(1, Ordering::SeqCst);
        });
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let job = job.clone();
                thread::spawn(move || {
                    for i in (t..64).step_by(4) {
                        job.submit_result(i, Ok(i as i32)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        job.wait();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
