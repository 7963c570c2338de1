// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler and worker pool.
//!
//! N worker threads share one ready queue. Each worker pops a strand, runs
//! one segment of its body, and acts on the returned `Step`. No strand is
//! preempted; a long segment occupies its worker until it returns.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::cancel::{Lifecycle, Phase};
use crate::config::SchedulerConfig;
use crate::error::{SchedError, StrandError};
use crate::event::{channel_sink, Event, EventKind, EventReceiver, EventSink, NullSink};
use crate::invoke::{self, Callable, Concurrency, InvocationJob};
use crate::metrics::{Counters, SchedulerStats};

use super::bridge::CompletionBridge;
use super::context::StrandContext;
use super::handle::StrandHandle;
use super::queue::ReadyQueue;
use super::raw::{
    FinishHook, ParentLink, RawStrand, StrandBody, StrandId, Step, Wakeup,
};

thread_local! {
    static IN_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// How `shutdown` treats unfinished work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Drain the ready queue and let running strands finish or block.
    /// Strands still blocked afterwards are cancelled.
    Graceful,
    /// Stop dispatching now. Every unfinished strand ends `DoneError` with
    /// a cancellation error and every pending bridge is closed.
    Immediate,
}

/// What `shutdown` had to clean up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Strands moved to `DoneError` by the shutdown itself.
    pub cancelled: usize,
    /// Ready-queue entries discarded without running.
    pub discarded: usize,
}

/// Who is asking for a new strand; decides which admission checks apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Embedder call: refused once shutdown started, subject to `max_pending`.
    External,
    /// Spawned by a running strand: subject to `max_pending`.
    Internal,
    /// Sub-invocation of an iterative job: only refused once the queue closed.
    Bypass,
}

pub(crate) struct SpawnOptions<V> {
    pub name: Option<Arc<str>>,
    pub parent: Option<ParentLink<V>>,
    pub on_finish: Option<FinishHook<V>>,
    pub admission: Admission,
}

impl<V> SpawnOptions<V> {
    pub fn new(admission: Admission) -> Self {
        Self {
            name: None,
            parent: None,
            on_finish: None,
            admission,
        }
    }
}

/// The process's strand dispatch authority.
///
/// Explicitly constructed and passed to collaborators (usually as an
/// `Arc<Scheduler<V>>`). `V` is the opaque payload type strands produce and
/// bridges deliver. Dropping the scheduler performs a graceful shutdown.
pub struct Scheduler<V: Send + 'static> {
    shared: Arc<Shared<V>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

/// State shared between workers, bridges, and the scheduler handle.
pub(crate) struct Shared<V> {
    pub queue: ReadyQueue<V>,
    /// Every non-terminal strand. Removal swaps, so order is not kept;
    /// ids grow monotonically and shutdown sorts by them.
    live: Mutex<IndexMap<StrandId, Arc<RawStrand<V>>>>,
    lifecycle: Lifecycle,
    /// Workers joined; nothing will be dispatched again.
    terminated: AtomicBool,
    sink: Arc<dyn EventSink>,
    pub counters: Counters,
    max_pending: Option<usize>,
    worker_count: usize,
}

impl<V: Send + 'static> Scheduler<V> {
    /// Start a scheduler that discards lifecycle events.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedError> {
        Self::with_sink(config, Arc::new(NullSink))
    }

    /// Start a scheduler that reports lifecycle events to `sink`.
    ///
    /// Fails if the config is invalid or a worker thread cannot be started;
    /// workers already started are stopped again.
    pub fn with_sink(config: SchedulerConfig, sink: Arc<dyn EventSink>) -> Result<Self, SchedError> {
        config
            .validate()
            .map_err(|e| SchedError::InvalidConfig(e.to_string()))?;
        let worker_count = config.resolved_workers();
        let shared = Arc::new(Shared {
            queue: ReadyQueue::new(),
            live: Mutex::new(IndexMap::new()),
            lifecycle: Lifecycle::new(),
            terminated: AtomicBool::new(false),
            sink,
            counters: Counters::default(),
            max_pending: config.max_pending,
            worker_count,
        });

        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let worker_shared = shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("strand-worker-{}", id))
                .spawn(move || worker_loop(id, &worker_shared));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    warn!(worker = id, error = %e, "failed to spawn worker thread");
                    shared.lifecycle.begin_shutdown(Phase::Cancelling);
                    shared.queue.abort();
                    for h in handles {
                        let _ = h.join();
                    }
                    return Err(SchedError::WorkerSpawn(e.to_string()));
                }
            }
        }
        info!(workers = worker_count, max_pending = ?config.max_pending, "scheduler started");

        Ok(Self {
            workers: Mutex::new(handles),
            shared,
        })
    }

    /// Start a scheduler wired to a fresh bounded event channel of
    /// `config.event_capacity` entries.
    pub fn with_event_channel(config: SchedulerConfig) -> Result<(Self, EventReceiver), SchedError> {
        let (sink, rx) = channel_sink(config.event_capacity);
        Ok((Self::with_sink(config, Arc::new(sink))?, rx))
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count
    }

    /// Create a strand with no parent and enqueue it.
    pub fn spawn<B: StrandBody<V>>(&self, body: B) -> Result<StrandHandle<V>, SchedError> {
        let raw = self
            .shared
            .spawn(Box::new(body), SpawnOptions::new(Admission::External))?;
        Ok(StrandHandle::new(raw))
    }

    /// Like `spawn`, with a name that shows up in logs.
    pub fn spawn_named<B: StrandBody<V>>(
        &self,
        name: &str,
        body: B,
    ) -> Result<StrandHandle<V>, SchedError> {
        let mut opts = SpawnOptions::new(Admission::External);
        opts.name = Some(Arc::from(name));
        let raw = self.shared.spawn(Box::new(body), opts)?;
        Ok(StrandHandle::new(raw))
    }

    /// Issue the completion bridge for a running strand. The strand blocks
    /// when its current segment returns control to the worker.
    pub fn park(&self, handle: &StrandHandle<V>) -> Result<CompletionBridge<V>, SchedError> {
        self.shared.park(handle.raw())
    }

    /// Deliver a result through `bridge`. Same as `bridge.complete(result)`.
    pub fn complete(
        &self,
        bridge: &CompletionBridge<V>,
        result: Result<V, StrandError>,
    ) -> Result<(), SchedError> {
        bridge.complete(result)
    }

    /// Create an iterative invocation job whose results are submitted by
    /// the caller through `InvocationJob::submit_result`.
    pub fn create_iterative_invocation<F>(&self, len: usize, on_complete: F) -> InvocationJob<V>
    where
        F: FnOnce(Result<Vec<V>, StrandError>) + Send + 'static,
    {
        InvocationJob::new(len, on_complete)
    }

    /// Invoke `callable` once per input on its own strand and report the
    /// ordered results (or the first recorded error) to `on_complete`.
    pub fn invoke_iteratively<C, F>(
        &self,
        inputs: Vec<V>,
        callable: C,
        concurrency: Concurrency,
        on_complete: F,
    ) -> Result<InvocationJob<V>, SchedError>
    where
        C: Callable<V>,
        F: FnOnce(Result<Vec<V>, StrandError>) + Send + 'static,
    {
        if self.shared.lifecycle.is_stopping() {
            return Err(SchedError::ShutDown);
        }
        Ok(invoke::drive(
            &self.shared,
            inputs,
            Arc::new(callable),
            concurrency,
            on_complete,
        ))
    }

    pub fn stats(&self) -> SchedulerStats {
        let live = self.shared.live.lock().len();
        let queue = &self.shared.queue;
        self.shared.counters.snapshot(live, queue.len(), queue.running())
    }

    /// Stop the scheduler. Repeated calls after the first return an empty
    /// report.
    ///
    /// Must not be called from a strand body: it joins the worker threads.
    pub fn shutdown(&self, mode: ShutdownMode) -> Result<ShutdownReport, SchedError> {
        if IN_WORKER.with(Cell::get) {
            return Err(SchedError::ShutdownFromWorker);
        }
        let phase = match mode {
            ShutdownMode::Graceful => Phase::Draining,
            ShutdownMode::Immediate => Phase::Cancelling,
        };
        if !self.shared.lifecycle.begin_shutdown(phase) {
            return Ok(ShutdownReport::default());
        }
        info!(?mode, "scheduler shutting down");

        match mode {
            ShutdownMode::Graceful => {
                self.shared.queue.wait_idle();
                self.shared.queue.close();
            }
            ShutdownMode::Immediate => self.shared.queue.abort(),
        }

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        self.shared.terminated.store(true, Ordering::Release);

        // Nothing is running now.
        let mut report = ShutdownReport {
            discarded: self.shared.queue.drain_all().len(),
            ..ShutdownReport::default()
        };
        let mut remaining: Vec<_> = self.shared.live.lock().values().cloned().collect();
        remaining.sort_unstable_by_key(|s| s.id);
        let reason = match mode {
            ShutdownMode::Graceful => StrandError::cancelled("scheduler shut down while strand was blocked"),
            ShutdownMode::Immediate => StrandError::cancelled("scheduler shut down"),
        };
        for strand in remaining {
            if self.shared.cancel_strand(&strand, &reason) {
                report.cancelled += 1;
            }
        }
        info!(
            cancelled = report.cancelled,
            discarded = report.discarded,
            "scheduler stopped"
        );
        Ok(report)
    }
}

impl<V: Send + 'static> Drop for Scheduler<V> {
    fn drop(&mut self) {
        if !self.shared.lifecycle.is_stopping() {
            if let Err(e) = self.shutdown(ShutdownMode::Graceful) {
                warn!(error = %e, "scheduler dropped without shutdown");
            }
        }
    }
}

impl<V: Send + 'static> Shared<V> {
    pub fn is_cancelling(&self) -> bool {
        self.lifecycle.is_cancelling()
    }

    /// Immediate shutdown began, or the workers are gone.
    pub fn is_shut_down(&self) -> bool {
        self.is_cancelling() || self.terminated.load(Ordering::Acquire)
    }

    fn emit(&self, strand: StrandId, kind: EventKind) {
        self.sink.emit(Event::now(strand, kind));
    }

    /// Allocate a Runnable strand and enqueue it.
    pub fn spawn(
        self: &Arc<Self>,
        body: Box<dyn StrandBody<V>>,
        opts: SpawnOptions<V>,
    ) -> Result<Arc<RawStrand<V>>, SchedError> {
        if opts.admission == Admission::External && self.lifecycle.is_stopping() {
            return Err(SchedError::ShutDown);
        }
        let limit = match opts.admission {
            Admission::Bypass => None,
            Admission::External | Admission::Internal => self.max_pending,
        };

        let strand = RawStrand::new(body, opts.name, opts.parent, opts.on_finish);
        let id = strand.id;
        {
            let mut live = self.live.lock();
            live.insert(id, strand.clone());
            self.counters.observe_live(live.len());
        }
        Counters::bump(&self.counters.created);
        self.emit(id, EventKind::Created);
        debug!(strand = %id, name = ?strand.name, "strand created");

        if let Err(strand) = self.queue.try_push(strand.clone(), limit) {
            self.live.lock().swap_remove(&id);
            Counters::bump(&self.counters.rejected);
            self.emit(id, EventKind::Rejected);
            // Never ran: release its body and any parent accounting.
            drop(strand.body.lock().take());
            let err = match limit {
                Some(limit) if !self.lifecycle.is_stopping() => {
                    SchedError::Overloaded { limit }
                }
                _ => SchedError::ShutDown,
            };
            debug!(strand = %id, error = %err, "strand rejected");
            return Err(err);
        }
        Ok(strand)
    }

    /// Issue the single outstanding bridge of a Running strand.
    pub fn park(
        self: &Arc<Self>,
        strand: &Arc<RawStrand<V>>,
    ) -> Result<CompletionBridge<V>, SchedError> {
        let id = strand.id;
        let state = strand.state();
        if state.is_terminal() {
            warn!(strand = %id, "protocol violation: park on finished strand");
            return Err(SchedError::Terminal { id });
        }
        if state != super::StrandState::Running {
            warn!(strand = %id, ?state, "protocol violation: park while not running");
            return Err(SchedError::NotRunning { id, state });
        }
        let mut slot = strand.bridge.lock();
        if slot.is_some() {
            warn!(strand = %id, "protocol violation: strand already parked");
            return Err(SchedError::AlreadyParked { id });
        }
        let bridge = CompletionBridge::new(strand.clone(), Arc::downgrade(self));
        *slot = Some(bridge.inner.clone());
        Ok(bridge)
    }

    /// A bridge completed: make its strand runnable again.
    pub fn resume(&self, strand: &Arc<RawStrand<V>>) -> Result<(), SchedError> {
        use super::raw::Notify;

        if self.terminated.load(Ordering::Acquire) {
            self.cancel_strand(strand, &StrandError::cancelled("scheduler shut down"));
            return Err(SchedError::ShutDown);
        }
        match strand.notify() {
            Notify::Enqueue => {
                Counters::bump(&self.counters.resumed);
                self.emit(strand.id, EventKind::Resumed);
                debug!(strand = %strand.id, "strand resumed");
                self.queue.push(strand.clone());
                Ok(())
            }
            // The park commit at the end of the current segment re-enqueues.
            Notify::Deferred | Notify::Spurious => Ok(()),
            Notify::Terminal => {
                if !self.is_shut_down() {
                    warn!(strand = %strand.id, "protocol violation: completion for finished strand");
                }
                Err(SchedError::Terminal { id: strand.id })
            }
        }
    }

    /// Running -> Blocked, or straight back to the queue if a completion
    /// already arrived.
    fn commit_park(&self, strand: Arc<RawStrand<V>>) {
        Counters::bump(&self.counters.parked);
        self.emit(strand.id, EventKind::Parked);
        debug!(strand = %strand.id, "strand parked");
        if strand.commit_park() {
            Counters::bump(&self.counters.resumed);
            self.emit(strand.id, EventKind::Resumed);
            debug!(strand = %strand.id, "strand resumed");
            self.queue.push(strand);
        }
    }

    /// Running -> terminal; hand the outcome to whoever is entitled to it.
    fn finish(&self, strand: &Arc<RawStrand<V>>, outcome: Result<V, StrandError>) {
        let id = strand.id;
        let ok = outcome.is_ok();
        if !strand.commit_finish(ok) {
            return;
        }
        if ok {
            Counters::bump(&self.counters.finished_ok);
        } else {
            Counters::bump(&self.counters.finished_err);
        }
        self.emit(id, EventKind::Finished { ok });
        debug!(strand = %id, ok, "strand finished");

        // A bridge issued during the last segment can no longer resume anything.
        strand.bridge.lock().take();
        self.release_children(strand);

        let hook = strand.on_finish.lock().take();
        let unconsumed = if let Some(hook) = hook {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(outcome))).is_err() {
                warn!(strand = %id, "finish hook panicked");
            }
            None
        } else if let Some(link) = &strand.parent {
            match link.group.child_finished(id, outcome) {
                None => None,
                // The parent finished without awaiting this child.
                Some(outcome) => {
                    let parent = link.parent.upgrade().map(|p| p.id);
                    debug!(strand = %id, ?parent, "child outlived its parent");
                    self.report_unhandled(id, &outcome);
                    Some(outcome)
                }
            }
        } else {
            self.report_unhandled(id, &outcome);
            Some(outcome)
        };

        strand.mark_complete(unconsumed);
        self.live.lock().swap_remove(&id);
    }

    /// Close the strand's child group and report child errors it never
    /// consumed.
    fn release_children(&self, strand: &RawStrand<V>) {
        let Some(group) = strand.children.lock().take() else {
            return;
        };
        for child in group.close() {
            self.report_unhandled(child.id, &child.result);
        }
    }

    fn report_unhandled(&self, id: StrandId, outcome: &Result<V, StrandError>) {
        if let Err(e) = outcome {
            warn!(strand = %id, error = %e, "unhandled strand error");
            self.emit(id, EventKind::UnhandledError(e.clone()));
        }
    }

    /// Force any live strand to DoneError. Returns false if it had already
    /// finished.
    pub fn cancel_strand(&self, strand: &Arc<RawStrand<V>>, reason: &StrandError) -> bool {
        if !strand.force_cancel() {
            return false;
        }
        let id = strand.id;
        if let Some(bridge) = strand.bridge.lock().take() {
            bridge.close();
        }
        self.release_children(strand);
        drop(strand.body.lock().take());
        Counters::bump(&self.counters.cancelled);
        self.emit(id, EventKind::Cancelled);
        debug!(strand = %id, "strand cancelled");

        let outcome = Err(reason.clone());
        let hook = strand.on_finish.lock().take();
        let unconsumed = match hook {
            Some(hook) => {
                if panic::catch_unwind(AssertUnwindSafe(|| hook(outcome))).is_err() {
                    warn!(strand = %id, "finish hook panicked");
                }
                None
            }
            None => Some(outcome),
        };
        strand.mark_complete(unconsumed);
        self.live.lock().swap_remove(&id);
        true
    }
}

/// Worker main loop.
fn worker_loop<V: Send + 'static>(id: usize, shared: &Arc<Shared<V>>) {
    IN_WORKER.with(|w| w.set(true));
    debug!(worker = id, "worker started");
    while let Some(strand) = shared.queue.pop_blocking() {
        run_segment(shared, strand);
        shared.queue.segment_done();
    }
    debug!(worker = id, "worker exiting");
}

/// Wakeup for the next segment: the bridge payload if one was delivered,
/// otherwise Start/Yielded.
fn take_wakeup<V>(strand: &RawStrand<V>) -> Wakeup<V> {
    let mut slot = strand.bridge.lock();
    if let Some(bridge) = slot.take() {
        match bridge.take_payload() {
            Some(wakeup) => return wakeup,
            // Issued but not completed yet: keep it outstanding.
            None => *slot = Some(bridge),
        }
    }
    drop(slot);
    strand.next_wakeup.lock().take().unwrap_or(Wakeup::Yielded)
}

/// Run one segment of a strand's body and act on the step it returns.
fn run_segment<V: Send + 'static>(shared: &Arc<Shared<V>>, strand: Arc<RawStrand<V>>) {
    if !strand.begin_dispatch() {
        trace!(strand = %strand.id, state = ?strand.state(), "skipping strand that is no longer runnable");
        return;
    }
    Counters::bump(&shared.counters.dispatched);
    shared.emit(strand.id, EventKind::Dispatched);
    trace!(strand = %strand.id, "strand dispatched");

    let wakeup = take_wakeup(&strand);
    let Some(mut body) = strand.body.lock().take() else {
        warn!(strand = %strand.id, "strand dispatched without a continuation");
        shared.finish(&strand, Err(StrandError::failed("strand has no continuation")));
        return;
    };

    let step = {
        let mut cx = StrandContext::new(&strand, shared);
        panic::catch_unwind(AssertUnwindSafe(|| body.resume(&mut cx, wakeup)))
            .unwrap_or_else(|payload| Step::Done(Err(StrandError::from_panic(payload))))
    };

    if shared.is_cancelling() && !matches!(step, Step::Done(_)) {
        drop(body);
        shared.cancel_strand(&strand, &StrandError::cancelled("scheduler shut down"));
        return;
    }

    match step {
        Step::Done(outcome) => {
            drop(body);
            shared.finish(&strand, outcome);
        }
        Step::Yield if !strand.has_bridge() => {
            *strand.body.lock() = Some(body);
            *strand.next_wakeup.lock() = Some(Wakeup::Yielded);
            if strand.commit_yield() {
                shared.queue.push(strand);
            }
        }
        // A yield with an outstanding bridge waits for the bridge.
        Step::Yield | Step::Park => {
            if !strand.has_bridge() {
                warn!(strand = %strand.id, "protocol violation: parked without a completion bridge");
                drop(body);
                shared.finish(
                    &strand,
                    Err(StrandError::failed("strand parked without a completion bridge")),
                );
                return;
            }
            *strand.body.lock() = Some(body);
            shared.commit_park(strand);
        }
        Step::Await(mode) => {
            if strand.has_bridge() {
                warn!(strand = %strand.id, "protocol violation: awaiting children while parked");
                drop(body);
                shared.finish(
                    &strand,
                    Err(StrandError::failed("strand awaited children while parked")),
                );
                return;
            }
            *strand.body.lock() = Some(body);
            let bridge = CompletionBridge::new(strand.clone(), Arc::downgrade(shared));
            *strand.bridge.lock() = Some(bridge.inner.clone());
            let group = strand.child_group();
            shared.commit_park(strand);
            group.arm(mode, bridge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strand::raw::{from_call, from_fn};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn sched(workers: usize) -> Scheduler<i32> {
        Scheduler::new(SchedulerConfig::default().with_workers(workers)).unwrap()
    }

    #[test]
    fn spawn_and_shutdown() {
        let s = sched(2);
        let counter = Arc::new(AtomicI32::new(0));
        for _ in 0..10 {
            let c = counter.clone();
            let h = s
                .spawn(from_call(move || {
                    c.fetch_add(1, Ordering::Relaxed);
                    Ok(0)
                }))
                .unwrap();
            drop(h);
        }
        let report = s.shutdown(ShutdownMode::Graceful).unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 10);
        assert_eq!(report.cancelled, 0);
    }

    #[test]
    fn default_workers() {
        let s = Scheduler::<i32>::new(SchedulerConfig::default()).unwrap();
        assert!(s.worker_count() >= 1);
        s.shutdown(ShutdownMode::Graceful).unwrap();
    }

    #[test]
    fn second_shutdown_is_empty() {
        let s = sched(1);
        s.shutdown(ShutdownMode::Graceful).unwrap();
        assert_eq!(
            s.shutdown(ShutdownMode::Immediate).unwrap(),
            ShutdownReport::default()
        );
    }

    #[test]
    fn spawn_after_shutdown_is_rejected() {
        let s = sched(1);
        s.shutdown(ShutdownMode::Graceful).unwrap();
        assert!(matches!(
            s.spawn(from_call(|| Ok(1))),
            Err(SchedError::ShutDown)
        ));
    }

    #[test]
    fn yield_requeues_strand() {
        let s = sched(1);
        let mut rounds = 0;
        let h = s
            .spawn(from_fn(move |_cx: &mut StrandContext<'_, i32>, wakeup| {
                match wakeup {
                    Wakeup::Start | Wakeup::Yielded => {}
                    other => panic!("unexpected wakeup {:?}", other),
                }
                rounds += 1;
                if rounds < 3 {
                    Step::Yield
                } else {
                    Step::Done(Ok(rounds))
                }
            }))
            .unwrap();
        assert_eq!(h.join(), Ok(3));
        assert_eq!(s.stats().dispatched, 3);
        s.shutdown(ShutdownMode::Graceful).unwrap();
    }

    #[test]
    fn panicking_body_finishes_with_error() {
        let s = sched(1);
        let h = s.spawn(from_call(|| -> Result<i32, StrandError> { panic!("boom") })).unwrap();
        let err = h.join().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Panicked);
        assert!(err.message.contains("boom"));
        s.shutdown(ShutdownMode::Graceful).unwrap();
    }

    #[test]
    fn shutdown_from_worker_is_refused() {
        let s = Arc::new(sched(1));
        let inner = s.clone();
        let h = s
            .spawn(from_call(move || {
                match inner.shutdown(ShutdownMode::Graceful) {
                    Err(SchedError::ShutdownFromWorker) => Ok(1),
                    _ => Ok(0),
                }
            }))
            .unwrap();
        assert_eq!(h.join(), Ok(1));
        s.shutdown(ShutdownMode::Graceful).unwrap();
    }
}
