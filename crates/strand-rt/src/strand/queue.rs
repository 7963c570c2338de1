// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ready queue.
//!
//! One FIFO shared by every worker. Mutex-protected VecDeque with a condvar
//! for idle workers. The same lock also tracks how many strands are out on
//! a worker, so "queue empty and nothing running" is observed atomically.
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::raw::RawStrand;

/// Multi-producer / multi-consumer queue of runnable strands.
pub(crate) struct ReadyQueue<V> {
    inner: Mutex<QueueInner<V>>,
    /// Workers sleep here when the queue is empty.
    available: Condvar,
    /// Graceful shutdown sleeps here until the queue drains.
    idle: Condvar,
}

struct QueueInner<V> {
    deque: VecDeque<Arc<RawStrand<V>>>,
    /// Strands popped and not yet returned via `segment_done`.
    running: usize,
    /// No more work will be accepted; workers exit once the deque is empty.
    closed: bool,
    /// Workers exit immediately, leaving queued strands behind.
    aborted: bool,
}

impl<V> ReadyQueue<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                deque: VecDeque::new(),
                running: 0,
                closed: false,
                aborted: false,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    /// Enqueue unconditionally. Used for resumed and yielded strands, which
    /// must never be dropped.
    pub fn push(&self, strand: Arc<RawStrand<V>>) {
        self.inner.lock().deque.push_back(strand);
        self.available.notify_one();
    }

    /// Enqueue a new strand, rejecting it once `limit` entries are pending.
    pub fn try_push(
        &self,
        strand: Arc<RawStrand<V>>,
        limit: Option<usize>,
    ) -> Result<(), Arc<RawStrand<V>>> {
        let mut q = self.inner.lock();
        if q.closed || q.aborted {
            return Err(strand);
        }
        if let Some(limit) = limit {
            if q.deque.len() >= limit {
                return Err(strand);
            }
        }
        q.deque.push_back(strand);
        drop(q);
        self.available.notify_one();
        Ok(())
    }

    /// Pop the next strand, sleeping while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained, or aborted.
    pub fn pop_blocking(&self) -> Option<Arc<RawStrand<V>>> {
        let mut q = self.inner.lock();
        loop {
            if q.aborted {
                return None;
            }
            if let Some(strand) = q.deque.pop_front() {
                q.running += 1;
                return Some(strand);
            }
            if q.closed {
                return None;
            }
            self.available.wait(&mut q);
        }
    }

    /// A worker finished the segment of a strand it popped.
    pub fn segment_done(&self) {
        let mut q = self.inner.lock();
        q.running = q.running.saturating_sub(1);
        if q.running == 0 && q.deque.is_empty() {
            self.idle.notify_all();
        }
    }

    /// Block until the queue is empty and no popped strand is still running.
    pub fn wait_idle(&self) {
        let mut q = self.inner.lock();
        while !(q.deque.is_empty() && q.running == 0) {
            self.idle.wait(&mut q);
        }
    }

    /// Stop accepting new strands; workers exit after draining.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    /// Make every worker return from `pop_blocking` now.
    pub fn abort(&self) {
        let mut q = self.inner.lock();
        q.closed = true;
        q.aborted = true;
        drop(q);
        self.available.notify_all();
    }

    /// Remove everything still queued (used during shutdown).
    pub fn drain_all(&self) -> Vec<Arc<RawStrand<V>>> {
        self.inner.lock().deque.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().deque.len()
    }

    pub fn running(&self) -> usize {
        self.inner.lock().running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strand::raw::from_call;
    use std::thread;
    use std::time::Duration;

    fn dummy() -> Arc<RawStrand<i32>> {
        RawStrand::new(Box::new(from_call(|| Ok(0))), None, None, None)
    }

    #[test]
    fn fifo_order() {
        let q = ReadyQueue::new();
        let a = dummy();
        let b = dummy();
        q.push(a.clone());
        q.push(b.clone());
        assert_eq!(q.pop_blocking().unwrap().id, a.id);
        assert_eq!(q.pop_blocking().unwrap().id, b.id);
        assert_eq!(q.running(), 2);
    }

    #[test]
    fn try_push_respects_limit() {
        let q = ReadyQueue::new();
        q.try_push(dummy(), Some(1)).unwrap();
        assert!(q.try_push(dummy(), Some(1)).is_err());
        // Resumed strands bypass the limit.
        q.push(dummy());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn closed_queue_rejects_new_work() {
        let q = ReadyQueue::<i32>::new();
        q.close();
        assert!(q.try_push(dummy(), None).is_err());
        assert!(q.pop_blocking().is_none());
    }

    #[test]
    fn close_drains_before_exit() {
        let q = ReadyQueue::new();
        q.push(dummy());
        q.close();
        assert!(q.pop_blocking().is_some());
        assert!(q.pop_blocking().is_none());
    }

    #[test]
    fn abort_wakes_sleeping_pop() {
        let q = Arc::new(ReadyQueue::<i32>::new());
        let q2 = q.clone();
        let t = thread::spawn(move || q2.pop_blocking().is_none());
        thread::sleep(Duration::from_millis(20));
        q.abort();
        assert!(t.join().unwrap());
    }

    #[test]
    fn push_wakes_sleeping_pop() {
        let q = Arc::new(ReadyQueue::new());
        let q2 = q.clone();
        let t = thread::spawn(move || q2.pop_blocking().map(|s| s.id));
        thread::sleep(Duration::from_millis(20));
        let s = dummy();
        let id = s.id;
        q.push(s);
        assert_eq!(t.join().unwrap(), Some(id));
    }

    #[test]
    fn wait_idle_returns_after_segments_finish() {
        let q = Arc::new(ReadyQueue::new());
        q.push(dummy());
        let popped = q.pop_blocking();
        assert!(popped.is_some());
        let q2 = q.clone();
        let t = thread::spawn(move || q2.wait_idle());
        thread::sleep(Duration::from_millis(20));
        q.segment_done();
        t.join().unwrap();
        assert_eq!(q.running(), 0);
    }
}
