// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Lifecycle events for an external observability collaborator.
//!
//! The scheduler never blocks on delivery. `ChannelSink` wraps a bounded
//! `std::sync::mpsc` channel and drops events when the consumer falls behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::error::StrandError;
use crate::strand::StrandId;

/// What happened to a strand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Created,
    /// Admission failed after creation (overload or shutdown).
    Rejected,
    Dispatched,
    Parked,
    Resumed,
    Finished { ok: bool },
    Cancelled,
    /// A strand failed and no parent strand was waiting for it.
    UnhandledError(StrandError),
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub strand: StrandId,
    pub kind: EventKind,
    pub at: Instant,
}

impl Event {
    pub fn now(strand: StrandId, kind: EventKind) -> Self {
        Self {
            strand,
            kind,
            at: Instant::now(),
        }
    }
}

/// Receiver of lifecycle events. `emit` is called on worker threads and
/// must return promptly.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Create a bounded event channel with room for `capacity` events.
pub fn channel_sink(capacity: usize) -> (ChannelSink, EventReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (
        ChannelSink {
            inner: tx,
            dropped: AtomicU64::new(0),
        },
        EventReceiver { inner: rx },
    )
}

/// Sending half: never blocks, counts what it had to drop.
#[derive(Debug)]
pub struct ChannelSink {
    inner: mpsc::SyncSender<Event>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Events dropped because the buffer was full or the receiver was gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        if self.inner.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Receiving half of an event channel.
#[derive(Debug)]
pub struct EventReceiver {
    inner: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Blocking receive. `None` once the sink is gone and the buffer empty.
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        self.inner.recv_timeout(timeout).ok()
    }

    /// Everything currently buffered, without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.inner.try_iter().collect()
    }
}
