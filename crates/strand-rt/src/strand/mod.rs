// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Strand scheduler.
//!
//! Strands are explicit continuations multiplexed onto a fixed worker pool.
//! A strand runs until its body returns a `Step`; parking hands out a
//! one-shot bridge that some other activity completes to resume it.
//!
//! Components:
//! - `raw`: strand object, state machine, body trait
//! - `queue`: shared FIFO ready queue
//! - `bridge`: one-shot completion bridge
//! - `group`: wait-all / wait-any child accounting
//! - `scheduler`: worker threads, dispatch loop, shutdown
//! - `context`: what a body can do during a segment
//! - `handle`: StrandHandle (state/join)

pub mod bridge;
pub mod context;
pub mod group;
pub mod handle;
pub(crate) mod queue;
pub mod raw;
pub mod scheduler;

pub use bridge::CompletionBridge;
pub use context::StrandContext;
pub use group::{ChildOutcome, WaitMode};
pub use handle::StrandHandle;
pub use raw::{from_call, from_fn, FromCall, FromFn, Step, StrandBody, StrandId, StrandState, Wakeup};
pub use scheduler::{Scheduler, ShutdownMode, ShutdownReport};
