// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Strand runtime: the concurrency core of a managed-language runtime.
//!
//! Language-level strands are explicit continuations multiplexed onto a
//! fixed pool of worker threads. A strand runs until its body returns a
//! `Step`: it yields, parks on a one-shot completion bridge, awaits its
//! children, or finishes. Nothing is preempted.
//!
//! Components:
//! - strand: strand state machine, ready queue, workers, bridges, groups
//! - invoke: iterative async invocation (array `map` over a callable)
//! - timeout: timers racing a completion bridge
//! - event/metrics: lifecycle events and counters for observers
//! - config: startup parameters (JSON / environment)

mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod invoke;
pub mod metrics;
pub mod strand;
pub mod timeout;

pub use config::{ConfigError, SchedulerConfig};
pub use error::{ErrorKind, SchedError, StrandError};
pub use event::{channel_sink, ChannelSink, Event, EventKind, EventReceiver, EventSink, NullSink};
pub use invoke::{Callable, Concurrency, InvocationJob};
pub use metrics::SchedulerStats;
pub use strand::{
    from_call, from_fn, ChildOutcome, CompletionBridge, FromCall, FromFn, Scheduler, ShutdownMode,
    ShutdownReport, Step, StrandBody, StrandContext, StrandHandle, StrandId, StrandState, WaitMode,
    Wakeup,
};
pub use timeout::Timer;
