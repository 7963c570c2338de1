// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Strand outcomes and scheduler protocol errors.

use thiserror::Error;

use crate::strand::{StrandId, StrandState};

/// Why a strand (or a sub-invocation) did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The body returned a domain error.
    Failed,
    /// The body panicked while being resumed.
    Panicked,
    /// Immediate shutdown cancelled the strand or its pending bridge.
    Cancelled,
    /// A timeout won the race on a completion bridge.
    TimedOut,
    /// The strand could never be created (scheduler shut down or overloaded).
    Rejected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Failed => "failed",
            ErrorKind::Panicked => "panicked",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::TimedOut => "timed out",
            ErrorKind::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Error value carried by a finished strand, a bridge, or an invocation job.
///
/// User errors and synthetic cancellation errors share this structure; the
/// `kind` tag is what lets callers tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StrandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StrandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A domain error raised by a strand body.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Failed, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimedOut, message)
    }

    /// True when the outcome was never going to succeed: the work was
    /// cut off rather than failing on its own.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled | ErrorKind::TimedOut)
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::new(ErrorKind::Panicked, msg)
    }
}

/// Rejected scheduler operations.
///
/// Everything except admission, shutdown and startup failures is a protocol
/// violation by the caller. The operation is refused and logged; other strands are
/// unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    #[error("strand {id} cannot park: it is {state:?}, not Running")]
    NotRunning { id: StrandId, state: StrandState },

    #[error("strand {id} already finished")]
    Terminal { id: StrandId },

    #[error("strand {id} already has an outstanding completion bridge")]
    AlreadyParked { id: StrandId },

    #[error("completion bridge for strand {id} was already completed")]
    AlreadyCompleted { id: StrandId },

    #[error("invocation index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invocation slot {index} was already resolved")]
    SlotResolved { index: usize },

    #[error("ready queue is full ({limit} pending strands)")]
    Overloaded { limit: usize },

    #[error("scheduler is shut down")]
    ShutDown,

    #[error("shutdown cannot be requested from a worker thread")]
    ShutdownFromWorker,

    #[error("strand {id} result was already taken")]
    ResultTaken { id: StrandId },

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

impl SchedError {
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(
            self,
            SchedError::Overloaded { .. }
                | SchedError::ShutDown
                | SchedError::ShutdownFromWorker
                | SchedError::InvalidConfig(_)
                | SchedError::WorkerSpawn(_)
        )
    }
}

impl From<SchedError> for StrandError {
    fn from(e: SchedError) -> Self {
        StrandError::new(ErrorKind::Rejected, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_kinds() {
        assert!(StrandError::cancelled("shutdown").is_cancellation());
        assert!(StrandError::timed_out("5ms").is_cancellation());
        assert!(!StrandError::failed("boom").is_cancellation());
    }

    #[test]
    fn display_includes_kind() {
        let e = StrandError::failed("bad input");
        assert_eq!(e.to_string(), "failed: bad input");
    }

    #[test]
    fn panic_payloads() {
        let e = StrandError::from_panic(Box::new("boom"));
        assert_eq!(e.kind, ErrorKind::Panicked);
        assert_eq!(e.message, "boom");
        let e = StrandError::from_panic(Box::new(String::from("owned")));
        assert_eq!(e.message, "owned");
        let e = StrandError::from_panic(Box::new(7u32));
        assert_eq!(e.message, "unknown panic");
    }

    #[test]
    fn overload_is_not_a_protocol_violation() {
        assert!(!SchedError::Overloaded { limit: 4 }.is_protocol_violation());
        assert!(SchedError::SlotResolved { index: 1 }.is_protocol_violation());
        assert!(!SchedError::InvalidConfig("x".into()).is_protocol_violation());
        assert!(!SchedError::WorkerSpawn("x".into()).is_protocol_violation());
    }
}
