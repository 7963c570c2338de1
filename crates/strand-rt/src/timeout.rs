// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Bridge timeouts.
//!
//! A timeout is a second completer racing the real one on the same bridge.
//! Each armed timer is a thread parked on a channel with a deadline; sending
//! on the channel disarms it.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::StrandError;
use crate::strand::CompletionBridge;

/// Handle to an armed timeout. Dropping it leaves the timer armed.
#[derive(Debug)]
pub struct Timer {
    disarm: mpsc::Sender<()>,
}

impl Timer {
    /// Stop the timer if it has not fired yet.
    pub fn disarm(self) {
        let _ = self.disarm.send(());
    }
}

pub(crate) fn arm<V: Send + 'static>(bridge: CompletionBridge<V>, duration: Duration) -> Timer {
    let (tx, rx) = mpsc::channel::<()>();
    let deadline = Instant::now() + duration;
    thread::spawn(move || {
        if !wait_for_deadline(&rx, deadline, || bridge.is_completed()) {
            return;
        }
        let err = StrandError::timed_out(format!("no completion within {:?}", duration));
        if bridge.try_complete(Err(err)) {
            debug!(strand = %bridge.strand_id(), ?duration, "bridge timed out");
        }
    });
    Timer { disarm: tx }
}

/// Poll interval once the handle is gone and only the bridge can end the wait.
const DETACHED_POLL: Duration = Duration::from_millis(10);

/// Sleep until `deadline`. Returns false if the timer was disarmed, or if
/// `is_done` turned true after the handle was dropped.
fn wait_for_deadline(rx: &mpsc::Receiver<()>, deadline: Instant, is_done: impl Fn() -> bool) -> bool {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(()) => return false,
        Err(RecvTimeoutError::Timeout) => return true,
        Err(RecvTimeoutError::Disconnected) => {}
    }
    // Handle dropped without disarming: still armed.
    loop {
        if is_done() {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        thread::sleep(left.min(DETACHED_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disarm_ends_wait() {
        let (tx, rx) = mpsc::channel();
        tx.send(()).unwrap();
        assert!(!wait_for_deadline(&rx, Instant::now() + Duration::from_secs(60), || false));
    }

    #[test]
    fn deadline_fires() {
        let (_tx, rx) = mpsc::channel::<()>();
        assert!(wait_for_deadline(&rx, Instant::now() + Duration::from_millis(5), || false));
    }

    #[test]
    fn dropped_timer_stops_once_bridge_completes() {
        let (tx, rx) = mpsc::channel::<()>();
        drop(tx);
        let start = Instant::now();
        assert!(!wait_for_deadline(&rx, start + Duration::from_secs(60), || true));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn dropped_timer_still_fires() {
        let (tx, rx) = mpsc::channel::<()>();
        drop(tx);
        assert!(wait_for_deadline(&rx, Instant::now() + Duration::from_millis(20), || false));
    }
}
