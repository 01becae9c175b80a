//! State shared between the session owner and the driver's frame-done
//! callback, which runs on a driver-internal thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::{
    config::SessionConfig,
    driver::DriverError,
    stats::{FrameMeta, FrameStats},
};

/// What the callback should do with a delivered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recycle {
    /// Steady state: push the buffer back into the capture queue.
    Requeue,
    /// The session is stopping; leave the buffer out of the queue so the
    /// teardown sequence can revoke it.
    Park,
}

/// Receive status of a delivered buffer, as classified by the driver.
#[derive(Debug, Clone, Copy)]
pub enum FrameOutcome {
    Complete(FrameMeta),
    /// Frame could not be filled to the end.
    Incomplete,
    /// Frame buffer was too small.
    TooSmall,
    /// Frame buffer was invalid.
    Invalid,
    /// Undocumented receive status.
    Unknown(i32),
}

pub struct SessionShared {
    cancelled: AtomicBool,
    teardown_started: AtomicBool,
    stats: Mutex<FrameStats>,
    tick_hz: f64,
}

impl SessionShared {
    pub fn new(config: &SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            teardown_started: AtomicBool::new(false),
            stats: Mutex::new(FrameStats::default()),
            tick_hz: config.timestamp_tick_hz,
        })
    }

    /// Ask the session to stop delivering and re-queueing frames. Safe to
    /// call from any thread, including a signal handler thread.
    pub fn request_stop(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Claim the teardown sequence. Returns true for exactly one caller;
    /// concurrent or repeated stop requests get false and must not run the
    /// teardown body again.
    pub(crate) fn begin_teardown(&self) -> bool {
        self.cancelled.store(true, Ordering::Relaxed);
        self.teardown_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear cancellation state so a stopped session can stream again.
    pub(crate) fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
        self.teardown_started.store(false, Ordering::Release);
    }

    /// Bookkeeping for one delivered buffer. Returns what the callback
    /// must do with it. Must stay cheap: the driver may block a later
    /// capture-engine stop until the callback returns.
    pub fn on_frame_done(&self, outcome: &FrameOutcome) -> Recycle {
        if self.is_cancelled() {
            return Recycle::Park;
        }
        let mut stats = self.stats.lock();
        match outcome {
            FrameOutcome::Complete(meta) => stats.record_complete(meta, self.tick_hz),
            other => {
                tracing::warn!("frame delivered with error status: {:?}", other);
                stats.record_errored();
            }
        }
        Recycle::Requeue
    }

    /// A buffer could not be pushed back into the capture queue. It is lost
    /// to the pool until the session restarts; diagnose instead of failing
    /// silently.
    pub fn note_requeue_failure(&self, err: &DriverError) {
        tracing::error!("re-queueing frame buffer failed, pool shrinks: {}", err);
        self.stats.lock().dropped_buffers += 1;
    }

    /// A completed frame was discarded because the delivery channel was
    /// full.
    pub fn note_delivery_dropped(&self) {
        tracing::warn!("delivery channel full, dropping completed frame");
        self.stats.lock().dropped_deliveries += 1;
    }

    /// Snapshot of the session statistics.
    pub fn stats(&self) -> FrameStats {
        self.stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverErrorKind;

    #[test]
    fn cancelled_session_parks_buffers() {
        let shared = SessionShared::new(&SessionConfig::default());
        let outcome = FrameOutcome::Complete(FrameMeta {
            frame_id: Some(1),
            device_timestamp: None,
        });
        assert_eq!(shared.on_frame_done(&outcome), Recycle::Requeue);
        shared.request_stop();
        assert_eq!(shared.on_frame_done(&outcome), Recycle::Park);
        // the parked delivery was not counted
        assert_eq!(shared.stats().frames_complete, 1);
    }

    #[test]
    fn teardown_claimed_once() {
        let shared = SessionShared::new(&SessionConfig::default());
        assert!(shared.begin_teardown());
        assert!(!shared.begin_teardown());
        assert!(shared.is_cancelled());
    }

    #[test]
    fn requeue_failures_are_counted() {
        let shared = SessionShared::new(&SessionConfig::default());
        let err = DriverError::new(DriverErrorKind::Unknown, -1, "boom");
        shared.note_requeue_failure(&err);
        shared.note_requeue_failure(&err);
        assert_eq!(shared.stats().dropped_buffers, 2);
    }
}
