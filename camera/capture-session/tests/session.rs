//! Session state machine tests against a scriptable in-memory driver.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;

use capture_session::{
    CaptureDriver, CaptureSession, DriverError, DriverErrorKind, SessionConfig, SessionError,
    SessionState,
};

#[derive(Default)]
struct MockState {
    payload_size: usize,
    alignment: usize,
    // 1-based call index at which the operation fails, if any
    fail_alloc_at: Option<usize>,
    fail_announce_at: Option<usize>,
    fail_queue_at: Option<usize>,
    // number of revoke calls answered with an in-use error before success
    revoke_busy_times: AtomicUsize,
    alloc_calls: AtomicUsize,
    live_allocs: AtomicUsize,
    announce_calls: AtomicUsize,
    queue_calls: AtomicUsize,
    revoked: AtomicUsize,
    capture_start_calls: AtomicUsize,
    capture_end_calls: AtomicUsize,
    queue_flush_calls: AtomicUsize,
    commands: Mutex<Vec<String>>,
    buffer_sizes: Mutex<Vec<(usize, usize)>>,
}

impl MockState {
    fn new(payload_size: usize, alignment: usize) -> Arc<Self> {
        Arc::new(Self {
            payload_size,
            alignment,
            ..Self::default()
        })
    }
}

struct MockBuffer {
    state: Arc<MockState>,
    announced: bool,
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        assert!(!self.announced, "buffer freed while still announced");
        self.state.live_allocs.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockDriver {
    state: Arc<MockState>,
}

impl CaptureDriver for MockDriver {
    type Buffer = MockBuffer;

    fn payload_size(&self) -> Result<usize, DriverError> {
        Ok(self.state.payload_size)
    }

    fn buffer_alignment(&self) -> usize {
        self.state.alignment
    }

    fn alloc_buffer(&self, size: usize, alignment: usize) -> Result<MockBuffer, DriverError> {
        let call = self.state.alloc_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.fail_alloc_at == Some(call) {
            return Err(DriverError::out_of_memory("simulated allocation failure"));
        }
        self.state.buffer_sizes.lock().push((size, alignment));
        self.state.live_allocs.fetch_add(1, Ordering::SeqCst);
        Ok(MockBuffer {
            state: self.state.clone(),
            announced: false,
        })
    }

    fn announce(&self, buffer: &mut MockBuffer) -> Result<(), DriverError> {
        let call = self.state.announce_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.fail_announce_at == Some(call) {
            return Err(DriverError::new(
                DriverErrorKind::Resources,
                -7,
                "simulated announce failure",
            ));
        }
        buffer.announced = true;
        Ok(())
    }

    fn revoke(&self, buffer: &mut MockBuffer) -> Result<(), DriverError> {
        let busy = &self.state.revoke_busy_times;
        if busy
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DriverError::new(
                DriverErrorKind::InUse,
                -10,
                "buffer in use",
            ));
        }
        buffer.announced = false;
        self.state.revoked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capture_start(&self) -> Result<(), DriverError> {
        self.state.capture_start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capture_end(&self) -> Result<(), DriverError> {
        self.state.capture_end_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn queue(&self, _buffer: &mut MockBuffer) -> Result<(), DriverError> {
        let call = self.state.queue_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.fail_queue_at == Some(call) {
            return Err(DriverError::new(
                DriverErrorKind::BadParameter,
                -8,
                "simulated queue failure",
            ));
        }
        Ok(())
    }

    fn queue_flush(&self) -> Result<(), DriverError> {
        self.state.queue_flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn run_command(&self, name: &str) -> Result<(), DriverError> {
        self.state.commands.lock().push(name.to_string());
        Ok(())
    }

    fn command_done(&self, _name: &str) -> Result<bool, DriverError> {
        Ok(true)
    }
}

fn test_config(num_buffers: usize) -> SessionConfig {
    SessionConfig {
        num_buffers,
        revoke_retry_msec: 1,
        command_retry_msec: 1,
        ..SessionConfig::default()
    }
}

fn session(state: &Arc<MockState>, num_buffers: usize) -> CaptureSession<MockDriver> {
    CaptureSession::new(
        MockDriver {
            state: state.clone(),
        },
        test_config(num_buffers),
    )
}

#[test]
fn full_lifecycle_releases_everything() {
    for n in [1usize, 3, 5, 10] {
        let state = MockState::new(1024, 8);
        let mut session = session(&state, n);

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Acquiring);
        assert_eq!(state.live_allocs.load(Ordering::SeqCst), n);
        assert_eq!(state.announce_calls.load(Ordering::SeqCst), n);
        assert_eq!(state.queue_calls.load(Ordering::SeqCst), n);
        assert_eq!(state.commands.lock().as_slice(), ["AcquisitionStart"]);

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(state.revoked.load(Ordering::SeqCst), n);
        assert_eq!(state.live_allocs.load(Ordering::SeqCst), 0);
        assert_eq!(state.capture_end_calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.queue_flush_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            state.commands.lock().as_slice(),
            ["AcquisitionStart", "AcquisitionStop"]
        );
    }
}

#[test]
fn buffers_are_sized_to_alignment() {
    let state = MockState::new(1000, 64);
    let mut session = session(&state, 5);
    session.start().unwrap();
    let sizes = state.buffer_sizes.lock().clone();
    assert_eq!(sizes, vec![(1024, 64); 5]);
    session.stop();
}

#[test]
fn alloc_failure_frees_earlier_buffers() {
    let state = Arc::new(MockState {
        payload_size: 1024,
        alignment: 8,
        fail_alloc_at: Some(3),
        ..MockState::default()
    });
    let mut session = session(&state, 5);
    match session.start() {
        Err(SessionError::Alloc { .. }) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(state.live_allocs.load(Ordering::SeqCst), 0);
    assert_eq!(state.announce_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn announce_failure_revokes_announced_prefix() {
    let state = Arc::new(MockState {
        payload_size: 1024,
        alignment: 8,
        fail_announce_at: Some(3),
        ..MockState::default()
    });
    let mut session = session(&state, 5);
    match session.start() {
        Err(SessionError::Announce { .. }) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
    assert_eq!(session.state(), SessionState::Idle);
    // the two buffers announced before the failure were revoked again
    assert_eq!(state.revoked.load(Ordering::SeqCst), 2);
    assert_eq!(state.live_allocs.load(Ordering::SeqCst), 0);
    assert_eq!(state.capture_start_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn queue_failure_unwinds_completely() {
    let state = Arc::new(MockState {
        payload_size: 1024,
        alignment: 8,
        fail_queue_at: Some(2),
        ..MockState::default()
    });
    let mut session = session(&state, 3);
    match session.start() {
        Err(SessionError::Queue { .. }) => {}
        other => panic!("unexpected result: {:?}", other.err()),
    }
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(state.capture_end_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.queue_flush_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.revoked.load(Ordering::SeqCst), 3);
    assert_eq!(state.live_allocs.load(Ordering::SeqCst), 0);
    // acquisition was never started on the device
    assert!(state.commands.lock().is_empty());
}

#[test]
fn in_use_buffers_are_retried_until_revoked() {
    let state = MockState::new(1024, 8);
    state.revoke_busy_times.store(2, Ordering::SeqCst);
    let mut session = session(&state, 3);
    session.start().unwrap();
    session.stop();
    assert_eq!(state.revoked.load(Ordering::SeqCst), 3);
    assert_eq!(state.live_allocs.load(Ordering::SeqCst), 0);
}

#[test]
fn exhausted_revoke_budget_leaks_and_finishes_teardown() {
    let state = MockState::new(1024, 8);
    // driver never lets go of the buffers
    state.revoke_busy_times.store(usize::MAX, Ordering::SeqCst);
    let mut session = session(&state, 2);
    session.start().unwrap();
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(state.capture_end_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.queue_flush_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.revoked.load(Ordering::SeqCst), 0);
    // the buffers are leaked, not freed while the driver references them
    assert_eq!(state.live_allocs.load(Ordering::SeqCst), 2);
}

#[test]
fn starting_twice_is_an_error() {
    let state = MockState::new(1024, 8);
    let mut session = session(&state, 3);
    session.start().unwrap();
    assert!(matches!(
        session.start(),
        Err(SessionError::AlreadyStreaming)
    ));
    session.stop();
}

#[test]
fn stopped_session_can_start_again() {
    let state = MockState::new(1024, 8);
    let mut session = session(&state, 3);
    session.start().unwrap();
    session.stop();
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Acquiring);
    session.stop();
    assert_eq!(state.capture_start_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.capture_end_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.live_allocs.load(Ordering::SeqCst), 0);
}

#[test]
fn repeated_stop_runs_teardown_once() {
    let state = MockState::new(1024, 8);
    let mut session = session(&state, 3);
    session.start().unwrap();
    // a stop request from another thread does not claim the teardown;
    // repeated stop calls observe the claim and return without repeating
    // any driver call
    session.shared().request_stop();
    session.stop();
    session.stop();
    assert_eq!(state.capture_end_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.revoked.load(Ordering::SeqCst), 3);
}

#[test]
fn racing_stops_run_teardown_once() {
    // simulates a signal handler racing the normal shutdown path
    let state = MockState::new(1024, 8);
    let mut session = session(&state, 3);
    session.start().unwrap();
    let session = Mutex::new(session);
    std::thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| session.lock().stop());
        }
    });
    assert_eq!(state.capture_end_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.queue_flush_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.revoked.load(Ordering::SeqCst), 3);
    assert_eq!(state.live_allocs.load(Ordering::SeqCst), 0);
}

#[test]
fn drop_tears_the_session_down() {
    let state = MockState::new(1024, 8);
    {
        let mut session = session(&state, 3);
        session.start().unwrap();
    }
    assert_eq!(state.capture_end_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.revoked.load(Ordering::SeqCst), 3);
    assert_eq!(state.live_allocs.load(Ordering::SeqCst), 0);
}
