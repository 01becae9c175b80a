//! Asynchronous frame capture for VmbC (Vimba X) cameras.
//!
//! This crate binds the generic pool and state machine of
//! `capture-session` to the `vmb` wrapper: it owns the loaded driver, the
//! `extern "C"` frame-done trampoline, and a registry that routes each
//! callback to the session it belongs to. Delivered frames are copied and
//! handed to the consumer through the session's bounded channel; the
//! driver-owned buffer goes straight back into the capture queue.

use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use tracing::{error, warn};

use capture_session::{
    delivery::TrySendError, frame_channel, CaptureDriver, CaptureSession, CapturedFrame,
    DriverError, DriverErrorKind, FrameMeta, FrameOutcome, PollError, Receiver, Recycle, Sender,
    SessionConfig, SessionShared,
};
use vmb::{access_mode, Camera, FrameStatus, VmbLibrary};

lazy_static! {
    static ref VMB_LIB: VmbLibrary = VmbLibrary::new().unwrap();
    static ref SESSIONS: Mutex<Vec<SessionEntry>> = Mutex::new(Vec::new());
}

/// Routing entry for one streaming camera, looked up by the trampoline.
struct SessionEntry {
    handle_key: usize,
    shared: Arc<SessionShared>,
    tx: Sender<CapturedFrame>,
}

/// The loaded VmbC library. First use loads the shared library and runs
/// `VmbStartup`; panics if the driver is not installed.
pub fn library() -> &'static VmbLibrary {
    &VMB_LIB
}

/// Open a camera by ID with full access through the shared library
/// instance.
pub fn open_camera(camera_id: &str) -> Result<Camera<'static>, vmb::Error> {
    Camera::open(camera_id, access_mode::FULL, &VMB_LIB.raw)
}

/// Runs `VmbShutdown` when dropped.
///
/// The library instance lives in a static, so nothing ever drops it; the
/// application holds one of these for the duration of its main function
/// instead.
pub struct ShutdownGuard {
    already_dropped: bool,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        // touch the static so the guard cannot outlive an unstarted library
        let _ = &VMB_LIB.raw;
        Self {
            already_dropped: false,
        }
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if !self.already_dropped {
            unsafe {
                VMB_LIB.shutdown();
            }
            self.already_dropped = true;
        }
    }
}

fn vmb_err_to_driver(e: vmb::VmbError) -> DriverError {
    use vmb::ErrorKind as K;
    let kind = match e.kind() {
        K::NotFound => DriverErrorKind::NotFound,
        K::BadParameter => DriverErrorKind::BadParameter,
        K::Timeout => DriverErrorKind::Timeout,
        K::Resources => DriverErrorKind::Resources,
        K::Busy => DriverErrorKind::Busy,
        K::InUse => DriverErrorKind::InUse,
        K::Already => DriverErrorKind::Already,
        K::RetriesExceeded => DriverErrorKind::RetriesExceeded,
        K::NotSupported => DriverErrorKind::NotSupported,
        _ => DriverErrorKind::Unknown,
    };
    DriverError::new(kind, e.code, e.msg)
}

fn to_driver(e: vmb::Error) -> DriverError {
    match e {
        vmb::Error::Vmb { source } => vmb_err_to_driver(source),
        vmb::Error::AllocFailed { .. } | vmb::Error::BadLayout { .. } => {
            DriverError::out_of_memory(e.to_string())
        }
        other => DriverError::new(DriverErrorKind::Unknown, 0, other.to_string()),
    }
}

/// One camera's streaming engine, driving `vmb::Frame` buffers.
///
/// Construction registers the camera in the trampoline routing table;
/// drop removes it again. Owned by a [CaptureSession], see [connect].
pub struct VmbStream {
    camera: Camera<'static>,
    handle_key: usize,
}

fn _test_stream_is_send() {
    // Compile-time test to ensure VmbStream implements Send trait.
    fn implements<T: Send>() {}
    implements::<VmbStream>();
}

impl VmbStream {
    /// The underlying camera, for feature access while not streaming.
    pub fn camera(&self) -> &Camera<'static> {
        &self.camera
    }

    /// Let a GigE transport negotiate its packet size, waiting for the
    /// asynchronously completing command within the configured retry
    /// budget. Cameras without the command are skipped silently.
    pub fn adjust_gvsp_packet_size(&self, config: &SessionConfig) -> Result<(), PollError> {
        const COMMAND: &str = "GVSPAdjustPacketSize";
        if let Err(e) = self.camera.command_run(COMMAND) {
            tracing::debug!("{} unavailable, skipping: {}", COMMAND, e);
            return Ok(());
        }
        capture_session::wait_until(
            config.command_retries,
            config.command_retry_interval(),
            || self.camera.command_done(COMMAND).map_err(to_driver),
        )
    }
}

impl Drop for VmbStream {
    fn drop(&mut self) {
        let mut sessions = SESSIONS.lock();
        sessions.retain(|entry| entry.handle_key != self.handle_key);
    }
}

impl CaptureDriver for VmbStream {
    type Buffer = vmb::Frame;

    fn payload_size(&self) -> Result<usize, DriverError> {
        self.camera.payload_size().map_err(to_driver)
    }

    fn buffer_alignment(&self) -> usize {
        self.camera.buffer_alignment()
    }

    fn alloc_buffer(&self, size: usize, alignment: usize) -> Result<vmb::Frame, DriverError> {
        vmb::Frame::with_layout(size, alignment).map_err(to_driver)
    }

    fn announce(&self, frame: &mut vmb::Frame) -> Result<(), DriverError> {
        self.camera.frame_announce(frame).map_err(to_driver)
    }

    fn revoke(&self, frame: &mut vmb::Frame) -> Result<(), DriverError> {
        self.camera.frame_revoke(frame).map_err(to_driver)
    }

    fn capture_start(&self) -> Result<(), DriverError> {
        self.camera.capture_start().map_err(to_driver)
    }

    fn capture_end(&self) -> Result<(), DriverError> {
        self.camera.capture_end().map_err(to_driver)
    }

    fn queue(&self, frame: &mut vmb::Frame) -> Result<(), DriverError> {
        self.camera
            .capture_frame_queue_with_callback(frame, Some(frame_done_c))
            .map_err(to_driver)
    }

    fn queue_flush(&self) -> Result<(), DriverError> {
        self.camera.capture_queue_flush().map_err(to_driver)
    }

    fn run_command(&self, name: &str) -> Result<(), DriverError> {
        self.camera.command_run(name).map_err(to_driver)
    }

    fn command_done(&self, name: &str) -> Result<bool, DriverError> {
        self.camera.command_done(name).map_err(to_driver)
    }
}

/// Wire a camera into a capture session.
///
/// Returns the session and the receiving end of the bounded frame
/// channel. The session owns the camera; dropping it stops acquisition,
/// releases all buffers, and closes the camera.
pub fn connect(
    camera: Camera<'static>,
    config: SessionConfig,
) -> (CaptureSession<VmbStream>, Receiver<CapturedFrame>) {
    let (tx, rx) = frame_channel(config.channel_capacity);
    let handle_key = camera.handle().key();
    let stream = VmbStream { camera, handle_key };
    let session = CaptureSession::new(stream, config);
    SESSIONS.lock().push(SessionEntry {
        handle_key,
        shared: session.shared(),
        tx,
    });
    (session, rx)
}

fn lookup(handle_key: usize) -> Option<(Arc<SessionShared>, Sender<CapturedFrame>)> {
    let sessions = SESSIONS.lock();
    sessions
        .iter()
        .find(|entry| entry.handle_key == handle_key)
        .map(|entry| (entry.shared.clone(), entry.tx.clone()))
}

fn frame_done(camera_handle: vmbc_sys::VmbHandle_t, frame: *mut vmbc_sys::VmbFrame_t) {
    let now = chrono::Utc::now(); // earliest possible host timestamp

    let Some((shared, tx)) = lookup(camera_handle as usize) else {
        warn!("frame callback for unknown camera {:?}", camera_handle);
        return;
    };

    let status = unsafe { (*frame).receiveStatus };
    let flags = unsafe { (*frame).receiveFlags };
    let frame_id = (flags & vmbc_sys::VmbFrameFlagsType::VmbFrameFlagsFrameID.0 as u32 != 0)
        .then(|| unsafe { (*frame).frameID });
    let device_timestamp = (flags & vmbc_sys::VmbFrameFlagsType::VmbFrameFlagsTimestamp.0 as u32
        != 0)
        .then(|| unsafe { (*frame).timestamp });

    let outcome = match FrameStatus::from(status) {
        FrameStatus::Complete => FrameOutcome::Complete(FrameMeta {
            frame_id,
            device_timestamp,
        }),
        FrameStatus::Incomplete => FrameOutcome::Incomplete,
        FrameStatus::TooSmall => FrameOutcome::TooSmall,
        FrameStatus::Invalid => FrameOutcome::Invalid,
        FrameStatus::Unknown(code) => FrameOutcome::Unknown(code),
    };

    handle_frame(
        &shared,
        &tx,
        &outcome,
        || {
            // Copy everything out of the driver-owned buffer before it
            // goes back into the queue.
            let image = unsafe {
                let buf = (*frame).buffer as *const u8;
                let len = (*frame).bufferSize as usize;
                std::slice::from_raw_parts(buf, len).to_vec()
            };
            let code = unsafe { (*frame).pixelFormat };
            match vmb::pixel_format_code(code) {
                Ok(pixel_format) => Some(CapturedFrame {
                    image,
                    width: unsafe { (*frame).width },
                    height: unsafe { (*frame).height },
                    pixel_format,
                    device_frame_id: frame_id,
                    device_timestamp,
                    host_timestamp: now,
                }),
                Err(e) => {
                    warn!("dropping frame: {}", e);
                    None
                }
            }
        },
        || {
            let errcode = unsafe {
                VMB_LIB
                    .raw
                    .VmbCaptureFrameQueue(camera_handle, frame, Some(frame_done_c))
            };
            if errcode == vmbc_sys::VmbErrorType::VmbErrorSuccess {
                Ok(())
            } else {
                Err(vmb_err_to_driver(vmb::VmbError::from(errcode)))
            }
        },
    );
}

/// Bookkeeping, recycling, and delivery for one delivered buffer.
///
/// Once the session is stopping, parked buffers get neither copied nor
/// re-queued nor delivered; they belong to the teardown sequence.
/// Otherwise the capture runs (only for complete frames, via `capture`),
/// the buffer is pushed back into the queue, and the copy is handed to
/// the consumer without blocking.
fn handle_frame<C, Q>(
    shared: &SessionShared,
    tx: &Sender<CapturedFrame>,
    outcome: &FrameOutcome,
    capture: C,
    requeue: Q,
) where
    C: FnOnce() -> Option<CapturedFrame>,
    Q: FnOnce() -> Result<(), DriverError>,
{
    if shared.on_frame_done(outcome) == Recycle::Park {
        return;
    }

    let captured = if matches!(outcome, FrameOutcome::Complete(_)) {
        capture()
    } else {
        None
    };

    if let Err(e) = requeue() {
        shared.note_requeue_failure(&e);
    }

    if let Some(captured) = captured {
        match tx.try_send(captured) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => shared.note_delivery_dropped(),
            Err(TrySendError::Disconnected(_)) => {
                error!("frame receiver dropped, stopping delivery");
                shared.request_stop();
            }
        }
    }
}

/// # Safety
///
/// Called by the driver on one of its internal threads with a valid frame
/// pointer. Panics are caught here so they never unwind across the FFI
/// boundary; a panic stops further delivery for the affected camera.
#[no_mangle]
pub unsafe extern "C" fn frame_done_c(
    camera_handle: vmbc_sys::VmbHandle_t,
    _stream_handle: vmbc_sys::VmbHandle_t,
    frame: *mut vmbc_sys::VmbFrame_t,
) {
    if std::panic::catch_unwind(|| frame_done(camera_handle, frame)).is_err() {
        eprintln!("CB: panic in frame callback");
        if let Some((shared, _tx)) = lookup(camera_handle as usize) {
            shared.request_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_session::{FrameStats, SessionConfig};

    fn complete_outcome(frame_id: u64) -> FrameOutcome {
        FrameOutcome::Complete(FrameMeta {
            frame_id: Some(frame_id),
            device_timestamp: None,
        })
    }

    fn dummy_frame(frame_id: u64) -> CapturedFrame {
        CapturedFrame {
            image: vec![0u8; 16],
            width: 4,
            height: 4,
            pixel_format: machine_vision_formats::PixFmt::Mono8,
            device_frame_id: Some(frame_id),
            device_timestamp: None,
            host_timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn steady_state_requeues_and_delivers() {
        let shared = SessionShared::new(&SessionConfig::default());
        let (tx, rx) = frame_channel(4);
        let mut requeued = false;
        handle_frame(
            &shared,
            &tx,
            &complete_outcome(7),
            || Some(dummy_frame(7)),
            || {
                requeued = true;
                Ok(())
            },
        );
        assert!(requeued);
        assert_eq!(rx.try_recv().unwrap().device_frame_id, Some(7));
        assert_eq!(shared.stats().frames_complete, 1);
    }

    #[test]
    fn stopping_session_parks_without_copying_or_delivering() {
        let shared = SessionShared::new(&SessionConfig::default());
        let (tx, rx) = frame_channel(4);
        shared.request_stop();
        handle_frame(
            &shared,
            &tx,
            &complete_outcome(1),
            || panic!("copied a frame for a stopping session"),
            || panic!("re-queued a buffer for a stopping session"),
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(shared.stats().frames_complete, 0);
    }

    #[test]
    fn full_channel_counts_a_dropped_delivery() {
        let shared = SessionShared::new(&SessionConfig::default());
        let (tx, rx) = frame_channel(1);
        tx.try_send(dummy_frame(0)).unwrap();
        handle_frame(&shared, &tx, &complete_outcome(1), || Some(dummy_frame(1)), || Ok(()));
        let stats: FrameStats = shared.stats();
        assert_eq!(stats.dropped_deliveries, 1);
        assert_eq!(rx.try_recv().unwrap().device_frame_id, Some(0));
    }
}
