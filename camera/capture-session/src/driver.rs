//! The seam to the vendor capture driver.
//!
//! Everything the session state machine needs from a driver is behind
//! [CaptureDriver], so the pool and state machine can be exercised against
//! a mock. The real implementation (VmbC) lives in the `vmb-capture` crate.

/// Driver-defined error taxonomy, consumed not produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    NotFound,
    BadParameter,
    Timeout,
    Resources,
    Busy,
    InUse,
    Already,
    RetriesExceeded,
    NotSupported,
    Unknown,
}

/// An error reported by the vendor driver, with its original numeric code.
#[derive(thiserror::Error, Debug, Clone)]
#[error("driver error {code} ({kind:?}): {msg}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub code: i32,
    pub msg: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, code: i32, msg: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            msg: msg.into(),
        }
    }

    /// Resource exhaustion on the host side (no driver code involved).
    pub fn out_of_memory(msg: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Resources, 0, msg)
    }

    /// Whether the driver still references the resource, so the operation
    /// may succeed when retried later.
    #[inline]
    pub fn is_in_use(&self) -> bool {
        matches!(self.kind, DriverErrorKind::InUse | DriverErrorKind::Busy)
    }
}

/// Operations of the vendor driver's frame streaming engine.
///
/// All buffer operations take `&mut` because announce/queue hand the buffer
/// address to the driver and the implementation tracks registration state
/// on the buffer itself.
pub trait CaptureDriver {
    /// One frame buffer, owned by this side. Dropping it frees the memory;
    /// implementations must only allow that for revoked buffers.
    type Buffer;

    /// Required buffer size for one frame of the current configuration.
    fn payload_size(&self) -> Result<usize, DriverError>;

    /// Required start-address alignment. Implementations fall back to
    /// pointer size when the driver does not report one.
    fn buffer_alignment(&self) -> usize;

    /// Allocate one buffer of `size` bytes aligned to `alignment`.
    fn alloc_buffer(&self, size: usize, alignment: usize) -> Result<Self::Buffer, DriverError>;

    /// Register a buffer with the streaming engine.
    fn announce(&self, buffer: &mut Self::Buffer) -> Result<(), DriverError>;

    /// Deregister a buffer. Fails with an in-use error while the capture
    /// engine may still write into it.
    fn revoke(&self, buffer: &mut Self::Buffer) -> Result<(), DriverError>;

    /// Start the capture engine.
    fn capture_start(&self) -> Result<(), DriverError>;

    /// Stop the capture engine. The driver guarantees this blocks until an
    /// in-flight frame-done callback has returned.
    fn capture_end(&self) -> Result<(), DriverError>;

    /// Push an announced buffer into the capture queue, together with the
    /// implementation's frame-done callback.
    fn queue(&self, buffer: &mut Self::Buffer) -> Result<(), DriverError>;

    /// Discard all queued buffers without delivering them.
    fn queue_flush(&self) -> Result<(), DriverError>;

    /// Run a named device command (fire-and-forget).
    fn run_command(&self, name: &str) -> Result<(), DriverError>;

    /// Whether a previously run device command has completed.
    fn command_done(&self, name: &str) -> Result<bool, DriverError>;
}
