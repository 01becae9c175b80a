//! Buffer pool and state machine for announce/queue/callback camera
//! drivers.
//!
//! Streaming drivers in the GenICam family all follow the same protocol:
//! the application owns the frame memory, registers ("announces") it with
//! the driver, pushes each buffer into a capture queue, and gets it back
//! through a callback on a driver thread when a frame has been written
//! into it. This crate implements the application side of that protocol
//! once, behind the [CaptureDriver] trait, so the sequencing and teardown
//! logic can be tested without a device or a vendor SDK. The VmbC binding
//! lives in the `vmb-capture` crate.

pub mod config;
pub mod delivery;
pub mod driver;
pub mod poll;
pub mod pool;
pub mod session;
pub mod shared;
pub mod stats;

pub use config::SessionConfig;
pub use delivery::{frame_channel, CapturedFrame, Receiver, Sender};
pub use driver::{CaptureDriver, DriverError, DriverErrorKind};
pub use poll::{wait_until, PollError};
pub use session::{CaptureSession, SessionError, SessionState};
pub use shared::{FrameOutcome, Recycle, SessionShared};
pub use stats::{FrameMeta, FrameStats};
