//! Safe wrapper for the Allied Vision VmbC (Vimba X) camera SDK.
//!
//! The driver is loaded at runtime with `libloading` (set `VIMBA_X_HOME` to
//! override the platform default location). The wrapper covers startup and
//! shutdown, camera enumeration, typed GenICam feature access by string
//! name, settings persistence, and the frame announce/queue/revoke capture
//! protocol. The higher-level buffer pool and capture session state machine
//! live in the `capture-session` crate.

mod camera;
mod error;
mod frame;
mod handle;
mod library;
mod pixfmt;

pub use camera::{access_mode, default_feature_persist_settings, AccessMode, Camera};
pub use error::{Error, ErrorKind, Result, VmbError};
pub use frame::{round_up_to_alignment, AlignedBuffer, Frame, FrameStatus};
pub use handle::{
    CameraHandle, InterfaceHandle, LocalDeviceHandle, StreamHandle, TransportLayerHandle,
};
pub use library::{CameraInfo, VersionInfo, VmbLibrary};
pub use pixfmt::{pixel_format_code, pixel_format_to_str, str_to_pixel_format};
