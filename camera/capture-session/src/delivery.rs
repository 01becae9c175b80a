//! Delivery of completed frames to the consumer.
//!
//! The frame-done callback runs on a driver-internal thread and must not
//! block, so frames are handed over through a bounded channel with
//! `try_send`; a full channel drops the frame and the drop is counted in
//! the session statistics.

use chrono::{DateTime, Utc};
use machine_vision_formats::PixFmt;

pub use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

/// One completed frame, copied out of the driver-owned buffer.
#[derive(Clone)]
pub struct CapturedFrame {
    /// Raw image bytes, row-major.
    pub image: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixFmt,
    /// Device frame counter, if the driver populated it.
    pub device_frame_id: Option<u64>,
    /// Device timestamp in tick units, if the driver populated it.
    pub device_timestamp: Option<u64>,
    /// Host clock time at which the callback observed the frame.
    pub host_timestamp: DateTime<Utc>,
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("image", &format_args!("[{} bytes]", self.image.len()))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("device_frame_id", &self.device_frame_id)
            .field("device_timestamp", &self.device_timestamp)
            .field("host_timestamp", &self.host_timestamp)
            .finish()
    }
}

/// Bounded channel for completed frames.
pub fn frame_channel(capacity: usize) -> (Sender<CapturedFrame>, Receiver<CapturedFrame>) {
    crossbeam_channel::bounded(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(device_frame_id: u64) -> CapturedFrame {
        CapturedFrame {
            image: vec![0u8; 16],
            width: 4,
            height: 4,
            pixel_format: PixFmt::Mono8,
            device_frame_id: Some(device_frame_id),
            device_timestamp: None,
            host_timestamp: Utc::now(),
        }
    }

    #[test]
    fn full_channel_rejects_without_blocking() {
        let (tx, rx) = frame_channel(2);
        assert!(tx.try_send(frame(0)).is_ok());
        assert!(tx.try_send(frame(1)).is_ok());
        assert!(matches!(tx.try_send(frame(2)), Err(TrySendError::Full(_))));
        assert_eq!(rx.recv().unwrap().device_frame_id, Some(0));
        assert!(tx.try_send(frame(3)).is_ok());
    }
}
