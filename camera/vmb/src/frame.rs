//! Frame buffers for the announce/queue/callback protocol.
//!
//! A [Frame] owns two allocations with driver-visible addresses: the image
//! buffer itself and the `VmbFrame_t` descriptor. The driver keys its
//! internal bookkeeping on the descriptor address, so the descriptor is kept
//! in a `Pin<Box<_>>` and must never move while the frame is announced.

use std::{alloc::Layout, convert::TryInto, pin::Pin, ptr::NonNull};

use vmbc_sys::{VmbFrameFlagsType, VmbFrameStatusType, VmbFrame_t};

use crate::error::{Error, Result};

/// Round `size` up to the next multiple of `alignment`.
pub fn round_up_to_alignment(size: usize, alignment: usize) -> usize {
    debug_assert!(alignment > 0);
    size.div_ceil(alignment) * alignment
}

/// A heap allocation with explicit alignment, zero-initialized.
///
/// The capture engine writes into this memory via DMA on some transports
/// and rejects buffers whose start address is not aligned to the value it
/// reports, so `Vec<u8>` (alignment 1) is not sufficient here.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuffer {
    /// Allocate `size` bytes rounded up to `alignment`.
    pub fn new(size: usize, alignment: usize) -> Result<Self> {
        let alignment = alignment.max(1);
        let rounded = round_up_to_alignment(size, alignment);
        // a zero-size allocation is undefined for the global allocator
        if rounded == 0 {
            return Err(Error::BadLayout {
                size: rounded,
                alignment,
            });
        }
        let layout = Layout::from_size_align(rounded, alignment).map_err(|_| Error::BadLayout {
            size: rounded,
            alignment,
        })?;
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(Error::AllocFailed {
            size: rounded,
            alignment,
        })?;
        Ok(Self { ptr, layout })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

unsafe impl Send for AlignedBuffer {}

/// Receive status of a delivered frame, set by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Complete,
    Incomplete,
    TooSmall,
    Invalid,
    Unknown(i32),
}

impl From<i32> for FrameStatus {
    fn from(code: i32) -> Self {
        #[allow(non_upper_case_globals)]
        match code {
            VmbFrameStatusType::VmbFrameStatusComplete => FrameStatus::Complete,
            VmbFrameStatusType::VmbFrameStatusIncomplete => FrameStatus::Incomplete,
            VmbFrameStatusType::VmbFrameStatusTooSmall => FrameStatus::TooSmall,
            VmbFrameStatusType::VmbFrameStatusInvalid => FrameStatus::Invalid,
            other => FrameStatus::Unknown(other),
        }
    }
}

/// A frame buffer plus its driver descriptor.
pub struct Frame {
    buffer: AlignedBuffer,
    // `frame` points into `buffer`; its own address is the driver's key for
    // this buffer and must remain fixed while announced.
    frame: Pin<Box<VmbFrame_t>>,
    pub(crate) announced: bool,
}

unsafe impl Send for Frame {}

fn _test_frame_is_send() {
    // Compile-time test to ensure Frame implements Send trait.
    fn implements<T: Send>() {}
    implements::<Frame>();
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("Frame")
            .field("descriptor", &(&*self.frame as *const VmbFrame_t))
            .field("buffer", &self.buffer.as_ptr())
            .field("buffer_len", &self.buffer.len())
            .field("announced", &self.announced)
            .finish()
    }
}

impl Frame {
    /// Allocate a frame buffer of `payload_size` bytes rounded up to
    /// `alignment`.
    pub fn with_layout(payload_size: usize, alignment: usize) -> Result<Self> {
        let buffer = AlignedBuffer::new(payload_size, alignment)?;
        let frame = Box::pin(VmbFrame_t {
            buffer: buffer.as_ptr() as _,
            bufferSize: buffer.len().try_into().unwrap(),
            context: [std::ptr::null_mut(); 4],
            receiveStatus: 0,
            frameID: 0,
            timestamp: 0,
            imageData: std::ptr::null_mut(),
            receiveFlags: 0,
            pixelFormat: 0,
            width: 0,
            height: 0,
            offsetX: 0,
            offsetY: 0,
            payloadType: vmbc_sys::VmbPayloadType::VmbPayloadTypeUnknown,
            chunkDataPresent: 0,
        });
        Ok(Self {
            buffer,
            frame,
            announced: false,
        })
    }

    pub(crate) fn descriptor(&self) -> &VmbFrame_t {
        &self.frame
    }

    #[inline]
    pub fn is_announced(&self) -> bool {
        self.announced
    }

    #[inline]
    pub fn status(&self) -> FrameStatus {
        FrameStatus::from(self.frame.receiveStatus)
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.status() == FrameStatus::Complete
    }

    /// Whether the driver populated the frame ID field.
    #[inline]
    pub fn has_frame_id(&self) -> bool {
        self.frame.receiveFlags & VmbFrameFlagsType::VmbFrameFlagsFrameID.0 as u32 != 0
    }

    /// Whether the driver populated the timestamp field.
    #[inline]
    pub fn has_timestamp(&self) -> bool {
        self.frame.receiveFlags & VmbFrameFlagsType::VmbFrameFlagsTimestamp.0 as u32 != 0
    }

    /// The device frame ID, only when the corresponding receive flag is set.
    #[inline]
    pub fn frame_id(&self) -> Option<u64> {
        self.has_frame_id().then(|| self.frame.frameID)
    }

    /// The device timestamp, only when the corresponding receive flag is set.
    #[inline]
    pub fn timestamp(&self) -> Option<u64> {
        self.has_timestamp().then(|| self.frame.timestamp)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.frame.height
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.frame.bufferSize.try_into().unwrap()
    }

    #[inline]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer.as_slice()[..self.buffer_size()]
    }

    #[inline]
    pub fn pixel_format(&self) -> Result<machine_vision_formats::PixFmt> {
        crate::pixfmt::pixel_format_code(self.frame.pixelFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up() {
        assert_eq!(round_up_to_alignment(1000, 64), 1024);
        assert_eq!(round_up_to_alignment(1024, 64), 1024);
        assert_eq!(round_up_to_alignment(1, 8), 8);
        assert_eq!(round_up_to_alignment(0, 64), 0);
    }

    #[test]
    fn aligned_buffer_layout() {
        let buf = AlignedBuffer::new(1000, 64).unwrap();
        assert_eq!(buf.len(), 1024);
        assert_eq!(buf.as_ptr() as usize % 64, 0);
        // zero-initialized
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_payload_is_rejected() {
        assert!(AlignedBuffer::new(0, 64).is_err());
        assert!(Frame::with_layout(0, 64).is_err());
    }

    #[test]
    fn frame_starts_unannounced() {
        let frame = Frame::with_layout(1000, 64).unwrap();
        assert!(!frame.is_announced());
        assert_eq!(frame.buffer_size(), 1024);
        assert_eq!(frame.frame_id(), None);
        assert_eq!(frame.timestamp(), None);
    }
}
