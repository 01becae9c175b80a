//! Fixed-size pool of driver-registered frame buffers.
//!
//! The pool is sized once per streaming session: payload size and
//! alignment are queried from the driver, every buffer is allocated at the
//! rounded-up size, and all buffers are announced before the capture
//! engine starts. Failure anywhere leaves nothing behind: no allocated
//! memory and no driver-side registrations.

use crate::{
    driver::CaptureDriver,
    session::SessionError,
};

/// `size` rounded up to the next multiple of `alignment`.
pub fn aligned_size(size: usize, alignment: usize) -> usize {
    debug_assert!(alignment > 0);
    size.div_ceil(alignment) * alignment
}

/// Allocate `count` buffers sized for the driver's current configuration.
///
/// On any allocation failure the buffers allocated so far are dropped
/// (freed) before the error is returned; a partially initialized pool
/// never escapes.
pub fn allocate<D: CaptureDriver>(driver: &D, count: usize) -> Result<Vec<D::Buffer>, SessionError> {
    let payload_size = driver
        .payload_size()
        .map_err(|source| SessionError::Alloc { source })?;
    let alignment = driver.buffer_alignment().max(1);
    let size = aligned_size(payload_size, alignment);
    tracing::debug!(
        "allocating {} buffers of {} bytes (payload {}, alignment {})",
        count,
        size,
        payload_size,
        alignment
    );

    let mut buffers = Vec::with_capacity(count);
    for _ in 0..count {
        let buffer = driver
            .alloc_buffer(size, alignment)
            .map_err(|source| SessionError::Alloc { source })?;
        buffers.push(buffer);
    }
    Ok(buffers)
}

/// Announce every buffer to the driver, one at a time.
///
/// If a registration fails, the already-registered prefix is revoked and
/// the whole pool is dropped before the originating error is returned.
pub fn announce_all<D: CaptureDriver>(
    driver: &D,
    buffers: &mut Vec<D::Buffer>,
) -> Result<(), SessionError> {
    for i in 0..buffers.len() {
        if let Err(source) = driver.announce(&mut buffers[i]) {
            for buffer in &mut buffers[..i] {
                if let Err(e) = driver.revoke(buffer) {
                    tracing::warn!("revoking buffer while unwinding failed announce: {}", e);
                }
            }
            buffers.clear();
            return Err(SessionError::Announce { source });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::aligned_size;

    #[test]
    fn payload_rounded_to_alignment() {
        assert_eq!(aligned_size(1000, 64), 1024);
        assert_eq!(aligned_size(1024, 64), 1024);
        assert_eq!(aligned_size(1, 1), 1);
        assert_eq!(aligned_size(65, 64), 128);
    }
}
