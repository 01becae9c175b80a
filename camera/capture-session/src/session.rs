//! The capture session state machine.
//!
//! A session owns the buffer pool and walks the driver through the strict
//! streaming bring-up order (allocate, announce, start engine, queue,
//! start acquisition) and the reverse teardown order. Teardown runs to
//! completion even when individual steps fail: a buffer the driver still
//! holds is worse than a logged error.

use std::sync::Arc;

use crate::{
    config::SessionConfig,
    driver::{CaptureDriver, DriverError},
    pool,
    shared::SessionShared,
    stats::FrameStats,
};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("allocating frame buffer: {source}")]
    Alloc { source: DriverError },
    #[error("announcing frame buffer: {source}")]
    Announce { source: DriverError },
    #[error("starting capture engine: {source}")]
    EngineStart { source: DriverError },
    #[error("queueing frame buffer: {source}")]
    Queue { source: DriverError },
    #[error("starting acquisition: {source}")]
    AcquisitionStart { source: DriverError },
    #[error("session is already streaming")]
    AlreadyStreaming,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Where the session is in the streaming lifecycle.
///
/// The intermediate states are only observable if `start` fails partway;
/// on success the session goes straight to `Acquiring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No buffers announced, capture engine stopped.
    Idle,
    /// Buffers announced, capture engine not yet started.
    BuffersAnnounced,
    /// Capture engine running, device not yet acquiring.
    Capturing,
    /// Frames are being acquired and delivered.
    Acquiring,
    /// Teardown in progress.
    Stopping,
}

/// One streaming session over a [CaptureDriver].
///
/// Dropping a session that is still acquiring runs the full teardown.
pub struct CaptureSession<D: CaptureDriver> {
    driver: D,
    buffers: Vec<D::Buffer>,
    state: SessionState,
    shared: Arc<SessionShared>,
    config: SessionConfig,
}

impl<D: CaptureDriver> CaptureSession<D> {
    pub fn new(driver: D, config: SessionConfig) -> Self {
        let shared = SessionShared::new(&config);
        Self {
            driver,
            buffers: Vec::new(),
            state: SessionState::Idle,
            shared,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle to the state shared with the driver's frame-done callback.
    /// The driver implementation holds a clone of this.
    pub fn shared(&self) -> Arc<SessionShared> {
        self.shared.clone()
    }

    pub fn stats(&self) -> FrameStats {
        self.shared.stats()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Bring the device to the acquiring state.
    ///
    /// The steps run in the order the driver requires; if any step fails,
    /// every completed step is undone before the error is returned, so a
    /// failed `start` leaves the session `Idle` with no buffers announced.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyStreaming);
        }
        self.shared.reset();

        let mut buffers = pool::allocate(&self.driver, self.config.num_buffers)?;
        pool::announce_all(&self.driver, &mut buffers)?;
        self.buffers = buffers;
        self.state = SessionState::BuffersAnnounced;

        if let Err(source) = self.driver.capture_start() {
            self.revoke_all();
            self.state = SessionState::Idle;
            return Err(SessionError::EngineStart { source });
        }
        self.state = SessionState::Capturing;

        // All buffers make it into the queue or none do. A pool that
        // starts short would stream but drop frames under load, which is
        // much harder to diagnose than a failed start.
        for i in 0..self.buffers.len() {
            if let Err(source) = self.driver.queue(&mut self.buffers[i]) {
                self.unwind_from_capturing();
                return Err(SessionError::Queue { source });
            }
        }

        if let Err(source) = self.driver.run_command(&self.config.acquisition_start_command) {
            self.unwind_from_capturing();
            return Err(SessionError::AcquisitionStart { source });
        }
        self.state = SessionState::Acquiring;
        tracing::info!(
            "acquisition started with {} queued buffers",
            self.buffers.len()
        );
        Ok(())
    }

    /// Stop acquisition and release every buffer.
    ///
    /// Exactly one caller runs the teardown sequence; a second concurrent
    /// or repeated call returns immediately. All steps are attempted even
    /// when earlier ones fail.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        if !self.shared.begin_teardown() {
            return;
        }
        self.state = SessionState::Stopping;

        if let Err(e) = self.driver.run_command(&self.config.acquisition_stop_command) {
            tracing::warn!("stopping acquisition: {}", e);
        }
        // Blocks until any in-flight frame-done callback has returned.
        if let Err(e) = self.driver.capture_end() {
            tracing::warn!("stopping capture engine: {}", e);
        }
        if let Err(e) = self.driver.queue_flush() {
            tracing::warn!("flushing capture queue: {}", e);
        }
        self.revoke_all();
        self.state = SessionState::Idle;
        tracing::info!("acquisition stopped, all buffers released");
    }

    /// Undo a partially completed `start` from the `Capturing` state.
    fn unwind_from_capturing(&mut self) {
        if let Err(e) = self.driver.capture_end() {
            tracing::warn!("stopping capture engine while unwinding: {}", e);
        }
        if let Err(e) = self.driver.queue_flush() {
            tracing::warn!("flushing capture queue while unwinding: {}", e);
        }
        self.revoke_all();
        self.state = SessionState::Idle;
    }

    /// Revoke and free every buffer in the pool.
    ///
    /// A buffer the driver reports as in use is retried within the
    /// configured budget; one that cannot be revoked at all is leaked with
    /// an error logged, since freeing memory the driver may still write
    /// into would corrupt the heap.
    fn revoke_all(&mut self) {
        for mut buffer in self.buffers.drain(..) {
            let mut attempt = 0;
            loop {
                match self.driver.revoke(&mut buffer) {
                    Ok(()) => break,
                    Err(e) if e.is_in_use() && attempt < self.config.revoke_retries => {
                        attempt += 1;
                        tracing::debug!(
                            "buffer still in use, revoke retry {}/{}",
                            attempt,
                            self.config.revoke_retries
                        );
                        std::thread::sleep(self.config.revoke_retry_interval());
                    }
                    Err(e) => {
                        tracing::error!("revoking buffer failed, leaking it: {}", e);
                        std::mem::forget(buffer);
                        break;
                    }
                }
            }
        }
    }
}

impl<D: CaptureDriver> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
