use serde::{Deserialize, Serialize};

/// Tuning knobs for one capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of frame buffers announced to the driver.
    pub num_buffers: usize,
    /// Capacity of the completed-frame delivery channel.
    pub channel_capacity: usize,
    /// Device command starting acquisition.
    pub acquisition_start_command: String,
    /// Device command stopping acquisition.
    pub acquisition_stop_command: String,
    /// How often to retry revoking a buffer the driver reports as in use.
    pub revoke_retries: usize,
    /// Interval between revoke retries, in milliseconds.
    pub revoke_retry_msec: u64,
    /// How often to poll an asynchronously completing device command.
    pub command_retries: usize,
    /// Interval between command completion polls, in milliseconds.
    pub command_retry_msec: u64,
    /// Device timestamp tick frequency in Hz, for frame rate estimation.
    pub timestamp_tick_hz: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_buffers: 3,
            channel_capacity: 10,
            acquisition_start_command: "AcquisitionStart".to_string(),
            acquisition_stop_command: "AcquisitionStop".to_string(),
            revoke_retries: 10,
            revoke_retry_msec: 100,
            command_retries: 10,
            command_retry_msec: 100,
            timestamp_tick_hz: 1e9,
        }
    }
}

impl SessionConfig {
    pub fn revoke_retry_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.revoke_retry_msec)
    }

    pub fn command_retry_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.command_retry_msec)
    }
}
