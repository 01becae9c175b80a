//! Per-session frame bookkeeping.
//!
//! Updated from the driver's frame-done callback, read from anywhere, so
//! the whole struct lives behind one mutex in
//! [crate::shared::SessionShared].

/// Metadata of one completed frame.
///
/// Frame ID and timestamp are optional because the driver flags whether it
/// populated them; an unset field must not be trusted.
#[derive(Debug, Clone, Copy)]
pub struct FrameMeta {
    pub frame_id: Option<u64>,
    pub device_timestamp: Option<u64>,
}

/// Number of frame IDs skipped between two deliveries.
///
/// Consecutive IDs mean nothing was missed. An ID equal to or lower than
/// the previous one (device restart, reorder) also counts as nothing
/// missed.
pub fn missing_between(previous: u64, current: u64) -> u64 {
    if current > previous {
        current - previous - 1
    } else {
        0
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    /// Frames delivered with complete receive status.
    pub frames_complete: u64,
    /// Frames delivered with an error receive status.
    pub frames_errored: u64,
    /// Total frame IDs skipped, from gaps in the delivered ID sequence.
    pub missing_frames: u64,
    /// Buffers lost to the pool because re-queueing them failed.
    pub dropped_buffers: u64,
    /// Completed frames discarded because the delivery channel was full.
    pub dropped_deliveries: u64,
    last_frame_id: Option<u64>,
    last_timestamp: Option<u64>,
    fps_estimate: Option<f64>,
}

impl FrameStats {
    /// Record a complete frame. `tick_hz` is the device timestamp tick
    /// frequency used for the frame rate estimate.
    pub fn record_complete(&mut self, meta: &FrameMeta, tick_hz: f64) {
        self.frames_complete += 1;

        if let Some(id) = meta.frame_id {
            if let Some(prev) = self.last_frame_id {
                let missing = missing_between(prev, id);
                if missing > 0 {
                    tracing::warn!("{} frames missing between id {} and {}", missing, prev, id);
                    self.missing_frames += missing;
                }
            }
            self.last_frame_id = Some(id);
        }

        if let Some(ts) = meta.device_timestamp {
            if let Some(prev) = self.last_timestamp {
                let delta_ticks = ts.saturating_sub(prev);
                if delta_ticks > 0 && tick_hz > 0.0 {
                    self.fps_estimate = Some(tick_hz / delta_ticks as f64);
                }
            }
            self.last_timestamp = Some(ts);
        }
    }

    pub fn record_errored(&mut self) {
        self.frames_errored += 1;
    }

    /// Instantaneous frame rate from the last two device timestamps.
    pub fn fps_estimate(&self) -> Option<f64> {
        self.fps_estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(frame_id: u64, device_timestamp: u64) -> FrameMeta {
        FrameMeta {
            frame_id: Some(frame_id),
            device_timestamp: Some(device_timestamp),
        }
    }

    #[test]
    fn consecutive_ids_miss_nothing() {
        assert_eq!(missing_between(7, 8), 0);
        assert_eq!(missing_between(8, 8), 0);
        assert_eq!(missing_between(9, 3), 0);
    }

    #[test]
    fn gaps_are_counted() {
        assert_eq!(missing_between(7, 9), 1);
        assert_eq!(missing_between(10, 20), 9);

        let mut stats = FrameStats::default();
        for (id, ts) in [(5, 100), (6, 200), (8, 400), (12, 800)] {
            stats.record_complete(&meta(id, ts), 1e9);
        }
        // 7 skipped, then 9..=11 skipped
        assert_eq!(stats.missing_frames, 4);
        assert_eq!(stats.frames_complete, 4);
    }

    #[test]
    fn fps_from_timestamp_delta() {
        let mut stats = FrameStats::default();
        // 1 GHz ticks, 10 msec apart -> 100 fps
        stats.record_complete(&meta(0, 1_000_000_000), 1e9);
        stats.record_complete(&meta(1, 1_010_000_000), 1e9);
        let fps = stats.fps_estimate().unwrap();
        assert!((fps - 100.0).abs() < 1e-9);
    }

    #[test]
    fn untrusted_fields_are_ignored() {
        let mut stats = FrameStats::default();
        stats.record_complete(
            &FrameMeta {
                frame_id: None,
                device_timestamp: None,
            },
            1e9,
        );
        stats.record_complete(&meta(10, 100), 1e9);
        // no gap counted against the frame with an unset ID
        assert_eq!(stats.missing_frames, 0);
        assert_eq!(stats.fps_estimate(), None);
    }
}
