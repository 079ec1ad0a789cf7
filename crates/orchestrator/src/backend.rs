//! Capture backend contracts.
//!
//! Backends do the actual encoding/exporting. The orchestrator only hands
//! them a [`CaptureJob`], steps them one frame per tick, and waits for a
//! terminal [`BackendStatus`] after asking them to stop.

use std::path::PathBuf;

use serde::Serialize;

use seqrec_common::error::SeqrecResult;
use seqrec_model::capture::{CaptureKind, CaptureSettings};

/// Everything a backend needs to produce one capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureJob {
    /// Capture display name.
    pub name: String,

    pub kind: CaptureKind,

    /// Resolved output path. Frame-expanding kinds keep `<Frame>` in it.
    pub output_path: PathBuf,

    /// Per-channel output paths for multi-channel captures.
    pub channel_outputs: Vec<(String, PathBuf)>,

    /// Output size; `(0, 0)` for kinds without pixels.
    pub width: u32,
    pub height: u32,

    /// Frame rate the capture is stepped at (the wrapper timeline's).
    pub fps: f64,

    /// Number of frames the backend will be fed.
    pub frame_count: u64,

    /// Kind-specific parameters.
    pub settings: CaptureSettings,

    pub origin: JobOrigin,
}

/// Which session, item, and capture configuration a job was built from.
///
/// Stable across runtime restarts, so backends can key their output on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobOrigin {
    pub session_id: String,
    pub item_index: usize,
    /// Index into the item's capture list, counting disabled captures.
    pub capture_index: usize,
}

/// Lifecycle of a backend as observed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendStatus {
    #[default]
    Idle,
    Running,
    /// Stop requested; output is being finalized.
    Flushing,
    Succeeded,
    Failed(String),
}

impl BackendStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackendStatus::Succeeded | BackendStatus::Failed(_))
    }
}

/// Runtime statistics reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Frames written so far.
    pub frames_captured: u64,

    /// Frames the backend had to drop.
    pub frames_dropped: u64,
}

impl BackendStats {
    /// Drop rate as a percentage.
    pub fn drop_rate(&self) -> f64 {
        let total = self.frames_captured + self.frames_dropped;
        if total == 0 {
            return 0.0;
        }
        self.frames_dropped as f64 / total as f64 * 100.0
    }
}

/// One running capture.
pub trait CaptureBackend: Send {
    /// Open outputs and get ready to receive frames.
    fn start(&mut self, job: &CaptureJob) -> SeqrecResult<()>;

    /// Capture the scene state for `frame` (at wrapper time `time_secs`).
    fn capture_frame(&mut self, frame: u64, time_secs: f64) -> SeqrecResult<()>;

    /// Stop accepting frames and begin finalizing output.
    fn request_stop(&mut self) -> SeqrecResult<()>;

    /// Current status. Polled once per tick while flushing.
    fn poll(&mut self) -> BackendStatus;

    /// Abandon the capture and discard partial output.
    fn abort(&mut self);

    /// Progress statistics.
    fn stats(&self) -> BackendStats;
}

/// Creates backends for capture jobs.
pub trait BackendFactory: Send {
    fn create(&mut self, job: &CaptureJob) -> SeqrecResult<Box<dyn CaptureBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(BackendStatus::Succeeded.is_terminal());
        assert!(BackendStatus::Failed("disk full".into()).is_terminal());
        assert!(!BackendStatus::Flushing.is_terminal());
        assert!(!BackendStatus::Running.is_terminal());
    }

    #[test]
    fn test_drop_rate() {
        let stats = BackendStats {
            frames_captured: 90,
            frames_dropped: 10,
        };
        assert!((stats.drop_rate() - 10.0).abs() < 1e-9);
        assert_eq!(BackendStats::default().drop_rate(), 0.0);
    }
}
