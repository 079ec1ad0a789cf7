//! Clock and timebase utilities for batch capture.
//!
//! Batch sessions outlive the process that started them (entering capture
//! mode restarts the runtime), so elapsed time is measured against a
//! persisted wall-clock anchor rather than a monotonic `Instant`.
//! Frame math is kept here so the synthesizer and the session machine agree
//! on how many ticks a span covers.

use chrono::{DateTime, Utc};

/// Wall-clock anchor for a batch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    started_at: DateTime<Utc>,
}

impl SessionClock {
    /// Create a clock anchored to now.
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
        }
    }

    /// Re-create a clock from a persisted anchor (after a restart).
    pub fn from_anchor(started_at: DateTime<Utc>) -> Self {
        Self { started_at }
    }

    /// Wall-clock time at session start.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds elapsed since the anchor, measured at `now`.
    pub fn elapsed_secs_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = now.signed_duration_since(self.started_at);
        (elapsed.num_milliseconds() as f64 / 1000.0).max(0.0)
    }

    /// Seconds elapsed since the anchor.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs_at(Utc::now())
    }
}

/// Fixed frame rate timebase used to step playback and capture in lock-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimebase {
    fps: f64,
}

impl FrameTimebase {
    /// Create a timebase. Callers validate `fps > 0` beforehand.
    pub fn new(fps: f64) -> Self {
        Self { fps }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(&self) -> f64 {
        1.0 / self.fps
    }

    /// Number of whole frames needed to cover `duration_secs`.
    ///
    /// A trailing partial frame still counts, so a span is never truncated.
    pub fn frames_in(&self, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 || self.fps <= 0.0 {
            return 0;
        }
        // Guard against 2.0000000001 * 30 style rounding noise.
        let exact = duration_secs * self.fps;
        let rounded = exact.round();
        if (exact - rounded).abs() < 1e-6 {
            rounded as u64
        } else {
            exact.ceil() as u64
        }
    }

    /// Time in seconds at the start of `frame`.
    pub fn time_of(&self, frame: u64) -> f64 {
        frame as f64 / self.fps
    }
}
