//! Scene playback contract for control clips.

use seqrec_common::error::SeqrecResult;

use crate::graph::ControlClip;

/// Plays a source sequence under the control of a wrapper graph.
///
/// The driver owns the active scene while an item executes. It is stepped
/// by absolute source time, never by wall-clock, so playback and capture
/// stay frame-aligned.
pub trait PlaybackDriver: Send {
    /// Bind the control clip's sequence. Fails with `InvalidSource` when the
    /// sequence cannot be played.
    fn load(&mut self, clip: &ControlClip) -> SeqrecResult<()>;

    /// Evaluate the scene at `source_time_secs`.
    fn evaluate(&mut self, source_time_secs: f64) -> SeqrecResult<()>;

    /// Release the sequence.
    fn unload(&mut self);
}
