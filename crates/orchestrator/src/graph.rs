//! Wrapper graphs: the temporary sequence built around one batch item.

use seqrec_common::clock::FrameTimebase;
use seqrec_common::error::{SeqrecError, SeqrecResult};
use seqrec_model::capture::CaptureKind;
use seqrec_model::sequence::SequenceId;

use crate::assets::{AssetHandle, TransientAssets};
use crate::backend::CaptureJob;

/// Time span of a clip on the wrapper timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl Span {
    pub fn new(start_secs: f64, duration_secs: f64) -> Self {
        Self {
            start_secs,
            duration_secs,
        }
    }

    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

/// Clip that replays the source sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlClip {
    pub sequence: SequenceId,
    pub sequence_name: String,
    pub span: Span,
    /// Source time played at the start of the span.
    pub source_offset_secs: f64,
    pub track: AssetHandle,
}

/// Clip bound to one capture backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureClip {
    /// Index of the configuration within the batch item.
    pub config_index: usize,
    pub name: String,
    pub kind: CaptureKind,
    pub span: Span,
    pub job: CaptureJob,
    pub track: AssetHandle,
}

/// A synthesized wrapper sequence. Lives for one item execution only.
#[derive(Debug)]
pub struct WrapperGraph {
    pub asset: AssetHandle,
    pub timebase: FrameTimebase,
    pub frame_count: u64,
    pub control: ControlClip,
    pub captures: Vec<CaptureClip>,
}

impl WrapperGraph {
    pub fn fps(&self) -> f64 {
        self.timebase.fps()
    }

    /// Every capture clip shares the control clip's start and duration.
    pub fn verify_alignment(&self) -> SeqrecResult<()> {
        for clip in &self.captures {
            if clip.span != self.control.span {
                return Err(SeqrecError::synthesis(format!(
                    "capture clip '{}' span [{:.3}s, {:.3}s) drifts from control span [{:.3}s, {:.3}s)",
                    clip.name,
                    clip.span.start_secs,
                    clip.span.end_secs(),
                    self.control.span.start_secs,
                    self.control.span.end_secs()
                )));
            }
        }
        Ok(())
    }

    /// Record the owning session and item on every capture job.
    pub fn assign_origin(&mut self, session_id: &str, item_index: usize) {
        for clip in &mut self.captures {
            clip.job.origin.session_id = session_id.to_string();
            clip.job.origin.item_index = item_index;
            clip.job.origin.capture_index = clip.config_index;
        }
    }

    /// Wrapper time of `frame`.
    pub fn wrapper_time(&self, frame: u64) -> f64 {
        self.control.span.start_secs + self.timebase.time_of(frame)
    }

    /// Source time played at `frame`.
    pub fn source_time(&self, frame: u64) -> f64 {
        self.control.source_offset_secs + self.timebase.time_of(frame)
    }

    /// Handles owned by this graph, tracks first.
    pub fn asset_handles(&self) -> Vec<AssetHandle> {
        let mut handles: Vec<AssetHandle> = self.captures.iter().map(|c| c.track).collect();
        handles.push(self.control.track);
        handles.push(self.asset);
        handles
    }

    /// Release every transient asset backing the graph.
    pub fn teardown(self, assets: &mut dyn TransientAssets) {
        let handles = self.asset_handles();
        tracing::debug!(
            sequence = %self.control.sequence_name,
            assets = handles.len(),
            "Tearing down wrapper graph"
        );
        for handle in handles {
            assets.release(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use seqrec_model::capture::{CaptureSettings, VideoFormat, VideoQuality};

    use crate::backend::JobOrigin;

    struct Counter {
        next: u64,
        live: Vec<AssetHandle>,
    }

    impl TransientAssets for Counter {
        fn allocate(&mut self, _label: &str) -> AssetHandle {
            self.next += 1;
            let h = AssetHandle(self.next);
            self.live.push(h);
            h
        }

        fn release(&mut self, handle: AssetHandle) {
            self.live.retain(|h| *h != handle);
        }
    }

    fn job() -> CaptureJob {
        CaptureJob {
            name: "Movie".into(),
            kind: CaptureKind::Video,
            output_path: PathBuf::from("/out/movie.mp4"),
            channel_outputs: vec![],
            width: 1920,
            height: 1080,
            fps: 30.0,
            frame_count: 60,
            settings: CaptureSettings::Video {
                format: VideoFormat::Mp4,
                width: 1920,
                height: 1080,
                fps: 30.0,
                quality: VideoQuality::default(),
                include_audio: false,
            },
            origin: JobOrigin::default(),
        }
    }

    fn graph(assets: &mut Counter, capture_span: Span) -> WrapperGraph {
        let span = Span::new(0.0, 2.0);
        WrapperGraph {
            asset: assets.allocate("wrapper"),
            timebase: FrameTimebase::new(30.0),
            frame_count: 60,
            control: ControlClip {
                sequence: SequenceId::new("t/a"),
                sequence_name: "A".into(),
                span,
                source_offset_secs: 1.5,
                track: assets.allocate("control"),
            },
            captures: vec![CaptureClip {
                config_index: 0,
                name: "Movie".into(),
                kind: CaptureKind::Video,
                span: capture_span,
                job: job(),
                track: assets.allocate("capture"),
            }],
        }
    }

    #[test]
    fn test_alignment_detects_drift() {
        let mut assets = Counter {
            next: 0,
            live: vec![],
        };
        assert!(graph(&mut assets, Span::new(0.0, 2.0))
            .verify_alignment()
            .is_ok());
        assert!(graph(&mut assets, Span::new(0.0, 2.5))
            .verify_alignment()
            .is_err());
    }

    #[test]
    fn test_source_time_applies_offset() {
        let mut assets = Counter {
            next: 0,
            live: vec![],
        };
        let g = graph(&mut assets, Span::new(0.0, 2.0));
        assert!((g.source_time(0) - 1.5).abs() < 1e-9);
        assert!((g.source_time(30) - 2.5).abs() < 1e-9);
        assert!((g.wrapper_time(30) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut assets = Counter {
            next: 0,
            live: vec![],
        };
        let g = graph(&mut assets, Span::new(0.0, 2.0));
        assert_eq!(assets.live.len(), 3);
        g.teardown(&mut assets);
        assert!(assets.live.is_empty());
    }

    #[test]
    fn test_assign_origin_stamps_session_and_item() {
        let mut assets = Counter {
            next: 0,
            live: vec![],
        };
        let mut g = graph(&mut assets, Span::new(0.0, 2.0));
        g.captures[0].config_index = 3;
        g.assign_origin("batch-42", 5);
        assert_eq!(
            g.captures[0].job.origin,
            JobOrigin {
                session_id: "batch-42".into(),
                item_index: 5,
                capture_index: 3,
            }
        );
    }
}
