//! Dry-run collaborators for `seqrec run`.
//!
//! Instead of encoding anything, each backend counts the frames it is fed
//! and, once stopped, writes a JSON manifest describing the job it would
//! have produced. The host, player and asset pool stand in for a runtime
//! and only log what they are asked to do.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use seqrec_common::error::{SeqrecError, SeqrecResult};
use seqrec_orchestrator::backend::{
    BackendFactory, BackendStats, BackendStatus, CaptureBackend, CaptureJob,
};
use seqrec_orchestrator::{
    AssetHandle, ControlClip, PlaybackDriver, RuntimeHost, RuntimeMode, TransientAssets,
};

/// Runtime host without a runtime. Mode switches take effect immediately.
#[derive(Debug)]
pub struct DryRunHost {
    mode: RuntimeMode,
}

impl DryRunHost {
    /// `mode` is the mode this process came up in.
    pub fn new(mode: RuntimeMode) -> Self {
        Self { mode }
    }
}

impl RuntimeHost for DryRunHost {
    fn current_mode(&self) -> RuntimeMode {
        self.mode
    }

    fn request_mode(&mut self, mode: RuntimeMode) {
        if mode != self.mode {
            tracing::info!(from = %self.mode, to = %mode, "Runtime mode change requested");
        }
        self.mode = mode;
    }
}

/// Playback driver that only tracks which sequence is bound.
#[derive(Debug, Default)]
pub struct DryRunPlayer {
    loaded: Option<String>,
    evaluations: u64,
}

impl PlaybackDriver for DryRunPlayer {
    fn load(&mut self, clip: &ControlClip) -> SeqrecResult<()> {
        tracing::debug!(
            sequence = %clip.sequence_name,
            offset_secs = clip.source_offset_secs,
            "Dry-run sequence loaded"
        );
        self.loaded = Some(clip.sequence_name.clone());
        self.evaluations = 0;
        Ok(())
    }

    fn evaluate(&mut self, source_time_secs: f64) -> SeqrecResult<()> {
        let Some(sequence) = &self.loaded else {
            return Err(SeqrecError::synthesis("evaluate called with nothing loaded"));
        };
        tracing::trace!(%sequence, source_time_secs, "Dry-run evaluation");
        self.evaluations += 1;
        Ok(())
    }

    fn unload(&mut self) {
        if let Some(sequence) = self.loaded.take() {
            tracing::debug!(%sequence, evaluations = self.evaluations, "Dry-run sequence unloaded");
        }
    }
}

/// Hands out sequential handles and tracks which are still live.
#[derive(Debug, Default)]
pub struct DryRunAssets {
    next: u64,
    live: BTreeSet<AssetHandle>,
}

impl DryRunAssets {
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl TransientAssets for DryRunAssets {
    fn allocate(&mut self, label: &str) -> AssetHandle {
        self.next += 1;
        let handle = AssetHandle(self.next);
        tracing::trace!(%handle, label, "Dry-run asset allocated");
        self.live.insert(handle);
        handle
    }

    fn release(&mut self, handle: AssetHandle) {
        if !self.live.remove(&handle) {
            tracing::warn!(%handle, "Released an asset that was not live");
        }
    }
}

impl Drop for DryRunAssets {
    fn drop(&mut self) {
        if !self.live.is_empty() {
            tracing::warn!(count = self.live.len(), "Dry-run assets still live at shutdown");
        }
    }
}

/// Creates [`ManifestBackend`]s that write into one directory.
///
/// Manifests are laid out as `<session>/<item>-<capture>-<name>.json`, so a
/// resumed process writes next to, never over, earlier items. A retried item
/// replaces its own manifests.
#[derive(Debug, Clone)]
pub struct ManifestBackends {
    dir: PathBuf,
}

impl ManifestBackends {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn manifest_path(&self, job: &CaptureJob) -> PathBuf {
        let origin = &job.origin;
        let session = if origin.session_id.is_empty() {
            "unsorted".to_string()
        } else {
            file_stem(&origin.session_id)
        };
        self.dir.join(session).join(format!(
            "{:03}-{:02}-{}.json",
            origin.item_index + 1,
            origin.capture_index + 1,
            file_stem(&job.name)
        ))
    }
}

impl BackendFactory for ManifestBackends {
    fn create(&mut self, job: &CaptureJob) -> SeqrecResult<Box<dyn CaptureBackend>> {
        Ok(Box::new(ManifestBackend {
            manifest_path: self.manifest_path(job),
            job: None,
            status: BackendStatus::Idle,
            stats: BackendStats::default(),
            first_time_secs: None,
            last_time_secs: None,
        }))
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Serialize)]
struct Manifest<'a> {
    job: &'a CaptureJob,
    frames_captured: u64,
    first_time_secs: Option<f64>,
    last_time_secs: Option<f64>,
    written_at: chrono::DateTime<Utc>,
}

/// Backend that records what it was fed and writes it out on stop.
pub struct ManifestBackend {
    manifest_path: PathBuf,
    job: Option<CaptureJob>,
    status: BackendStatus,
    stats: BackendStats,
    first_time_secs: Option<f64>,
    last_time_secs: Option<f64>,
}

impl ManifestBackend {
    fn write_manifest(&self, path: &Path) -> SeqrecResult<()> {
        let job = self
            .job
            .as_ref()
            .ok_or_else(|| SeqrecError::backend("stopped before it was started"))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manifest = Manifest {
            job,
            frames_captured: self.stats.frames_captured,
            first_time_secs: self.first_time_secs,
            last_time_secs: self.last_time_secs,
            written_at: Utc::now(),
        };
        std::fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(())
    }
}

impl CaptureBackend for ManifestBackend {
    fn start(&mut self, job: &CaptureJob) -> SeqrecResult<()> {
        tracing::debug!(capture = %job.name, output = %job.output_path.display(), "Dry-run capture started");
        self.job = Some(job.clone());
        self.status = BackendStatus::Running;
        Ok(())
    }

    fn capture_frame(&mut self, _frame: u64, time_secs: f64) -> SeqrecResult<()> {
        self.first_time_secs.get_or_insert(time_secs);
        self.last_time_secs = Some(time_secs);
        self.stats.frames_captured += 1;
        Ok(())
    }

    fn request_stop(&mut self) -> SeqrecResult<()> {
        self.status = BackendStatus::Flushing;
        Ok(())
    }

    fn poll(&mut self) -> BackendStatus {
        if self.status == BackendStatus::Flushing {
            let path = self.manifest_path.clone();
            self.status = match self.write_manifest(&path) {
                Ok(()) => {
                    tracing::debug!(manifest = %path.display(), "Dry-run manifest written");
                    BackendStatus::Succeeded
                }
                Err(e) => BackendStatus::Failed(e.to_string()),
            };
        }
        self.status.clone()
    }

    fn abort(&mut self) {
        self.status = BackendStatus::Failed("aborted".into());
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqrec_model::batch::CaptureDefaults;
    use seqrec_model::capture::CaptureKind;
    use seqrec_model::factory::create_default;
    use seqrec_model::sequence::SequenceId;
    use seqrec_orchestrator::backend::JobOrigin;
    use seqrec_orchestrator::graph::Span;

    fn job_for(item_index: usize) -> CaptureJob {
        let settings = create_default(CaptureKind::Video, &CaptureDefaults::default()).settings;
        CaptureJob {
            name: "Hero Movie".into(),
            kind: CaptureKind::Video,
            output_path: PathBuf::from("/proj/Recordings/Lvl1/Intro_1/movie.mp4"),
            channel_outputs: vec![],
            width: 1920,
            height: 1080,
            fps: 30.0,
            frame_count: 3,
            settings,
            origin: JobOrigin {
                session_id: "batch-1".into(),
                item_index,
                capture_index: 0,
            },
        }
    }

    fn job() -> CaptureJob {
        job_for(0)
    }

    fn run_backend(factory: &mut ManifestBackends, job: &CaptureJob, frames: u64) {
        let mut backend = factory.create(job).unwrap();
        backend.start(job).unwrap();
        for frame in 0..frames {
            backend.capture_frame(frame, frame as f64 / 30.0).unwrap();
        }
        backend.request_stop().unwrap();
        assert_eq!(backend.poll(), BackendStatus::Succeeded);
    }

    #[test]
    fn test_manifest_written_after_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let mut factory = ManifestBackends::new(tmp.path());
        run_backend(&mut factory, &job(), 3);

        let written =
            std::fs::read_to_string(tmp.path().join("batch_1/001-01-Hero_Movie.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["frames_captured"], 3);
        assert_eq!(value["job"]["name"], "Hero Movie");
    }

    #[test]
    fn test_abort_skips_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let mut factory = ManifestBackends::new(tmp.path());
        let job = job();
        let mut backend = factory.create(&job).unwrap();
        backend.start(&job).unwrap();
        backend.abort();
        assert!(backend.poll().is_terminal());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_resumed_process_keeps_earlier_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        run_backend(&mut ManifestBackends::new(tmp.path()), &job_for(0), 3);
        // A fresh factory, as built after the runtime restarts.
        run_backend(&mut ManifestBackends::new(tmp.path()), &job_for(1), 2);

        let session_dir = tmp.path().join("batch_1");
        let mut names: Vec<String> = std::fs::read_dir(&session_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["001-01-Hero_Movie.json", "002-01-Hero_Movie.json"]);

        let first: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(session_dir.join("001-01-Hero_Movie.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(first["frames_captured"], 3);
        assert_eq!(first["job"]["origin"]["item_index"], 0);
    }

    #[test]
    fn test_retried_item_replaces_its_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        run_backend(&mut ManifestBackends::new(tmp.path()), &job_for(0), 1);
        run_backend(&mut ManifestBackends::new(tmp.path()), &job_for(0), 3);

        let session_dir = tmp.path().join("batch_1");
        assert_eq!(std::fs::read_dir(&session_dir).unwrap().count(), 1);
        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(session_dir.join("001-01-Hero_Movie.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(value["frames_captured"], 3);
    }

    #[test]
    fn test_host_reports_requested_mode() {
        let mut host = DryRunHost::new(RuntimeMode::Edit);
        assert_eq!(host.current_mode(), RuntimeMode::Edit);
        host.request_mode(RuntimeMode::Capture);
        assert_eq!(host.current_mode(), RuntimeMode::Capture);
    }

    #[test]
    fn test_player_needs_a_loaded_sequence() {
        let mut player = DryRunPlayer::default();
        assert!(player.evaluate(0.0).is_err());

        let clip = ControlClip {
            sequence: SequenceId::new("Timelines/Intro"),
            sequence_name: "Intro".into(),
            span: Span::new(0.0, 1.0),
            source_offset_secs: 0.0,
            track: AssetHandle(1),
        };
        player.load(&clip).unwrap();
        player.evaluate(0.5).unwrap();
        assert_eq!(player.evaluations, 1);
        player.unload();
        assert!(player.evaluate(0.5).is_err());
    }

    #[test]
    fn test_assets_track_live_handles() {
        let mut assets = DryRunAssets::default();
        let a = assets.allocate("wrapper");
        let b = assets.allocate("track:control");
        assert_ne!(a, b);
        assert_eq!(assets.live_count(), 2);
        assets.release(a);
        assets.release(a);
        assets.release(b);
        assert_eq!(assets.live_count(), 0);
    }
}
