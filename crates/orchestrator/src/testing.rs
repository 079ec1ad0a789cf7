//! In-process collaborators for tests and dry runs.
//!
//! Every double keeps its state behind an `Arc<Mutex<..>>`, so the handle a
//! test keeps and the boxed copy given to the machine observe the same
//! state. Dropping a machine and building a new one from the same
//! [`SimRig`] and store is how a runtime restart is simulated.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use seqrec_common::error::{SeqrecError, SeqrecResult};

use crate::assets::{AssetHandle, TransientAssets};
use crate::backend::{BackendFactory, BackendStats, BackendStatus, CaptureBackend, CaptureJob};
use crate::graph::ControlClip;
use crate::host::{RuntimeHost, RuntimeMode};
use crate::machine::Collaborators;
use crate::playback::PlaybackDriver;
use crate::store::KeyValueStore;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoning is ignored; state stays readable after a panicking test.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runtime host that switches modes immediately and records every request.
#[derive(Debug, Clone)]
pub struct SimHost {
    state: Arc<Mutex<(RuntimeMode, Vec<RuntimeMode>)>>,
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new((RuntimeMode::Edit, Vec::new()))),
        }
    }

    pub fn mode(&self) -> RuntimeMode {
        lock(&self.state).0
    }

    pub fn requests(&self) -> Vec<RuntimeMode> {
        lock(&self.state).1.clone()
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeHost for SimHost {
    fn current_mode(&self) -> RuntimeMode {
        self.mode()
    }

    fn request_mode(&mut self, mode: RuntimeMode) {
        let mut state = lock(&self.state);
        state.0 = mode;
        state.1.push(mode);
    }
}

/// How a scripted backend behaves.
#[derive(Debug, Clone, Default)]
pub struct BackendScript {
    pub fail_on_start: bool,
    /// Fail when asked to capture this frame.
    pub fail_at_frame: Option<u64>,
    /// Report failure once flushing ends.
    pub fail_on_finish: bool,
    /// Polls spent in `Flushing` before reporting a terminal status.
    pub flush_ticks: u32,
}

/// What scripted backends have been asked to do.
#[derive(Debug, Clone, Default)]
pub struct BackendLog {
    pub jobs: Vec<CaptureJob>,
    pub frames: HashMap<String, Vec<u64>>,
    pub aborted: Vec<String>,
    pub finished: Vec<String>,
}

/// Backend factory whose backends follow a per-capture [`BackendScript`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackends {
    scripts: Arc<Mutex<HashMap<String, BackendScript>>>,
    log: Arc<Mutex<BackendLog>>,
}

impl ScriptedBackends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the backend created for captures named `capture`.
    pub fn script(&self, capture: &str, script: BackendScript) {
        lock(&self.scripts).insert(capture.to_string(), script);
    }

    pub fn log(&self) -> BackendLog {
        lock(&self.log).clone()
    }

    /// Frames delivered to captures named `capture`, across all runs.
    pub fn frames(&self, capture: &str) -> Vec<u64> {
        lock(&self.log)
            .frames
            .get(capture)
            .cloned()
            .unwrap_or_default()
    }

    pub fn aborted(&self) -> Vec<String> {
        lock(&self.log).aborted.clone()
    }
}

impl BackendFactory for ScriptedBackends {
    fn create(&mut self, job: &CaptureJob) -> SeqrecResult<Box<dyn CaptureBackend>> {
        let script = lock(&self.scripts)
            .get(&job.name)
            .cloned()
            .unwrap_or_default();
        lock(&self.log).jobs.push(job.clone());
        Ok(Box::new(ScriptedBackend {
            name: job.name.clone(),
            script,
            log: Arc::clone(&self.log),
            status: BackendStatus::Idle,
            stats: BackendStats::default(),
            flush_left: 0,
        }))
    }
}

struct ScriptedBackend {
    name: String,
    script: BackendScript,
    log: Arc<Mutex<BackendLog>>,
    status: BackendStatus,
    stats: BackendStats,
    flush_left: u32,
}

impl CaptureBackend for ScriptedBackend {
    fn start(&mut self, _job: &CaptureJob) -> SeqrecResult<()> {
        if self.script.fail_on_start {
            self.status = BackendStatus::Failed("failed to open output".into());
            return Err(SeqrecError::backend(format!(
                "{}: failed to open output",
                self.name
            )));
        }
        self.status = BackendStatus::Running;
        Ok(())
    }

    fn capture_frame(&mut self, frame: u64, _time_secs: f64) -> SeqrecResult<()> {
        if self.script.fail_at_frame == Some(frame) {
            return Err(SeqrecError::backend(format!(
                "{}: encoder rejected frame {frame}",
                self.name
            )));
        }
        lock(&self.log)
            .frames
            .entry(self.name.clone())
            .or_default()
            .push(frame);
        self.stats.frames_captured += 1;
        Ok(())
    }

    fn request_stop(&mut self) -> SeqrecResult<()> {
        self.status = BackendStatus::Flushing;
        self.flush_left = self.script.flush_ticks;
        Ok(())
    }

    fn poll(&mut self) -> BackendStatus {
        if self.status == BackendStatus::Flushing {
            if self.flush_left == 0 {
                self.status = if self.script.fail_on_finish {
                    BackendStatus::Failed(format!("{}: finalize failed", self.name))
                } else {
                    BackendStatus::Succeeded
                };
                lock(&self.log).finished.push(self.name.clone());
            } else {
                self.flush_left -= 1;
            }
        }
        self.status.clone()
    }

    fn abort(&mut self) {
        lock(&self.log).aborted.push(self.name.clone());
        self.status = BackendStatus::Failed("aborted".into());
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}

#[derive(Debug, Default)]
struct PlayerState {
    loaded: Vec<String>,
    current: Option<String>,
    evaluations: Vec<f64>,
    unloads: usize,
    fail_on_load: BTreeSet<String>,
}

/// Playback driver that records what it was asked to play.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlayer {
    state: Arc<Mutex<PlayerState>>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load` fail for the sequence named `name`.
    pub fn fail_on_load(&self, name: &str) {
        lock(&self.state).fail_on_load.insert(name.to_string());
    }

    /// Names of loaded sequences, in load order.
    pub fn loaded(&self) -> Vec<String> {
        lock(&self.state).loaded.clone()
    }

    /// Source times evaluated, across all loads.
    pub fn evaluations(&self) -> Vec<f64> {
        lock(&self.state).evaluations.clone()
    }

    pub fn unloads(&self) -> usize {
        lock(&self.state).unloads
    }

    pub fn is_loaded(&self) -> bool {
        lock(&self.state).current.is_some()
    }
}

impl PlaybackDriver for RecordingPlayer {
    fn load(&mut self, clip: &ControlClip) -> SeqrecResult<()> {
        let mut state = lock(&self.state);
        if state.fail_on_load.contains(&clip.sequence_name) {
            return Err(SeqrecError::invalid_source(
                &clip.sequence_name,
                "sequence asset could not be loaded",
            ));
        }
        state.loaded.push(clip.sequence_name.clone());
        state.current = Some(clip.sequence_name.clone());
        Ok(())
    }

    fn evaluate(&mut self, source_time_secs: f64) -> SeqrecResult<()> {
        let mut state = lock(&self.state);
        if state.current.is_none() {
            return Err(SeqrecError::synthesis("evaluate called with nothing loaded"));
        }
        state.evaluations.push(source_time_secs);
        Ok(())
    }

    fn unload(&mut self) {
        let mut state = lock(&self.state);
        state.current = None;
        state.unloads += 1;
    }
}

#[derive(Debug, Default)]
struct AssetLedger {
    next: u64,
    live: BTreeSet<u64>,
    allocated: u64,
}

/// Transient-asset allocator that tracks what is still live.
#[derive(Debug, Clone, Default)]
pub struct CountingAssets {
    ledger: Arc<Mutex<AssetLedger>>,
}

impl CountingAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.ledger).live.len()
    }

    pub fn total_allocated(&self) -> u64 {
        lock(&self.ledger).allocated
    }
}

impl TransientAssets for CountingAssets {
    fn allocate(&mut self, label: &str) -> AssetHandle {
        let mut ledger = lock(&self.ledger);
        ledger.next += 1;
        ledger.allocated += 1;
        let id = ledger.next;
        ledger.live.insert(id);
        tracing::trace!(id, label, "Allocated transient asset");
        AssetHandle(id)
    }

    fn release(&mut self, handle: AssetHandle) {
        lock(&self.ledger).live.remove(&handle.0);
    }
}

/// One set of shared doubles. Each call to [`SimRig::collaborators`] hands
/// out fresh boxes over the same state.
#[derive(Debug, Clone, Default)]
pub struct SimRig {
    pub host: SimHost,
    pub backends: ScriptedBackends,
    pub player: RecordingPlayer,
    pub assets: CountingAssets,
}

impl SimRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collaborators(&self, store: Box<dyn KeyValueStore>) -> Collaborators {
        Collaborators {
            store,
            host: Box::new(self.host.clone()),
            backends: Box::new(self.backends.clone()),
            player: Box::new(self.player.clone()),
            assets: Box::new(self.assets.clone()),
            scene: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_host_switches_immediately() {
        let host = SimHost::new();
        let mut boxed: Box<dyn RuntimeHost> = Box::new(host.clone());
        boxed.request_mode(RuntimeMode::Capture);
        assert_eq!(host.mode(), RuntimeMode::Capture);
        assert_eq!(host.requests(), vec![RuntimeMode::Capture]);
    }

    #[test]
    fn test_counting_assets_tracks_live_handles() {
        let assets = CountingAssets::new();
        let mut boxed = assets.clone();
        let a = boxed.allocate("a");
        let _b = boxed.allocate("b");
        boxed.release(a);
        assert_eq!(assets.live_count(), 1);
        assert_eq!(assets.total_allocated(), 2);
    }
}
