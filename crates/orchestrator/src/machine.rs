//! Batch session state machine.
//!
//! ```text
//! Idle ─start─▶ Preparing ─(restart)─resume─▶ Executing(i) ─▶ Executing(i+1) …
//!                                                  │
//!                                                  ├─▶ Completed
//!                                                  ├─▶ Cancelled
//!                                                  └─▶ FailedFatal
//! ```
//!
//! Each `Executing(i)` walks `GraphBuilt → Playing → Flushing → ItemDone`,
//! one step per [`SessionMachine::tick`]. While playing, every tick
//! evaluates the scene at one frame and hands that frame to every capture
//! backend, so playback and capture stay in lock-step.
//!
//! Entering capture mode restarts the runtime. `start` therefore persists
//! the session before asking for the mode switch, and `resume` rebuilds
//! everything from the persisted record.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use seqrec_common::clock::SessionClock;
use seqrec_common::config::{AppConfig, SessionPolicy};
use seqrec_common::error::{SeqrecError, SeqrecResult};
use seqrec_model::batch::{
    BatchItem, BatchSession, CaptureDefaults, CaptureOutcome, ItemRecord, ItemStatus,
    SessionStage,
};
use seqrec_model::capture::CaptureKind;
use seqrec_model::scene::SceneResolver;

use crate::assets::TransientAssets;
use crate::backend::{BackendFactory, BackendStats, BackendStatus, CaptureBackend};
use crate::graph::WrapperGraph;
use crate::host::{RuntimeHost, RuntimeMode};
use crate::playback::PlaybackDriver;
use crate::store::{KeyValueStore, SessionStore};
use crate::synth::{Synthesis, Synthesizer};

/// Sub-state of an executing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    /// Wrapper graph synthesized, backends started.
    GraphBuilt,
    /// Stepping frames.
    Playing,
    /// All frames delivered; waiting for backends to finalize.
    Flushing,
    /// Every backend reported a terminal status.
    ItemDone,
}

/// Machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MachineState {
    #[default]
    Idle,
    /// Session persisted; waiting for the capture-mode restart.
    Preparing,
    Executing {
        index: usize,
        phase: ItemPhase,
    },
    Completed,
    Cancelled,
    /// Persisted session was older than the abandonment window.
    Abandoned,
    /// Persisted state could not be trusted.
    FailedFatal,
}

impl MachineState {
    pub fn is_active(&self) -> bool {
        matches!(self, MachineState::Preparing | MachineState::Executing { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MachineState::Completed
                | MachineState::Cancelled
                | MachineState::Abandoned
                | MachineState::FailedFatal
        )
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::Idle => f.write_str("idle"),
            MachineState::Preparing => f.write_str("preparing"),
            MachineState::Executing { index, phase } => {
                write!(f, "executing item {} ({phase:?})", index + 1)
            }
            MachineState::Completed => f.write_str("completed"),
            MachineState::Cancelled => f.write_str("cancelled"),
            MachineState::Abandoned => f.write_str("abandoned"),
            MachineState::FailedFatal => f.write_str("failed (fatal)"),
        }
    }
}

/// Result of [`SessionMachine::resume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No persisted session was waiting.
    NothingToResume,
    /// Execution continues at `index`.
    Resumed { session_id: String, index: usize },
    /// The persisted session was too old and has been archived.
    Abandoned { session_id: String },
}

/// Where outputs go and how recovery behaves.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub project_root: PathBuf,
    pub permitted_root: Option<PathBuf>,
    pub policy: SessionPolicy,
}

impl MachineConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            permitted_root: None,
            policy: SessionPolicy::default(),
        }
    }

    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            project_root: config.project_root.clone(),
            permitted_root: config.permitted_root.clone(),
            policy: config.session.clone(),
        }
    }
}

/// External collaborators the machine drives.
pub struct Collaborators {
    pub store: Box<dyn KeyValueStore>,
    pub host: Box<dyn RuntimeHost>,
    pub backends: Box<dyn BackendFactory>,
    pub player: Box<dyn PlaybackDriver>,
    pub assets: Box<dyn TransientAssets>,
    /// Active scene, for target checks during synthesis.
    pub scene: Option<Box<dyn SceneResolver + Send>>,
}

/// Live state of one capture backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureProgress {
    pub name: String,
    pub kind: CaptureKind,
    pub status: BackendStatus,
    pub stats: BackendStats,
}

/// Snapshot returned by [`SessionMachine::progress`].
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub session_id: String,
    pub state: MachineState,
    pub current_index: usize,
    pub total: usize,
    pub statuses: Vec<ItemStatus>,
    /// Seconds since the session was created. Survives restarts.
    pub elapsed_secs: f64,
    /// Extrapolated from the completed fraction; `None` before any progress.
    pub estimated_remaining_secs: Option<f64>,
    /// Frames delivered for the current item, as a fraction.
    pub current_item_fraction: f64,
    pub captures: Vec<CaptureProgress>,
}

impl Progress {
    /// Estimate progress from a persisted record alone.
    pub fn from_session(session: &BatchSession, state: MachineState) -> Self {
        Self::estimate(session, state, 0.0, Vec::new(), Utc::now())
    }

    fn estimate(
        session: &BatchSession,
        state: MachineState,
        current_item_fraction: f64,
        captures: Vec<CaptureProgress>,
        now: DateTime<Utc>,
    ) -> Self {
        let elapsed_secs = SessionClock::from_anchor(session.created_at).elapsed_secs_at(now);
        let total = session.len();
        let fraction = if total == 0 {
            1.0
        } else {
            (session.finished_count() as f64 + current_item_fraction) / total as f64
        };
        let estimated_remaining_secs = if fraction >= 1.0 || state.is_terminal() {
            Some(0.0)
        } else if fraction > 0.0 {
            Some(elapsed_secs * (1.0 - fraction) / fraction)
        } else {
            None
        };
        Self {
            session_id: session.id.clone(),
            state,
            current_index: session.current_index,
            total,
            statuses: session.statuses(),
            elapsed_secs,
            estimated_remaining_secs,
            current_item_fraction,
            captures,
        }
    }

    /// Overall completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        let finished = self.statuses.iter().filter(|s| s.is_terminal()).count();
        ((finished as f64 + self.current_item_fraction) / self.total as f64).min(1.0)
    }
}

struct ActiveCapture {
    /// `None` when the backend could not be created or started.
    backend: Option<Box<dyn CaptureBackend>>,
    status: BackendStatus,
}

impl ActiveCapture {
    fn fail(&mut self, reason: String) {
        if let Some(backend) = self.backend.as_mut() {
            backend.abort();
        }
        self.status = BackendStatus::Failed(reason);
    }

    fn frames_captured(&self) -> u64 {
        self.backend
            .as_ref()
            .map(|b| b.stats().frames_captured)
            .unwrap_or(0)
    }
}

/// The item currently owning the scene.
struct ActiveItem {
    index: usize,
    graph: WrapperGraph,
    captures: Vec<ActiveCapture>,
    frame: u64,
    phase: ItemPhase,
}

impl ActiveItem {
    fn fraction(&self) -> f64 {
        match self.phase {
            ItemPhase::GraphBuilt => 0.0,
            ItemPhase::Playing => {
                if self.graph.frame_count == 0 {
                    0.0
                } else {
                    self.frame as f64 / self.graph.frame_count as f64
                }
            }
            ItemPhase::Flushing | ItemPhase::ItemDone => 1.0,
        }
    }
}

/// Sequences batch items through synthesis, playback and capture.
pub struct SessionMachine {
    config: MachineConfig,
    synth: Synthesizer,
    store: SessionStore,
    host: Box<dyn RuntimeHost>,
    backends: Box<dyn BackendFactory>,
    player: Box<dyn PlaybackDriver>,
    assets: Box<dyn TransientAssets>,
    scene: Option<Box<dyn SceneResolver + Send>>,
    session: Option<BatchSession>,
    state: MachineState,
    active: Option<ActiveItem>,
    cancel_flag: Arc<AtomicBool>,
}

impl SessionMachine {
    pub fn new(config: MachineConfig, collaborators: Collaborators) -> Self {
        let synth = Synthesizer::new(config.project_root.clone())
            .with_permitted_root(config.permitted_root.clone());
        Self {
            config,
            synth,
            store: SessionStore::new(collaborators.store),
            host: collaborators.host,
            backends: collaborators.backends,
            player: collaborators.player,
            assets: collaborators.assets,
            scene: collaborators.scene,
            session: None,
            state: MachineState::Idle,
            active: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn session(&self) -> Option<&BatchSession> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Active scene used for target lookups.
    pub fn scene(&self) -> Option<&dyn SceneResolver> {
        self.scene.as_deref().map(|s| s as &dyn SceneResolver)
    }

    /// Flag that requests cancellation at the next tick when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Persist `session` and request the capture-mode switch.
    ///
    /// The record is written before the mode request, since the switch
    /// wipes in-memory state.
    pub fn start(&mut self, mut session: BatchSession) -> SeqrecResult<()> {
        if self.state.is_active() {
            let session_id = self
                .session
                .as_ref()
                .map(|s| s.id.clone())
                .unwrap_or_default();
            return Err(SeqrecError::SessionAlreadyRunning { session_id });
        }
        if let Ok(Some(existing)) = self.store.load_active() {
            if !existing.stage.is_terminal() {
                return Err(SeqrecError::SessionAlreadyRunning {
                    session_id: existing.id,
                });
            }
        }
        if session.is_empty() {
            return Err(SeqrecError::configuration("batch session has no items"));
        }
        session
            .check_integrity()
            .map_err(|e| SeqrecError::configuration(format!("batch session is inconsistent: {e}")))?;

        session.stage = SessionStage::Preparing;
        self.store.save_active(&mut session)?;
        self.cancel_flag.store(false, Ordering::SeqCst);
        self.active = None;

        tracing::info!(
            session_id = %session.id,
            items = session.len(),
            "Batch session persisted; requesting capture mode"
        );
        self.session = Some(session);
        self.state = MachineState::Preparing;
        self.host.request_mode(RuntimeMode::Capture);
        Ok(())
    }

    /// Rehydrate the persisted session after a mode switch and enter its
    /// current item.
    ///
    /// A record that is missing while its marker is present, corrupt, or
    /// inconsistent is fatal to the session: the machine moves to
    /// `FailedFatal` and the `SessionIntegrity` error is returned.
    pub fn resume(&mut self) -> SeqrecResult<ResumeOutcome> {
        if matches!(self.state, MachineState::Executing { .. }) {
            let session_id = self
                .session
                .as_ref()
                .map(|s| s.id.clone())
                .unwrap_or_default();
            return Err(SeqrecError::SessionAlreadyRunning { session_id });
        }

        let marker = self.store.marker()?;
        let loaded = match self.store.load_active() {
            Ok(loaded) => loaded,
            Err(e) if e.is_fatal() => return Err(self.fail_fatal(e)),
            Err(e) => return Err(e),
        };
        let mut session = match (loaded, marker.clone()) {
            (Some(session), _) => session,
            (None, Some(id)) => {
                return Err(self.fail_fatal(SeqrecError::session_integrity(format!(
                    "session record for {id} is missing"
                ))));
            }
            (None, None) => {
                tracing::debug!("No persisted batch session to resume");
                return Ok(ResumeOutcome::NothingToResume);
            }
        };

        if let Some(id) = marker {
            if id != session.id {
                let err = SeqrecError::session_integrity(format!(
                    "session marker names {id} but the record holds {}",
                    session.id
                ));
                self.session = Some(session);
                return Err(self.fail_fatal(err));
            }
        }
        if let Err(e) = session.check_integrity() {
            self.session = Some(session);
            return Err(self.fail_fatal(SeqrecError::session_integrity(e)));
        }

        if session.stage.is_terminal() {
            // Archiving was interrupted; finish it.
            self.store.archive(&mut session)?;
            return Ok(ResumeOutcome::NothingToResume);
        }

        let age_secs = Utc::now()
            .signed_duration_since(session.checkpoint_at)
            .num_seconds();
        if age_secs > self.config.policy.abandon_after_secs as i64 {
            tracing::warn!(
                session_id = %session.id,
                age_secs,
                "Batch session was never resumed; archiving as abandoned"
            );
            session.stage = SessionStage::Abandoned;
            self.store.archive(&mut session)?;
            let session_id = session.id.clone();
            self.session = Some(session);
            self.state = MachineState::Abandoned;
            self.host.request_mode(RuntimeMode::Edit);
            return Ok(ResumeOutcome::Abandoned { session_id });
        }

        if self.host.current_mode() != RuntimeMode::Capture {
            tracing::warn!(
                mode = %self.host.current_mode(),
                "Resuming batch session outside capture mode"
            );
        }

        session.stage = SessionStage::Executing;
        let session_id = session.id.clone();
        let index = session.current_index;
        tracing::info!(
            session_id = %session_id,
            index,
            items = session.len(),
            "Batch session rehydrated"
        );
        self.session = Some(session);
        self.active = None;
        self.state = MachineState::Executing {
            index,
            phase: ItemPhase::GraphBuilt,
        };
        self.enter_item()?;
        Ok(ResumeOutcome::Resumed { session_id, index })
    }

    /// Advance by one scheduler tick.
    pub fn tick(&mut self) -> SeqrecResult<MachineState> {
        match self.state {
            MachineState::Preparing if self.cancel_requested() => self.finish_cancel()?,
            MachineState::Executing { .. } => {
                if self.cancel_requested() {
                    self.finish_cancel()?;
                } else {
                    self.step()?;
                }
            }
            _ => {}
        }
        Ok(self.state)
    }

    /// Request cancellation.
    ///
    /// While executing, resources are released on the next tick. A session
    /// still waiting for the mode switch is cancelled immediately.
    pub fn cancel(&mut self) -> SeqrecResult<()> {
        match self.state {
            MachineState::Preparing => self.finish_cancel(),
            MachineState::Executing { index, .. } => {
                tracing::info!(index, "Cancellation requested");
                self.cancel_flag.store(true, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(SeqrecError::NoActiveSession),
        }
    }

    /// Progress of the current session, if any.
    pub fn progress(&self) -> Option<Progress> {
        let session = self.session.as_ref()?;
        let (fraction, captures) = match &self.active {
            Some(active) => (
                active.fraction(),
                active
                    .graph
                    .captures
                    .iter()
                    .zip(&active.captures)
                    .map(|(clip, cap)| CaptureProgress {
                        name: clip.name.clone(),
                        kind: clip.kind,
                        status: cap.status.clone(),
                        stats: cap
                            .backend
                            .as_ref()
                            .map(|b| b.stats())
                            .unwrap_or_default(),
                    })
                    .collect(),
            ),
            None => (0.0, Vec::new()),
        };
        Some(Progress::estimate(
            session,
            self.state,
            fraction,
            captures,
            Utc::now(),
        ))
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Enter the item at the current index, skipping or failing items that
    /// cannot run, until one is executing or the batch is done.
    fn enter_item(&mut self) -> SeqrecResult<()> {
        let max_attempts = self.config.policy.max_item_attempts;
        loop {
            let Some(session) = self.session.as_mut() else {
                return Err(SeqrecError::NoActiveSession);
            };
            let index = session.current_index;
            if index >= session.len() {
                return self.complete();
            }
            let item = session.items[index].clone();
            let record = &mut session.records[index];
            let now = Utc::now();

            if record.status.is_terminal() {
                self.advance()?;
                continue;
            }

            if let Some(reason) = skip_reason(&item) {
                tracing::info!(index, item = %item.sequence.name, reason, "Skipping batch item");
                record.status = ItemStatus::Skipped;
                record.warnings.push(format!("Skipped: {reason}"));
                record.finished_at = Some(now);
                self.advance()?;
                continue;
            }

            if record.status == ItemStatus::Running {
                tracing::warn!(
                    index,
                    item = %item.sequence.name,
                    attempts = record.attempts,
                    "Item was interrupted by a runtime restart"
                );
                record.warnings.push(format!(
                    "Attempt {} interrupted by a runtime restart; partial output discarded",
                    record.attempts
                ));
                if record.attempts >= max_attempts {
                    record.status = ItemStatus::Failed;
                    record.error = Some(format!("gave up after {} attempts", record.attempts));
                    record.finished_at = Some(now);
                    self.advance()?;
                    continue;
                }
            }

            record.attempts += 1;
            record.status = ItemStatus::Running;
            record.started_at = Some(now);
            record.finished_at = None;
            record.error = None;
            record.captures.clear();
            let defaults = session.defaults.clone();
            let timestamp = session.created_at;
            self.store.save_active(session)?;

            tracing::info!(index, item = %item.sequence.name, "Entering batch item");
            match self.build_item(index, &item, &defaults, timestamp) {
                Ok(active) => {
                    self.state = MachineState::Executing {
                        index,
                        phase: active.phase,
                    };
                    self.active = Some(active);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(index, item = %item.sequence.name, error = %e, "Batch item failed before playback");
                    if let Some(record) = self.record_mut(index) {
                        record.status = ItemStatus::Failed;
                        record.error = Some(e.to_string());
                        record.finished_at = Some(Utc::now());
                    }
                    self.advance()?;
                }
            }
        }
    }

    /// Synthesize the wrapper graph, bind playback and start backends.
    fn build_item(
        &mut self,
        index: usize,
        item: &BatchItem,
        defaults: &CaptureDefaults,
        timestamp: DateTime<Utc>,
    ) -> SeqrecResult<ActiveItem> {
        let scene = self.scene.as_deref().map(|s| s as &dyn SceneResolver);
        let Synthesis { mut graph, warnings } =
            self.synth
                .synthesize(item, defaults, timestamp, scene, self.assets.as_mut())?;
        let session_id = self.session.as_ref().map(|s| s.id.clone()).unwrap_or_default();
        graph.assign_origin(&session_id, index);
        if let Some(record) = self.record_mut(index) {
            record.warnings.extend(warnings);
        }

        if let Err(e) = self.player.load(&graph.control) {
            graph.teardown(self.assets.as_mut());
            return Err(e);
        }

        let mut captures = Vec::with_capacity(graph.captures.len());
        for clip in &graph.captures {
            let started = self.backends.create(&clip.job).and_then(|mut backend| {
                backend.start(&clip.job)?;
                Ok(backend)
            });
            match started {
                Ok(backend) => captures.push(ActiveCapture {
                    backend: Some(backend),
                    status: BackendStatus::Running,
                }),
                Err(e) => {
                    tracing::warn!(capture = %clip.name, error = %e, "Capture backend failed to start");
                    captures.push(ActiveCapture {
                        backend: None,
                        status: BackendStatus::Failed(e.to_string()),
                    });
                }
            }
        }

        Ok(ActiveItem {
            index,
            graph,
            captures,
            frame: 0,
            phase: ItemPhase::GraphBuilt,
        })
    }

    /// One phase step of the executing item.
    fn step(&mut self) -> SeqrecResult<()> {
        let Some(active) = self.active.as_mut() else {
            return self.enter_item();
        };

        match active.phase {
            ItemPhase::GraphBuilt => {
                tracing::info!(index = active.index, frames = active.graph.frame_count, "Playing");
                active.phase = ItemPhase::Playing;
            }
            ItemPhase::Playing => {
                let frame = active.frame;
                let source_time = active.graph.source_time(frame);
                let wrapper_time = active.graph.wrapper_time(frame);
                tracing::trace!(index = active.index, frame, source_time, "Frame");

                if let Err(e) = self.player.evaluate(source_time) {
                    tracing::warn!(index = active.index, frame, error = %e, "Playback failed");
                    for cap in &mut active.captures {
                        if !cap.status.is_terminal() {
                            cap.fail(format!("playback failed: {e}"));
                        }
                    }
                    active.phase = ItemPhase::ItemDone;
                } else {
                    for (cap, clip) in active.captures.iter_mut().zip(&active.graph.captures) {
                        if cap.status != BackendStatus::Running {
                            continue;
                        }
                        let result = match cap.backend.as_mut() {
                            Some(backend) => backend.capture_frame(frame, wrapper_time),
                            None => continue,
                        };
                        if let Err(e) = result {
                            tracing::warn!(capture = %clip.name, frame, error = %e, "Capture backend failed");
                            cap.fail(e.to_string());
                        }
                    }
                    active.frame += 1;

                    if active.frame >= active.graph.frame_count {
                        for cap in &mut active.captures {
                            if cap.status != BackendStatus::Running {
                                continue;
                            }
                            let result = match cap.backend.as_mut() {
                                Some(backend) => backend.request_stop(),
                                None => continue,
                            };
                            match result {
                                Ok(()) => cap.status = BackendStatus::Flushing,
                                Err(e) => cap.fail(e.to_string()),
                            }
                        }
                        tracing::debug!(index = active.index, "All frames delivered; flushing");
                        active.phase = ItemPhase::Flushing;
                    }
                }
            }
            ItemPhase::Flushing => {
                for cap in &mut active.captures {
                    if cap.status.is_terminal() {
                        continue;
                    }
                    if let Some(backend) = cap.backend.as_mut() {
                        let status = backend.poll();
                        cap.status = if status.is_terminal() {
                            status
                        } else {
                            BackendStatus::Flushing
                        };
                    }
                }
                if active.captures.iter().all(|c| c.status.is_terminal()) {
                    active.phase = ItemPhase::ItemDone;
                }
            }
            ItemPhase::ItemDone => return self.finish_item(),
        }

        self.state = MachineState::Executing {
            index: active.index,
            phase: active.phase,
        };
        Ok(())
    }

    /// Record capture outcomes, release the graph and move on.
    fn finish_item(&mut self) -> SeqrecResult<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let index = active.index;
        let outcomes = self.release_item(active, None);
        let failed = outcomes.iter().filter(|o| !o.succeeded).count();

        if let Some(record) = self.record_mut(index) {
            record.status = if failed == 0 {
                ItemStatus::Completed
            } else {
                ItemStatus::Failed
            };
            if failed > 0 {
                record.error = Some(format!(
                    "{failed} of {} captures failed",
                    outcomes.len()
                ));
            }
            record.captures = outcomes;
            record.finished_at = Some(Utc::now());
            tracing::info!(
                index,
                status = ?record.status,
                warnings = record.warnings.len(),
                "Batch item finished"
            );
        }

        self.advance()?;
        self.enter_item()
    }

    /// Abort unfinished backends, unload playback, tear the graph down and
    /// collect capture outcomes. `abort_reason` marks unfinished captures.
    fn release_item(
        &mut self,
        active: ActiveItem,
        abort_reason: Option<&str>,
    ) -> Vec<CaptureOutcome> {
        let ActiveItem {
            graph,
            mut captures,
            ..
        } = active;

        for cap in &mut captures {
            if !cap.status.is_terminal() {
                cap.fail(abort_reason.unwrap_or("aborted").to_string());
            }
        }
        self.player.unload();

        let outcomes = graph
            .captures
            .iter()
            .zip(&captures)
            .map(|(clip, cap)| CaptureOutcome {
                name: clip.name.clone(),
                kind: clip.kind,
                output_path: clip.job.output_path.clone(),
                succeeded: cap.status == BackendStatus::Succeeded,
                frames_captured: cap.frames_captured(),
                error: match &cap.status {
                    BackendStatus::Failed(message) => Some(message.clone()),
                    _ => None,
                },
            })
            .collect();

        drop(captures);
        graph.teardown(self.assets.as_mut());
        outcomes
    }

    fn record_mut(&mut self, index: usize) -> Option<&mut ItemRecord> {
        self.session
            .as_mut()
            .and_then(|s| s.records.get_mut(index))
    }

    /// Move the cursor past the current item and checkpoint.
    fn advance(&mut self) -> SeqrecResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(SeqrecError::NoActiveSession);
        };
        session.current_index += 1;
        self.store.save_active(session)
    }

    fn complete(&mut self) -> SeqrecResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(SeqrecError::NoActiveSession);
        };
        session.stage = SessionStage::Completed;
        self.store.archive(session)?;

        let statuses = session.statuses();
        tracing::info!(
            session_id = %session.id,
            completed = statuses.iter().filter(|s| **s == ItemStatus::Completed).count(),
            failed = statuses.iter().filter(|s| **s == ItemStatus::Failed).count(),
            skipped = statuses.iter().filter(|s| **s == ItemStatus::Skipped).count(),
            "Batch session completed"
        );
        self.state = MachineState::Completed;
        self.host.request_mode(RuntimeMode::Edit);
        Ok(())
    }

    fn finish_cancel(&mut self) -> SeqrecResult<()> {
        self.cancel_flag.store(false, Ordering::SeqCst);
        if let Some(active) = self.active.take() {
            let index = active.index;
            let outcomes = self.release_item(active, Some("cancelled"));
            if let Some(record) = self.record_mut(index) {
                record.status = ItemStatus::Cancelled;
                record.captures = outcomes;
                record.finished_at = Some(Utc::now());
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.stage = SessionStage::Cancelled;
            self.store.archive(session)?;
            tracing::info!(
                session_id = %session.id,
                index = session.current_index,
                "Batch session cancelled"
            );
        }
        self.state = MachineState::Cancelled;
        self.host.request_mode(RuntimeMode::Edit);
        Ok(())
    }

    /// Move to `FailedFatal`, releasing whatever is live. Returns `err`.
    fn fail_fatal(&mut self, err: SeqrecError) -> SeqrecError {
        tracing::error!(error = %err, "Batch session cannot continue");
        if let Some(active) = self.active.take() {
            self.release_item(active, Some("session failed"));
        }
        let persisted = match self.session.as_mut() {
            Some(session) => {
                session.stage = SessionStage::FailedFatal;
                self.store.archive(session)
            }
            None => self.store.clear_active(),
        };
        if let Err(e) = persisted {
            tracing::warn!(error = %e, "Failed to record fatal session state");
        }
        self.state = MachineState::FailedFatal;
        self.host.request_mode(RuntimeMode::Edit);
        err
    }
}

impl fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMachine")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("session", &self.session.as_ref().map(|s| &s.id))
            .finish_non_exhaustive()
    }
}

fn skip_reason(item: &BatchItem) -> Option<&'static str> {
    if !item.enabled {
        Some("item disabled")
    } else if item.enabled_captures().next().is_none() {
        Some("no enabled captures")
    } else {
        None
    }
}
