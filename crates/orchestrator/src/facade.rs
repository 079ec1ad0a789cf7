//! Orchestration facade used by the CLI and other front ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use seqrec_common::config::AppConfig;
use seqrec_common::error::{SeqrecError, SeqrecResult};
use seqrec_model::batch::BatchSession;
use seqrec_model::repair::{repair_until_stable, RepairContext, RepairReport};
use seqrec_model::validate::{validate_item_with_captures, ValidationContext};

use crate::machine::{
    Collaborators, MachineConfig, MachineState, Progress, ResumeOutcome, SessionMachine,
};

/// Facade settings.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub machine: MachineConfig,
    /// Run the repair driver over every capture before starting.
    pub auto_repair: bool,
    /// Refuse to start while configuration errors remain.
    pub strict: bool,
    pub max_repair_iterations: usize,
}

impl OrchestratorOptions {
    pub fn new(machine: MachineConfig) -> Self {
        Self {
            machine,
            auto_repair: true,
            strict: false,
            max_repair_iterations: 5,
        }
    }

    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            machine: MachineConfig::from_app(config),
            auto_repair: true,
            strict: false,
            max_repair_iterations: config.repair.max_iterations,
        }
    }

    pub fn with_auto_repair(mut self, enabled: bool) -> Self {
        self.auto_repair = enabled;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Repairs applied to one capture during preflight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRepair {
    pub item: usize,
    pub capture: String,
    pub report: RepairReport,
}

/// What preflight found and changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub repairs: Vec<CaptureRepair>,
    /// Remaining errors, prefixed with the item they belong to.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Entry point for starting, driving and querying batch sessions.
#[derive(Debug)]
pub struct Orchestrator {
    machine: SessionMachine,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(options: OrchestratorOptions, collaborators: Collaborators) -> Self {
        Self {
            machine: SessionMachine::new(options.machine.clone(), collaborators),
            options,
        }
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn state(&self) -> MachineState {
        self.machine.state()
    }

    pub fn session(&self) -> Option<&BatchSession> {
        self.machine.session()
    }

    /// Repair (when enabled) and validate every item of `session`.
    pub fn preflight(&self, session: &mut BatchSession) -> PreflightReport {
        let mut report = PreflightReport::default();
        let config = self.machine.config();
        let defaults = session.defaults.clone();
        let mut ctx = ValidationContext::new(&defaults, &config.project_root)
            .with_permitted_root(config.permitted_root.as_deref());
        if let Some(scene) = self.machine.scene() {
            ctx = ctx.with_scene(scene);
        }

        for (index, item) in session.items.iter_mut().enumerate() {
            let item_ctx = ctx.with_timeline_fps(item.effective_fps(&defaults));
            if self.options.auto_repair {
                let repair_ctx = RepairContext::new(item_ctx);
                for capture in item.captures.iter_mut().filter(|c| c.enabled) {
                    let capture_report =
                        repair_until_stable(capture, &repair_ctx, self.options.max_repair_iterations);
                    if capture_report.changed() {
                        report.repairs.push(CaptureRepair {
                            item: index,
                            capture: capture.name.clone(),
                            report: capture_report,
                        });
                    }
                }
            }

            let result = validate_item_with_captures(item, &ctx);
            let name = &item.sequence.name;
            report.errors.extend(
                result
                    .errors
                    .iter()
                    .map(|issue| format!("item {} ({name}): {issue}", index + 1)),
            );
            report.warnings.extend(
                result
                    .warnings
                    .iter()
                    .map(|issue| format!("item {} ({name}): {issue}", index + 1)),
            );
        }

        for error in &report.errors {
            tracing::warn!(%error, "Preflight error");
        }
        report
    }

    /// Preflight `session`, then hand it to the state machine.
    ///
    /// In strict mode any remaining configuration error refuses the start.
    pub fn start(&mut self, mut session: BatchSession) -> SeqrecResult<PreflightReport> {
        if self.machine.state().is_active() {
            let session_id = self
                .machine
                .session()
                .map(|s| s.id.clone())
                .unwrap_or_default();
            return Err(SeqrecError::SessionAlreadyRunning { session_id });
        }

        let report = self.preflight(&mut session);
        if self.options.strict && !report.is_ok() {
            return Err(SeqrecError::configuration(format!(
                "{} configuration error(s): {}",
                report.errors.len(),
                report.errors.join("; ")
            )));
        }
        self.machine.start(session)?;
        Ok(report)
    }

    /// Pick up a persisted session after the capture-mode restart.
    pub fn resume(&mut self) -> SeqrecResult<ResumeOutcome> {
        self.machine.resume()
    }

    pub fn tick(&mut self) -> SeqrecResult<MachineState> {
        self.machine.tick()
    }

    pub fn cancel(&mut self) -> SeqrecResult<()> {
        self.machine.cancel()
    }

    /// Flag that cancels the session at the next tick when set, e.g. from a
    /// signal handler.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.machine.cancel_handle()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.machine.progress()
    }

    /// Tick until the session is no longer active.
    ///
    /// `watchdog` sees the progress after every tick and returns `false` to
    /// cancel, which is how callers bound a hung backend. A session still in
    /// `Preparing` is resumed first; hosts that switch modes in-process
    /// never restart, so nobody else will.
    pub fn run<F>(&mut self, mut watchdog: F) -> SeqrecResult<MachineState>
    where
        F: FnMut(&Progress) -> bool,
    {
        if self.machine.state() == MachineState::Preparing
            && !self.machine.cancel_handle().load(Ordering::SeqCst)
        {
            self.machine.resume()?;
        }

        while self.machine.state().is_active() {
            let state = self.machine.tick()?;
            if !state.is_active() {
                break;
            }
            if let Some(progress) = self.machine.progress() {
                if !watchdog(&progress) {
                    tracing::warn!(
                        session_id = %progress.session_id,
                        index = progress.current_index,
                        "Watchdog requested cancellation"
                    );
                    self.machine.cancel()?;
                }
            }
        }
        Ok(self.machine.state())
    }
}
