//! Run a batch plan with dry-run backends.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use seqrec_common::config::AppConfig;
use seqrec_model::batch::BatchSession;
use seqrec_model::scene::{SceneResolver, SceneSnapshot};
use seqrec_orchestrator::{
    Collaborators, FileStore, MachineState, Orchestrator, OrchestratorOptions, ResumeOutcome,
    RuntimeMode,
};

use crate::dry_run::{DryRunAssets, DryRunHost, DryRunPlayer, ManifestBackends};

pub struct RunArgs {
    pub plan: Option<PathBuf>,
    pub scene: Option<PathBuf>,
    pub resume: bool,
    pub strict: bool,
    pub auto_repair: bool,
    pub timeout_secs: Option<u64>,
}

/// Collaborators for one process lifetime that came up in `mode`.
fn collaborators(
    config: &AppConfig,
    mode: RuntimeMode,
    scene: Option<SceneSnapshot>,
) -> anyhow::Result<Collaborators> {
    let store = FileStore::open(&config.state_dir)
        .map_err(|e| anyhow::anyhow!("Failed to open state directory: {e}"))?;
    Ok(Collaborators {
        store: Box::new(store),
        host: Box::new(DryRunHost::new(mode)),
        backends: Box::new(ManifestBackends::new(config.state_dir.join("dry-run"))),
        player: Box::new(DryRunPlayer::default()),
        assets: Box::new(DryRunAssets::default()),
        scene: scene.map(|s| Box::new(s) as Box<dyn SceneResolver + Send>),
    })
}

pub async fn run(config: AppConfig, args: RunArgs) -> anyhow::Result<()> {
    let scene = super::load_scene(args.scene.as_deref())?;
    let options = OrchestratorOptions::from_app(&config)
        .with_auto_repair(args.auto_repair)
        .with_strict(args.strict);

    println!("State directory: {}", config.state_dir.display());
    println!("Project root: {}", config.project_root.display());
    println!();

    if !args.resume {
        let plan_path = args
            .plan
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("A batch plan is required unless --resume is given"))?;
        let session = super::load_plan(plan_path)?.into_session(&config.defaults);
        println!(
            "Starting batch session {} ({} item(s))",
            session.id,
            session.len()
        );

        let editing = collaborators(&config, RuntimeMode::Edit, scene.clone())?;
        let mut orchestrator = Orchestrator::new(options.clone(), editing);
        let report = orchestrator
            .start(session)
            .map_err(|e| anyhow::anyhow!("Failed to start batch session: {e}"))?;
        for repair in &report.repairs {
            for applied in &repair.report.applied {
                println!(
                    "  Repaired item {} / {}: {}",
                    repair.item + 1,
                    repair.capture,
                    applied.strategy
                );
            }
        }
        for error in &report.errors {
            println!("  Error: {error}");
        }
        for warning in &report.warnings {
            println!("  Warning: {warning}");
        }
        // Switching to capture mode restarts the runtime; everything past
        // this point is rebuilt from the persisted record.
    }

    let mut orchestrator =
        Orchestrator::new(options, collaborators(&config, RuntimeMode::Capture, scene)?);
    match orchestrator
        .resume()
        .map_err(|e| anyhow::anyhow!("Failed to resume batch session: {e}"))?
    {
        ResumeOutcome::NothingToResume => {
            println!("No batch session to resume.");
            return Ok(());
        }
        ResumeOutcome::Abandoned { session_id } => {
            println!("Session {session_id} was stale and has been archived as abandoned.");
            return Ok(());
        }
        ResumeOutcome::Resumed { session_id, index } => {
            println!("Resumed session {session_id} at item {}", index + 1);
        }
    }

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nCancelling after the current frame...");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    println!("Press Ctrl+C to cancel...");
    println!();

    let deadline = args
        .timeout_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let (orchestrator, state) = tokio::task::spawn_blocking(move || {
        let mut announced = None;
        let state = orchestrator.run(|progress| {
            if announced != Some(progress.current_index) && progress.current_index < progress.total
            {
                announced = Some(progress.current_index);
                println!(
                    "  [{}/{}] running ({:.0}% of batch)",
                    progress.current_index + 1,
                    progress.total,
                    progress.fraction() * 100.0
                );
            }
            deadline.map_or(true, |d| Instant::now() < d)
        });
        (orchestrator, state)
    })
    .await?;
    let state = state.map_err(|e| anyhow::anyhow!("Batch session failed: {e}"))?;

    println!();
    println!("Session finished: {state}");
    if let Some(session) = orchestrator.session() {
        print_summary(session);
    }
    println!(
        "\nDry-run manifests: {}",
        config.state_dir.join("dry-run").display()
    );

    if state == MachineState::Completed {
        Ok(())
    } else {
        anyhow::bail!("batch session ended as {state}")
    }
}

pub(crate) fn print_summary(session: &BatchSession) {
    for (index, (item, record)) in session.items.iter().zip(&session.records).enumerate() {
        let duration = record
            .duration_secs()
            .map(|d| format!(" in {d:.1}s"))
            .unwrap_or_default();
        println!(
            "  [{}] {}: {:?}{}",
            index + 1,
            item.sequence.name,
            record.status,
            duration
        );
        for capture in &record.captures {
            println!(
                "      {} {} -> {} ({} frames){}",
                if capture.succeeded { "ok  " } else { "FAIL" },
                capture.name,
                capture.output_path.display(),
                capture.frames_captured,
                capture
                    .error
                    .as_ref()
                    .map(|e| format!(": {e}"))
                    .unwrap_or_default()
            );
        }
        for warning in &record.warnings {
            println!("      warning: {warning}");
        }
        if let Some(error) = &record.error {
            println!("      error: {error}");
        }
    }
}
