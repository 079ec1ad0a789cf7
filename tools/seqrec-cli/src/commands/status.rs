//! Show the persisted batch session.

use seqrec_common::config::AppConfig;
use seqrec_model::batch::{BatchSession, SessionStage};
use seqrec_orchestrator::{FileStore, MachineState, Progress, SessionStore};

pub fn run(config: &AppConfig, session_id: Option<String>) -> anyhow::Result<()> {
    let store = FileStore::open(&config.state_dir)
        .map_err(|e| anyhow::anyhow!("Failed to open state directory: {e}"))?;
    let store = SessionStore::new(Box::new(store));

    let session = match &session_id {
        Some(id) => store
            .load_archived(id)
            .map_err(|e| anyhow::anyhow!("Failed to load archived session: {e}"))?,
        None => store
            .load_active()
            .map_err(|e| anyhow::anyhow!("Failed to load active session: {e}"))?,
    };

    let Some(session) = session else {
        match session_id {
            Some(id) => println!("No archived session with id {id}."),
            None => println!("No active batch session."),
        }
        return Ok(());
    };

    print_status(&session);
    Ok(())
}

fn print_status(session: &BatchSession) {
    let progress = Progress::from_session(session, machine_state(session));

    println!("Session: {}", session.id);
    println!("  Stage: {:?}", session.stage);
    println!("  Created: {}", session.created_at);
    println!("  Last checkpoint: {}", session.checkpoint_at);
    println!(
        "  Progress: {}/{} item(s) finished ({:.0}%)",
        session.finished_count(),
        session.len(),
        progress.fraction() * 100.0
    );
    println!("  Elapsed: {:.1}s", progress.elapsed_secs);
    if let Some(remaining) = progress.estimated_remaining_secs {
        println!("  Estimated remaining: {remaining:.1}s");
    }
    println!();
    super::run::print_summary(session);
}

/// Machine state a persisted session would be in after a resume.
fn machine_state(session: &BatchSession) -> MachineState {
    match session.stage {
        SessionStage::Preparing => MachineState::Preparing,
        SessionStage::Executing => MachineState::Executing {
            index: session.current_index,
            phase: seqrec_orchestrator::ItemPhase::GraphBuilt,
        },
        SessionStage::Completed => MachineState::Completed,
        SessionStage::Cancelled => MachineState::Cancelled,
        SessionStage::Abandoned => MachineState::Abandoned,
        SessionStage::FailedFatal => MachineState::FailedFatal,
    }
}
