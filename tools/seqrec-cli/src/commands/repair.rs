//! Auto-repair the captures of a batch plan.

use std::path::PathBuf;

use seqrec_common::config::AppConfig;
use seqrec_model::repair::{repair_until_stable, RepairContext};
use seqrec_model::validate::ValidationContext;

pub fn run(
    config: &AppConfig,
    plan_path: PathBuf,
    scene_path: Option<PathBuf>,
    write: bool,
) -> anyhow::Result<()> {
    println!("Repairing batch plan: {}", plan_path.display());

    let mut plan = super::load_plan(&plan_path)?;
    let scene = super::load_scene(scene_path.as_deref())?;
    let defaults = plan.defaults.clone().unwrap_or_else(|| config.defaults.clone());

    let mut ctx = ValidationContext::new(&defaults, &config.project_root)
        .with_permitted_root(config.permitted_root.as_deref());
    if let Some(scene) = &scene {
        ctx = ctx.with_scene(scene);
    }

    let mut applied = 0;
    let mut unresolved = 0;
    for (index, item) in plan.items.iter_mut().enumerate() {
        let repair_ctx = RepairContext::new(ctx.with_timeline_fps(item.effective_fps(&defaults)))
            .with_materialize_dirs(write);
        for capture in item.captures.iter_mut().filter(|c| c.enabled) {
            let report = repair_until_stable(capture, &repair_ctx, config.repair.max_iterations);
            for repair in &report.applied {
                println!(
                    "  [{}] {} / {}: {} ({})",
                    index + 1,
                    item.sequence.name,
                    capture.name,
                    repair.strategy,
                    repair.issue
                );
            }
            for issue in &report.remaining.errors {
                println!(
                    "  [{}] {} / {}: unresolved: {issue}",
                    index + 1,
                    item.sequence.name,
                    capture.name
                );
            }
            if report.hit_cap {
                println!(
                    "  [{}] {} / {}: stopped after {} pass(es)",
                    index + 1,
                    item.sequence.name,
                    capture.name,
                    report.iterations
                );
            }
            applied += report.applied.len();
            unresolved += report.remaining.errors.len();
        }
    }

    println!("\n{applied} repair(s) applied, {unresolved} error(s) remaining.");

    if write && applied > 0 {
        plan.save(&plan_path)
            .map_err(|e| anyhow::anyhow!("Failed to write batch plan: {e}"))?;
        println!("Repaired plan written to: {}", plan_path.display());
    } else if applied > 0 {
        println!("Run with --write to save the repaired plan.");
    }

    Ok(())
}
