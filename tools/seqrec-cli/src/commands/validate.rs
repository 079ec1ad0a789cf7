//! Validate a batch plan.

use std::path::PathBuf;

use seqrec_common::config::AppConfig;
use seqrec_model::validate::{validate_item_with_captures, ValidationContext};

pub fn run(config: &AppConfig, plan_path: PathBuf, scene_path: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Validating batch plan: {}", plan_path.display());

    let plan = super::load_plan(&plan_path)?;
    let scene = super::load_scene(scene_path.as_deref())?;
    let defaults = plan.defaults.clone().unwrap_or_else(|| config.defaults.clone());

    let mut ctx = ValidationContext::new(&defaults, &config.project_root)
        .with_permitted_root(config.permitted_root.as_deref());
    if let Some(scene) = &scene {
        ctx = ctx.with_scene(scene);
    }

    println!("  Project root: {}", config.project_root.display());
    println!(
        "  Defaults: {}x{} @ {}fps under {}",
        defaults.width,
        defaults.height,
        defaults.fps,
        defaults.base_output_path.display()
    );
    println!("  Items: {}", plan.items.len());
    println!();

    let mut errors = 0;
    let mut warnings = 0;
    for (index, item) in plan.items.iter().enumerate() {
        let result = validate_item_with_captures(item, &ctx);
        let enabled = item.enabled_captures().count();
        println!(
            "  [{}] {} ({}/{} capture(s) enabled{})",
            index + 1,
            item.sequence.name,
            enabled,
            item.captures.len(),
            if item.enabled { "" } else { ", item disabled" }
        );
        for issue in &result.errors {
            println!("      error: {issue}");
        }
        for issue in &result.warnings {
            println!("      warning: {issue}");
        }
        errors += result.errors.len();
        warnings += result.warnings.len();
    }

    if errors == 0 {
        println!("\nBatch plan is valid ({warnings} warning(s)).");
        Ok(())
    } else {
        println!("\n{errors} error(s), {warnings} warning(s) found.");
        anyhow::bail!("batch plan has {errors} configuration error(s)")
    }
}
