pub mod defaults;
pub mod repair;
pub mod resolve;
pub mod run;
pub mod status;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use seqrec_model::batch::BatchPlan;
use seqrec_model::capture::CaptureKind;
use seqrec_model::scene::SceneSnapshot;

pub(crate) fn load_plan(path: &Path) -> anyhow::Result<BatchPlan> {
    BatchPlan::load(path).map_err(|e| anyhow::anyhow!("Failed to load batch plan: {e}"))
}

pub(crate) fn load_scene(path: Option<&Path>) -> anyhow::Result<Option<SceneSnapshot>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scene listing {}", path.display()))?;
    let scene = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse scene listing {}", path.display()))?;
    Ok(Some(scene))
}

pub(crate) fn parse_kind(kind: &str) -> anyhow::Result<CaptureKind> {
    CaptureKind::parse(kind).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown capture kind '{kind}' (expected one of: {})",
            CaptureKind::ALL
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}
