//! Automatic repair of broken capture configurations.
//!
//! Repairs are a flat registry of plain functions. Each [`RepairStrategy`]
//! declares the issue categories it handles and reports whether it actually
//! changed the configuration. [`repair_until_stable`] re-validates and
//! re-applies strategies until nothing repairable is left, nothing changes,
//! or the iteration cap is reached.

use serde::{Deserialize, Serialize};

use crate::capture::{CaptureConfig, CaptureSettings};
use crate::factory::{default_template, DEFAULT_CHANNELS};
use crate::scene::ObjectCapability;
use crate::template;
use crate::validate::{validate, Issue, IssueCategory, ValidationContext, ValidationResult};

/// Standard resolutions invalid sizes snap to.
pub const STANDARD_RESOLUTIONS: [(u32, u32); 6] = [
    (640, 480),
    (1280, 720),
    (1920, 1080),
    (2560, 1440),
    (3840, 2160),
    (7680, 4320),
];

/// Inputs available to repair strategies.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub validation: ValidationContext<'a>,
    /// Create the output directory after fixing an output path.
    pub materialize_dirs: bool,
}

impl<'a> RepairContext<'a> {
    pub fn new(validation: ValidationContext<'a>) -> Self {
        Self {
            validation,
            materialize_dirs: false,
        }
    }

    pub fn with_materialize_dirs(mut self, enabled: bool) -> Self {
        self.materialize_dirs = enabled;
        self
    }
}

type RepairFn = fn(&mut CaptureConfig, &Issue, &RepairContext<'_>) -> bool;

/// A named repair and the issue categories it addresses.
pub struct RepairStrategy {
    pub name: &'static str,
    pub handles: &'static [IssueCategory],
    pub apply: RepairFn,
}

impl RepairStrategy {
    pub fn can_repair(&self, issue: &Issue) -> bool {
        self.handles.contains(&issue.category)
    }
}

/// Built-in strategies, in the order they are tried.
pub static STRATEGIES: [RepairStrategy; 6] = [
    RepairStrategy {
        name: "force-frame-rate",
        handles: &[IssueCategory::FrameRate, IssueCategory::FrameRateMismatch],
        apply: force_frame_rate,
    },
    RepairStrategy {
        name: "snap-resolution",
        handles: &[IssueCategory::Resolution],
        apply: snap_resolution,
    },
    RepairStrategy {
        name: "default-output-path",
        handles: &[
            IssueCategory::OutputPathEmpty,
            IssueCategory::OutputPathPlaceholder,
            IssueCategory::OutputPathUnwritable,
            IssueCategory::OutputOutsideProject,
            IssueCategory::OutputOutsidePermittedRoot,
            IssueCategory::ChannelPathCollision,
        ],
        apply: default_output_path,
    },
    RepairStrategy {
        name: "rebind-target",
        handles: &[IssueCategory::TargetMissing, IssueCategory::TargetDangling],
        apply: rebind_target,
    },
    RepairStrategy {
        name: "default-channels",
        handles: &[IssueCategory::Channels],
        apply: default_channels,
    },
    RepairStrategy {
        name: "dedupe-channels",
        handles: &[IssueCategory::Channels],
        apply: dedupe_channels,
    },
];

fn force_frame_rate(config: &mut CaptureConfig, _: &Issue, ctx: &RepairContext<'_>) -> bool {
    let expected = ctx.validation.expected_fps();
    if !expected.is_finite() || expected <= 0.0 || config.settings.fps() == expected {
        return false;
    }
    config.settings.set_fps(expected);
    true
}

/// Nearest standard resolution by summed axis distance. Ties go to the
/// smaller size.
pub fn nearest_standard_resolution(width: u32, height: u32) -> (u32, u32) {
    STANDARD_RESOLUTIONS
        .iter()
        .copied()
        .min_by_key(|(w, h)| {
            (i64::from(*w) - i64::from(width)).abs() + (i64::from(*h) - i64::from(height)).abs()
        })
        .unwrap_or((1920, 1080))
}

fn snap_resolution(config: &mut CaptureConfig, _: &Issue, _: &RepairContext<'_>) -> bool {
    let Some((w, h)) = config.settings.resolution() else {
        return false;
    };
    let snapped = nearest_standard_resolution(w, h);
    if snapped == (w, h) {
        return false;
    }
    config.settings.set_resolution(snapped.0, snapped.1)
}

fn default_output_path(config: &mut CaptureConfig, issue: &Issue, ctx: &RepairContext<'_>) -> bool {
    let safe = default_template(config.kind());
    let changed = config.output_template != safe;
    if changed {
        tracing::debug!(
            capture = %config.name,
            from = %config.output_template,
            reason = ?issue.category,
            "Substituting default output path"
        );
        config.output_template = safe.to_string();
    }
    if ctx.materialize_dirs {
        materialize_output_dir(config, ctx);
    }
    changed
}

/// Create the directory the configuration writes into, as far as it can be
/// known before a run (the part of the path up to the first placeholder
/// that depends on the run).
fn materialize_output_dir(config: &CaptureConfig, ctx: &RepairContext<'_>) {
    let v = &ctx.validation;
    let static_prefix: String = config
        .output_template
        .split('/')
        .take_while(|segment| template::unresolved_placeholders(segment).is_empty())
        .collect::<Vec<_>>()
        .join("/");
    let Some(dir) = template::compose_output_path(
        &template::Resolved::literal(static_prefix),
        v.project_root,
        &v.defaults.base_output_path,
        None,
    ) else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to create output directory");
    }
}

fn rebind_target(config: &mut CaptureConfig, _: &Issue, ctx: &RepairContext<'_>) -> bool {
    let Some(scene) = ctx.validation.scene else {
        return false;
    };
    let kind = config.kind();
    let candidate = ObjectCapability::preferred_for(kind)
        .iter()
        .find_map(|cap| scene.find_with_capability(*cap));
    match candidate {
        Some(reference) if config.settings.target() != Some(&reference) => {
            tracing::info!(capture = %config.name, target = %reference, "Rebinding capture target");
            config.settings.set_target(Some(reference))
        }
        _ => false,
    }
}

fn default_channels(config: &mut CaptureConfig, _: &Issue, _: &RepairContext<'_>) -> bool {
    match &mut config.settings {
        CaptureSettings::MultiChannelPass { channels, .. } if channels.is_empty() => {
            channels.extend(DEFAULT_CHANNELS.iter().map(|c| c.to_string()));
            true
        }
        _ => false,
    }
}

/// Drop repeated channel names, keeping the first occurrence.
fn dedupe_channels(config: &mut CaptureConfig, _: &Issue, _: &RepairContext<'_>) -> bool {
    let CaptureSettings::MultiChannelPass { channels, .. } = &mut config.settings else {
        return false;
    };
    let before = channels.len();
    let mut seen: Vec<String> = Vec::with_capacity(before);
    channels.retain(|channel| {
        if seen.contains(channel) {
            false
        } else {
            seen.push(channel.clone());
            true
        }
    });
    channels.len() != before
}

/// Apply the first strategy that handles `issue` and changes `config`.
///
/// Returns true only if the configuration was modified.
pub fn repair(config: &mut CaptureConfig, issue: &Issue, ctx: &RepairContext<'_>) -> bool {
    apply_first(config, issue, ctx).is_some()
}

fn apply_first(
    config: &mut CaptureConfig,
    issue: &Issue,
    ctx: &RepairContext<'_>,
) -> Option<&'static str> {
    STRATEGIES
        .iter()
        .filter(|s| s.can_repair(issue))
        .find(|s| (s.apply)(config, issue, ctx))
        .map(|s| s.name)
}

/// One change made by the repair driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRepair {
    pub strategy: String,
    pub category: IssueCategory,
    pub issue: String,
}

/// Summary of a [`repair_until_stable`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Validate/repair passes that changed something.
    pub iterations: usize,
    pub applied: Vec<AppliedRepair>,
    /// Validation after the last pass.
    pub remaining: ValidationResult,
    /// Stopped because the iteration cap was reached.
    pub hit_cap: bool,
}

impl RepairReport {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Repair `config` to a fixed point, bounded by `max_iterations` passes.
pub fn repair_until_stable(
    config: &mut CaptureConfig,
    ctx: &RepairContext<'_>,
    max_iterations: usize,
) -> RepairReport {
    let mut report = RepairReport::default();
    let mut result = validate(config, &ctx.validation);

    loop {
        let pending: Vec<Issue> = result.repairable().cloned().collect();
        if pending.is_empty() {
            break;
        }
        if report.iterations >= max_iterations {
            report.hit_cap = true;
            tracing::warn!(
                capture = %config.name,
                max_iterations,
                "Repair iteration cap reached"
            );
            break;
        }

        let mut changed = false;
        for issue in &pending {
            if let Some(strategy) = apply_first(config, issue, ctx) {
                tracing::info!(
                    capture = %config.name,
                    strategy,
                    issue = %issue.message,
                    "Repaired capture configuration"
                );
                report.applied.push(AppliedRepair {
                    strategy: strategy.to_string(),
                    category: issue.category,
                    issue: issue.message.clone(),
                });
                changed = true;
            }
        }

        result = validate(config, &ctx.validation);
        if !changed {
            break;
        }
        report.iterations += 1;
    }

    report.remaining = result;
    report
}
