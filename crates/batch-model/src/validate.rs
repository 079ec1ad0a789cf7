//! Capture configuration and batch item validation.
//!
//! Validation never fails outright: it returns every issue it finds, split
//! into errors (the capture cannot run as configured) and warnings (it can,
//! but probably not as intended). Each issue carries an [`IssueCategory`]
//! that repair strategies key on.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::{BatchItem, CaptureDefaults};
use crate::capture::CaptureConfig;
use crate::scene::SceneResolver;
use crate::template::{self, TemplateContext};

/// Largest width or height accepted for pixel captures.
pub const MAX_DIMENSION: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// Frame rate is zero, negative or not finite.
    FrameRate,
    /// Frame rate differs from the timeline the capture runs on.
    FrameRateMismatch,
    /// Width/height is zero or above [`MAX_DIMENSION`].
    Resolution,
    OutputPathEmpty,
    /// Template still has placeholders after resolution.
    OutputPathPlaceholder,
    /// An ancestor of the output directory is a file.
    OutputPathUnwritable,
    /// Absolute output path outside the project root.
    OutputOutsideProject,
    /// Output path outside the permitted root.
    OutputOutsidePermittedRoot,
    TargetMissing,
    /// Target reference no longer resolves in the scene.
    TargetDangling,
    /// Multi-channel capture without channels, or with a channel listed twice.
    Channels,
    /// Several channels would write the same file.
    ChannelPathCollision,
    NoEnabledCaptures,
    TimeRange,
    SourceUnplayable,
}

impl IssueCategory {
    /// Whether a warning of this category should still be fed to repair.
    pub fn is_repairable_warning(&self) -> bool {
        matches!(
            self,
            IssueCategory::FrameRateMismatch | IssueCategory::OutputOutsideProject
        )
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub category: IssueCategory,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn has(&self, category: IssueCategory) -> bool {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .any(|i| i.category == category)
    }

    /// Errors plus warnings that repair strategies act on.
    pub fn repairable(&self) -> impl Iterator<Item = &Issue> {
        self.errors.iter().chain(
            self.warnings
                .iter()
                .filter(|w| w.category.is_repairable_warning()),
        )
    }

    pub fn error(&mut self, category: IssueCategory, message: impl Into<String>) {
        self.errors.push(Issue {
            severity: Severity::Error,
            category,
            message: message.into(),
        });
    }

    pub fn warning(&mut self, category: IssueCategory, message: impl Into<String>) {
        self.warnings.push(Issue {
            severity: Severity::Warning,
            category,
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Everything validation looks at besides the configuration itself.
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    pub defaults: &'a CaptureDefaults,
    pub project_root: &'a Path,
    pub permitted_root: Option<&'a Path>,
    /// Active scene, for checking target references. Skipped when `None`.
    pub scene: Option<&'a dyn SceneResolver>,
    /// Frame rate of the timeline the capture will run on. Defaults to
    /// `defaults.fps`.
    pub timeline_fps: Option<f64>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(defaults: &'a CaptureDefaults, project_root: &'a Path) -> Self {
        Self {
            defaults,
            project_root,
            permitted_root: None,
            scene: None,
            timeline_fps: None,
        }
    }

    pub fn with_permitted_root(mut self, root: Option<&'a Path>) -> Self {
        self.permitted_root = root;
        self
    }

    pub fn with_scene(mut self, scene: &'a dyn SceneResolver) -> Self {
        self.scene = Some(scene);
        self
    }

    pub fn with_timeline_fps(mut self, fps: f64) -> Self {
        self.timeline_fps = Some(fps);
        self
    }

    /// Frame rate captures are expected to match.
    pub fn expected_fps(&self) -> f64 {
        self.timeline_fps.unwrap_or(self.defaults.fps)
    }
}

impl fmt::Debug for ValidationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("defaults", self.defaults)
            .field("project_root", &self.project_root)
            .field("permitted_root", &self.permitted_root)
            .field("scene", &self.scene.is_some())
            .field("timeline_fps", &self.timeline_fps)
            .finish()
    }
}

/// Fixed timestamp for sample resolution so validation stays deterministic.
fn sample_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Context used to test-resolve a template during validation.
fn sample_context(config: &CaptureConfig, defaults: &CaptureDefaults) -> TemplateContext {
    let (width, height) = config
        .settings
        .resolution()
        .unwrap_or((defaults.width, defaults.height));
    let mut ctx = TemplateContext::new(
        "Scene",
        "Sequence",
        config.take,
        config.kind(),
        sample_timestamp(),
    )
    .with_resolution(width, height);
    if let Some(channel) = config.settings.channels().first() {
        ctx = ctx.with_channel(channel.clone());
    }
    ctx
}

/// Make `path` absolute against the working directory, lexically.
fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let joined = std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf());
    template::normalize_path(&joined.to_string_lossy())
}

/// Nearest existing ancestor of `dir` is a file, so the directory can never
/// be created.
fn blocked_by_file(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .filter(|a| !a.as_os_str().is_empty())
        .find(|a| a.exists())
        .filter(|a| !a.is_dir())
        .map(Path::to_path_buf)
}

/// Validate a single capture configuration.
pub fn validate(config: &CaptureConfig, ctx: &ValidationContext<'_>) -> ValidationResult {
    let mut result = ValidationResult::default();
    let kind = config.kind();
    let label = if config.name.is_empty() {
        kind.label().to_string()
    } else {
        config.name.clone()
    };

    let fps = config.settings.fps();
    if !fps.is_finite() || fps <= 0.0 {
        result.error(
            IssueCategory::FrameRate,
            format!("{label}: frame rate must be positive (got {fps})"),
        );
    } else if (fps - ctx.expected_fps()).abs() > 1e-6 {
        result.warning(
            IssueCategory::FrameRateMismatch,
            format!(
                "{label}: frame rate {fps} differs from timeline frame rate {}",
                ctx.expected_fps()
            ),
        );
    }

    if let Some((w, h)) = config.settings.resolution() {
        if w == 0 || h == 0 {
            result.error(
                IssueCategory::Resolution,
                format!("{label}: resolution {w}x{h} must be positive"),
            );
        } else if w > MAX_DIMENSION || h > MAX_DIMENSION {
            result.error(
                IssueCategory::Resolution,
                format!("{label}: resolution {w}x{h} exceeds {MAX_DIMENSION}px"),
            );
        }
    }

    if kind.requires_target() {
        match config.settings.target() {
            None => result.error(
                IssueCategory::TargetMissing,
                format!("{label}: {kind} capture needs a target object"),
            ),
            Some(target) if target.is_empty() => result.error(
                IssueCategory::TargetMissing,
                format!("{label}: {kind} capture needs a target object"),
            ),
            Some(target) if !target.is_scene_root() => {
                if let Some(scene) = ctx.scene {
                    if scene.resolve(target).is_none() {
                        result.error(
                            IssueCategory::TargetDangling,
                            format!("{label}: target {target} not found in scene"),
                        );
                    }
                }
            }
            Some(_) => {}
        }
    }

    if kind == crate::capture::CaptureKind::MultiChannelPass {
        validate_channels(config, &label, &mut result);
    }

    validate_output(config, ctx, &label, &mut result);
    result
}

fn validate_channels(config: &CaptureConfig, label: &str, result: &mut ValidationResult) {
    let channels = config.settings.channels();
    if channels.is_empty() {
        result.error(
            IssueCategory::Channels,
            format!("{label}: multi-channel capture has no channels"),
        );
        return;
    }

    let mut seen: Vec<&str> = Vec::with_capacity(channels.len());
    for channel in channels {
        if seen.contains(&channel.as_str()) {
            result.error(
                IssueCategory::Channels,
                format!("{label}: channel '{channel}' is listed more than once"),
            );
        } else {
            seen.push(channel.as_str());
        }
    }

    let per_channel = template::unresolved_placeholders(&config.output_template)
        .iter()
        .any(|name| name == "Channel");
    if seen.len() > 1 && !per_channel {
        result.error(
            IssueCategory::ChannelPathCollision,
            format!(
                "{label}: output path has no <Channel> placeholder, so {} channels would write the same file",
                seen.len()
            ),
        );
    }
}

fn validate_output(
    config: &CaptureConfig,
    ctx: &ValidationContext<'_>,
    label: &str,
    result: &mut ValidationResult,
) {
    let template_str = config.output_template.trim();
    if template_str.is_empty() {
        result.error(
            IssueCategory::OutputPathEmpty,
            format!("{label}: output path is empty"),
        );
        return;
    }

    let kind = config.kind();
    let resolved =
        template::resolve_template(template_str, &sample_context(config, ctx.defaults));
    let leftovers: Vec<&String> = resolved
        .unresolved
        .iter()
        .filter(|name| !(kind.expands_frames() && name.as_str() == "Frame"))
        .collect();
    if !leftovers.is_empty() {
        result.error(
            IssueCategory::OutputPathPlaceholder,
            format!(
                "{label}: unresolved placeholders in output path: {}",
                leftovers
                    .iter()
                    .map(|n| format!("<{n}>"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
        return;
    }

    let Some(full) = template::compose_output_path(
        &resolved,
        ctx.project_root,
        &ctx.defaults.base_output_path,
        Some(config.settings.extension()),
    ) else {
        return;
    };
    let full = absolutize(&full);

    let project_root = absolutize(ctx.project_root);
    let absolute = Path::new(&resolved.text.replace('\\', "/")).is_absolute();
    if absolute && !full.starts_with(&project_root) {
        result.warning(
            IssueCategory::OutputOutsideProject,
            format!(
                "{label}: output {} is outside the project root {}",
                full.display(),
                project_root.display()
            ),
        );
    }

    if let Some(permitted) = ctx.permitted_root {
        let permitted = absolutize(permitted);
        if !full.starts_with(&permitted) {
            result.error(
                IssueCategory::OutputOutsidePermittedRoot,
                format!(
                    "{label}: output {} is outside the permitted root {}",
                    full.display(),
                    permitted.display()
                ),
            );
        }
    }

    if let Some(dir) = full.parent() {
        if let Some(blocker) = blocked_by_file(dir) {
            result.error(
                IssueCategory::OutputPathUnwritable,
                format!(
                    "{label}: output directory cannot be created, {} is a file",
                    blocker.display()
                ),
            );
        }
    }
}

/// Validate item-level invariants. Captures are validated separately.
pub fn validate_item(item: &BatchItem) -> ValidationResult {
    let mut result = ValidationResult::default();
    let name = &item.sequence.name;

    if !item.sequence.is_playable() {
        result.error(
            IssueCategory::SourceUnplayable,
            format!(
                "{name}: sequence duration {} must be positive",
                item.sequence.duration_secs
            ),
        );
    } else if let Some(range) = item.time_range {
        if let Err(message) = range.check(item.sequence.duration_secs) {
            result.error(IssueCategory::TimeRange, format!("{name}: {message}"));
        }
    }

    if let Some(fps) = item.fps_override {
        if !fps.is_finite() || fps <= 0.0 {
            result.error(
                IssueCategory::FrameRate,
                format!("{name}: frame rate override must be positive (got {fps})"),
            );
        }
    }

    if item.enabled_captures().next().is_none() {
        result.warning(
            IssueCategory::NoEnabledCaptures,
            format!("{name}: no enabled captures"),
        );
    }

    result
}

/// Validate an item and each of its enabled captures against the item's
/// timeline.
pub fn validate_item_with_captures(
    item: &BatchItem,
    ctx: &ValidationContext<'_>,
) -> ValidationResult {
    let mut result = validate_item(item);
    let item_ctx = ctx.with_timeline_fps(item.effective_fps(ctx.defaults));
    for (_, capture) in item.enabled_captures() {
        result.extend(validate(capture, &item_ctx));
    }
    result
}
