//! Wrapper-graph synthesis.
//!
//! For one batch item the synthesizer builds a wrapper sequence running at
//! the item's effective frame rate, one control clip spanning
//! `[0, duration)` that replays the source from its time-range start, and
//! one capture clip per enabled, valid capture configuration. Every capture
//! clip gets the control clip's span.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use seqrec_common::clock::FrameTimebase;
use seqrec_common::error::{SeqrecError, SeqrecResult};
use seqrec_model::batch::{BatchItem, CaptureDefaults};
use seqrec_model::capture::{CaptureConfig, CaptureKind};
use seqrec_model::scene::SceneResolver;
use seqrec_model::template::{self, TemplateContext};
use seqrec_model::validate::{validate, ValidationContext};

use crate::assets::TransientAssets;
use crate::backend::{CaptureJob, JobOrigin};
use crate::graph::{CaptureClip, ControlClip, Span, WrapperGraph};

/// A synthesized graph plus the per-item warnings collected while building
/// it.
#[derive(Debug)]
pub struct Synthesis {
    pub graph: WrapperGraph,
    pub warnings: Vec<String>,
}

/// Builds wrapper graphs for batch items.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    project_root: PathBuf,
    permitted_root: Option<PathBuf>,
}

impl Synthesizer {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            permitted_root: None,
        }
    }

    pub fn with_permitted_root(mut self, root: Option<PathBuf>) -> Self {
        self.permitted_root = root;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Build the wrapper graph for `item`.
    ///
    /// Fails with `InvalidSource` for an unplayable sequence and with
    /// `Synthesis` for an unusable span or frame rate. Captures that fail
    /// validation are left out and reported in [`Synthesis::warnings`].
    /// Assets are only allocated once the graph is known to be buildable.
    pub fn synthesize(
        &self,
        item: &BatchItem,
        defaults: &CaptureDefaults,
        timestamp: DateTime<Utc>,
        scene: Option<&dyn SceneResolver>,
        assets: &mut dyn TransientAssets,
    ) -> SeqrecResult<Synthesis> {
        let sequence = &item.sequence;
        if !sequence.is_playable() {
            return Err(SeqrecError::invalid_source(
                &sequence.name,
                format!(
                    "duration must be positive (got {}s)",
                    sequence.duration_secs
                ),
            ));
        }
        if let Some(range) = item.time_range {
            range
                .check(sequence.duration_secs)
                .map_err(|e| SeqrecError::synthesis(format!("{}: {e}", sequence.name)))?;
        }

        let fps = item.effective_fps(defaults);
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SeqrecError::synthesis(format!(
                "{}: wrapper frame rate must be positive (got {fps})",
                sequence.name
            )));
        }
        let timebase = FrameTimebase::new(fps);
        let duration = item.effective_duration();
        let frame_count = timebase.frames_in(duration);
        if frame_count == 0 {
            return Err(SeqrecError::synthesis(format!(
                "{}: span of {duration}s holds no frames at {fps} fps",
                sequence.name
            )));
        }
        let span = Span::new(0.0, duration);

        let mut validation = ValidationContext::new(defaults, &self.project_root)
            .with_permitted_root(self.permitted_root.as_deref())
            .with_timeline_fps(fps);
        if let Some(scene) = scene {
            validation = validation.with_scene(scene);
        }

        let mut warnings = Vec::new();
        let mut jobs = Vec::new();
        for (index, config) in item.enabled_captures() {
            let result = validate(config, &validation);
            if !result.is_ok() {
                let reasons = result
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                tracing::warn!(
                    item = %sequence.name,
                    capture = %config.name,
                    %reasons,
                    "Excluding invalid capture from wrapper graph"
                );
                warnings.push(format!("Excluded capture '{}': {reasons}", config.name));
                continue;
            }
            for issue in &result.warnings {
                tracing::debug!(item = %sequence.name, capture = %config.name, %issue, "Capture warning");
            }

            match self.build_job(item, index, config, defaults, timestamp, fps, frame_count) {
                Some(job) => jobs.push((index, job)),
                None => {
                    tracing::warn!(
                        item = %sequence.name,
                        capture = %config.name,
                        "Output path did not resolve; excluding capture"
                    );
                    warnings.push(format!(
                        "Excluded capture '{}': output path '{}' did not resolve",
                        config.name, config.output_template
                    ));
                }
            }
        }

        let asset = assets.allocate(&format!("wrapper:{}", sequence.name));
        let control = ControlClip {
            sequence: sequence.id.clone(),
            sequence_name: sequence.name.clone(),
            span,
            source_offset_secs: item.source_offset(),
            track: assets.allocate("track:control"),
        };
        let captures = jobs
            .into_iter()
            .map(|(config_index, job)| CaptureClip {
                config_index,
                name: job.name.clone(),
                kind: job.kind,
                span,
                track: assets.allocate(&format!("track:capture:{}", job.name)),
                job,
            })
            .collect();

        let graph = WrapperGraph {
            asset,
            timebase,
            frame_count,
            control,
            captures,
        };
        if let Err(e) = graph.verify_alignment() {
            graph.teardown(assets);
            return Err(e);
        }

        tracing::info!(
            item = %sequence.name,
            fps,
            frames = frame_count,
            captures = graph.captures.len(),
            excluded = warnings.len(),
            "Wrapper graph synthesized"
        );
        Ok(Synthesis { graph, warnings })
    }

    /// Resolve outputs and assemble the backend job for one capture.
    #[allow(clippy::too_many_arguments)]
    fn build_job(
        &self,
        item: &BatchItem,
        config_index: usize,
        config: &CaptureConfig,
        defaults: &CaptureDefaults,
        timestamp: DateTime<Utc>,
        fps: f64,
        frame_count: u64,
    ) -> Option<CaptureJob> {
        let kind = config.kind();
        let ctx = TemplateContext::new(
            item.sequence.scene.as_str(),
            item.sequence.name.as_str(),
            config.take,
            kind,
            timestamp,
        )
        .with_resolution(defaults.width, defaults.height);
        let extension = Some(config.settings.extension());

        let mut channel_outputs = Vec::new();
        let output_path = if kind == CaptureKind::MultiChannelPass {
            for channel in config.settings.channels() {
                let resolved = template::resolve_template(
                    &config.output_template,
                    &ctx.clone().with_channel(channel),
                );
                let path = self.compose(&resolved, defaults, extension)?;
                channel_outputs.push((channel.clone(), path));
            }
            channel_outputs.first().map(|(_, p)| p.clone())?
        } else {
            let resolved = template::resolve_template(&config.output_template, &ctx);
            self.compose(&resolved, defaults, extension)?
        };

        let (width, height) = config.settings.resolution().unwrap_or((0, 0));
        Some(CaptureJob {
            name: config.name.clone(),
            kind,
            output_path,
            channel_outputs,
            width,
            height,
            fps,
            frame_count,
            settings: config.settings.clone(),
            origin: JobOrigin {
                capture_index: config_index,
                ..JobOrigin::default()
            },
        })
    }

    fn compose(
        &self,
        resolved: &template::Resolved,
        defaults: &CaptureDefaults,
        extension: Option<&str>,
    ) -> Option<PathBuf> {
        template::compose_output_path(
            resolved,
            &self.project_root,
            &defaults.base_output_path,
            extension,
        )
    }
}
