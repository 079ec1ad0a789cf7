//! Batch items and the persisted batch session record.
//!
//! A [`BatchSession`] is the single durable record for a batch run. It only
//! holds stable identifiers (sequence ids, object references), never live
//! handles, so it can be written before a runtime restart and read back
//! afterwards.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use seqrec_common::config::CaptureDefaults;
use seqrec_common::error::{SeqrecError, SeqrecResult};

use crate::capture::{CaptureConfig, CaptureKind};
use crate::sequence::SourceSequence;

/// Schema version of the persisted session record.
pub const SESSION_SCHEMA_VERSION: &str = "1.0";

/// Sub-span of a source sequence to capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TimeRange {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Check `end > start >= 0` and `end <= source_duration`.
    pub fn check(&self, source_duration: f64) -> Result<(), String> {
        if !(self.start_secs.is_finite() && self.end_secs.is_finite()) {
            return Err("time range bounds must be finite".to_string());
        }
        if self.start_secs < 0.0 {
            return Err(format!(
                "time range start {:.3}s is negative",
                self.start_secs
            ));
        }
        if self.end_secs <= self.start_secs {
            return Err(format!(
                "time range end {:.3}s must be after start {:.3}s",
                self.end_secs, self.start_secs
            ));
        }
        if self.end_secs > source_duration {
            return Err(format!(
                "time range end {:.3}s exceeds sequence duration {:.3}s",
                self.end_secs, source_duration
            ));
        }
        Ok(())
    }
}

/// One sequence to play plus the captures to run alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub sequence: SourceSequence,

    #[serde(default)]
    pub captures: Vec<CaptureConfig>,

    /// Capture only this span of the sequence.
    #[serde(default)]
    pub time_range: Option<TimeRange>,

    /// Frame rate for the wrapper graph; falls back to the session default.
    #[serde(default)]
    pub fps_override: Option<f64>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl BatchItem {
    pub fn new(sequence: SourceSequence, captures: Vec<CaptureConfig>) -> Self {
        Self {
            sequence,
            captures,
            time_range: None,
            fps_override: None,
            enabled: true,
        }
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// Frame rate the wrapper graph runs at.
    pub fn effective_fps(&self, defaults: &CaptureDefaults) -> f64 {
        self.fps_override.unwrap_or(defaults.fps)
    }

    /// Length of the captured span in seconds.
    pub fn effective_duration(&self) -> f64 {
        self.time_range
            .map(|r| r.duration_secs())
            .unwrap_or(self.sequence.duration_secs)
    }

    /// Source time at which the control clip starts playing.
    pub fn source_offset(&self) -> f64 {
        self.time_range.map(|r| r.start_secs).unwrap_or(0.0)
    }

    pub fn enabled_captures(&self) -> impl Iterator<Item = (usize, &CaptureConfig)> {
        self.captures.iter().enumerate().filter(|(_, c)| c.enabled)
    }
}

/// Lifecycle status of a batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemStatus::Pending | ItemStatus::Running)
    }
}

/// Result of one capture clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub name: String,
    pub kind: CaptureKind,
    pub output_path: PathBuf,
    pub succeeded: bool,
    pub frames_captured: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Per-item bookkeeping kept in the session record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemRecord {
    pub status: ItemStatus,

    /// Non-fatal issues (excluded captures, restarts, ...).
    #[serde(default)]
    pub warnings: Vec<String>,

    /// Item-level failure reason.
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub captures: Vec<CaptureOutcome>,

    /// How many times the item has been started.
    #[serde(default)]
    pub attempts: u32,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ItemRecord {
    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }
}

/// Where a batch session stands, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    /// Written, waiting for the capture-mode restart.
    #[default]
    Preparing,
    /// Items are being executed.
    Executing,
    Completed,
    Cancelled,
    /// Never resumed within the abandonment window.
    Abandoned,
    /// Persisted state could not be trusted.
    FailedFatal,
}

impl SessionStage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStage::Preparing | SessionStage::Executing)
    }
}

/// Durable record of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSession {
    pub version: String,
    pub id: String,
    pub items: Vec<BatchItem>,
    pub defaults: CaptureDefaults,
    pub current_index: usize,
    pub records: Vec<ItemRecord>,
    pub stage: SessionStage,
    pub created_at: DateTime<Utc>,
    /// Last time the record was persisted.
    pub checkpoint_at: DateTime<Utc>,
}

impl BatchSession {
    pub fn new(items: Vec<BatchItem>, defaults: CaptureDefaults) -> Self {
        let now = Utc::now();
        let records = vec![ItemRecord::default(); items.len()];
        Self {
            version: SESSION_SCHEMA_VERSION.to_string(),
            id: session_id(now),
            items,
            defaults,
            current_index: 0,
            records,
            stage: SessionStage::Preparing,
            created_at: now,
            checkpoint_at: now,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn status(&self, index: usize) -> Option<ItemStatus> {
        self.records.get(index).map(|r| r.status)
    }

    pub fn statuses(&self) -> Vec<ItemStatus> {
        self.records.iter().map(|r| r.status).collect()
    }

    pub fn current_item(&self) -> Option<&BatchItem> {
        self.items.get(self.current_index)
    }

    /// Items that reached a terminal status.
    pub fn finished_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status.is_terminal())
            .count()
    }

    /// Check the record is internally consistent after being read back.
    pub fn check_integrity(&self) -> Result<(), String> {
        if self.records.len() != self.items.len() {
            return Err(format!(
                "{} item records for {} items",
                self.records.len(),
                self.items.len()
            ));
        }
        if self.current_index > self.items.len() {
            return Err(format!(
                "current index {} out of range for {} items",
                self.current_index,
                self.items.len()
            ));
        }
        if let Some(pos) = self.records[..self.current_index]
            .iter()
            .position(|r| !r.status.is_terminal())
        {
            return Err(format!(
                "item {pos} is before the current index but not finished"
            ));
        }
        Ok(())
    }
}

/// A batch as authored on disk: the items to run plus optional defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Overrides the configured defaults when present.
    #[serde(default)]
    pub defaults: Option<CaptureDefaults>,

    pub items: Vec<BatchItem>,
}

impl BatchPlan {
    pub fn new(items: Vec<BatchItem>) -> Self {
        Self {
            defaults: None,
            items,
        }
    }

    /// Load a plan from a JSON file.
    pub fn load(path: &Path) -> SeqrecResult<Self> {
        if !path.exists() {
            return Err(SeqrecError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the plan as pretty JSON.
    pub fn save(&self, path: &Path) -> SeqrecResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Turn the plan into a fresh session, falling back to `defaults`.
    pub fn into_session(self, defaults: &CaptureDefaults) -> BatchSession {
        let defaults = self.defaults.unwrap_or_else(|| defaults.clone());
        BatchSession::new(self.items, defaults)
    }
}

/// Time-derived session id, e.g. `batch-20240309T140530-1a2b3c4d`.
fn session_id(now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_subsec_nanos();
    let mixed = (now.timestamp() as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(nanos as u64);
    format!(
        "batch-{}-{:08x}",
        now.format("%Y%m%dT%H%M%S"),
        (mixed ^ (mixed >> 29)) as u32
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(duration: f64) -> BatchItem {
        BatchItem::new(
            SourceSequence::new("Timelines/A", "A", "Lvl1", duration, 30.0),
            vec![],
        )
    }

    #[test]
    fn test_time_range_checks() {
        assert!(TimeRange::new(0.0, 5.0).check(10.0).is_ok());
        assert!(TimeRange::new(2.0, 10.0).check(10.0).is_ok());
        assert!(TimeRange::new(-1.0, 5.0).check(10.0).is_err());
        assert!(TimeRange::new(5.0, 5.0).check(10.0).is_err());
        assert!(TimeRange::new(3.0, 12.0).check(10.0).is_err());
    }

    #[test]
    fn test_effective_span_uses_override() {
        let plain = item(10.0);
        assert_eq!(plain.effective_duration(), 10.0);
        assert_eq!(plain.source_offset(), 0.0);

        let ranged = item(10.0).with_time_range(TimeRange::new(2.5, 4.0));
        assert_eq!(ranged.effective_duration(), 1.5);
        assert_eq!(ranged.source_offset(), 2.5);
    }

    #[test]
    fn test_effective_fps_falls_back_to_defaults() {
        let defaults = CaptureDefaults::default();
        let mut it = item(1.0);
        assert_eq!(it.effective_fps(&defaults), defaults.fps);
        it.fps_override = Some(60.0);
        assert_eq!(it.effective_fps(&defaults), 60.0);
    }

    #[test]
    fn test_new_session_is_pending() {
        let session = BatchSession::new(vec![item(1.0), item(2.0)], CaptureDefaults::default());
        assert_eq!(session.len(), 2);
        assert_eq!(
            session.statuses(),
            vec![ItemStatus::Pending, ItemStatus::Pending]
        );
        assert_eq!(session.stage, SessionStage::Preparing);
        assert!(session.id.starts_with("batch-"));
        assert!(session.check_integrity().is_ok());
    }

    #[test]
    fn test_integrity_detects_mismatched_records() {
        let mut session = BatchSession::new(vec![item(1.0)], CaptureDefaults::default());
        session.records.clear();
        assert!(session.check_integrity().is_err());
    }

    #[test]
    fn test_integrity_detects_unfinished_item_behind_cursor() {
        let mut session = BatchSession::new(vec![item(1.0), item(1.0)], CaptureDefaults::default());
        session.current_index = 1;
        assert!(session.check_integrity().is_err());
        session.records[0].status = ItemStatus::Completed;
        assert!(session.check_integrity().is_ok());
    }

    #[test]
    fn test_plan_save_load_and_defaults_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plans/batch.json");
        let plan = BatchPlan::new(vec![item(3.0)]);
        plan.save(&path).unwrap();

        let loaded = BatchPlan::load(&path).unwrap();
        assert_eq!(loaded, plan);

        let fallback = CaptureDefaults {
            fps: 24.0,
            ..CaptureDefaults::default()
        };
        let session = loaded.into_session(&fallback);
        assert_eq!(session.defaults.fps, 24.0);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_plan_load_missing_file() {
        let err = BatchPlan::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, SeqrecError::FileNotFound { .. }));
    }

    #[test]
    fn test_session_serialization_round_trip() {
        let mut session = BatchSession::new(vec![item(1.0), item(2.0)], CaptureDefaults::default());
        session.current_index = 1;
        session.records[0].status = ItemStatus::Failed;
        session.records[0].warnings.push("excluded".to_string());

        let json = serde_json::to_string_pretty(&session).unwrap();
        let parsed: BatchSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }
}
