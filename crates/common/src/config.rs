//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root that relative output paths are resolved against.
    pub project_root: PathBuf,

    /// Hard boundary for output paths. `None` disables the check.
    pub permitted_root: Option<PathBuf>,

    /// Directory backing the persisted session store.
    pub state_dir: PathBuf,

    /// Default capture parameters.
    pub defaults: CaptureDefaults,

    /// Auto-repair driver settings.
    pub repair: RepairConfig,

    /// Session recovery settings.
    pub session: SessionPolicy,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default capture parameters applied when a configuration omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Default frame rate.
    pub fps: f64,

    /// Default output width in pixels.
    pub width: u32,

    /// Default output height in pixels.
    pub height: u32,

    /// Base directory prepended to every resolved output path.
    pub base_output_path: PathBuf,
}

/// Auto-repair driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Upper bound on validate/repair passes per configuration.
    pub max_iterations: usize,
}

/// Session recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// How many times an item may be started before it is marked failed.
    /// Interrupted runs (a restart while an item was executing) count.
    pub max_item_attempts: u32,

    /// A persisted session whose last checkpoint is older than this is
    /// archived as abandoned instead of resumed.
    pub abandon_after_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "seqrec=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            permitted_root: None,
            state_dir: default_state_dir(),
            defaults: CaptureDefaults::default(),
            repair: RepairConfig::default(),
            session: SessionPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            fps: 30.0,
            width: 1920,
            height: 1080,
            base_output_path: PathBuf::from("Recordings"),
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self { max_iterations: 5 }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_item_attempts: 2,
            abandon_after_secs: 24 * 60 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("seqrec").join("config.json")
}

/// Default session state directory.
fn default_state_dir() -> PathBuf {
    let base = std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("state")
        });
    base.join("seqrec").join("sessions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.defaults.fps, 30.0);
        assert_eq!(config.defaults.width, 1920);
        assert_eq!(config.repair.max_iterations, 5);
        assert_eq!(config.session.max_item_attempts, 2);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.defaults.fps = 60.0;
        config.permitted_root = Some(PathBuf::from("/srv/captures"));
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.defaults.fps, 60.0);
        assert_eq!(loaded.permitted_root, Some(PathBuf::from("/srv/captures")));
    }

    #[test]
    fn test_malformed_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.defaults.width, 1920);
    }

    #[test]
    fn test_partial_config_fills_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "defaults": { "fps": 24.0 } }"#).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.defaults.fps, 24.0);
        assert_eq!(loaded.defaults.height, 1080);
        assert_eq!(loaded.logging.level, "info");
    }
}
