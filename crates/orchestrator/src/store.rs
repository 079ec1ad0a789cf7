//! Restart-surviving persistence for batch sessions.
//!
//! The store is a plain key-value collaborator. [`SessionStore`] layers the
//! session record layout on top of it:
//!
//! | Key | Value |
//! |---|---|
//! | `session.active` | the running [`BatchSession`] as JSON |
//! | `session.marker` | id of the running session |
//! | `session.archive.<id>` | finished sessions |
//!
//! The marker is written together with the record. Finding the marker
//! without the record on rehydration means the record was lost between
//! restart boundaries.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use seqrec_common::error::{SeqrecError, SeqrecResult};
use seqrec_model::batch::BatchSession;

const ACTIVE_KEY: &str = "session.active";
const MARKER_KEY: &str = "session.marker";
const ARCHIVE_PREFIX: &str = "session.archive.";

/// Durable string storage that survives a runtime restart.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> SeqrecResult<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> SeqrecResult<()>;

    fn remove(&mut self, key: &str) -> SeqrecResult<()>;
}

/// Directory-backed store: one `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> SeqrecResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> SeqrecResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SeqrecError::persistence(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> SeqrecResult<()> {
        let path = self.path_for(key);
        // Write-then-rename so a crash never leaves a half-written record.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| {
            SeqrecError::persistence(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            SeqrecError::persistence(format!("Failed to replace {}: {e}", path.display()))
        })?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> SeqrecResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store. Clones share the same map, so a clone handed to a
/// rebuilt machine plays the role of storage that outlived a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SeqrecResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| SeqrecError::persistence("memory store lock poisoned"))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> SeqrecResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> SeqrecResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> SeqrecResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Session record layout over a [`KeyValueStore`].
pub struct SessionStore {
    inner: Box<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(inner: Box<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// Persist the active session and stamp its checkpoint time.
    pub fn save_active(&mut self, session: &mut BatchSession) -> SeqrecResult<()> {
        session.checkpoint_at = Utc::now();
        let json = serde_json::to_string_pretty(session)?;
        self.inner.set(ACTIVE_KEY, &json)?;
        self.inner.set(MARKER_KEY, &session.id)?;
        tracing::debug!(
            session_id = %session.id,
            index = session.current_index,
            "Session checkpoint written"
        );
        Ok(())
    }

    /// Read the active session.
    ///
    /// A record that exists but does not parse is a `SessionIntegrity`
    /// error, not a missing session.
    pub fn load_active(&self) -> SeqrecResult<Option<BatchSession>> {
        let Some(json) = self.inner.get(ACTIVE_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| SeqrecError::session_integrity(format!("corrupt session record: {e}")))
    }

    /// Id of the session that was running when the record was last written.
    pub fn marker(&self) -> SeqrecResult<Option<String>> {
        self.inner.get(MARKER_KEY)
    }

    /// Move `session` to the archive and clear the active slot.
    pub fn archive(&mut self, session: &mut BatchSession) -> SeqrecResult<()> {
        session.checkpoint_at = Utc::now();
        let json = serde_json::to_string_pretty(session)?;
        self.inner
            .set(&format!("{ARCHIVE_PREFIX}{}", session.id), &json)?;
        self.clear_active()?;
        tracing::info!(session_id = %session.id, stage = ?session.stage, "Session archived");
        Ok(())
    }

    /// Drop the active record and marker.
    pub fn clear_active(&mut self) -> SeqrecResult<()> {
        self.inner.remove(ACTIVE_KEY)?;
        self.inner.remove(MARKER_KEY)
    }

    pub fn load_archived(&self, id: &str) -> SeqrecResult<Option<BatchSession>> {
        let Some(json) = self.inner.get(&format!("{ARCHIVE_PREFIX}{id}"))? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&json)?))
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}
