//! Source sequences and durable scene-object references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of an externally authored sequence asset.
///
/// This is the asset path (or GUID) the host uses to load the sequence. It is
/// what gets persisted, never a live handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(pub String);

impl SequenceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A timed sequence that drives the scene. Read-only to this system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSequence {
    /// Asset identifier.
    pub id: SequenceId,

    /// Display name, used for the `<Sequence>` placeholder.
    pub name: String,

    /// Scene the sequence plays in, used for the `<Scene>` placeholder.
    pub scene: String,

    /// Nominal duration in seconds.
    pub duration_secs: f64,

    /// Authored frame rate.
    pub fps: f64,
}

impl SourceSequence {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        scene: impl Into<String>,
        duration_secs: f64,
        fps: f64,
    ) -> Self {
        Self {
            id: SequenceId::new(id),
            name: name.into(),
            scene: scene.into(),
            duration_secs,
            fps,
        }
    }

    /// Whether the sequence can be played at all.
    pub fn is_playable(&self) -> bool {
        self.duration_secs.is_finite() && self.duration_secs > 0.0
    }
}

/// Durable reference to a scene object.
///
/// Raw object handles do not survive a runtime restart, so targets are
/// addressed by scene path plus hierarchy path and re-resolved on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Scene asset path (e.g. `Scenes/Lvl1`).
    pub scene_path: String,

    /// Object path inside the scene hierarchy (e.g. `Rig/Hero`).
    pub object_path: String,
}

impl ObjectRef {
    pub fn new(scene_path: impl Into<String>, object_path: impl Into<String>) -> Self {
        Self {
            scene_path: scene_path.into(),
            object_path: object_path.into(),
        }
    }

    /// Reference to the whole active scene rather than one object.
    pub fn scene_root() -> Self {
        Self::new("", "/")
    }

    pub fn is_scene_root(&self) -> bool {
        self.scene_path.is_empty() && self.object_path == "/"
    }

    /// Leaf object name (last hierarchy segment).
    pub fn name(&self) -> &str {
        self.object_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.object_path)
    }

    pub fn is_empty(&self) -> bool {
        self.object_path.trim().is_empty()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scene_path, self.object_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_name_is_leaf_segment() {
        let r = ObjectRef::new("Scenes/Lvl1", "Rig/Body/Hero");
        assert_eq!(r.name(), "Hero");
        assert_eq!(r.to_string(), "Scenes/Lvl1:Rig/Body/Hero");
    }

    #[test]
    fn test_scene_root_reference() {
        let root = ObjectRef::scene_root();
        assert!(root.is_scene_root());
        assert!(!root.is_empty());
        assert!(!ObjectRef::new("Lvl1", "/").is_scene_root());
    }

    #[test]
    fn test_unplayable_sequences() {
        assert!(!SourceSequence::new("a", "a", "s", 0.0, 30.0).is_playable());
        assert!(!SourceSequence::new("a", "a", "s", -2.0, 30.0).is_playable());
        assert!(!SourceSequence::new("a", "a", "s", f64::NAN, 30.0).is_playable());
        assert!(SourceSequence::new("a", "a", "s", 0.5, 30.0).is_playable());
    }

    #[test]
    fn test_sequence_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&SequenceId::new("Timelines/Intro")).unwrap();
        assert_eq!(json, "\"Timelines/Intro\"");
    }
}
