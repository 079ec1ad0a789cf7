//! Scene-object lookup contracts.
//!
//! The host owns the live scene. Captures only hold [`ObjectRef`]s and ask a
//! [`SceneResolver`] to re-locate them, which is the only way a binding can
//! survive a runtime restart.

use serde::{Deserialize, Serialize};

use crate::capture::CaptureKind;
use crate::sequence::ObjectRef;

/// Component capabilities a capture may require of its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCapability {
    /// Drives an animator/rig.
    Animator,
    /// Has a skinned (deforming) mesh.
    SkinnedMesh,
    /// Has a static mesh.
    Mesh,
}

impl ObjectCapability {
    /// Capabilities to search for when re-binding a capture, best first.
    pub fn preferred_for(kind: CaptureKind) -> &'static [ObjectCapability] {
        match kind {
            CaptureKind::Animation => &[ObjectCapability::SkinnedMesh, ObjectCapability::Animator],
            CaptureKind::MeshCache => &[ObjectCapability::SkinnedMesh, ObjectCapability::Mesh],
            CaptureKind::GeometryExport => &[ObjectCapability::Mesh, ObjectCapability::SkinnedMesh],
            _ => &[],
        }
    }
}

/// A live scene object as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub reference: ObjectRef,
    #[serde(default)]
    pub capabilities: Vec<ObjectCapability>,
}

impl SceneObject {
    pub fn has(&self, capability: ObjectCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Resolves durable references against the active scene.
pub trait SceneResolver {
    /// Look up an object. `None` means the reference is dangling.
    ///
    /// [`ObjectRef::scene_root`] always resolves while a scene is loaded.
    fn resolve(&self, reference: &ObjectRef) -> Option<SceneObject>;

    /// First object (in scene order) carrying `capability`.
    fn find_with_capability(&self, capability: ObjectCapability) -> Option<ObjectRef>;
}

/// Scene snapshot held in memory, e.g. loaded from a JSON listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub objects: Vec<SceneObject>,
}

impl SceneSnapshot {
    pub fn new(objects: Vec<SceneObject>) -> Self {
        Self { objects }
    }

    pub fn with(mut self, reference: ObjectRef, capabilities: &[ObjectCapability]) -> Self {
        self.objects.push(SceneObject {
            reference,
            capabilities: capabilities.to_vec(),
        });
        self
    }
}

impl SceneResolver for SceneSnapshot {
    fn resolve(&self, reference: &ObjectRef) -> Option<SceneObject> {
        if reference.is_scene_root() {
            return Some(SceneObject {
                reference: reference.clone(),
                capabilities: vec![],
            });
        }
        self.objects
            .iter()
            .find(|o| &o.reference == reference)
            .cloned()
    }

    fn find_with_capability(&self, capability: ObjectCapability) -> Option<ObjectRef> {
        self.objects
            .iter()
            .find(|o| o.has(capability))
            .map(|o| o.reference.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_lookup_in_scene_order() {
        let scene = SceneSnapshot::default()
            .with(ObjectRef::new("Lvl1", "Props/Crate"), &[ObjectCapability::Mesh])
            .with(
                ObjectRef::new("Lvl1", "Rig/Hero"),
                &[ObjectCapability::SkinnedMesh, ObjectCapability::Animator],
            )
            .with(
                ObjectRef::new("Lvl1", "Rig/Villain"),
                &[ObjectCapability::SkinnedMesh],
            );

        assert_eq!(
            scene.find_with_capability(ObjectCapability::SkinnedMesh),
            Some(ObjectRef::new("Lvl1", "Rig/Hero"))
        );
        assert!(scene.resolve(&ObjectRef::new("Lvl1", "Props/Crate")).is_some());
        assert!(scene.resolve(&ObjectRef::new("Lvl2", "Props/Crate")).is_none());
    }

    #[test]
    fn test_preferred_capabilities() {
        assert_eq!(
            ObjectCapability::preferred_for(CaptureKind::Animation)[0],
            ObjectCapability::SkinnedMesh
        );
        assert!(ObjectCapability::preferred_for(CaptureKind::Video).is_empty());
    }
}
