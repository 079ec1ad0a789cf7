//! Capture configuration types.
//!
//! A [`CaptureConfig`] describes one output to produce while a sequence
//! plays. The common fields (name, enabled, output template, take) live on
//! the struct and everything kind-specific lives in [`CaptureSettings`],
//! a closed tagged variant. Dispatch on capture kind is a `match`, never a
//! runtime type lookup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sequence::ObjectRef;

/// The capture kinds this system knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Per-frame image sequence.
    Image,
    /// Single-file encoded movie.
    Video,
    /// Animation clip baked from a scene object.
    Animation,
    /// Point/mesh cache baked from a scene object.
    MeshCache,
    /// Geometry interchange export (Alembic, FBX, USD).
    GeometryExport,
    /// Multi-channel render passes (AOVs), one image sequence per channel.
    MultiChannelPass,
}

impl CaptureKind {
    pub const ALL: [CaptureKind; 6] = [
        CaptureKind::Image,
        CaptureKind::Video,
        CaptureKind::Animation,
        CaptureKind::MeshCache,
        CaptureKind::GeometryExport,
        CaptureKind::MultiChannelPass,
    ];

    /// Label used for the `<Kind>` placeholder and in logs.
    pub fn label(&self) -> &'static str {
        match self {
            CaptureKind::Image => "Image",
            CaptureKind::Video => "Movie",
            CaptureKind::Animation => "Animation",
            CaptureKind::MeshCache => "MeshCache",
            CaptureKind::GeometryExport => "Geometry",
            CaptureKind::MultiChannelPass => "AOV",
        }
    }

    /// Whether the backend writes one file per frame and expands `<Frame>`
    /// itself.
    pub fn expands_frames(&self) -> bool {
        matches!(self, CaptureKind::Image | CaptureKind::MultiChannelPass)
    }

    /// Whether the capture must be bound to a scene object.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            CaptureKind::Animation | CaptureKind::MeshCache | CaptureKind::GeometryExport
        )
    }

    /// Whether the capture renders pixels at a given resolution.
    pub fn has_resolution(&self) -> bool {
        matches!(
            self,
            CaptureKind::Image | CaptureKind::Video | CaptureKind::MultiChannelPass
        )
    }

    /// Parse a kind from its snake_case or label spelling.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| {
            k.label().eq_ignore_ascii_case(&lower)
                || serde_json::to_value(k)
                    .ok()
                    .and_then(|v| v.as_str().map(|s| s == lower))
                    .unwrap_or(false)
        })
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Exr,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Exr => "exr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Webm,
    Mov,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Mov => "mov",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoQuality {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnimationCompression {
    None,
    #[default]
    KeyframeReduction,
    Optimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MeshCacheFormat {
    #[default]
    Pc2,
    Mdd,
}

impl MeshCacheFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MeshCacheFormat::Pc2 => "pc2",
            MeshCacheFormat::Mdd => "mdd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeometryFormat {
    #[default]
    Alembic,
    Fbx,
    Usd,
}

impl GeometryFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            GeometryFormat::Alembic => "abc",
            GeometryFormat::Fbx => "fbx",
            GeometryFormat::Usd => "usd",
        }
    }
}

/// Kind-specific capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureSettings {
    Image {
        format: ImageFormat,
        width: u32,
        height: u32,
        fps: f64,
        #[serde(default)]
        capture_alpha: bool,
    },
    Video {
        format: VideoFormat,
        width: u32,
        height: u32,
        fps: f64,
        #[serde(default)]
        quality: VideoQuality,
        #[serde(default)]
        include_audio: bool,
    },
    Animation {
        target: Option<ObjectRef>,
        fps: f64,
        #[serde(default)]
        compression: AnimationCompression,
        #[serde(default = "default_true")]
        include_children: bool,
    },
    MeshCache {
        target: Option<ObjectRef>,
        fps: f64,
        #[serde(default)]
        format: MeshCacheFormat,
        #[serde(default)]
        world_space: bool,
    },
    GeometryExport {
        target: Option<ObjectRef>,
        fps: f64,
        #[serde(default)]
        format: GeometryFormat,
        #[serde(default)]
        compressed: bool,
    },
    MultiChannelPass {
        width: u32,
        height: u32,
        fps: f64,
        channels: Vec<String>,
    },
}

fn default_true() -> bool {
    true
}

impl CaptureSettings {
    pub fn kind(&self) -> CaptureKind {
        match self {
            CaptureSettings::Image { .. } => CaptureKind::Image,
            CaptureSettings::Video { .. } => CaptureKind::Video,
            CaptureSettings::Animation { .. } => CaptureKind::Animation,
            CaptureSettings::MeshCache { .. } => CaptureKind::MeshCache,
            CaptureSettings::GeometryExport { .. } => CaptureKind::GeometryExport,
            CaptureSettings::MultiChannelPass { .. } => CaptureKind::MultiChannelPass,
        }
    }

    pub fn fps(&self) -> f64 {
        match self {
            CaptureSettings::Image { fps, .. }
            | CaptureSettings::Video { fps, .. }
            | CaptureSettings::Animation { fps, .. }
            | CaptureSettings::MeshCache { fps, .. }
            | CaptureSettings::GeometryExport { fps, .. }
            | CaptureSettings::MultiChannelPass { fps, .. } => *fps,
        }
    }

    pub fn set_fps(&mut self, value: f64) {
        match self {
            CaptureSettings::Image { fps, .. }
            | CaptureSettings::Video { fps, .. }
            | CaptureSettings::Animation { fps, .. }
            | CaptureSettings::MeshCache { fps, .. }
            | CaptureSettings::GeometryExport { fps, .. }
            | CaptureSettings::MultiChannelPass { fps, .. } => *fps = value,
        }
    }

    /// Output resolution, for kinds that render pixels.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        match self {
            CaptureSettings::Image { width, height, .. }
            | CaptureSettings::Video { width, height, .. }
            | CaptureSettings::MultiChannelPass { width, height, .. } => Some((*width, *height)),
            _ => None,
        }
    }

    /// Set the output resolution. Returns false for kinds without one.
    pub fn set_resolution(&mut self, w: u32, h: u32) -> bool {
        match self {
            CaptureSettings::Image { width, height, .. }
            | CaptureSettings::Video { width, height, .. }
            | CaptureSettings::MultiChannelPass { width, height, .. } => {
                *width = w;
                *height = h;
                true
            }
            _ => false,
        }
    }

    /// Bound scene object, for kinds that capture one.
    pub fn target(&self) -> Option<&ObjectRef> {
        match self {
            CaptureSettings::Animation { target, .. }
            | CaptureSettings::MeshCache { target, .. }
            | CaptureSettings::GeometryExport { target, .. } => target.as_ref(),
            _ => None,
        }
    }

    /// Bind a scene object. Returns false for kinds without a target.
    pub fn set_target(&mut self, value: Option<ObjectRef>) -> bool {
        match self {
            CaptureSettings::Animation { target, .. }
            | CaptureSettings::MeshCache { target, .. }
            | CaptureSettings::GeometryExport { target, .. } => {
                *target = value;
                true
            }
            _ => false,
        }
    }

    /// Render channels, for multi-channel captures.
    pub fn channels(&self) -> &[String] {
        match self {
            CaptureSettings::MultiChannelPass { channels, .. } => channels,
            _ => &[],
        }
    }

    /// File extension the backend writes.
    pub fn extension(&self) -> &'static str {
        match self {
            CaptureSettings::Image { format, .. } => format.extension(),
            CaptureSettings::Video { format, .. } => format.extension(),
            CaptureSettings::Animation { .. } => "anim",
            CaptureSettings::MeshCache { format, .. } => format.extension(),
            CaptureSettings::GeometryExport { format, .. } => format.extension(),
            CaptureSettings::MultiChannelPass { .. } => "exr",
        }
    }
}

/// One capture to run alongside a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Display name.
    pub name: String,

    /// Disabled captures are kept in the item but never synthesized.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Output-path template, resolved per run (see [`crate::template`]).
    pub output_template: String,

    /// Take number substituted for `<Take>`.
    #[serde(default = "default_take")]
    pub take: u32,

    /// Kind-specific settings.
    #[serde(flatten)]
    pub settings: CaptureSettings,
}

fn default_take() -> u32 {
    1
}

impl CaptureConfig {
    pub fn kind(&self) -> CaptureKind {
        self.settings.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_expansion_kinds() {
        assert!(CaptureKind::Image.expands_frames());
        assert!(CaptureKind::MultiChannelPass.expands_frames());
        assert!(!CaptureKind::Video.expands_frames());
        assert!(!CaptureKind::Animation.expands_frames());
    }

    #[test]
    fn test_target_kinds() {
        let required: Vec<_> = CaptureKind::ALL
            .into_iter()
            .filter(|k| k.requires_target())
            .collect();
        assert_eq!(
            required,
            vec![
                CaptureKind::Animation,
                CaptureKind::MeshCache,
                CaptureKind::GeometryExport
            ]
        );
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(CaptureKind::parse("video"), Some(CaptureKind::Video));
        assert_eq!(CaptureKind::parse("Movie"), Some(CaptureKind::Video));
        assert_eq!(CaptureKind::parse("mesh_cache"), Some(CaptureKind::MeshCache));
        assert_eq!(CaptureKind::parse("aov"), Some(CaptureKind::MultiChannelPass));
        assert_eq!(CaptureKind::parse("hologram"), None);
    }

    #[test]
    fn test_config_serializes_flat_with_kind_tag() {
        let config = CaptureConfig {
            name: "Beauty".to_string(),
            enabled: true,
            output_template: "<Scene>/<Take>/beauty".to_string(),
            take: 3,
            settings: CaptureSettings::Video {
                format: VideoFormat::Mp4,
                width: 1280,
                height: 720,
                fps: 24.0,
                quality: VideoQuality::High,
                include_audio: false,
            },
        };

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["kind"], "video");
        assert_eq!(value["width"], 1280);

        let parsed: CaptureConfig = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_legacy_config_defaults_optional_fields() {
        let json = r#"{
            "name": "Hero anim",
            "output_template": "anim/<Take>",
            "kind": "animation",
            "target": null,
            "fps": 30.0
        }"#;
        let parsed: CaptureConfig = serde_json::from_str(json).unwrap();
        assert!(parsed.enabled);
        assert_eq!(parsed.take, 1);
        assert_eq!(parsed.kind(), CaptureKind::Animation);
        assert!(matches!(
            parsed.settings,
            CaptureSettings::Animation {
                include_children: true,
                ..
            }
        ));
    }

    #[test]
    fn test_resolution_accessors() {
        let mut settings = CaptureSettings::Animation {
            target: None,
            fps: 30.0,
            compression: AnimationCompression::None,
            include_children: true,
        };
        assert_eq!(settings.resolution(), None);
        assert!(!settings.set_resolution(10, 10));
        assert!(settings.set_target(Some(ObjectRef::new("s", "Hero"))));
        assert_eq!(settings.target().map(|t| t.name()), Some("Hero"));
    }
}
