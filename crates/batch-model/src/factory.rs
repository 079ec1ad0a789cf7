//! Default capture configurations per kind.

use crate::batch::CaptureDefaults;
use crate::capture::{
    AnimationCompression, CaptureConfig, CaptureKind, CaptureSettings, GeometryFormat,
    ImageFormat, MeshCacheFormat, VideoFormat, VideoQuality,
};
use crate::sequence::ObjectRef;

/// Channels a new multi-channel capture renders.
pub const DEFAULT_CHANNELS: [&str; 2] = ["beauty", "depth"];

/// Default output template for `kind`.
///
/// Frame-expanding kinds carry a `<Frame>` token for the backend; single
/// file kinds do not.
pub fn default_template(kind: CaptureKind) -> &'static str {
    match kind {
        CaptureKind::Image => "<Scene>/<Sequence>_<Take>/image_<Frame>",
        CaptureKind::Video => "<Scene>/<Sequence>_<Take>/movie",
        CaptureKind::Animation => "<Scene>/<Sequence>_<Take>/animation",
        CaptureKind::MeshCache => "<Scene>/<Sequence>_<Take>/meshcache",
        CaptureKind::GeometryExport => "<Scene>/<Sequence>_<Take>/geometry",
        CaptureKind::MultiChannelPass => "<Scene>/<Sequence>_<Take>/<Channel>/aov_<Frame>",
    }
}

/// Build the default configuration for `kind`.
///
/// Resolution and frame rate come from `defaults`. Kinds that bind a scene
/// object start out targeting the whole active scene.
pub fn create_default(kind: CaptureKind, defaults: &CaptureDefaults) -> CaptureConfig {
    let fps = defaults.fps;
    let (width, height) = (defaults.width, defaults.height);
    let settings = match kind {
        CaptureKind::Image => CaptureSettings::Image {
            format: ImageFormat::Png,
            width,
            height,
            fps,
            capture_alpha: false,
        },
        CaptureKind::Video => CaptureSettings::Video {
            format: VideoFormat::Mp4,
            width,
            height,
            fps,
            quality: VideoQuality::High,
            include_audio: false,
        },
        CaptureKind::Animation => CaptureSettings::Animation {
            target: Some(ObjectRef::scene_root()),
            fps,
            compression: AnimationCompression::KeyframeReduction,
            include_children: true,
        },
        CaptureKind::MeshCache => CaptureSettings::MeshCache {
            target: Some(ObjectRef::scene_root()),
            fps,
            format: MeshCacheFormat::Pc2,
            world_space: false,
        },
        CaptureKind::GeometryExport => CaptureSettings::GeometryExport {
            target: Some(ObjectRef::scene_root()),
            fps,
            format: GeometryFormat::Alembic,
            compressed: true,
        },
        CaptureKind::MultiChannelPass => CaptureSettings::MultiChannelPass {
            width,
            height,
            fps,
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
        },
    };

    CaptureConfig {
        name: kind.label().to_string(),
        enabled: true,
        output_template: default_template(kind).to_string(),
        take: 1,
        settings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::unresolved_placeholders;
    use crate::validate::{validate, ValidationContext};
    use proptest::prelude::*;
    use std::path::Path;

    #[test]
    fn test_frame_token_only_on_frame_kinds() {
        for kind in CaptureKind::ALL {
            let has_frame = unresolved_placeholders(default_template(kind))
                .iter()
                .any(|n| n == "Frame");
            assert_eq!(has_frame, kind.expands_frames(), "{kind}");
        }
    }

    #[test]
    fn test_defaults_follow_global_settings() {
        let defaults = CaptureDefaults {
            fps: 24.0,
            width: 1280,
            height: 720,
            ..CaptureDefaults::default()
        };
        let config = create_default(CaptureKind::Video, &defaults);
        assert_eq!(config.settings.fps(), 24.0);
        assert_eq!(config.settings.resolution(), Some((1280, 720)));
        assert_eq!(config.take, 1);
        assert!(config.enabled);
    }

    #[test]
    fn test_every_default_validates_without_errors() {
        let defaults = CaptureDefaults::default();
        let ctx = ValidationContext::new(&defaults, Path::new("/proj"));
        for kind in CaptureKind::ALL {
            let result = validate(&create_default(kind, &defaults), &ctx);
            assert!(result.is_ok(), "{kind}: {:?}", result.errors);
        }
    }

    proptest! {
        #[test]
        fn prop_default_then_validate_is_clean(
            kind_index in 0usize..6,
            fps in 1.0f64..240.0,
            width in 1u32..=8192,
            height in 1u32..=8192,
        ) {
            let defaults = CaptureDefaults { fps, width, height, ..CaptureDefaults::default() };
            let ctx = ValidationContext::new(&defaults, Path::new("/proj"));
            let config = create_default(CaptureKind::ALL[kind_index], &defaults);
            let result = validate(&config, &ctx);
            prop_assert!(result.errors.is_empty(), "{:?}", result.errors);
        }
    }
}
