//! Output-path template resolution.
//!
//! Templates are plain strings with `<Placeholder>` tokens, for example
//! `<Scene>_<Take>/<Scene>_<Take>_<Frame>`. Resolution is pure string
//! substitution: no I/O and no normalization. Tokens that are not
//! recognized, or whose value is not available, are left in place so
//! validation can report them.
//!
//! | Token | Value |
//! |---|---|
//! | `<Scene>` | scene name |
//! | `<Sequence>` | sequence name |
//! | `<Take>` | take number |
//! | `<Frame>` | frame index, 4-digit zero padded; kept for frame-expanding kinds |
//! | `<Width>` / `<Height>` / `<Resolution>` | output size, `<Resolution>` as `WxH` |
//! | `<Kind>` | capture kind label |
//! | `<Channel>` | render channel; kept when absent |
//! | `<Date>` / `<Time>` | timestamp as `YYYY-MM-DD` / `HH-MM-SS` |

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::capture::CaptureKind;

/// Placeholder names this resolver substitutes.
pub const RECOGNIZED_PLACEHOLDERS: [&str; 11] = [
    "Scene",
    "Sequence",
    "Take",
    "Frame",
    "Width",
    "Height",
    "Resolution",
    "Kind",
    "Channel",
    "Date",
    "Time",
];

/// Value used for `<Frame>` on single-file kinds when no frame is given.
pub const DEFAULT_FRAME: u64 = 0;

/// Values substituted into a template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateContext {
    pub scene: String,
    pub sequence: String,
    pub take: u32,
    pub frame: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub kind: CaptureKind,
    pub channel: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TemplateContext {
    pub fn new(
        scene: impl Into<String>,
        sequence: impl Into<String>,
        take: u32,
        kind: CaptureKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            scene: scene.into(),
            sequence: sequence.into(),
            take,
            frame: None,
            width: 0,
            height: 0,
            kind,
            channel: None,
            timestamp,
        }
    }

    pub fn with_frame(mut self, frame: u64) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// A `<Name>` token found in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    start: usize,
    end: usize,
    name: &'a str,
}

/// Iterate `<Name>` tokens. Names are ASCII alphanumerics or `_`; anything
/// else between angle brackets is treated as literal text.
fn tokens(template: &str) -> impl Iterator<Item = Token<'_>> {
    let bytes = template.as_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos < bytes.len() {
            if bytes[pos] != b'<' {
                pos += 1;
                continue;
            }
            let start = pos;
            let mut cursor = start + 1;
            while cursor < bytes.len()
                && (bytes[cursor].is_ascii_alphanumeric() || bytes[cursor] == b'_')
            {
                cursor += 1;
            }
            if cursor > start + 1 && cursor < bytes.len() && bytes[cursor] == b'>' {
                pos = cursor + 1;
                return Some(Token {
                    start,
                    end: cursor + 1,
                    name: &template[start + 1..cursor],
                });
            }
            pos = start + 1;
        }
        None
    })
}

fn substitution(name: &str, ctx: &TemplateContext) -> Option<String> {
    match name {
        "Scene" => Some(ctx.scene.clone()),
        "Sequence" => Some(ctx.sequence.clone()),
        "Take" => Some(ctx.take.to_string()),
        "Frame" => {
            if ctx.kind.expands_frames() {
                None
            } else {
                Some(format!("{:04}", ctx.frame.unwrap_or(DEFAULT_FRAME)))
            }
        }
        "Width" => Some(ctx.width.to_string()),
        "Height" => Some(ctx.height.to_string()),
        "Resolution" => Some(format!("{}x{}", ctx.width, ctx.height)),
        "Kind" => Some(ctx.kind.label().to_string()),
        "Channel" => ctx.channel.clone(),
        "Date" => Some(ctx.timestamp.format("%Y-%m-%d").to_string()),
        "Time" => Some(ctx.timestamp.format("%H-%M-%S").to_string()),
        _ => None,
    }
}

/// A resolved template and the tokens it left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub text: String,
    /// Names of template tokens that were not substituted, in first-seen
    /// order. Angle brackets that arrived through substituted values are
    /// plain text and never listed here.
    pub unresolved: Vec<String>,
}

impl Resolved {
    /// Text that came from no template, e.g. a literal path prefix.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            unresolved: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Nothing but `<Frame>` is left, which frame-expanding backends fill in.
    pub fn only_frame_left(&self) -> bool {
        self.unresolved.iter().all(|name| name == "Frame")
    }
}

/// Substitute every recognized placeholder that has a value in `ctx` and
/// record the template tokens that stayed.
pub fn resolve_template(template: &str, ctx: &TemplateContext) -> Resolved {
    let mut text = String::with_capacity(template.len() + 32);
    let mut unresolved: Vec<String> = Vec::new();
    let mut last = 0;
    for token in tokens(template) {
        text.push_str(&template[last..token.start]);
        match substitution(token.name, ctx) {
            Some(value) => text.push_str(&value),
            None => {
                text.push_str(&template[token.start..token.end]);
                if !unresolved.iter().any(|n| n == token.name) {
                    unresolved.push(token.name.to_string());
                }
            }
        }
        last = token.end;
    }
    text.push_str(&template[last..]);
    Resolved { text, unresolved }
}

/// Substitute every recognized placeholder that has a value in `ctx`.
pub fn resolve(template: &str, ctx: &TemplateContext) -> String {
    resolve_template(template, ctx).text
}

/// Placeholder tokens in a template string, in first-seen order.
///
/// Only meaningful on template text. For resolved output use
/// [`Resolved::unresolved`], since substituted values may contain `<..>`.
pub fn unresolved_placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for token in tokens(text) {
        if !names.iter().any(|n| n == token.name) {
            names.push(token.name.to_string());
        }
    }
    names
}

/// Whether `name` is a placeholder this resolver knows.
pub fn is_recognized(name: &str) -> bool {
    RECOGNIZED_PLACEHOLDERS.contains(&name)
}

/// Lexically normalize a path string.
///
/// Converts `\` to `/`, drops empty and `.` segments and folds `..` where a
/// parent exists. Nothing is read from disk.
pub fn normalize_path(path: &str) -> PathBuf {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        PathBuf::from(format!("/{joined}"))
    } else {
        PathBuf::from(joined)
    }
}

/// Place a resolved template on disk.
///
/// Relative results land under `project_root/base_output_path`; absolute
/// results are kept as they are. The extension is appended when given.
/// Returns `None` while template tokens other than `<Frame>` remain, so
/// template syntax is never reshaped as if it were a path. `<Frame>` is
/// kept for the backend.
pub fn compose_output_path(
    resolved: &Resolved,
    project_root: &std::path::Path,
    base_output_path: &std::path::Path,
    extension: Option<&str>,
) -> Option<PathBuf> {
    if !resolved.only_frame_left() {
        return None;
    }
    let with_ext = match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{ext}", resolved.text),
        _ => resolved.text.clone(),
    };
    let relative = normalize_path(&with_ext);
    if relative.is_absolute() {
        return Some(relative);
    }
    Some(normalize_path(&format!(
        "{}/{}/{}",
        project_root.to_string_lossy(),
        base_output_path.to_string_lossy(),
        relative.to_string_lossy()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::path::Path;

    fn ctx(kind: CaptureKind) -> TemplateContext {
        TemplateContext::new(
            "Lvl1",
            "Intro",
            2,
            kind,
            Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 30).unwrap(),
        )
        .with_frame(7)
        .with_resolution(1920, 1080)
    }

    const EXAMPLE: &str = "<Scene>_<Take>/<Scene>_<Take>_<Frame>";

    #[test]
    fn test_image_kind_keeps_frame_for_backend() {
        assert_eq!(
            resolve(EXAMPLE, &ctx(CaptureKind::Image)),
            "Lvl1_2/Lvl1_2_<Frame>"
        );
    }

    #[test]
    fn test_video_kind_substitutes_padded_frame() {
        assert_eq!(
            resolve(EXAMPLE, &ctx(CaptureKind::Video)),
            "Lvl1_2/Lvl1_2_0007"
        );
    }

    #[test]
    fn test_missing_frame_uses_default() {
        let mut c = ctx(CaptureKind::Animation);
        c.frame = None;
        assert_eq!(resolve("clip_<Frame>", &c), "clip_0000");
    }

    #[test]
    fn test_unknown_placeholders_left_intact() {
        let out = resolve_template("<Scene>/<Camera>/<Take>/<Camera>", &ctx(CaptureKind::Video));
        assert_eq!(out.text, "Lvl1/<Camera>/2/<Camera>");
        assert_eq!(out.unresolved, vec!["Camera".to_string()]);
    }

    #[test]
    fn test_channel_left_when_absent() {
        let c = ctx(CaptureKind::MultiChannelPass);
        assert_eq!(resolve("pass_<Channel>", &c), "pass_<Channel>");
        let c = c.with_channel("depth");
        assert_eq!(resolve("pass_<Channel>", &c), "pass_depth");
    }

    #[test]
    fn test_resolution_kind_and_timestamp() {
        let out = resolve(
            "<Kind>_<Resolution>_<Width>_<Height>_<Date>_<Time>",
            &ctx(CaptureKind::Video),
        );
        assert_eq!(out, "Movie_1920x1080_1920_1080_2024-03-09_14-05-30");
    }

    #[test]
    fn test_non_token_angle_brackets_are_literal() {
        let out = resolve("a < b/<Take>/<not a token>/<>", &ctx(CaptureKind::Video));
        assert_eq!(out, "a < b/2/<not a token>/<>");
    }

    #[test]
    fn test_separators_in_values_are_tolerated() {
        let mut c = ctx(CaptureKind::Video);
        c.scene = "World/Lvl1".to_string();
        assert_eq!(resolve("<Scene>/out", &c), "World/Lvl1/out");
    }

    #[test]
    fn test_brackets_in_values_are_not_placeholders() {
        let mut c = ctx(CaptureKind::Video);
        c.sequence = "Boss<Intro>".to_string();
        let out = resolve_template("<Scene>/<Sequence>_<Take>/movie", &c);
        assert_eq!(out.text, "Lvl1/Boss<Intro>_2/movie");
        assert!(out.is_complete());
        assert_eq!(
            compose_output_path(&out, Path::new("/proj"), Path::new("Recordings"), Some("mp4")),
            Some(PathBuf::from("/proj/Recordings/Lvl1/Boss<Intro>_2/movie.mp4"))
        );
    }

    #[test]
    fn test_normalize_cleans_segments() {
        assert_eq!(
            normalize_path("Recordings\\.\\a//b/../c"),
            PathBuf::from("Recordings/a/c")
        );
        assert_eq!(normalize_path("/x/../../y"), PathBuf::from("/y"));
        assert_eq!(normalize_path("../y"), PathBuf::from("../y"));
    }

    #[test]
    fn test_compose_places_relative_under_base() {
        let path = compose_output_path(
            &resolve_template("<Scene>_<Take>/shot_<Frame>", &ctx(CaptureKind::Image)),
            Path::new("/proj"),
            Path::new("Recordings"),
            Some("png"),
        );
        assert_eq!(
            path,
            Some(PathBuf::from("/proj/Recordings/Lvl1_2/shot_<Frame>.png"))
        );
    }

    #[test]
    fn test_compose_keeps_absolute_and_rejects_unknown() {
        assert_eq!(
            compose_output_path(
                &Resolved::literal("/mnt/out/clip"),
                Path::new("/proj"),
                Path::new("R"),
                None
            ),
            Some(PathBuf::from("/mnt/out/clip"))
        );
        let camera = resolve_template("<Camera>/clip", &ctx(CaptureKind::Video));
        assert_eq!(
            compose_output_path(&camera, Path::new("/proj"), Path::new("R"), None),
            None
        );
    }

    proptest! {
        #[test]
        fn prop_resolve_is_deterministic(
            template in "[A-Za-z_/<>. ]{0,40}",
            take in 0u32..1000,
            frame in proptest::option::of(0u64..100_000),
        ) {
            let mut c = ctx(CaptureKind::Video);
            c.take = take;
            c.frame = frame;
            prop_assert_eq!(resolve(&template, &c), resolve(&template, &c));
        }

        #[test]
        fn prop_unknown_placeholders_survive(
            name in "[A-Z][a-z]{2,8}",
            prefix in "[a-z/]{0,10}",
        ) {
            prop_assume!(!is_recognized(&name));
            let template = format!("{prefix}<{name}>/<Take>");
            let out = resolve_template(&template, &ctx(CaptureKind::Image));
            let placeholder = format!("<{name}>");
            prop_assert!(out.text.contains(&placeholder));
            prop_assert_eq!(out.unresolved, vec![name]);
        }

        #[test]
        fn prop_recognized_text_only_grows_by_substitution(take in 0u32..100) {
            let mut c = ctx(CaptureKind::Video);
            c.take = take;
            let out = resolve("<Take>", &c);
            prop_assert_eq!(out, take.to_string());
        }
    }
}
