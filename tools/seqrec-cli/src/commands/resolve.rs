//! Resolve an output path template.

use chrono::Utc;
use seqrec_common::config::AppConfig;
use seqrec_model::template::{self, TemplateContext};

#[allow(clippy::too_many_arguments)]
pub fn run(
    config: &AppConfig,
    template_str: String,
    scene: String,
    sequence: String,
    take: u32,
    kind: String,
    frame: Option<u64>,
    channel: Option<String>,
) -> anyhow::Result<()> {
    let kind = super::parse_kind(&kind)?;
    let defaults = &config.defaults;

    let mut ctx = TemplateContext::new(scene, sequence, take, kind, Utc::now())
        .with_resolution(defaults.width, defaults.height);
    if let Some(frame) = frame {
        ctx = ctx.with_frame(frame);
    }
    if let Some(channel) = channel {
        ctx = ctx.with_channel(channel);
    }

    let resolved = template::resolve_template(&template_str, &ctx);
    println!("Resolved: {}", resolved.text);

    if !resolved.is_complete() {
        println!(
            "Unresolved: {}",
            resolved
                .unresolved
                .iter()
                .map(|n| format!("<{n}>"))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    match template::compose_output_path(
        &resolved,
        &config.project_root,
        &defaults.base_output_path,
        None,
    ) {
        Some(full) => println!("Output path: {}", full.display()),
        None => println!("Output path: (cannot be composed)"),
    }

    Ok(())
}
