//! Print the default configuration for a capture kind.

use seqrec_common::config::AppConfig;
use seqrec_model::factory::create_default;

pub fn run(config: &AppConfig, kind: String) -> anyhow::Result<()> {
    let kind = super::parse_kind(&kind)?;
    let capture = create_default(kind, &config.defaults);
    println!("{}", serde_json::to_string_pretty(&capture)?);
    Ok(())
}
