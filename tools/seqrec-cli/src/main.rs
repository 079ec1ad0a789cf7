//! seqrec CLI: validate, repair and run batch recording plans.
//!
//! Usage:
//!   seqrec validate <PLAN>          Validate a batch plan
//!   seqrec repair <PLAN> [--write]  Auto-repair capture configurations
//!   seqrec resolve <TEMPLATE>       Resolve an output path template
//!   seqrec defaults <KIND>          Print the default capture of a kind
//!   seqrec run <PLAN>               Run a batch with dry-run backends
//!   seqrec status                   Show the persisted session

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use seqrec_common::config::AppConfig;

mod commands;
mod dry_run;

#[derive(Parser)]
#[command(
    name = "seqrec",
    about = "Batch recording orchestration for timeline sequences",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the project root from the config
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every item and capture of a batch plan
    Validate {
        /// Path to the batch plan (JSON)
        plan: PathBuf,

        /// Scene listing (JSON) used to check capture targets
        #[arg(long)]
        scene: Option<PathBuf>,
    },

    /// Repair capture configurations until they validate
    Repair {
        /// Path to the batch plan (JSON)
        plan: PathBuf,

        /// Scene listing (JSON) used to re-bind capture targets
        #[arg(long)]
        scene: Option<PathBuf>,

        /// Write the repaired plan back to disk
        #[arg(long)]
        write: bool,
    },

    /// Resolve an output path template
    Resolve {
        /// Template, e.g. "<Scene>/<Sequence>_<Take>/movie"
        template: String,

        /// Value for <Scene>
        #[arg(long, default_value = "Scene")]
        scene: String,

        /// Value for <Sequence>
        #[arg(long, default_value = "Sequence")]
        sequence: String,

        /// Value for <Take>
        #[arg(long, default_value = "1")]
        take: u32,

        /// Capture kind (video, image, animation, mesh_cache, ...)
        #[arg(long, default_value = "video")]
        kind: String,

        /// Value for <Frame>
        #[arg(long)]
        frame: Option<u64>,

        /// Value for <Channel>
        #[arg(long)]
        channel: Option<String>,
    },

    /// Print the default configuration for a capture kind
    Defaults {
        /// Capture kind (video, image, animation, mesh_cache, ...)
        kind: String,
    },

    /// Run a batch plan end to end with dry-run backends
    Run {
        /// Path to the batch plan (JSON)
        plan: Option<PathBuf>,

        /// Scene listing (JSON) used to check capture targets
        #[arg(long)]
        scene: Option<PathBuf>,

        /// Resume the persisted session instead of starting a new one
        #[arg(long)]
        resume: bool,

        /// Refuse to start while configuration errors remain
        #[arg(long)]
        strict: bool,

        /// Skip the auto-repair pass
        #[arg(long)]
        no_repair: bool,

        /// Cancel the session after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show the active or an archived session
    Status {
        /// Archived session id
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    seqrec_common::logging::init_cli_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if let Some(root) = cli.project_root {
        config.project_root = root;
    }

    match cli.command {
        Commands::Validate { plan, scene } => commands::validate::run(&config, plan, scene),
        Commands::Repair { plan, scene, write } => {
            commands::repair::run(&config, plan, scene, write)
        }
        Commands::Resolve {
            template,
            scene,
            sequence,
            take,
            kind,
            frame,
            channel,
        } => commands::resolve::run(
            &config, template, scene, sequence, take, kind, frame, channel,
        ),
        Commands::Defaults { kind } => commands::defaults::run(&config, kind),
        Commands::Run {
            plan,
            scene,
            resume,
            strict,
            no_repair,
            timeout_secs,
        } => {
            commands::run::run(
                config,
                commands::run::RunArgs {
                    plan,
                    scene,
                    resume,
                    strict,
                    auto_repair: !no_repair,
                    timeout_secs,
                },
            )
            .await
        }
        Commands::Status { session } => commands::status::run(&config, session),
    }
}
