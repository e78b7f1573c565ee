//! shift: the PromptShift command line.
//!
//! # Usage
//!
//! ```text
//! shift --config shift.toml run --candidate candidate.toml
//! shift --config shift.toml validate
//! shift --config shift.toml status <pipeline-id>
//! shift --config shift.toml rollback <pipeline-id>
//! shift --config shift.toml history
//! shift --config shift.toml serve --port 8080
//! ```
//!
//! `run` exits 0 when the candidate is promoted, 1 when the gate blocks
//! it, 2 when it is rolled back after promotion and 3 on any fatal error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

/// Exit code for configuration and other fatal errors.
const EXIT_FATAL: u8 = 3;

#[derive(Parser)]
#[command(
    name = "shift",
    about = "PromptShift: quality-gated prompt and model rollouts",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to shift.toml.
    #[arg(short, long, global = true, default_value = "shift.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Test, gate, deploy and monitor one candidate.
    Run {
        /// Candidate descriptor (.toml or .json).
        #[arg(long)]
        candidate: PathBuf,
        /// Deployment target (default: [pipeline].target).
        #[arg(long)]
        target: Option<String>,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Check configuration, templates, corpus, backends and guardrail probes.
    Validate {
        /// Template directory (default: [templates].dir).
        #[arg(long)]
        templates: Option<PathBuf>,
    },
    /// Show the report of one rollout.
    Status {
        pipeline_id: String,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Force a finished promotion back to the previous live pointer.
    Rollback { pipeline_id: String },
    /// List every recorded rollout.
    History {
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Serve the REST API.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shift=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = cli.config;
    let result = match cli.command {
        Commands::Run {
            candidate,
            target,
            format,
        } => commands::run::run(&config, &candidate, target, format).await,
        Commands::Validate { templates } => commands::validate::validate(&config, templates),
        Commands::Status {
            pipeline_id,
            format,
        } => commands::status::status(&config, &pipeline_id, format),
        Commands::Rollback { pipeline_id } => {
            commands::status::rollback(&config, &pipeline_id).await
        }
        Commands::History { format } => commands::status::history(&config, format),
        Commands::Serve { port } => commands::serve::serve(&config, port).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
