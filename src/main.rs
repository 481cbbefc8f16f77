use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "rigup")]
#[command(version, about = "Guided-setup orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a setup plan
    Run {
        /// Path to the setup-plan.json file
        plan: PathBuf,

        /// Maximum operations to run in parallel
        #[arg(long, default_value_t = 1)]
        max_parallel: usize,

        /// Answer recovery prompts automatically (retry once, then skip)
        #[arg(long)]
        yes: bool,

        /// Console buffer capacity in lines
        #[arg(long, default_value_t = 1000)]
        console_capacity: usize,

        /// Base working directory for operations
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Export the run log on completion (plain-text, json, csv, html)
        #[arg(long)]
        export: Option<String>,

        /// Output path for the exported log
        #[arg(long)]
        out: Option<PathBuf>,

        /// Minimum severity to export (info, warning, error)
        #[arg(long)]
        min_severity: Option<String>,
    },
    /// Validate a setup plan without running it
    Validate {
        /// Path to the setup-plan.json file
        plan: PathBuf,
    },
    /// List the supported operation kinds
    Kinds,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "rigup=debug" } else { "rigup=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            plan,
            max_parallel,
            yes,
            console_capacity,
            working_dir,
            export,
            out,
            min_severity,
        } => {
            cmd::run(cmd::RunArgs {
                plan,
                max_parallel,
                yes,
                console_capacity,
                working_dir,
                export,
                out,
                min_severity,
            })
            .await
        }
        Commands::Validate { plan } => cmd::validate(&plan),
        Commands::Kinds => cmd::kinds(),
    }
}
