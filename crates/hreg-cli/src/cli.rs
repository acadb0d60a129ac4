use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hreg",
    about = "Healthcare registry event log: replay and inspect event directories",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load and apply every event file in a directory
    Replay(ReplayArgs),
    /// Parse a single event file and show its envelope
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Event directory; overrides `data_dir` from the config file
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Engine configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Reject unsigned events
    #[arg(long)]
    pub require_signatures: bool,
    /// Domain tag every certificate chain is expected to carry
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Args)]
pub struct InspectArgs {
    pub file: PathBuf,
}
