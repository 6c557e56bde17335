//! CLI command definitions using clap

use crate::config::{ColorChoice, CATALOG_ENV, SNAPSHOT_ENV};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Precursor: plan the prerequisite tests an e2e test needs before it can run
#[derive(Parser, Debug)]
#[command(name = "precursor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Catalog directory with one implication descriptor per file
    #[arg(long, env = CATALOG_ENV, global = true)]
    pub catalog: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the prerequisite chain for a target status
    Analyze(PlanArgs),

    /// Exit non-zero unless the target status can run now
    Check(PlanArgs),

    /// Validate every descriptor in the catalog
    Validate(ValidateArgs),

    /// Export the status graph in DOT format
    Graph(GraphArgs),
}

/// Arguments shared by `analyze` and `check`
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Target status to plan for
    pub status: String,

    /// Snapshot JSON file (missing file means an empty snapshot)
    #[arg(short, long, env = SNAPSHOT_ENV)]
    pub snapshot: Option<PathBuf>,

    /// Event name to prefer when choosing setup entries and transitions
    #[arg(short, long)]
    pub event: Option<String>,

    /// Test file currently being run
    #[arg(short = 't', long)]
    pub test_file: Option<String>,

    /// Platform the caller runs on
    #[arg(short, long, default_value = "web")]
    pub platform: String,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the validate command
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Treat warnings as failures
    #[arg(long)]
    pub strict: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the graph command
#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    /// Write the graph to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Auto-detect
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
