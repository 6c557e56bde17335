//! Precursor CLI: plan e2e test prerequisites from the command line
//!
//! ## Usage
//!
//! ```bash
//! precursor --catalog implications analyze booking_confirmed
//! precursor check booking_confirmed --snapshot testData.json
//! precursor validate --strict
//! precursor graph -o states.dot
//! ```

use clap::Parser;
use precursor_cli::{handlers, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity);
    console::set_colors_enabled(config.color.should_color());

    match &cli.command {
        Commands::Analyze(args) => handlers::run_analyze(&config, args),
        Commands::Check(args) => handlers::run_check(&config, args),
        Commands::Validate(args) => handlers::run_validate(&config, args),
        Commands::Graph(args) => handlers::run_graph(&config, args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.into();
    let mut config = CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color);
    if let Some(catalog) = &cli.catalog {
        config = config.with_catalog(catalog);
    }
    config
}

/// Log to stderr; `RUST_LOG` overrides the `-v`/`-q` level.
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
