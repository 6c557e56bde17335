//! Precursor CLI Library
//!
//! Command-line interface over the Precursor planner.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod commands;
mod config;
mod error;
pub mod handlers;

pub use commands::{Cli, ColorArg, Commands, GraphArgs, OutputFormat, PlanArgs, ValidateArgs};
pub use config::{CliConfig, ColorChoice, Verbosity, CATALOG_ENV, SNAPSHOT_ENV};
pub use error::{CliError, CliResult};
pub use handlers::Catalog;
