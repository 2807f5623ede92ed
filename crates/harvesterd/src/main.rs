//! Command line interface for the `harvester` arXiv corpus builder.
//!
//! The binary wraps the [`harvester`] library with a small set of commands:
//! - Writing a default configuration file
//! - Running (or resuming) a harvest into a JSON Lines corpus
//! - Inspecting and resetting the harvest checkpoint
//!
//! # Usage
//!
//! ```bash
//! # Write ~/.config/harvester/config.toml with the defaults
//! harvester init
//!
//! # Harvest 5000 machine learning papers submitted between January 2023 and May 2024
//! harvester run --query "cat:cs.LG" --target 5000 --start 2024-05 --stop 2023-01
//!
//! # See how far the last harvest got
//! harvester status
//!
//! # Forget the checkpoint and start over next time
//! harvester reset
//! ```
//!
//! A harvest interrupted by Ctrl-C, a crash or a network outage picks up where it stopped the
//! next time `run` is invoked with the same query. Verbosity is raised with `-v` (up to `-vvvv`)
//! or controlled directly through `RUST_LOG`.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{path::PathBuf, process::ExitCode};

use clap::{builder::ArgAction, Args, Parser, Subcommand};
use console::style;
use harvester::{checkpoint::FileCheckpointStore, prelude::*, Config};
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

pub mod commands;
pub mod error;

use crate::{commands::*, error::*};

/// Prefix for information messages
static INFO_PREFIX: &str = "ℹ ";
/// Prefix for success messages
static SUCCESS_PREFIX: &str = "✓ ";
/// Prefix for warning messages
static WARNING_PREFIX: &str = "! ";
/// Prefix for error messages
static ERROR_PREFIX: &str = "✗ ";
/// Prefix for a detail line
static ITEM_PREFIX: &str = "├─";
/// Prefix for the last detail line
static LAST_ITEM_PREFIX: &str = "└─";

/// Command line interface configuration and argument parsing
#[derive(Parser)]
#[command(author, version, about = "Incremental, resumable arXiv harvesting")]
pub struct Cli {
  /// Verbose mode (-v, -vv, -vvv, -vvvv) for different levels of logging detail
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Path to the configuration file. If not specified, uses the default platform-specific
  /// configuration directory.
  #[arg(long, short, global = true)]
  config: Option<PathBuf>,

  /// The subcommand to execute
  #[command(subcommand)]
  command: Commands,

  /// Skip all prompts and accept defaults (mostly for testing)
  #[arg(long, hide = true, global = true)]
  accept_defaults: bool,
}

impl Cli {
  /// The configuration file this invocation uses.
  pub fn config_path(&self) -> PathBuf { self.config.clone().unwrap_or_else(Config::default_path) }

  /// Reads the configuration file, falling back to defaults when there is none.
  pub fn load_config(&self) -> Result<Config> {
    let path = self.config_path();
    let config = Config::load_or_default(&path)?;
    debug!("Using configuration {} -> {config:?}", path.display());
    Ok(config)
  }
}

/// Configures the logging system based on the verbosity level
///
/// The verbosity levels are:
/// - 0: error (default)
/// - 1: warn
/// - 2: info
/// - 3: debug
/// - 4+: trace
///
/// `RUST_LOG`, when set, takes precedence.
fn setup_logging(verbosity: u8) {
  let filter = match verbosity {
    0 => "error",
    1 => "warn",
    2 => "info",
    3 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true)
    .init();
}

/// Entry point for the harvester CLI
///
/// Parses the arguments, sets up logging and runs the requested command. Any error is printed
/// and turned into a failing exit status.
#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  setup_logging(cli.verbose);
  trace!("Starting with {} verbosity", cli.verbose);

  let result = match &cli.command {
    Commands::Init(options) => init(&cli, options).await,
    Commands::Run(options) => run(&cli, options).await,
    Commands::Status(options) => status(&cli, options).await,
    Commands::Reset(options) => reset(&cli, options).await,
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      eprintln!("{} {e}", style(ERROR_PREFIX).red());
      ExitCode::FAILURE
    },
  }
}
