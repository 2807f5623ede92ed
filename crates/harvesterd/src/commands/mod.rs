//! The subcommands of the CLI.

use super::*;

pub mod init;
pub mod reset;
pub mod run;
pub mod status;

pub use init::{init, InitOptions};
pub use reset::{reset, ResetOptions};
pub use run::{run, RunOptions};
pub use status::{status, StatusOptions};

/// Available commands for the CLI
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
  /// Write a configuration file with the default settings
  Init(InitOptions),

  /// Harvest records into the corpus, resuming from the checkpoint if there is one
  ///
  /// Exits with status 0 when the harvest completes and also when it is interrupted with
  /// Ctrl-C, since progress up to the interruption is saved in the checkpoint. Any other
  /// failure exits with status 1. Use `status` to tell a finished harvest from an
  /// interrupted one.
  Run(RunOptions),

  /// Show the current checkpoint
  Status(StatusOptions),

  /// Delete the checkpoint after confirmation, so the next run starts over
  Reset(ResetOptions),
}

/// Prints a `label: value` detail line.
fn item(label: &str, value: impl std::fmt::Display, last: bool) {
  let prefix = if last { LAST_ITEM_PREFIX } else { ITEM_PREFIX };
  println!("   {} {}: {}", style(prefix).dim(), style(label).bold(), value);
}
