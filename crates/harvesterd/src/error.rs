//! Error types for the harvester CLI.

use thiserror::Error;

use super::*;

/// Error type alias used throughout the CLI.
pub type Result<T> = core::result::Result<T, HarvesterdError>;

/// Errors surfaced to the user by a command.
#[derive(Error, Debug)]
pub enum HarvesterdError {
  /// Errors from the harvester library
  #[error(transparent)]
  Harvester(#[from] harvester::error::HarvestError),

  /// Errors from interactive prompts
  #[error(transparent)]
  Dialog(#[from] dialoguer::Error),

  /// Standard IO errors
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// A harvest stopped before completing.
  #[error(
    "harvest stopped at partition {partition} offset {offset} after {total} records: {cause}; \
     run again to resume"
  )]
  Aborted {
    /// What stopped the harvest
    cause:     harvester::error::HarvestError,
    /// Partition of the last durable checkpoint
    partition: String,
    /// Offset of the last durable checkpoint
    offset:    u64,
    /// Records written in total
    total:     u64,
  },
}

impl HarvesterdError {
  /// Wraps a failed harvest together with the checkpoint it will resume from.
  pub fn aborted(cause: harvester::error::HarvestError, checkpoint: &Checkpoint) -> Self {
    Self::Aborted {
      cause,
      partition: checkpoint.partition_key.clone(),
      offset: checkpoint.offset,
      total: checkpoint.total,
    }
  }
}
