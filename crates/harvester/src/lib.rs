//! Incremental, resumable harvesting of arXiv records.
//!
//! `harvester` walks a paginated arXiv query and appends every record it finds to a local
//! JSON Lines corpus. Progress is checkpointed after every durable write, so a run that is
//! interrupted (a crash, a network outage, Ctrl-C) continues where it left off without losing
//! records.
//!
//! # Features
//!
//! - **Date partitioning**: a query is split into one partition per calendar month, walked from
//!   the newest month backwards, so no single result set grows past what the API will page.
//! - **Checkpointed pagination**: offset and running total are persisted after each batch.
//! - **Crash-safe output**: records are flushed to disk before the checkpoint moves.
//! - **Failure classification**: transient failures are retried with backoff, bad queries and
//!   write failures stop the run with the checkpoint intact.
//! - **Politeness**: a fixed delay between successive requests to the same partition.
//!
//! # Getting Started
//!
//! ```no_run
//! use harvester::{
//!   checkpoint::FileCheckpointStore,
//!   fetch::ArxivFetcher,
//!   harvest::{HarvestOutcome, Harvester},
//!   request::{DateWindow, HarvestRequest, YearMonth},
//!   sink::JsonlSink,
//!   Config,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = Config::default();
//!   let window = DateWindow::new(YearMonth::new(2024, 5)?, YearMonth::new(2023, 1)?)?;
//!   let request = HarvestRequest::new("cat:cs.AI OR cat:cs.LG", 5000, 100)?.with_window(window);
//!
//!   let fetcher = ArxivFetcher::from_config(&config.api)?;
//!   let store = FileCheckpointStore::new(&config.paths.checkpoint);
//!   let sink = JsonlSink::open(&config.paths.output).await?;
//!
//!   match Harvester::new(request, fetcher, store, sink).run().await {
//!     HarvestOutcome::Completed(summary) => println!("harvested {} records", summary.total),
//!     HarvestOutcome::Aborted { error, checkpoint } =>
//!       eprintln!("stopped at {}: {error}", checkpoint.partition_key),
//!   }
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`request`]: The immutable [`HarvestRequest`](request::HarvestRequest) and date window
//! - [`partition`]: Monthly and flat partition strategies
//! - [`checkpoint`]: Durable progress records and their stores
//! - [`fetch`]: One bounded request against the arXiv API
//! - [`parse`]: Atom feed decoding into [`Record`](record::Record)s
//! - [`sink`]: Append-only corpus output
//! - [`harvest`]: The controller state machine tying everything together
//! - [`configuration`]: TOML-backed runtime configuration

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  fmt::Display,
  path::{Path, PathBuf},
  str::FromStr,
  time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod checkpoint;
pub mod configuration;
pub mod error;
pub mod fetch;
pub mod harvest;
pub mod parse;
pub mod partition;
pub mod record;
pub mod request;
pub mod sink;

pub use configuration::Config;

use crate::{
  checkpoint::Checkpoint, error::*, partition::Partition, record::Record, request::HarvestRequest,
};

/// Largest page size a single request may ask for.
///
/// arXiv throttles or truncates larger pages, so requests are clamped to this value.
pub const MAX_BATCH_SIZE: usize = 500;

/// Common traits and types for ergonomic imports.
///
/// ```no_run
/// use harvester::prelude::*;
///
/// fn total(checkpoint: &Checkpoint) -> u64 { checkpoint.total }
/// ```
pub mod prelude {
  pub use crate::{
    checkpoint::{Checkpoint, CheckpointStore},
    error::{FetchError, HarvestError},
    fetch::BatchFetcher,
    partition::{Partition, Partitioner},
    record::Record,
    request::HarvestRequest,
    sink::AppendSink,
  };
}
