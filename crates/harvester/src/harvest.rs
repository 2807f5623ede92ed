//! The harvest controller.
//!
//! A [`Harvester`] owns one [`HarvestRequest`] together with the three collaborators it drives: a
//! [`BatchFetcher`], a [`CheckpointStore`] and an [`AppendSink`]. Calling
//! [`run`](Harvester::run) walks the request's partitions batch by batch until the target count is
//! reached, the partitions run out, or something goes wrong.
//!
//! # States
//!
//! ```text
//! Initializing ─▶ SelectingPartition ─▶ FetchingBatch ─▶ PersistingBatch ─▶ AdvancingCheckpoint
//!                        ▲                   ▲  │                                  │
//!                        │                   │  └── empty batch ──┐                │
//!                        │                   └──── full batch ────┼────────────────┤
//!                        └──────────── next partition ◀───────────┴── short batch ─┘
//! ```
//!
//! Any state can end in `Completed` or `Aborted`. The ordering guarantees are:
//!
//! - records reach the sink before the checkpoint that counts them is saved;
//! - a failed append or checkpoint write stops the run without moving the checkpoint;
//! - a retried request is identical to the one that failed, so nothing is fetched twice into the
//!   corpus.
//!
//! # Examples
//!
//! ```
//! use harvester::{
//!   checkpoint::MemoryCheckpointStore,
//!   fetch::{Batch, BatchFetcher},
//!   harvest::{CompletionReason, HarvestOutcome, Harvester},
//!   prelude::*,
//!   sink::MemorySink,
//! };
//!
//! struct Empty;
//!
//! #[async_trait::async_trait]
//! impl BatchFetcher for Empty {
//!   async fn fetch(
//!     &self,
//!     partition: &Partition,
//!     offset: u64,
//!     size: usize,
//!   ) -> Result<Batch, FetchError> {
//!     Ok(Batch { partition_key: partition.key.clone(), offset, requested: size, records: vec![] })
//!   }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> harvester::error::Result<()> {
//! let request = HarvestRequest::new("cat:cs.LG", 100, 50)?;
//! let mut harvester =
//!   Harvester::new(request, Empty, MemoryCheckpointStore::new(), MemorySink::new());
//!
//! match harvester.run().await {
//!   HarvestOutcome::Completed(summary) => {
//!     assert_eq!(summary.total, 0);
//!     assert_eq!(summary.reason, CompletionReason::PartitionsExhausted);
//!   },
//!   HarvestOutcome::Aborted { error, .. } => panic!("{error}"),
//! }
//! # Ok(())
//! # }
//! ```

use tokio_util::sync::CancellationToken;

use crate::{
  checkpoint::CheckpointStore,
  configuration::{HarvestConfig, RetryConfig},
  fetch::{Batch, BatchFetcher},
  partition::Partitioner,
  sink::AppendSink,
};

use super::*;

/// Where the controller currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestState {
  /// Loading or deriving the starting checkpoint
  Initializing,
  /// Deciding whether the current partition should be harvested
  SelectingPartition,
  /// Waiting on the API
  FetchingBatch,
  /// Appending a batch to the sink
  PersistingBatch,
  /// Saving the checkpoint that counts the batch just written
  AdvancingCheckpoint,
  /// Finished normally
  Completed,
  /// Stopped on an error or cancellation
  Aborted,
}

/// Why a harvest finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionReason {
  /// The requested number of records has been written.
  TargetReached,
  /// Every partition has been read to its end.
  PartitionsExhausted,
  /// The checkpoint points at a partition outside the requested window.
  OutsideWindow,
}

impl Display for CompletionReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CompletionReason::TargetReached => write!(f, "target reached"),
      CompletionReason::PartitionsExhausted => write!(f, "partitions exhausted"),
      CompletionReason::OutsideWindow => write!(f, "outside the requested window"),
    }
  }
}

/// Statistics of a completed harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
  /// Records written overall, including those from earlier runs of the same harvest
  pub total:      u64,
  /// Records requested
  pub target:     u64,
  /// Whether `total` reached `target`
  pub target_met: bool,
  /// Successful fetches made by this run
  pub batches:    u64,
  /// What ended the run
  pub reason:     CompletionReason,
}

/// Result of [`Harvester::run`].
#[derive(Debug)]
pub enum HarvestOutcome {
  /// The harvest ended normally.
  Completed(HarvestSummary),
  /// The harvest stopped early. Running it again resumes from `checkpoint`.
  Aborted {
    /// What stopped the run
    error:      HarvestError,
    /// The last checkpoint known to be durable
    checkpoint: Checkpoint,
  },
}

impl HarvestOutcome {
  /// Whether the run ended normally.
  pub fn is_completed(&self) -> bool { matches!(self, HarvestOutcome::Completed(_)) }

  /// The summary of a completed run.
  pub fn summary(&self) -> Option<&HarvestSummary> {
    match self {
      HarvestOutcome::Completed(summary) => Some(summary),
      HarvestOutcome::Aborted { .. } => None,
    }
  }
}

/// Exponential backoff for retryable fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Attempts per request, including the first
  pub max_attempts:    u32,
  /// Wait before the first retry
  pub initial_backoff: Duration,
  /// Growth factor between successive waits
  pub multiplier:      u32,
  /// Cap on any single wait
  pub max_backoff:     Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self::from(&RetryConfig::default()) }
}

impl From<&RetryConfig> for RetryPolicy {
  fn from(config: &RetryConfig) -> Self {
    Self {
      max_attempts:    config.max_attempts.max(1),
      initial_backoff: Duration::from_millis(config.initial_backoff_ms),
      multiplier:      config.multiplier.max(1),
      max_backoff:     Duration::from_millis(config.max_backoff_ms),
    }
  }
}

impl RetryPolicy {
  /// The wait after failed attempt number `attempt` (starting at 1).
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
    self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
  }
}

/// How the run should begin, decided from the stored checkpoint.
enum Start {
  /// Harvest `partition` from `checkpoint`
  At(Partition, Checkpoint),
  /// Nothing left to do
  Finished(u64, CompletionReason),
  /// The stored state cannot be used
  Abort(HarvestError, Checkpoint),
}

/// Drives one [`HarvestRequest`] to completion.
pub struct Harvester<F, C, S> {
  /// What to harvest
  request:       HarvestRequest,
  /// Source of batches
  fetcher:       F,
  /// Where progress is kept
  store:         C,
  /// Where records go
  sink:          S,
  /// Retry behaviour for retryable fetch failures
  retry:         RetryPolicy,
  /// Pause between full batches of the same partition
  politeness:    Duration,
  /// Stops the run between states and during waits
  cancel:        CancellationToken,
  /// Current state
  state:         HarvestState,
  /// Successful fetches so far
  batches:       u64,
  /// Whether the next fetch follows a full batch of the same partition
  follows_batch: bool,
}

impl<F, C, S> Harvester<F, C, S>
where
  F: BatchFetcher,
  C: CheckpointStore,
  S: AppendSink,
{
  /// Creates a harvester with the default retry policy and politeness delay.
  pub fn new(request: HarvestRequest, fetcher: F, store: C, sink: S) -> Self {
    let defaults = HarvestConfig::default();
    Self {
      request,
      fetcher,
      store,
      sink,
      retry: RetryPolicy::from(&defaults.retry),
      politeness: defaults.politeness_delay(),
      cancel: CancellationToken::new(),
      state: HarvestState::Initializing,
      batches: 0,
      follows_batch: false,
    }
  }

  /// Applies the `[harvest]` configuration section.
  pub fn with_config(self, config: &HarvestConfig) -> Self {
    self.with_retry_policy(RetryPolicy::from(&config.retry))
      .with_politeness_delay(config.politeness_delay())
  }

  /// Sets the retry policy.
  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Sets the pause between successive requests to the same partition.
  pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
    self.politeness = delay;
    self
  }

  /// Lets `token` stop the run.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  /// The request being harvested.
  pub fn request(&self) -> &HarvestRequest { &self.request }

  /// The current state.
  pub fn state(&self) -> HarvestState { self.state }

  /// Runs the harvest until it completes or aborts.
  pub async fn run(&mut self) -> HarvestOutcome {
    let partitioner = self.request.partitioner();
    let target = self.request.target_count();
    self.transition(HarvestState::Initializing);

    let (mut partition, mut checkpoint) = match self.initialize(partitioner.as_ref()).await {
      Start::At(partition, checkpoint) => (partition, checkpoint),
      Start::Finished(total, reason) => return self.complete(total, reason),
      Start::Abort(error, checkpoint) => return self.abort(error, checkpoint),
    };
    info!(
      "Harvesting \"{}\" from {partition}@{} ({} of {target} records so far)",
      self.request.base_query(),
      checkpoint.offset,
      checkpoint.total
    );

    loop {
      self.transition(HarvestState::SelectingPartition);
      if checkpoint.total >= target {
        return self.complete(checkpoint.total, CompletionReason::TargetReached);
      }
      if !partitioner.covers(&partition) {
        info!("Partition {partition} lies outside the requested window");
        return self.complete(checkpoint.total, CompletionReason::OutsideWindow);
      }

      // Read the partition until a batch comes back empty or short.
      loop {
        self.transition(HarvestState::FetchingBatch);
        let remaining = target.saturating_sub(checkpoint.total);
        if remaining == 0 {
          return self.complete(checkpoint.total, CompletionReason::TargetReached);
        }
        let size = (self.request.batch_size() as u64).min(remaining) as usize;

        if self.follows_batch {
          if let Err(error) = self.pause(self.politeness).await {
            return self.abort(error, checkpoint);
          }
        } else if self.cancel.is_cancelled() {
          return self.abort(HarvestError::Cancelled, checkpoint);
        }

        let batch = match self.fetch_with_retry(&partition, checkpoint.offset, size).await {
          Ok(batch) => batch,
          Err(error) => return self.abort(error, checkpoint),
        };
        self.batches += 1;

        if batch.is_empty() {
          debug!("{partition}@{}: no more records", checkpoint.offset);
          break;
        }

        self.transition(HarvestState::PersistingBatch);
        if let Err(error) = self.sink.append(&batch.records).await {
          return self.abort(error, checkpoint);
        }

        self.transition(HarvestState::AdvancingCheckpoint);
        let advanced = checkpoint.advanced_by(batch.records.len() as u64);
        if let Err(error) = self.store.save(&advanced).await {
          return self.abort(error, checkpoint);
        }
        checkpoint = advanced;
        debug!(
          "{partition}: {} records written, offset {} (total {}/{target})",
          batch.records.len(),
          checkpoint.offset,
          checkpoint.total
        );

        // A short page is taken as the end of the partition. A page cut short by a transient
        // server problem is indistinguishable and would skip the rest of the partition.
        if batch.is_short() {
          break;
        }
        self.follows_batch = true;
      }

      self.follows_batch = false;
      match partitioner.next(&partition) {
        Some(next) => {
          let entered = checkpoint.entering(&next);
          if let Err(error) = self.store.save(&entered).await {
            return self.abort(error, checkpoint);
          }
          info!("Partition {partition} done, moving on to {next} (total {})", entered.total);
          partition = next;
          checkpoint = entered;
        },
        None => {
          let finished = checkpoint.finished();
          if let Err(error) = self.store.save(&finished).await {
            return self.abort(error, checkpoint);
          }
          info!("Partition {partition} was the last one");
          return self.complete(finished.total, CompletionReason::PartitionsExhausted);
        },
      }
    }
  }

  /// Works out where to start from the stored checkpoint.
  async fn initialize(&self, partitioner: &dyn Partitioner) -> Start {
    let query = self.request.base_query();
    let first = partitioner.first();
    let fresh = |partition: Option<&Partition>| match partition {
      Some(partition) => Checkpoint::start_of(partition, query),
      None => Checkpoint {
        partition_key: String::new(),
        offset:        0,
        total:         0,
        exhausted:     false,
        query:         Some(query.to_string()),
        updated_at:    None,
      },
    };

    let stored = match self.store.load().await {
      Ok(stored) => stored,
      Err(error) => return Start::Abort(error, fresh(first.as_ref())),
    };

    if let Some(stored) = stored {
      if let Some(previous) = stored.query.as_deref().filter(|previous| *previous != query) {
        let error = HarvestError::CheckpointMismatch {
          checkpoint: previous.to_string(),
          request:    query.to_string(),
        };
        return Start::Abort(error, stored);
      }
      if stored.exhausted {
        info!(
          "Checkpoint marks the harvest as finished ({} records); rechecking {}@{}",
          stored.total, stored.partition_key, stored.offset
        );
      }
      match partitioner.resume(&stored.partition_key) {
        Some(partition) => {
          debug!("Resuming from checkpoint {stored:?}");
          let checkpoint =
            Checkpoint { query: Some(query.to_string()), exhausted: false, ..stored };
          return Start::At(partition, checkpoint);
        },
        None => warn!(
          "Checkpoint partition {:?} does not belong to this harvest; starting fresh",
          stored.partition_key
        ),
      }
    }

    match first {
      Some(partition) => {
        let checkpoint = fresh(Some(&partition));
        Start::At(partition, checkpoint)
      },
      None => {
        info!("Nothing to harvest");
        Start::Finished(0, CompletionReason::PartitionsExhausted)
      },
    }
  }

  /// Fetches one page, repeating the identical request on retryable failures.
  async fn fetch_with_retry(
    &self,
    partition: &Partition,
    offset: u64,
    size: usize,
  ) -> Result<Batch> {
    let mut attempt = 1;
    loop {
      match self.fetcher.fetch(partition, offset, size).await {
        Ok(batch) => return Ok(batch),
        Err(error) if error.is_retryable() && attempt < self.retry.max_attempts => {
          let wait = self.retry.backoff(attempt);
          warn!(
            "{partition}@{offset}: attempt {attempt}/{} failed ({error}); retrying in {wait:?}",
            self.retry.max_attempts
          );
          self.pause(wait).await?;
          attempt += 1;
        },
        Err(error) => return Err(error.into()),
      }
    }
  }

  /// Sleeps for `duration`, returning early with [`HarvestError::Cancelled`] on cancellation.
  async fn pause(&self, duration: Duration) -> Result<()> {
    if self.cancel.is_cancelled() {
      return Err(HarvestError::Cancelled);
    }
    if duration.is_zero() {
      return Ok(());
    }
    tokio::select! {
      _ = self.cancel.cancelled() => Err(HarvestError::Cancelled),
      _ = tokio::time::sleep(duration) => Ok(()),
    }
  }

  /// Records a state change.
  fn transition(&mut self, next: HarvestState) {
    if self.state != next {
      trace!("{:?} -> {next:?}", self.state);
      self.state = next;
    }
  }

  /// Ends the run normally.
  fn complete(&mut self, total: u64, reason: CompletionReason) -> HarvestOutcome {
    self.transition(HarvestState::Completed);
    let target = self.request.target_count();
    let summary = HarvestSummary {
      total,
      target,
      target_met: total >= target,
      batches: self.batches,
      reason,
    };
    if summary.target_met {
      info!("Harvest complete: {total} records ({reason})");
    } else {
      warn!("Harvest complete with {total} of {target} requested records ({reason})");
    }
    HarvestOutcome::Completed(summary)
  }

  /// Ends the run early, reporting the last durable checkpoint.
  fn abort(&mut self, error: impl Into<HarvestError>, checkpoint: Checkpoint) -> HarvestOutcome {
    self.transition(HarvestState::Aborted);
    let error = error.into();
    warn!(
      "Harvest stopped at {}@{} (total {}): {error}",
      checkpoint.partition_key, checkpoint.offset, checkpoint.total
    );
    HarvestOutcome::Aborted { error, checkpoint }
  }
}
