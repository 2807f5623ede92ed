//! Splitting a harvest into independently paginatable partitions.
//!
//! The arXiv API pages through a result set with a numeric offset, and deep offsets into a large
//! result set are slow and unreliable. A [`Partitioner`] breaks one logical harvest into an ordered
//! sequence of smaller queries, each paged from offset zero.
//!
//! Two strategies are provided:
//!
//! - [`MonthlyPartitioner`]: one partition per calendar month of a [`DateWindow`], newest first.
//! - [`FlatPartitioner`]: a single partition holding the base query as-is.
//!
//! Partitions are identified by a string key (`2024-05`, or `all` for the flat strategy) which is
//! what gets stored in a [`Checkpoint`], and [`Partitioner::resume`] turns such a key back into a
//! partition on restart.
//!
//! # Examples
//!
//! ```
//! use harvester::{
//!   partition::{MonthlyPartitioner, Partitioner},
//!   request::{DateWindow, YearMonth},
//! };
//!
//! # fn example() -> harvester::error::Result<()> {
//! let window = DateWindow::new(YearMonth::new(2024, 2)?, YearMonth::new(2024, 1)?)?;
//! let partitioner = MonthlyPartitioner::new("cat:cs.LG", window);
//!
//! let feb = partitioner.first().unwrap();
//! assert_eq!(feb.query, "(cat:cs.LG) AND submittedDate:[20240201 TO 20240229]");
//!
//! let jan = partitioner.next(&feb).unwrap();
//! assert_eq!(jan.key, "2024-01");
//! assert!(partitioner.next(&jan).is_none());
//! # Ok(())
//! # }
//! ```

use crate::request::{DateWindow, YearMonth};

use super::*;

mod flat;
mod monthly;

pub use flat::FlatPartitioner;
pub use monthly::MonthlyPartitioner;

/// One disjoint slice of a harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
  /// Stable identifier, persisted in checkpoints
  pub key:   String,
  /// Fully formed `search_query` expression for this slice
  pub query: String,
  /// The calendar month covered, for date-partitioned harvests
  pub month: Option<YearMonth>,
}

impl Display for Partition {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.key) }
}

/// A strategy for ordering a harvest into partitions.
///
/// Implementations must yield partitions that are disjoint and, together, cover the whole
/// harvest. [`next`](Partitioner::next) must never revisit a partition.
pub trait Partitioner: Send + Sync {
  /// The partition a fresh harvest starts with, or `None` if there is nothing to harvest.
  fn first(&self) -> Option<Partition>;

  /// The partition after `partition`, or `None` once the sequence is exhausted.
  fn next(&self, partition: &Partition) -> Option<Partition>;

  /// Rebuilds the partition identified by a checkpoint key.
  ///
  /// Returns `None` when the key was not produced by this kind of partitioner. A key that parses
  /// but lies outside the harvest is still returned; see [`covers`](Partitioner::covers).
  fn resume(&self, key: &str) -> Option<Partition>;

  /// Whether `partition` lies within the bounds of this harvest.
  fn covers(&self, partition: &Partition) -> bool;
}
