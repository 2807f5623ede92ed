use super::*;

/// Key of the single partition produced by [`FlatPartitioner`].
const FLAT_KEY: &str = "all";

/// Harvests the base query as one partition, paging by offset only.
#[derive(Debug, Clone)]
pub struct FlatPartitioner {
  /// The query for the only partition
  query: String,
}

impl FlatPartitioner {
  /// Creates a partitioner whose single partition runs `base_query` unmodified.
  pub fn new(base_query: &str) -> Self { Self { query: base_query.trim().to_string() } }

  /// The only partition this strategy produces.
  fn partition(&self) -> Partition {
    Partition { key: FLAT_KEY.to_string(), query: self.query.clone(), month: None }
  }
}

impl Partitioner for FlatPartitioner {
  fn first(&self) -> Option<Partition> {
    // arXiv rejects an empty `search_query`, so there is nothing to page through.
    (!self.query.is_empty()).then(|| self.partition())
  }

  fn next(&self, _partition: &Partition) -> Option<Partition> { None }

  fn resume(&self, key: &str) -> Option<Partition> { (key == FLAT_KEY).then(|| self.partition()) }

  fn covers(&self, partition: &Partition) -> bool { partition.key == FLAT_KEY }
}
