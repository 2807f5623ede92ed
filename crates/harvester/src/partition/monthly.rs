use super::*;

/// Walks a [`DateWindow`] one calendar month at a time, newest month first.
#[derive(Debug, Clone)]
pub struct MonthlyPartitioner {
  /// Filter combined with every month's date range; may be empty
  base_query: String,
  /// Months to cover
  window:     DateWindow,
}

impl MonthlyPartitioner {
  /// Creates a partitioner over `window` restricting every month to `base_query`.
  pub fn new(base_query: &str, window: DateWindow) -> Self {
    Self { base_query: base_query.trim().to_string(), window }
  }

  /// Builds the partition for one month.
  ///
  /// The date range runs from the first to the last calendar day of the month, inclusive, in the
  /// `YYYYMMDD` form arXiv expects for `submittedDate`.
  pub fn partition_for(&self, month: YearMonth) -> Partition {
    let date_filter = format!(
      "submittedDate:[{} TO {}]",
      month.first_day().format("%Y%m%d"),
      month.last_day().format("%Y%m%d")
    );
    let query = if self.base_query.is_empty() {
      date_filter
    } else {
      format!("({}) AND {date_filter}", self.base_query)
    };
    Partition { key: month.to_string(), query, month: Some(month) }
  }
}

impl Partitioner for MonthlyPartitioner {
  fn first(&self) -> Option<Partition> { Some(self.partition_for(self.window.start)) }

  fn next(&self, partition: &Partition) -> Option<Partition> {
    let candidate = partition.month?.previous();
    // The candidate ends before the stop boundary once its last day precedes the stop month.
    if candidate.last_day() < self.window.stop.first_day() {
      return None;
    }
    Some(self.partition_for(candidate))
  }

  fn resume(&self, key: &str) -> Option<Partition> {
    key.parse::<YearMonth>().ok().map(|month| self.partition_for(month))
  }

  fn covers(&self, partition: &Partition) -> bool {
    partition.month.is_some_and(|month| month <= self.window.start && month >= self.window.stop)
  }
}
