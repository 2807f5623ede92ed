//! The immutable description of one harvest.
//!
//! A [`HarvestRequest`] is built once per invocation from the caller's parameters and handed to
//! the [`Harvester`](crate::harvest::Harvester). It never changes during a run.
//!
//! # Examples
//!
//! ```
//! use harvester::request::{DateWindow, HarvestRequest, YearMonth};
//!
//! # fn example() -> harvester::error::Result<()> {
//! let window = DateWindow::new(YearMonth::new(2024, 5)?, YearMonth::new(2023, 1)?)?;
//! let request = HarvestRequest::new("cat:cs.AI", 5000, 100)?.with_window(window);
//!
//! assert_eq!(request.partitioner().first().unwrap().key, "2024-05");
//! # Ok(())
//! # }
//! ```

use crate::partition::{FlatPartitioner, MonthlyPartitioner, Partitioner};

use super::*;

/// Base query used when none is given: every Computer Science category.
pub const DEFAULT_BASE_QUERY: &str = "cat:cs.*";
/// Number of records a harvest aims for by default.
pub const DEFAULT_TARGET_COUNT: u64 = 10_000;
/// Records requested per API call by default.
pub const DEFAULT_BATCH_SIZE: usize = 200;
/// Years covered by the default date window, counting back from the current month.
pub const DEFAULT_WINDOW_YEARS: u32 = 3;

/// A calendar month.
///
/// Ordering is chronological, so `YearMonth::new(2024, 1) > YearMonth::new(2023, 12)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
  /// Calendar year
  year:  i32,
  /// Month of the year, 1 through 12
  month: u32,
}

impl YearMonth {
  /// Creates a month, rejecting month numbers outside `1..=12`.
  pub fn new(year: i32, month: u32) -> Result<Self> {
    if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
      return Err(HarvestError::InvalidRequest(format!(
        "{year:04}-{month:02} is not a valid month"
      )));
    }
    Ok(Self { year, month })
  }

  /// The month containing `date`.
  pub fn from_date(date: NaiveDate) -> Self { Self { year: date.year(), month: date.month() } }

  /// The calendar year.
  pub fn year(&self) -> i32 { self.year }

  /// The month of the year, 1 through 12.
  pub fn month(&self) -> u32 { self.month }

  /// The month before this one, crossing into December of the previous year from January.
  pub fn previous(&self) -> Self {
    if self.month == 1 {
      Self { year: self.year - 1, month: 12 }
    } else {
      Self { year: self.year, month: self.month - 1 }
    }
  }

  /// The first calendar day of the month.
  pub fn first_day(&self) -> NaiveDate {
    // Validated on construction.
    NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
  }

  /// The last calendar day of the month, accounting for month length and leap years.
  pub fn last_day(&self) -> NaiveDate {
    let next = if self.month == 12 {
      NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
    } else {
      NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
    };
    next.and_then(|d| d.pred_opt()).unwrap_or(NaiveDate::MAX)
  }
}

impl Display for YearMonth {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:04}-{:02}", self.year, self.month)
  }
}

impl FromStr for YearMonth {
  type Err = HarvestError;

  /// Parses `YYYY-MM`.
  fn from_str(s: &str) -> Result<Self> {
    let invalid = || HarvestError::InvalidRequest(format!("expected YYYY-MM, got \"{s}\""));
    let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.len() != 2 {
      return Err(invalid());
    }
    let year = year.parse().map_err(|_| invalid())?;
    let month = month.parse().map_err(|_| invalid())?;
    YearMonth::new(year, month)
  }
}

/// Inclusive range of months to harvest, walked from `start` (newest) back to `stop` (oldest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
  /// Newest month, harvested first
  pub start: YearMonth,
  /// Oldest month, harvested last
  pub stop:  YearMonth,
}

impl DateWindow {
  /// Creates a window, requiring `start` to be no earlier than `stop`.
  pub fn new(start: YearMonth, stop: YearMonth) -> Result<Self> {
    if start < stop {
      return Err(HarvestError::InvalidRequest(format!(
        "window start {start} precedes its stop {stop}; harvesting walks backwards in time"
      )));
    }
    Ok(Self { start, stop })
  }

  /// The window ending at the month of `today` and reaching back `years` years.
  ///
  /// A year is counted as 365 days, so the stop month can land one month off an exact
  /// calendar anniversary around leap years.
  pub fn trailing_years(today: NaiveDate, years: u32) -> Self {
    let back = chrono::Duration::days(365 * i64::from(years));
    let past = today.checked_sub_signed(back).unwrap_or(NaiveDate::MIN);
    Self { start: YearMonth::from_date(today), stop: YearMonth::from_date(past) }
  }

  /// Number of months the window spans.
  pub fn month_count(&self) -> usize {
    let months = |ym: YearMonth| i64::from(ym.year) * 12 + i64::from(ym.month);
    (months(self.start) - months(self.stop) + 1) as usize
  }
}

/// Everything a harvest needs to know about what to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRequest {
  /// Filter expression applied to every partition (arXiv `search_query` syntax)
  base_query:   String,
  /// Number of records after which the harvest stops
  target_count: u64,
  /// Records requested per API call
  batch_size:   usize,
  /// Optional month range; `None` harvests the base query without date partitioning
  window:       Option<DateWindow>,
}

impl HarvestRequest {
  /// Creates a request without a date window.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::InvalidRequest`] if the target or batch size is zero.
  pub fn new(base_query: impl Into<String>, target_count: u64, batch_size: usize) -> Result<Self> {
    if target_count == 0 {
      return Err(HarvestError::InvalidRequest("target count must be positive".into()));
    }
    if batch_size == 0 {
      return Err(HarvestError::InvalidRequest("batch size must be positive".into()));
    }
    let batch_size = if batch_size > MAX_BATCH_SIZE {
      warn!("Batch size {batch_size} exceeds the server-safe maximum, using {MAX_BATCH_SIZE}");
      MAX_BATCH_SIZE
    } else {
      batch_size
    };
    let base_query = base_query.into().trim().to_string();
    Ok(Self { base_query, target_count, batch_size, window: None })
  }

  /// Restricts the harvest to the given months, one partition per month.
  pub fn with_window(mut self, window: DateWindow) -> Self {
    self.window = Some(window);
    self
  }

  /// The base filter expression.
  pub fn base_query(&self) -> &str { &self.base_query }

  /// The number of records to harvest.
  pub fn target_count(&self) -> u64 { self.target_count }

  /// The per-request page size, already clamped to [`MAX_BATCH_SIZE`].
  pub fn batch_size(&self) -> usize { self.batch_size }

  /// The month range, if the harvest is date partitioned.
  pub fn window(&self) -> Option<DateWindow> { self.window }

  /// The partition strategy matching this request: monthly with a window, flat without.
  pub fn partitioner(&self) -> Box<dyn Partitioner> {
    match self.window {
      Some(window) => Box::new(MonthlyPartitioner::new(&self.base_query, window)),
      None => Box::new(FlatPartitioner::new(&self.base_query)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn month_lengths_follow_the_calendar() {
    let cases = [
      ((2024, 2), 29),
      ((2023, 2), 28),
      ((1900, 2), 28),
      ((2000, 2), 29),
      ((2024, 4), 30),
      ((2024, 12), 31),
    ];
    for ((year, month), days) in cases {
      let ym = YearMonth::new(year, month).unwrap();
      assert_eq!(ym.last_day().day(), days, "{ym}");
      assert_eq!(ym.first_day().day(), 1);
    }
  }

  #[test]
  fn previous_wraps_at_january() {
    let jan = YearMonth::new(2024, 1).unwrap();
    assert_eq!(jan.previous(), YearMonth::new(2023, 12).unwrap());
    let may = YearMonth::new(2024, 5).unwrap();
    assert_eq!(may.previous(), YearMonth::new(2024, 4).unwrap());
  }

  #[test]
  fn parse_year_month() {
    assert_eq!("2024-05".parse::<YearMonth>().unwrap(), YearMonth::new(2024, 5).unwrap());
    assert!("2024-13".parse::<YearMonth>().is_err());
    assert!("2024-5".parse::<YearMonth>().is_err());
    assert!("202405".parse::<YearMonth>().is_err());
  }

  #[test]
  fn window_must_walk_backwards() {
    let newer = YearMonth::new(2024, 5).unwrap();
    let older = YearMonth::new(2023, 1).unwrap();
    assert!(DateWindow::new(older, newer).is_err());
    assert_eq!(DateWindow::new(newer, older).unwrap().month_count(), 17);
    assert_eq!(DateWindow::new(newer, newer).unwrap().month_count(), 1);
  }

  #[test]
  fn trailing_window() {
    let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
    let window = DateWindow::trailing_years(today, 3);
    assert_eq!(window.start, YearMonth::new(2026, 10).unwrap());
    assert_eq!(window.stop, YearMonth::new(2023, 10).unwrap());
  }

  #[traced_test]
  #[test]
  fn batch_size_is_clamped() {
    let request = HarvestRequest::new("cat:cs.*", 10, 10_000).unwrap();
    assert_eq!(request.batch_size(), MAX_BATCH_SIZE);
    assert!(logs_contain("server-safe maximum"));
  }

  #[test]
  fn zero_values_are_rejected() {
    assert!(HarvestRequest::new("cat:cs.*", 0, 10).is_err());
    assert!(HarvestRequest::new("cat:cs.*", 10, 0).is_err());
  }
}
