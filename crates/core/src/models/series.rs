use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::price::PricePoint;

/// The full stored history for one symbol.
///
/// Invariants (upheld by `HistoricalSeriesCache`, the only mutator):
/// - `points` is strictly ascending by date, no duplicate dates.
/// - `last_date == points.last().date` after every successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub symbol: String,
    pub points: Vec<PricePoint>,
    pub last_date: NaiveDate,
    pub total_data_points: usize,
}

/// Result of a freshness check on a stored series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFreshness {
    pub needs_update: bool,
    /// `None` when the symbol has never been fetched — a full range is needed.
    pub last_date: Option<NaiveDate>,
    /// Business days missing between `last_date` (exclusive) and today
    /// (inclusive). `None` when there is no stored series at all.
    pub missing_days: Option<i64>,
}

impl SeriesFreshness {
    pub fn never_fetched() -> Self {
        Self {
            needs_update: true,
            last_date: None,
            missing_days: None,
        }
    }
}

/// A read-time window over the maximal stored history.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesWindow {
    pub data: Vec<PricePoint>,
    pub needs_update: bool,
    pub filtered_data_points: usize,
    pub total_data_points: usize,
    pub filtered_period: HistoryRange,
    pub last_modified: DateTime<Utc>,
}

/// The window a caller requests over a stored series. The cache always
/// stores the maximal known history; filtering happens at read time so one
/// symbol's cache serves differently-windowed requests without refetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRange {
    Days(u32),
    Months(u32),
    Max,
}

impl HistoryRange {
    /// First date (inclusive) of the window ending at `today`.
    /// `None` means no lower bound.
    pub fn start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            HistoryRange::Days(n) => today.checked_sub_days(Days::new(u64::from(*n))),
            HistoryRange::Months(n) => today.checked_sub_months(Months::new(*n)),
            HistoryRange::Max => None,
        }
    }
}

impl std::fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryRange::Days(n) => write!(f, "{n}d"),
            HistoryRange::Months(n) => write!(f, "{n}mo"),
            HistoryRange::Max => write!(f, "max"),
        }
    }
}

/// Count business days (Mon–Fri) in `(after, up_to]`.
///
/// Market holidays are not modeled, so a holiday can count as a missing
/// trading day.
pub fn business_days_between(after: NaiveDate, up_to: NaiveDate) -> i64 {
    if up_to <= after {
        return 0;
    }
    let mut days = 0;
    let mut d = after;
    while d < up_to {
        d = match d.succ_opt() {
            Some(next) => next,
            None => break,
        };
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            days += 1;
        }
    }
    days
}
