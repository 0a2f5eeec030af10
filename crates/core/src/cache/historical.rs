use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::store::JsonStore;
use crate::clock::Clock;
use crate::errors::CoreError;
use crate::models::price::PricePoint;
use crate::models::series::{
    business_days_between, HistoricalSeries, HistoryRange, SeriesFreshness, SeriesWindow,
};

/// Persistent per-symbol daily price series with incremental-merge semantics.
///
/// The cache always stores the maximal known history for a symbol; callers
/// request a window and filtering happens at read time. Refreshes compute
/// exactly which trading days are missing past the stored tail and splice
/// the newly fetched points in without duplicates. The merge is append-only
/// with respect to time: a stored point is never rewritten (the very first
/// populate stores a full fetched range).
pub struct HistoricalSeriesCache {
    store: JsonStore<HistoricalSeries>,
}

impl HistoricalSeriesCache {
    pub fn open(path: impl Into<PathBuf>, clock: Clock) -> Self {
        Self {
            store: JsonStore::open(path, clock),
        }
    }

    /// Decide whether a symbol's stored series needs a refresh.
    ///
    /// No entry means a full range must be fetched. Otherwise the gap is the
    /// number of business days (Mon–Fri) strictly after `last_date` up to
    /// today; one or more missing days flags an update, and the count lets
    /// the caller size its fetch request instead of re-pulling full history.
    pub fn needs_update(&self, symbol: &str) -> SeriesFreshness {
        let key = symbol.to_uppercase();
        let Some(entry) = self.store.get(&key) else {
            return SeriesFreshness::never_fetched();
        };

        let today = self.store.clock().now().date_naive();
        let missing = business_days_between(entry.value.last_date, today);
        SeriesFreshness {
            needs_update: missing >= 1,
            last_date: Some(entry.value.last_date),
            missing_days: Some(missing),
        }
    }

    /// Full overwrite, used for first-time population or a full resync.
    ///
    /// Upstream sources are not guaranteed to return ordered, gap-free or
    /// duplicate-free data, so the input is sorted ascending and deduplicated
    /// by date before storing (later occurrence of a date wins).
    /// Returns the number of points stored. An empty input is a logged no-op.
    pub fn set(&mut self, symbol: &str, points: Vec<PricePoint>) -> Result<usize, CoreError> {
        let key = symbol.to_uppercase();
        let points = normalize(points);
        let Some(last) = points.last() else {
            warn!(symbol = %key, "ignoring empty series on full set");
            return Ok(0);
        };

        let last_date = last.date;
        let stored = points.len();
        let series = HistoricalSeries {
            symbol: key.clone(),
            total_data_points: stored,
            last_date,
            points,
        };
        self.store
            .set_with_price_date(key, series, Some(last_date))?;
        Ok(stored)
    }

    /// Splice freshly fetched candidate points onto the stored series.
    ///
    /// Only points strictly after the stored `last_date` are kept — the
    /// strict comparison prevents re-inserting the boundary day, so feeding
    /// the same batch twice (or a batch overlapping the stored tail) never
    /// creates duplicates and never rewrites an existing point. With no
    /// prior entry this degrades to a full `set`.
    ///
    /// Returns the number of points appended. If the fetched batch itself
    /// has an internal gap the stored series inherits it; only trailing
    /// staleness is tracked, never backfilled.
    pub fn update_incremental(
        &mut self,
        symbol: &str,
        new_points: Vec<PricePoint>,
    ) -> Result<usize, CoreError> {
        let key = symbol.to_uppercase();
        let Some(existing) = self.store.get(&key) else {
            return self.set(symbol, new_points);
        };

        let boundary = existing.value.last_date;
        let fresh: Vec<PricePoint> = normalize(new_points)
            .into_iter()
            .filter(|p| p.date > boundary)
            .collect();

        if fresh.is_empty() {
            debug!(symbol = %key, last_date = %boundary, "no points past stored tail, series unchanged");
            return Ok(0);
        }

        // `fresh` is sorted and starts past the stored tail, so appending
        // preserves the strictly-ascending invariant.
        let mut series = existing.value.clone();
        let appended = fresh.len();
        series.points.extend(fresh);
        series.last_date = series
            .points
            .last()
            .map(|p| p.date)
            .unwrap_or(boundary);
        series.total_data_points = series.points.len();

        let last_date = series.last_date;
        self.store
            .set_with_price_date(key.clone(), series, Some(last_date))?;
        debug!(symbol = %key, appended, last_date = %last_date, "merged incremental points");
        Ok(appended)
    }

    /// Read a window over the stored series, newest data last.
    ///
    /// Returns `None` when the symbol has never been fetched. The window
    /// carries the same freshness verdict as `needs_update`, so callers can
    /// serve the (possibly slightly stale) data and decide to refresh.
    pub fn get(&self, symbol: &str, range: HistoryRange) -> Option<SeriesWindow> {
        let key = symbol.to_uppercase();
        let entry = self.store.get(&key)?;
        let freshness = self.needs_update(&key);

        let today = self.store.clock().now().date_naive();
        let data: Vec<PricePoint> = match range.start_date(today) {
            Some(start) => entry
                .value
                .points
                .iter()
                .filter(|p| p.date >= start)
                .cloned()
                .collect(),
            None => entry.value.points.clone(),
        };

        Some(SeriesWindow {
            filtered_data_points: data.len(),
            data,
            needs_update: freshness.needs_update,
            total_data_points: entry.value.total_data_points,
            filtered_period: range,
            last_modified: entry.fetched_at,
        })
    }

    pub fn last_date(&self, symbol: &str) -> Option<NaiveDate> {
        self.store
            .get(&symbol.to_uppercase())
            .map(|e| e.value.last_date)
    }

    pub fn point_count(&self, symbol: &str) -> usize {
        self.store
            .get(&symbol.to_uppercase())
            .map(|e| e.value.points.len())
            .unwrap_or(0)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.store.keys().cloned().collect()
    }

    /// Wipe every stored series. Returns the number of symbols removed.
    pub fn clear_all(&mut self) -> Result<usize, CoreError> {
        self.store.clear_all()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn clock(&self) -> &Clock {
        self.store.clock()
    }
}

/// Sort ascending by date and collapse duplicate dates, keeping the latest
/// occurrence within the batch.
fn normalize(mut points: Vec<PricePoint>) -> Vec<PricePoint> {
    points.sort_by_key(|p| p.date);
    let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
    for p in points {
        match out.last_mut() {
            Some(last) if last.date == p.date => *last = p,
            _ => out.push(p),
        }
    }
    out
}
