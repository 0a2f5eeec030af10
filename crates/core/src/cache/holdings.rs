use chrono::Duration;
use std::path::PathBuf;
use tracing::warn;

use super::store::JsonStore;
use crate::clock::Clock;
use crate::constants;
use crate::errors::CoreError;
use crate::models::price::HoldingValuation;

/// Persistent last-known-good pricing per holding symbol.
///
/// This is the fallback source of truth for portfolio valuation when a live
/// fetch fails: entries never auto-expire, and staleness is only an advisory
/// flag the caller decides to act on.
pub struct HoldingsCache {
    store: JsonStore<HoldingValuation>,
    stale_after: Duration,
}

impl HoldingsCache {
    pub fn open(path: impl Into<PathBuf>, clock: Clock) -> Self {
        Self {
            store: JsonStore::open(path, clock),
            stale_after: constants::holdings_stale_after(),
        }
    }

    /// Override the staleness threshold (tests, tighter valuation loops).
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn get(&self, symbol: &str) -> Option<HoldingValuation> {
        self.store
            .get(&symbol.to_uppercase())
            .map(|e| e.value.clone())
    }

    /// Store a valuation. A record without a usable price is rejected with a
    /// logged no-op (`Ok(false)`), leaving any existing entry untouched —
    /// callers must not assume `set` always succeeds.
    pub fn set(&mut self, valuation: HoldingValuation) -> Result<bool, CoreError> {
        let symbol = valuation.symbol.to_uppercase();
        if !valuation.price.is_finite() || valuation.price <= 0.0 {
            warn!(
                symbol = %symbol,
                price = valuation.price,
                "refusing to cache holding valuation without a usable price"
            );
            return Ok(false);
        }

        let price_date = valuation.price_date;
        self.store
            .set_with_price_date(symbol, valuation, price_date)?;
        Ok(true)
    }

    /// True when there is no entry, or the entry's fetch age exceeds the
    /// staleness threshold. Advisory only — nothing auto-refreshes here; the
    /// caller decides whether to trigger a live refetch.
    pub fn is_stale(&self, symbol: &str) -> bool {
        match self.store.age_of(&symbol.to_uppercase()) {
            Some(age) => age > self.stale_after,
            None => true,
        }
    }

    /// Wipe the cache. Returns the number of entries removed.
    pub fn clear_all(&mut self) -> Result<usize, CoreError> {
        self.store.clear_all()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.store.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
