//! Tuning knobs for the cache tiers and the historical sync.

use chrono::Duration;

/// How long an in-memory quote stays fresh before the next call re-fetches.
pub fn quote_ttl() -> Duration {
    Duration::seconds(180)
}

/// A holdings-cache entry older than this is reported stale by `is_stale`.
/// Advisory only — nothing evicts or auto-refreshes on staleness.
pub fn holdings_stale_after() -> Duration {
    Duration::hours(1)
}

/// Extra days requested on top of the computed missing-day gap, so a fetch
/// always overlaps the stored series and the strict date filter can trim it.
pub const HISTORY_FETCH_BUFFER_DAYS: i64 = 5;

/// Days of history requested when a symbol has no stored series yet.
pub const HISTORY_INITIAL_RANGE_DAYS: i64 = 365;

/// Persisted cache file names, one flat JSON object per cache.
pub const HOLDINGS_CACHE_FILE: &str = "holdings-cache.json";
pub const HISTORICAL_CACHE_FILE: &str = "historical-cache.json";
pub const PORTFOLIOS_FILE: &str = "portfolios.json";

/// Upload directories scanned by asset discovery, one per trade-source format.
pub const UPLOADS_DIR_BROKER_A: &str = "uploads/questrade";
pub const UPLOADS_DIR_BROKER_B: &str = "uploads/wealthsimple";
