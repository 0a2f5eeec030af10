use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One daily bar of a historical price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    /// A bar where every OHLC field carries the same price — what providers
    /// that only expose a single daily price degrade to.
    pub fn flat(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }
}

/// A point-in-time quote. Lives only in the in-memory quote cache and is
/// intentionally lost on restart — quotes are cheap to refetch and their
/// staleness tolerance is minutes, not hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub price: f64,
    pub change_24h: Option<f64>,
    pub volume: Option<f64>,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
}

/// Last-known-good valuation of a portfolio holding.
///
/// Persisted on every write so a crash never loses more than the in-flight
/// update. Never auto-expires; staleness is a derived flag the caller acts
/// on (try a live fetch, fall back to this on failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub symbol: String,
    pub price: f64,
    pub usd_price: f64,
    pub cad_price: f64,
    pub company_name: String,
    pub exchange_rate: f64,
    pub last_updated: DateTime<Utc>,
    pub price_date: Option<NaiveDate>,
}
