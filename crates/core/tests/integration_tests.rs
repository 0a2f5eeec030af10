// ═══════════════════════════════════════════════════════════════════
// Integration Tests — MarketDataEngine end-to-end over a temp data dir
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use tempfile::tempdir;

use market_data_core::clock::Clock;
use market_data_core::errors::CoreError;
use market_data_core::models::asset::{AssetType, Holding, Portfolio};
use market_data_core::models::price::{PricePoint, QuoteRecord};
use market_data_core::models::series::HistoryRange;
use market_data_core::providers::registry::ProviderRegistry;
use market_data_core::providers::traits::MarketDataProvider;
use market_data_core::services::sync::RefreshStatus;
use market_data_core::MarketDataEngine;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Clock pinned to Friday 2024-01-05 noon UTC.
fn test_clock() -> Clock {
    Clock::fixed(Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap())
}

/// Provider serving a fixed quote and a generated daily history per symbol.
struct FixtureProvider {
    types: Vec<AssetType>,
    quotes: HashMap<String, f64>,
}

impl FixtureProvider {
    fn new(types: Vec<AssetType>, quotes: &[(&str, f64)]) -> Self {
        Self {
            types,
            quotes: quotes
                .iter()
                .map(|(s, p)| (s.to_string(), *p))
                .collect(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for FixtureProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    fn supported_asset_types(&self) -> Vec<AssetType> {
        self.types.clone()
    }

    async fn get_quote(&self, symbol: &str, currency: &str) -> Result<QuoteRecord, CoreError> {
        let price = *self
            .quotes
            .get(&symbol.to_uppercase())
            .ok_or_else(|| CoreError::QuoteNotAvailable {
                symbol: symbol.to_string(),
                currency: currency.to_string(),
            })?;
        Ok(QuoteRecord {
            symbol: symbol.to_uppercase(),
            price,
            change_24h: None,
            volume: None,
            currency: currency.to_uppercase(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap(),
        })
    }

    async fn get_daily_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let base = *self
            .quotes
            .get(&symbol.to_uppercase())
            .ok_or_else(|| CoreError::HistoryNotAvailable {
                symbol: symbol.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            })?;

        let mut points = Vec::new();
        let mut date = from;
        let mut offset = 0.0;
        while date <= to {
            points.push(PricePoint::flat(date, base + offset));
            date = date.succ_opt().unwrap();
            offset += 0.1;
        }
        Ok(points)
    }
}

fn engine_at(dir: &std::path::Path) -> MarketDataEngine {
    let mut registry = ProviderRegistry::new();
    registry.register(Box::new(FixtureProvider::new(
        vec![AssetType::Stock],
        &[("AAPL", 185.0), ("SHOP", 97.0)],
    )));
    registry.register(Box::new(FixtureProvider::new(
        vec![AssetType::Crypto],
        &[("BTC", 65000.0)],
    )));
    MarketDataEngine::new(dir, registry, test_clock())
}

// ═══════════════════════════════════════════════════════════════════
// End-to-end flows
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn discover_refresh_and_read_back() {
    let dir = tempdir().unwrap();
    let mut engine = engine_at(dir.path());

    engine
        .save_portfolio(Portfolio::new(
            "main",
            vec![
                Holding::new("AAPL", 10.0, AssetType::Stock),
                Holding::new("BTC", 0.5, AssetType::Crypto),
                Holding::new("DUST", 0.0, AssetType::Stock),
            ],
        ))
        .unwrap();

    // Zero-quantity holdings stay out of the universe.
    let symbols: Vec<String> = engine.discover_symbols().into_iter().collect();
    assert_eq!(symbols, vec!["AAPL", "BTC"]);

    let outcomes = engine.refresh_all().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o.status, RefreshStatus::Updated { .. })));

    // Both series now end today and report fresh.
    assert_eq!(engine.history_last_date("AAPL"), Some(d(2024, 1, 5)));
    assert!(!engine.history_needs_update("AAPL").needs_update);
    assert!(!engine.history_needs_update("BTC").needs_update);

    // A second pass finds nothing to do.
    assert!(engine.refresh_all().await.is_empty());

    let window = engine.history("AAPL", HistoryRange::Days(30)).unwrap();
    assert!(window.filtered_data_points <= window.total_data_points);
    assert!(!window.needs_update);
}

#[tokio::test]
async fn historical_cache_survives_an_engine_rebuild() {
    let dir = tempdir().unwrap();
    {
        let mut engine = engine_at(dir.path());
        engine
            .save_portfolio(Portfolio::new(
                "main",
                vec![Holding::new("AAPL", 1.0, AssetType::Stock)],
            ))
            .unwrap();
        engine.refresh_all().await;
    }

    let engine = engine_at(dir.path());
    assert_eq!(engine.history_last_date("AAPL"), Some(d(2024, 1, 5)));
    assert!(engine.history("AAPL", HistoryRange::Max).is_some());
    assert_eq!(engine.portfolios().len(), 1);
}

#[tokio::test]
async fn live_quote_populates_the_fallback_path() {
    let dir = tempdir().unwrap();
    let mut engine = engine_at(dir.path());

    let q = engine
        .live_quote("SHOP", "CAD", AssetType::Stock)
        .await
        .unwrap();
    assert_eq!(q.price, 97.0);

    // The live fetch seeded the holdings cache as last-known-good.
    let valuation = engine.holding_valuation("SHOP").unwrap();
    assert_eq!(valuation.price, 97.0);
    assert!(!engine.holding_is_stale("SHOP"));
    assert!(engine.holding_is_stale("NEVER-SEEN"));
}

#[tokio::test]
async fn incremental_merge_through_the_facade() {
    let dir = tempdir().unwrap();
    let mut engine = engine_at(dir.path());

    engine
        .set_history(
            "AAPL",
            vec![
                PricePoint::flat(d(2024, 1, 2), 100.0),
                PricePoint::flat(d(2024, 1, 3), 101.0),
            ],
        )
        .unwrap();

    let added = engine
        .merge_history(
            "AAPL",
            vec![
                PricePoint::flat(d(2024, 1, 3), 999.0),
                PricePoint::flat(d(2024, 1, 4), 102.0),
            ],
        )
        .unwrap();

    assert_eq!(added, 1);
    let window = engine.history("AAPL", HistoryRange::Max).unwrap();
    let closes: Vec<f64> = window.data.iter().map(|p| p.close).collect();
    assert_eq!(closes, vec![100.0, 101.0, 102.0]);
}

#[tokio::test]
async fn clear_operations_report_counts() {
    let dir = tempdir().unwrap();
    let mut engine = engine_at(dir.path());

    engine
        .save_portfolio(Portfolio::new(
            "main",
            vec![Holding::new("AAPL", 1.0, AssetType::Stock)],
        ))
        .unwrap();
    engine.refresh_all().await;
    engine
        .live_quote("AAPL", "USD", AssetType::Stock)
        .await
        .unwrap();

    assert_eq!(engine.clear_historical_cache().unwrap(), 1);
    assert_eq!(engine.clear_holdings_cache().unwrap(), 1);
    assert_eq!(engine.clear_quote_cache().await, 1);
    assert_eq!(engine.clear_portfolios().unwrap(), 1);

    assert!(engine.history("AAPL", HistoryRange::Max).is_none());
    assert!(engine.holding_valuation("AAPL").is_none());
    assert!(engine.discover_symbols().is_empty());
}
