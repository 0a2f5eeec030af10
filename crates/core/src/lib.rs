pub mod cache;
pub mod clock;
pub mod constants;
pub mod errors;
pub mod models;
pub mod providers;
pub mod services;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use uuid::Uuid;

use cache::historical::HistoricalSeriesCache;
use cache::holdings::HoldingsCache;
use cache::quote::QuoteCache;
use cache::store::JsonStore;
use clock::Clock;
use errors::CoreError;
use models::asset::{AssetType, Portfolio};
use models::price::{HoldingValuation, PricePoint, QuoteRecord};
use models::series::{HistoryRange, SeriesFreshness, SeriesWindow};
use providers::registry::ProviderRegistry;
use services::discovery::{AssetDiscovery, RefreshTask};
use services::sync::{RefreshOutcome, SyncService};

/// Main entry point for the market-data cache core.
///
/// Owns the three cache tiers, the persisted portfolio store, asset
/// discovery and the sync service, all rooted in one data directory. Route
/// handlers and other callers receive an instance by injection; tests build
/// isolated instances over temp directories with a manual clock.
#[must_use]
pub struct MarketDataEngine {
    data_dir: PathBuf,
    quotes: QuoteCache,
    holdings: HoldingsCache,
    historical: HistoricalSeriesCache,
    portfolios: JsonStore<Portfolio>,
    discovery: AssetDiscovery,
    sync: SyncService,
}

impl std::fmt::Debug for MarketDataEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataEngine")
            .field("data_dir", &self.data_dir)
            .field("holdings", &self.holdings.len())
            .field("historical_symbols", &self.historical.len())
            .field("portfolios", &self.portfolios.len())
            .finish()
    }
}

impl MarketDataEngine {
    /// Build an engine rooted at `data_dir` with the given providers.
    pub fn new(data_dir: impl Into<PathBuf>, registry: ProviderRegistry, clock: Clock) -> Self {
        let data_dir = data_dir.into();
        Self {
            quotes: QuoteCache::new(clock.clone()),
            holdings: HoldingsCache::open(data_dir.join(constants::HOLDINGS_CACHE_FILE), clock.clone()),
            historical: HistoricalSeriesCache::open(
                data_dir.join(constants::HISTORICAL_CACHE_FILE),
                clock.clone(),
            ),
            portfolios: JsonStore::open(data_dir.join(constants::PORTFOLIOS_FILE), clock),
            discovery: AssetDiscovery::new(
                data_dir.join(constants::UPLOADS_DIR_BROKER_A),
                data_dir.join(constants::UPLOADS_DIR_BROKER_B),
            ),
            sync: SyncService::new(registry),
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ── Portfolios ──────────────────────────────────────────────────

    /// Insert or replace a portfolio record and persist immediately.
    pub fn save_portfolio(&mut self, portfolio: Portfolio) -> Result<Uuid, CoreError> {
        let id = portfolio.id;
        self.portfolios.set(id.to_string(), portfolio)?;
        Ok(id)
    }

    pub fn get_portfolio(&self, id: Uuid) -> Option<Portfolio> {
        self.portfolios.get(&id.to_string()).map(|e| e.value.clone())
    }

    pub fn portfolios(&self) -> Vec<Portfolio> {
        self.portfolios.iter().map(|(_, e)| e.value.clone()).collect()
    }

    pub fn clear_portfolios(&mut self) -> Result<usize, CoreError> {
        self.portfolios.clear_all()
    }

    // ── Live quotes ─────────────────────────────────────────────────

    /// Quote through the short-TTL cache, falling back to the last-known-good
    /// holdings record when every upstream fails.
    pub async fn live_quote(
        &mut self,
        symbol: &str,
        currency: &str,
        asset_type: AssetType,
    ) -> Result<QuoteRecord, CoreError> {
        self.sync
            .live_quote(&self.quotes, &mut self.holdings, symbol, currency, asset_type)
            .await
    }

    pub async fn clear_quote_cache(&self) -> usize {
        self.quotes.clear().await
    }

    // ── Holdings cache ──────────────────────────────────────────────

    pub fn holding_valuation(&self, symbol: &str) -> Option<HoldingValuation> {
        self.holdings.get(symbol)
    }

    /// Store a valuation; `false` means the record had no usable price and
    /// was ignored.
    pub fn set_holding_valuation(&mut self, valuation: HoldingValuation) -> Result<bool, CoreError> {
        self.holdings.set(valuation)
    }

    /// Advisory staleness flag; the caller decides whether to refetch.
    pub fn holding_is_stale(&self, symbol: &str) -> bool {
        self.holdings.is_stale(symbol)
    }

    pub fn clear_holdings_cache(&mut self) -> Result<usize, CoreError> {
        self.holdings.clear_all()
    }

    // ── Historical series ───────────────────────────────────────────

    /// Windowed read over a symbol's stored history.
    pub fn history(&self, symbol: &str, range: HistoryRange) -> Option<SeriesWindow> {
        self.historical.get(symbol, range)
    }

    pub fn history_needs_update(&self, symbol: &str) -> SeriesFreshness {
        self.historical.needs_update(symbol)
    }

    /// Splice fetched points onto a stored series (see
    /// `HistoricalSeriesCache::update_incremental`).
    pub fn merge_history(
        &mut self,
        symbol: &str,
        points: Vec<PricePoint>,
    ) -> Result<usize, CoreError> {
        self.historical.update_incremental(symbol, points)
    }

    /// Full overwrite of a symbol's history (first populate / full resync).
    pub fn set_history(&mut self, symbol: &str, points: Vec<PricePoint>) -> Result<usize, CoreError> {
        self.historical.set(symbol, points)
    }

    pub fn history_last_date(&self, symbol: &str) -> Option<NaiveDate> {
        self.historical.last_date(symbol)
    }

    pub fn clear_historical_cache(&mut self) -> Result<usize, CoreError> {
        self.historical.clear_all()
    }

    // ── Discovery & refresh ─────────────────────────────────────────

    /// The current symbol universe: positive-quantity portfolio holdings
    /// union symbols parsed from uploaded trade files. Recomputed fresh on
    /// every call.
    pub fn discover_symbols(&self) -> BTreeSet<String> {
        self.discovery.all_unique_symbols(&self.portfolios)
    }

    /// Prioritized worklist of symbols whose stored series is behind.
    pub fn refresh_worklist(&self) -> Vec<RefreshTask> {
        self.discovery
            .symbols_needing_update(&self.portfolios, &self.historical)
    }

    /// Refresh one symbol's history if it is behind.
    pub async fn refresh_symbol(&mut self, symbol: &str, asset_type: AssetType) -> RefreshOutcome {
        self.sync
            .refresh_symbol(&mut self.historical, symbol, asset_type)
            .await
    }

    /// Refresh the whole discovered universe. Fetches run concurrently;
    /// each symbol's outcome is tracked independently.
    pub async fn refresh_all(&mut self) -> Vec<RefreshOutcome> {
        self.sync
            .refresh_all(&mut self.historical, &self.portfolios, &self.discovery)
            .await
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn cached_history_symbols(&self) -> Vec<String> {
        self.historical.symbols()
    }

    pub fn cached_holding_symbols(&self) -> Vec<String> {
        self.holdings.symbols()
    }
}
