use chrono::{Days, NaiveDate};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::historical::HistoricalSeriesCache;
use crate::cache::holdings::HoldingsCache;
use crate::cache::quote::{quote_key, QuoteCache};
use crate::cache::store::JsonStore;
use crate::constants;
use crate::errors::CoreError;
use crate::models::asset::{AssetType, Portfolio};
use crate::models::price::{HoldingValuation, PricePoint, QuoteRecord};
use crate::providers::registry::ProviderRegistry;
use crate::services::discovery::AssetDiscovery;

/// Per-symbol outcome of a refresh. A batch tracks each symbol
/// independently — one failure never aborts the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshStatus {
    Updated { points_added: usize },
    Fresh,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub symbol: String,
    pub status: RefreshStatus,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self.status, RefreshStatus::Failed { .. })
    }
}

/// Wires the provider registry to the cache tiers: incremental historical
/// refresh sized by the missing-day gap, and live quotes with a
/// last-known-good fallback.
///
/// Caches are passed in per call rather than owned, so the same service
/// serves any cache instance (and tests construct isolated ones).
pub struct SyncService {
    registry: ProviderRegistry,
}

impl SyncService {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    // ── Historical refresh ──────────────────────────────────────────

    /// Bring one symbol's stored series up to date.
    ///
    /// Consults the cache's freshness verdict first; a fresh series is not
    /// refetched. Otherwise only the missing tail (plus a small overlap
    /// buffer the strict merge filter trims back out) is requested, or a
    /// full initial range when the symbol has never been fetched.
    pub async fn refresh_symbol(
        &self,
        historical: &mut HistoricalSeriesCache,
        symbol: &str,
        asset_type: AssetType,
    ) -> RefreshOutcome {
        let freshness = historical.needs_update(symbol);
        if !freshness.needs_update {
            debug!(symbol, "series already fresh, skipping fetch");
            return RefreshOutcome {
                symbol: symbol.to_uppercase(),
                status: RefreshStatus::Fresh,
            };
        }

        let today = historical.clock().now().date_naive();
        let (from, to) = fetch_range(freshness.last_date, today);
        let fetched = self
            .fetch_history(symbol, asset_type, from, to)
            .await;

        self.merge_outcome(historical, symbol, fetched)
    }

    /// Refresh every symbol of the discovered universe that needs it.
    ///
    /// Fetches are issued concurrently and awaited collectively; merges then
    /// apply sequentially, since the historical cache is the single series
    /// mutator. There is no cancellation — an in-flight batch runs to
    /// completion. Timeouts belong to the underlying HTTP client.
    pub async fn refresh_all(
        &self,
        historical: &mut HistoricalSeriesCache,
        portfolios: &JsonStore<Portfolio>,
        discovery: &AssetDiscovery,
    ) -> Vec<RefreshOutcome> {
        let tasks = discovery.symbols_needing_update(portfolios, historical);
        if tasks.is_empty() {
            debug!("historical refresh: nothing to do");
            return Vec::new();
        }

        let types = discovery.symbol_asset_types(portfolios);
        let today = historical.clock().now().date_naive();

        let fetches = tasks.iter().map(|task| {
            let asset_type = types
                .get(&task.symbol)
                .copied()
                .unwrap_or(AssetType::Stock);
            let (from, to) = fetch_range(task.last_date, today);
            async move {
                let result = self.fetch_history(&task.symbol, asset_type, from, to).await;
                (task.symbol.clone(), result)
            }
        });

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (symbol, fetched) in join_all(fetches).await {
            outcomes.push(self.merge_outcome(historical, &symbol, fetched));
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            total = outcomes.len(),
            failed, "historical refresh batch finished"
        );
        outcomes
    }

    fn merge_outcome(
        &self,
        historical: &mut HistoricalSeriesCache,
        symbol: &str,
        fetched: Result<Vec<PricePoint>, CoreError>,
    ) -> RefreshOutcome {
        let symbol = symbol.to_uppercase();
        let status = match fetched {
            Ok(points) => match historical.update_incremental(&symbol, points) {
                Ok(points_added) => RefreshStatus::Updated { points_added },
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "failed to persist merged series");
                    RefreshStatus::Failed {
                        message: e.to_string(),
                    }
                }
            },
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "historical fetch failed");
                RefreshStatus::Failed {
                    message: e.to_string(),
                }
            }
        };
        RefreshOutcome { symbol, status }
    }

    /// Fetch daily bars with provider fallback in registration order.
    async fn fetch_history(
        &self,
        symbol: &str,
        asset_type: AssetType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let providers = self.registry.get_providers_for(asset_type);
        if providers.is_empty() {
            return Err(CoreError::NoProvider(asset_type.to_string()));
        }

        let mut last_error = None;
        for provider in &providers {
            match provider.get_daily_history(symbol, from, to).await {
                Ok(points) => return Ok(points),
                Err(e) => {
                    debug!(symbol, provider = provider.name(), error = %e, "history fetch failed, trying next provider");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider(asset_type.to_string())))
    }

    // ── Live quotes ─────────────────────────────────────────────────

    /// Serve a live quote through the short-TTL cache.
    ///
    /// A successful fetch also refreshes the holdings cache so the
    /// last-known-good record keeps up with live traffic. On total upstream
    /// failure the holdings cache answers instead — stale-but-present data
    /// is preferred over a hard failure — and only when no fallback exists
    /// does the error surface.
    pub async fn live_quote(
        &self,
        quotes: &QuoteCache,
        holdings: &mut HoldingsCache,
        symbol: &str,
        currency: &str,
        asset_type: AssetType,
    ) -> Result<QuoteRecord, CoreError> {
        let key = quote_key(symbol, currency);
        let fetched = quotes
            .get_or_fetch(&key, constants::quote_ttl(), || {
                self.fetch_quote(symbol, currency, asset_type)
            })
            .await;

        match fetched {
            Ok(quote) => {
                // Best-effort: a holdings-cache write failure must not fail
                // the quote path.
                if let Err(e) = holdings.set(valuation_from_quote(&quote)) {
                    warn!(symbol, error = %e, "could not update holdings cache from live quote");
                }
                Ok(quote)
            }
            Err(e) => match holdings.get(symbol) {
                Some(valuation) => {
                    warn!(symbol, error = %e, "live quote failed, serving last-known-good valuation");
                    Ok(quote_from_valuation(&valuation, currency))
                }
                None => Err(e),
            },
        }
    }

    /// Fetch a quote with provider fallback and price validation.
    async fn fetch_quote(
        &self,
        symbol: &str,
        currency: &str,
        asset_type: AssetType,
    ) -> Result<QuoteRecord, CoreError> {
        let providers = self.registry.get_providers_for(asset_type);
        if providers.is_empty() {
            return Err(CoreError::NoProvider(asset_type.to_string()));
        }

        let mut last_error = None;
        for provider in &providers {
            match provider.get_quote(symbol, currency).await {
                Ok(quote) => {
                    if !quote.price.is_finite() || quote.price < 0.0 {
                        last_error = Some(CoreError::Api {
                            provider: provider.name().to_string(),
                            message: format!(
                                "Invalid price returned for {symbol}: {} (must be finite and non-negative)",
                                quote.price
                            ),
                        });
                        continue;
                    }
                    return Ok(quote);
                }
                Err(e) => {
                    debug!(symbol, provider = provider.name(), error = %e, "quote fetch failed, trying next provider");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::NoProvider(asset_type.to_string())))
    }
}

/// Inclusive fetch range for a refresh: the missing tail plus an overlap
/// buffer, or a full initial range for a never-fetched symbol.
fn fetch_range(last_date: Option<NaiveDate>, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let from = match last_date {
        Some(d) => d
            .checked_sub_days(Days::new(constants::HISTORY_FETCH_BUFFER_DAYS as u64))
            .unwrap_or(d),
        None => today
            .checked_sub_days(Days::new(constants::HISTORY_INITIAL_RANGE_DAYS as u64))
            .unwrap_or(today),
    };
    (from, today)
}

fn valuation_from_quote(quote: &QuoteRecord) -> HoldingValuation {
    // Only the quoted currency's slot is authoritative; cross-currency
    // conversion happens upstream when an exchange rate is known.
    HoldingValuation {
        symbol: quote.symbol.clone(),
        price: quote.price,
        usd_price: quote.price,
        cad_price: quote.price,
        company_name: quote.symbol.clone(),
        exchange_rate: 1.0,
        last_updated: quote.timestamp,
        price_date: Some(quote.timestamp.date_naive()),
    }
}

fn quote_from_valuation(valuation: &HoldingValuation, currency: &str) -> QuoteRecord {
    QuoteRecord {
        symbol: valuation.symbol.clone(),
        price: valuation.price,
        change_24h: None,
        volume: None,
        currency: currency.to_uppercase(),
        timestamp: valuation.last_updated,
    }
}
