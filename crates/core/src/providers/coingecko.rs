use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::traits::MarketDataProvider;
use crate::errors::CoreError;
use crate::models::asset::AssetType;
use crate::models::price::{PricePoint, QuoteRecord};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko API provider for cryptocurrency data.
///
/// - **Free**: no API key required (rate limited to ~10-30 req/min).
/// - **Endpoints**: `/simple/price`, `/coins/{id}/market_chart`, `/search`.
///
/// CoinGecko addresses coins by lowercase ids like "bitcoin". Common symbols
/// are pre-mapped (BTC → bitcoin); unknown ones are resolved dynamically via
/// the search endpoint and the result is remembered for the session.
pub struct CoinGeckoProvider {
    client: Client,
    /// Map from uppercase symbol (BTC) to CoinGecko coin id (bitcoin).
    symbol_map: Mutex<HashMap<String, String>>,
}

impl CoinGeckoProvider {
    pub fn new() -> Self {
        let mut symbol_map = HashMap::new();
        let common = [
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
            ("USDT", "tether"),
            ("USDC", "usd-coin"),
            ("BNB", "binancecoin"),
            ("XRP", "ripple"),
            ("ADA", "cardano"),
            ("SOL", "solana"),
            ("DOGE", "dogecoin"),
            ("DOT", "polkadot"),
            ("LTC", "litecoin"),
            ("AVAX", "avalanche-2"),
            ("LINK", "chainlink"),
            ("UNI", "uniswap"),
            ("ATOM", "cosmos"),
            ("XLM", "stellar"),
            ("ALGO", "algorand"),
            ("TRX", "tron"),
            ("AAVE", "aave"),
            ("FIL", "filecoin"),
            ("ETC", "ethereum-classic"),
            ("XMR", "monero"),
        ];
        for (sym, id) in common {
            symbol_map.insert(sym.to_string(), id.to_string());
        }

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            symbol_map: Mutex::new(symbol_map),
        }
    }

    /// Resolve a symbol like "BTC" to a CoinGecko id like "bitcoin",
    /// searching the API for symbols outside the seeded map and caching the
    /// answer for future lookups.
    async fn resolve_id(&self, symbol: &str) -> Result<String, CoreError> {
        let upper = symbol.to_uppercase();

        {
            let map = self.symbol_map.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(id) = map.get(&upper) {
                return Ok(id.clone());
            }
        }

        let url = format!("{BASE_URL}/search?query={upper}");
        let resp: SearchResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "CoinGecko".into(),
                message: format!("Failed to search for {upper}: {e}"),
            })?;

        let matched = resp
            .coins
            .iter()
            .find(|c| c.symbol.to_uppercase() == upper)
            .ok_or_else(|| CoreError::Api {
                provider: "CoinGecko".into(),
                message: format!("No CoinGecko coin found for symbol {upper}"),
            })?;

        let id = matched.id.clone();
        {
            let mut map = self.symbol_map.lock().unwrap_or_else(|e| e.into_inner());
            map.insert(upper, id.clone());
        }
        Ok(id)
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ── CoinGecko API response types ────────────────────────────────────

#[derive(Deserialize)]
struct SearchResponse {
    coins: Vec<SearchCoin>,
}

#[derive(Deserialize)]
struct SearchCoin {
    id: String,
    symbol: String,
}

#[derive(Deserialize)]
struct SimplePriceEntry {
    #[serde(flatten)]
    fields: HashMap<String, f64>,
}

#[derive(Deserialize)]
struct MarketChartResponse {
    /// `[unix_millis, price]` pairs, one per day at daily interval.
    prices: Vec<(i64, f64)>,
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "CoinGecko"
    }

    fn supported_asset_types(&self) -> Vec<AssetType> {
        vec![AssetType::Crypto]
    }

    async fn get_quote(&self, symbol: &str, currency: &str) -> Result<QuoteRecord, CoreError> {
        let id = self.resolve_id(symbol).await?;
        let vs = currency.to_lowercase();
        let url = format!(
            "{BASE_URL}/simple/price?ids={id}&vs_currencies={vs}&include_24hr_change=true&include_24hr_vol=true"
        );

        let resp: HashMap<String, SimplePriceEntry> = self
            .client
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "CoinGecko".into(),
                message: format!("Failed to parse price for {symbol}: {e}"),
            })?;

        let entry = resp.get(&id).ok_or_else(|| CoreError::QuoteNotAvailable {
            symbol: symbol.to_string(),
            currency: currency.to_string(),
        })?;

        let price = *entry
            .fields
            .get(&vs)
            .ok_or_else(|| CoreError::QuoteNotAvailable {
                symbol: symbol.to_string(),
                currency: currency.to_string(),
            })?;

        Ok(QuoteRecord {
            symbol: symbol.to_uppercase(),
            price,
            change_24h: entry.fields.get(&format!("{vs}_24h_change")).copied(),
            volume: entry.fields.get(&format!("{vs}_24h_vol")).copied(),
            currency: currency.to_uppercase(),
            timestamp: Utc::now(),
        })
    }

    async fn get_daily_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        let id = self.resolve_id(symbol).await?;
        let days = (Utc::now().date_naive() - from).num_days().max(1);
        let url = format!(
            "{BASE_URL}/coins/{id}/market_chart?vs_currency=usd&days={days}&interval=daily"
        );

        let resp: MarketChartResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "CoinGecko".into(),
                message: format!("Failed to parse market chart for {symbol}: {e}"),
            })?;

        // market_chart only exposes a single daily price, so bars degrade to
        // flat OHLC. Duplicate dates (the trailing intraday sample) collapse
        // in the cache's normalization pass.
        let points: Vec<PricePoint> = resp
            .prices
            .iter()
            .filter_map(|&(millis, price)| {
                let date = chrono::DateTime::from_timestamp_millis(millis)?.date_naive();
                if date < from || date > to {
                    return None;
                }
                Some(PricePoint::flat(date, price))
            })
            .collect();

        if points.is_empty() {
            return Err(CoreError::HistoryNotAvailable {
                symbol: symbol.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(points)
    }
}
