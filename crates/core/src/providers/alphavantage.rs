use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::traits::MarketDataProvider;
use crate::errors::CoreError;
use crate::models::asset::AssetType;
use crate::models::price::{PricePoint, QuoteRecord};

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage API provider for stock/equity data.
///
/// - **Free tier**: 25 requests/day (across ALL endpoints).
/// - **Requires**: API key (registry key "alphavantage").
/// - **Strategy**: the cache tiers above this keep request volume bounded;
///   history fetches use compact output (100 trading days) unless the
///   requested range reaches further back.
///
/// Prices come back in the stock's native currency (typically USD).
pub struct AlphaVantageProvider {
    client: Client,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
        }
    }
}

// ── Alpha Vantage API response types ────────────────────────────────

#[derive(Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Deserialize)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

#[derive(Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyBar>>,
}

#[derive(Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "Alpha Vantage"
    }

    fn supported_asset_types(&self) -> Vec<AssetType> {
        vec![AssetType::Stock]
    }

    async fn get_quote(&self, symbol: &str, currency: &str) -> Result<QuoteRecord, CoreError> {
        let resp: GlobalQuoteResponse = self
            .client
            .get(BASE_URL)
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", &symbol.to_uppercase()),
                ("apikey", &self.api_key),
            ])
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "Alpha Vantage".into(),
                message: format!("Failed to parse quote for {symbol}: {e}"),
            })?;

        let quote = resp.global_quote.ok_or_else(|| CoreError::Api {
            provider: "Alpha Vantage".into(),
            message: format!("No quote data for {symbol}. API limit may be exceeded."),
        })?;

        let price: f64 = quote
            .price
            .as_deref()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| CoreError::Api {
                provider: "Alpha Vantage".into(),
                message: format!("Invalid price format for {symbol}"),
            })?;

        // "1.2345%" → 1.2345
        let change_24h = quote
            .change_percent
            .as_deref()
            .and_then(|c| c.trim_end_matches('%').parse().ok());
        let volume = quote.volume.as_deref().and_then(|v| v.parse().ok());

        Ok(QuoteRecord {
            symbol: symbol.to_uppercase(),
            price,
            change_24h,
            volume,
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
        // Compact output covers ~100 trading days; pull the full series only
        // when the requested range reaches further back than that.
        let output_size = if (Utc::now().date_naive() - from).num_days() > 100 {
            "full"
        } else {
            "compact"
        };

        let resp: TimeSeriesResponse = self
            .client
            .get(BASE_URL)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", &symbol.to_uppercase()),
                ("outputsize", output_size),
                ("apikey", &self.api_key),
            ])
            .send()
            .await?
            .json()
            .await
            .map_err(|e| CoreError::Api {
                provider: "Alpha Vantage".into(),
                message: format!("Failed to parse time series for {symbol}: {e}"),
            })?;

        let series = resp.time_series.ok_or_else(|| CoreError::Api {
            provider: "Alpha Vantage".into(),
            message: format!("No time series data for {symbol}. API limit may be exceeded."),
        })?;

        let mut points: Vec<PricePoint> = series
            .iter()
            .filter_map(|(date_str, bar)| {
                let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
                if date < from || date > to {
                    return None;
                }
                Some(PricePoint {
                    date,
                    open: bar.open.parse().ok()?,
                    high: bar.high.parse().ok()?,
                    low: bar.low.parse().ok()?,
                    close: bar.close.parse().ok()?,
                    volume: bar.volume.parse().unwrap_or(0.0),
                })
            })
            .collect();

        points.sort_by_key(|p| p.date);
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
