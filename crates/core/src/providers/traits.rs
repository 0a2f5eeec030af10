use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::CoreError;
use crate::models::asset::AssetType;
use crate::models::price::{PricePoint, QuoteRecord};

/// Trait abstraction over upstream market-data sources.
///
/// The cache core is agnostic to which external provider backs these calls;
/// it only needs success/failure and the shapes below. Each API provider
/// implements this trait, so the core can be unit-tested with a fake
/// implementation and zero network dependency.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Which asset types this provider can handle.
    fn supported_asset_types(&self) -> Vec<AssetType>;

    /// Current point-in-time quote for a symbol in a given currency.
    async fn get_quote(&self, symbol: &str, currency: &str) -> Result<QuoteRecord, CoreError>;

    /// Daily bars for a symbol over an inclusive date range, ascending by
    /// date. Implementations may return extra days around the range; the
    /// caches filter defensively.
    async fn get_daily_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError>;
}
