use std::collections::HashMap;

use crate::models::asset::AssetType;

use super::alphavantage::AlphaVantageProvider;
use super::coingecko::CoinGeckoProvider;
use super::traits::MarketDataProvider;

/// Registry of all available market-data providers.
///
/// Routes requests to the correct provider based on `AssetType`. Providers
/// are tried in registration order, so registration priority doubles as the
/// fallback order when an upstream is down or rate limited.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn MarketDataProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Create a registry with all default providers pre-configured.
    pub fn new_with_defaults(api_keys: &HashMap<String, String>) -> Self {
        let mut registry = Self::new();

        // CoinGecko — crypto, no API key needed
        registry.register(Box::new(CoinGeckoProvider::new()));

        // Alpha Vantage — stocks, requires API key
        if let Some(key) = api_keys.get("alphavantage") {
            registry.register(Box::new(AlphaVantageProvider::new(key.clone())));
        }

        registry
    }

    /// Register a new provider.
    pub fn register(&mut self, provider: Box<dyn MarketDataProvider>) {
        self.providers.push(provider);
    }

    /// Find the first provider that supports the given asset type.
    pub fn get_provider_for(&self, asset_type: AssetType) -> Option<&dyn MarketDataProvider> {
        self.providers
            .iter()
            .find(|p| p.supported_asset_types().contains(&asset_type))
            .map(|p| p.as_ref())
    }

    /// Return ALL providers that support the given asset type, ordered by
    /// registration priority. Used for fallback: if the first provider
    /// fails, try the next one.
    pub fn get_providers_for(&self, asset_type: AssetType) -> Vec<&dyn MarketDataProvider> {
        self.providers
            .iter()
            .filter(|p| p.supported_asset_types().contains(&asset_type))
            .map(|p| p.as_ref())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
