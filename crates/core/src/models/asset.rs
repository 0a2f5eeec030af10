use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The category of a tradable asset.
/// Determines which market-data provider serves its quotes and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    /// Cryptocurrencies (BTC, ETH, ...)
    Crypto,
    /// Stocks / ETFs (AAPL, VFV.TO, ...)
    Stock,
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Crypto => write!(f, "Crypto"),
            AssetType::Stock => write!(f, "Stock"),
        }
    }
}

/// A single position inside a portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    /// Ticker symbol, uppercased (e.g., "BTC", "AAPL")
    pub symbol: String,
    pub quantity: f64,
    #[serde(default = "default_asset_type")]
    pub asset_type: AssetType,
}

fn default_asset_type() -> AssetType {
    AssetType::Stock
}

impl Holding {
    pub fn new(symbol: impl Into<String>, quantity: f64, asset_type: AssetType) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            quantity,
            asset_type,
        }
    }
}

/// A persisted portfolio record: a named bag of holdings.
/// Stored in `portfolios.json` keyed by the record id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub name: String,
    pub holdings: Vec<Holding>,
}

impl Portfolio {
    pub fn new(name: impl Into<String>, holdings: Vec<Holding>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            holdings,
        }
    }
}
