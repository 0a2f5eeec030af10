pub mod alphavantage;
pub mod coingecko;
pub mod registry;
pub mod traits;
