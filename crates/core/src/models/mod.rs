pub mod asset;
pub mod price;
pub mod series;
