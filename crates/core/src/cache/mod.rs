pub mod historical;
pub mod holdings;
pub mod quote;
pub mod store;
