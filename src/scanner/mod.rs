//! Catalyst Scanner component: scoring, market-data validation, and
//! multi-stage candidate ranking.

pub mod engine;
pub mod market_data;
pub mod scoring;

pub use engine::{CatalystScanner, ScanThresholds};
pub use market_data::{FakeMarketDataClient, HttpMarketDataClient, MarketDataClient, MarketSnapshot};
