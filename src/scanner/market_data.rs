//! Market-data collaborator client.

use crate::CoreError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MarketSnapshot {
    pub price: f64,
    pub volume: u64,
    pub relative_volume: f64,
    pub price_change_pct: f64,
    pub premarket_volume: Option<u64>,
    pub premarket_change_pct: Option<f64>,
}

#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, CoreError>;
}

/// HTTP-backed implementation against the market-data collaborator's REST API.
pub struct HttpMarketDataClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMarketDataClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(timeout).build().expect("reqwest client"),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MarketDataClient for HttpMarketDataClient {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, CoreError> {
        let url = format!("{}/snapshot/{}", self.base_url, symbol);
        let snapshot = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<MarketSnapshot>()
            .await?;
        Ok(snapshot)
    }
}

/// Fixed-table client for tests and fixture-driven scans.
#[derive(Default)]
pub struct FakeMarketDataClient {
    pub snapshots: HashMap<String, MarketSnapshot>,
}

impl FakeMarketDataClient {
    pub fn with(mut self, symbol: impl Into<String>, snapshot: MarketSnapshot) -> Self {
        self.snapshots.insert(symbol.into(), snapshot);
        self
    }
}

#[async_trait]
impl MarketDataClient for FakeMarketDataClient {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, CoreError> {
        self.snapshots
            .get(symbol)
            .copied()
            .ok_or_else(|| CoreError::NotFound(format!("market snapshot for {symbol}")))
    }
}
