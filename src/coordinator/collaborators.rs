//! HTTP clients for the analyze/signal/execute collaborators.

use crate::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub symbol: String,
    pub catalyst_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub symbol: String,
    pub pattern: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalRequest {
    pub symbol: String,
    pub patterns: Vec<PatternRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TechnicalSignal {
    pub symbol: String,
    pub confidence: f64,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub symbol: String,
    pub direction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: String,
    pub news_fingerprint: String,
    pub source: String,
    pub source_tier: u8,
    pub pnl: f64,
    pub was_accurate: bool,
}

/// Minimum confidence a technical signal must clear to reach the execute stage.
pub const SIGNAL_CONFIDENCE_FLOOR: f64 = 0.6;

#[async_trait]
pub trait HealthCheckable: Send + Sync {
    fn name(&self) -> &str;
    async fn health(&self) -> Result<bool, CoreError>;
}

pub struct HttpCollaborator {
    client: reqwest::Client,
    base_url: String,
    name: String,
}

impl HttpCollaborator {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(timeout).build().expect("reqwest client"),
            base_url: base_url.into(),
            name: name.into(),
        }
    }

    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<PatternRecord, CoreError> {
        let url = format!("{}/analyze", self.base_url);
        Ok(self.client.post(&url).json(request).send().await?.error_for_status()?.json().await?)
    }

    pub async fn signal(&self, request: &SignalRequest) -> Result<TechnicalSignal, CoreError> {
        let url = format!("{}/signal", self.base_url);
        Ok(self.client.post(&url).json(request).send().await?.error_for_status()?.json().await?)
    }

    pub async fn execute(&self, request: &ExecuteRequest) -> Result<TradeRecord, CoreError> {
        let url = format!("{}/execute", self.base_url);
        Ok(self.client.post(&url).json(request).send().await?.error_for_status()?.json().await?)
    }

    pub async fn poll_closed_trades(&self, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<ClosedTrade>, CoreError> {
        let url = format!("{}/closed_trades", self.base_url);
        Ok(self
            .client
            .get(&url)
            .query(&[("since", since.to_rfc3339())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

#[async_trait]
impl HealthCheckable for HttpCollaborator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health(&self) -> Result<bool, CoreError> {
        let url = format!("{}/health", self.base_url);
        let response = tokio::time::timeout(Duration::from_secs(5), self.client.get(&url).send()).await??;
        Ok(response.status().is_success())
    }
}
