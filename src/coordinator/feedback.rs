//! Outcome-feedback sweep: every 15 minutes, pull newly closed trades and
//! transactionally update the originating `NewsItem` and `SourceMetrics`.

use crate::coordinator::collaborators::HttpCollaborator;
use crate::models::NewsOutcome;
use crate::persistence::PersistencePort;
use crate::CoreError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

pub const FEEDBACK_INTERVAL_SECS: u64 = 15 * 60;

pub struct OutcomeFeedback {
    trading: Arc<HttpCollaborator>,
    persistence: Arc<dyn PersistencePort>,
    last_run: Mutex<DateTime<Utc>>,
}

impl OutcomeFeedback {
    pub fn new(trading: Arc<HttpCollaborator>, persistence: Arc<dyn PersistencePort>) -> Self {
        Self { trading, persistence, last_run: Mutex::new(Utc::now()) }
    }

    /// Run one sweep: closed trades since the last run update the
    /// originating news item's outcome and that source's accuracy counters.
    pub async fn run(&self) -> Result<usize, CoreError> {
        let since = *self.last_run.lock();
        let closed = self.trading.poll_closed_trades(since).await?;
        let mut applied = 0;

        for trade in &closed {
            let outcome = NewsOutcome {
                price_move_1h: None,
                price_move_24h: None,
                volume_surge_ratio: None,
                was_accurate: Some(trade.was_accurate),
            };
            if let Err(e) = self.persistence.update_news_outcome(&trade.news_fingerprint, outcome).await {
                warn!(trade_id = %trade.trade_id, error = %e, "failed to backfill news outcome");
                continue;
            }
            let (confirmed_delta, accurate_delta, false_delta) =
                if trade.was_accurate { (1, 1, 0) } else { (1, 0, 1) };
            self.persistence
                .increment_source_metrics(&trade.source, trade.source_tier, confirmed_delta, accurate_delta, false_delta)
                .await?;
            applied += 1;
        }

        *self.last_run.lock() = Utc::now();
        info!(closed = closed.len(), applied, "outcome feedback sweep complete");
        Ok(applied)
    }
}
