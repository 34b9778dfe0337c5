//! Stage orchestration: Collect → Scan → Analyze → Signal → Execute →
//! Finalize, in strict order, with per-stage timeouts, retry-with-backoff,
//! and cooperative cancellation between collaborator calls.

use crate::coordinator::collaborators::{
    AnalyzeRequest, ExecuteRequest, HttpCollaborator, SignalRequest, SIGNAL_CONFIDENCE_FLOOR,
};
use crate::coordinator::state::CycleState;
use crate::models::{CycleMode, CycleStage, CycleStatus, TradingCycle, WorkflowLogEntry};
use crate::news::NewsCollector;
use crate::persistence::PersistencePort;
use crate::retry::{retry_with_backoff, BackoffPolicy};
use crate::scanner::CatalystScanner;
use crate::CoreError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PATTERN_TIMEOUT: Duration = Duration::from_secs(30);
const TECHNICAL_TIMEOUT: Duration = Duration::from_secs(30);
const TRADING_TIMEOUT: Duration = Duration::from_secs(10);

pub struct StageRunner {
    pub news: Arc<NewsCollector>,
    pub scanner: Arc<CatalystScanner>,
    pub pattern: Arc<HttpCollaborator>,
    pub technical: Arc<HttpCollaborator>,
    pub trading: Arc<HttpCollaborator>,
    pub persistence: Arc<dyn PersistencePort>,
    pub state: Arc<CycleState>,
    pub retry_policy: BackoffPolicy,
}

impl StageRunner {
    /// Run one full cycle in `mode`. Only a `DependencyDown` (persistence) or
    /// collect-stage failure is fatal; collaborator errors during
    /// analyze/signal/execute degrade the cycle to "partial" but it still
    /// completes if at least one candidate made it through.
    pub async fn run_cycle(&self, cycle: TradingCycle) -> Result<TradingCycle, CoreError> {
        let cycle_id = cycle.cycle_id.clone();
        self.persistence.insert_cycle(&cycle).await?;
        let cancel = self
            .state
            .cancellation_token()
            .unwrap_or_else(tokio_util::sync::CancellationToken::new);

        if let Err(e) = self.stage_collect(&cycle_id, cycle.mode).await {
            return self.fail(&cycle_id, format!("collect stage fatal: {e}")).await;
        }
        if cancel.is_cancelled() {
            return self.cancelled(&cycle_id).await;
        }

        let candidates = match self.stage_scan(&cycle_id, cycle.mode).await {
            Ok(c) => c,
            Err(e) => return self.fail(&cycle_id, format!("scan stage fatal: {e}")).await,
        };
        if cancel.is_cancelled() {
            return self.cancelled(&cycle_id).await;
        }

        let patterns = self.stage_analyze(&cycle_id, &candidates, &cancel).await;
        if cancel.is_cancelled() {
            return self.cancelled(&cycle_id).await;
        }
        let signals = self.stage_signal(&cycle_id, &candidates, &patterns, &cancel).await;
        if cancel.is_cancelled() {
            return self.cancelled(&cycle_id).await;
        }
        let trades = self.stage_execute(&cycle_id, &signals, &cancel).await;
        if cancel.is_cancelled() {
            return self.cancelled(&cycle_id).await;
        }

        self.log_stage(&cycle_id, CycleStage::Finalize, 1, false).await;
        let finished = self
            .state
            .finish(CycleStatus::Completed, None)
            .ok_or_else(|| CoreError::NotFound(cycle_id.clone()))?;
        self.persistence.finalize_cycle(&finished).await?;
        info!(cycle_id = %cycle_id, trades = trades.len(), "cycle completed");
        Ok(finished)
    }

    async fn fail(&self, cycle_id: &str, reason: String) -> Result<TradingCycle, CoreError> {
        warn!(cycle_id, %reason, "cycle failed");
        let finished = self
            .state
            .finish(CycleStatus::Failed, Some(reason))
            .ok_or_else(|| CoreError::NotFound(cycle_id.to_string()))?;
        self.persistence.finalize_cycle(&finished).await?;
        Ok(finished)
    }

    /// Finalize an operator-cancelled cycle, preserving whatever counters
    /// had already been recorded when the cancellation was observed.
    async fn cancelled(&self, cycle_id: &str) -> Result<TradingCycle, CoreError> {
        warn!(cycle_id, "cycle cancelled by operator");
        let finished = self
            .state
            .finish(CycleStatus::Failed, Some("cancelled".to_string()))
            .ok_or_else(|| CoreError::NotFound(cycle_id.to_string()))?;
        self.persistence.finalize_cycle(&finished).await?;
        Ok(finished)
    }

    async fn log_stage(&self, cycle_id: &str, stage: CycleStage, record_count: u32, partial: bool) {
        self.state.set_stage(stage);
        let entry = WorkflowLogEntry {
            stage,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            record_count,
            partial,
        };
        if let Err(e) = self.persistence.update_cycle_stage(cycle_id, entry).await {
            warn!(cycle_id, stage = ?stage, error = %e, "failed to record workflow log entry");
        }
    }

    async fn stage_collect(&self, cycle_id: &str, mode: CycleMode) -> Result<(), CoreError> {
        self.state.set_stage(CycleStage::Collect);
        let report = self.news.collect(mode).await?;
        self.state.record_progress(|c| c.news_collected = report.new);
        self.log_stage(cycle_id, CycleStage::Collect, report.new, !report.errors.is_empty()).await;
        Ok(())
    }

    async fn stage_scan(
        &self,
        cycle_id: &str,
        mode: CycleMode,
    ) -> Result<Vec<crate::models::TradingCandidate>, CoreError> {
        self.state.set_stage(CycleStage::Scan);
        let result = self.scanner.scan(mode).await?;
        let count = result.candidates.len() as u32;
        self.state.record_progress(|c| c.candidates_selected = count);
        self.log_stage(cycle_id, CycleStage::Scan, count, false).await;
        Ok(result.candidates)
    }

    async fn stage_analyze(
        &self,
        cycle_id: &str,
        candidates: &[crate::models::TradingCandidate],
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Vec<(String, crate::coordinator::collaborators::PatternRecord)> {
        self.state.set_stage(CycleStage::Analyze);
        let mut patterns = Vec::new();
        let mut partial = false;
        for candidate in candidates {
            if cancel.is_cancelled() {
                partial = true;
                break;
            }
            let request = AnalyzeRequest { symbol: candidate.symbol.clone(), catalyst_score: candidate.catalyst_score };
            let pattern = self.pattern.clone();
            let call = retry_with_backoff(self.retry_policy, &candidate.symbol, || {
                let pattern = pattern.clone();
                let request = request.clone();
                async move { pattern.analyze(&request).await }
            });
            let outcome = tokio::select! {
                outcome = tokio::time::timeout(PATTERN_TIMEOUT, call) => outcome,
                _ = cancel.cancelled() => { partial = true; break; }
            };
            match outcome {
                Ok(Ok(record)) => patterns.push((candidate.symbol.clone(), record)),
                _ => partial = true,
            }
        }
        self.state.record_progress(|c| c.patterns_analyzed = patterns.len() as u32);
        self.log_stage(cycle_id, CycleStage::Analyze, patterns.len() as u32, partial).await;
        patterns
    }

    async fn stage_signal(
        &self,
        cycle_id: &str,
        candidates: &[crate::models::TradingCandidate],
        patterns: &[(String, crate::coordinator::collaborators::PatternRecord)],
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Vec<crate::coordinator::collaborators::TechnicalSignal> {
        self.state.set_stage(CycleStage::Signal);
        let mut signals = Vec::new();
        let mut partial = false;
        for candidate in candidates {
            if cancel.is_cancelled() {
                partial = true;
                break;
            }
            let symbol_patterns: Vec<_> = patterns
                .iter()
                .filter(|(sym, _)| sym == &candidate.symbol)
                .map(|(_, p)| p.clone())
                .collect();
            if symbol_patterns.is_empty() {
                continue;
            }
            let request = SignalRequest { symbol: candidate.symbol.clone(), patterns: symbol_patterns };
            let technical = self.technical.clone();
            let call = retry_with_backoff(self.retry_policy, &candidate.symbol, || {
                let technical = technical.clone();
                let request = request.clone();
                async move { technical.signal(&request).await }
            });
            let outcome = tokio::select! {
                outcome = tokio::time::timeout(TECHNICAL_TIMEOUT, call) => outcome,
                _ = cancel.cancelled() => { partial = true; break; }
            };
            match outcome {
                Ok(Ok(signal)) if signal.confidence >= SIGNAL_CONFIDENCE_FLOOR => signals.push(signal),
                Ok(Ok(_)) => {}
                _ => partial = true,
            }
        }
        self.state.record_progress(|c| c.signals_generated = signals.len() as u32);
        self.log_stage(cycle_id, CycleStage::Signal, signals.len() as u32, partial).await;
        signals
    }

    async fn stage_execute(
        &self,
        cycle_id: &str,
        signals: &[crate::coordinator::collaborators::TechnicalSignal],
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Vec<crate::coordinator::collaborators::TradeRecord> {
        self.state.set_stage(CycleStage::Execute);
        let mut trades = Vec::new();
        let mut partial = false;
        for signal in signals {
            if cancel.is_cancelled() {
                partial = true;
                break;
            }
            let request = ExecuteRequest { symbol: signal.symbol.clone(), direction: signal.direction.clone() };
            let trading = self.trading.clone();
            let call = retry_with_backoff(self.retry_policy, &signal.symbol, || {
                let trading = trading.clone();
                let request = request.clone();
                async move { trading.execute(&request).await }
            });
            let outcome = tokio::select! {
                outcome = tokio::time::timeout(TRADING_TIMEOUT, call) => outcome,
                _ = cancel.cancelled() => { partial = true; break; }
            };
            match outcome {
                Ok(Ok(trade)) => trades.push(trade),
                _ => partial = true,
            }
        }
        self.state.record_progress(|c| c.trades_executed = trades.len() as u32);
        self.log_stage(cycle_id, CycleStage::Execute, trades.len() as u32, partial).await;
        trades
    }
}
