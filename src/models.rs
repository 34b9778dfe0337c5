//! Core data model.
//! Pilot in Command: shared record types
//! Mission: one definition of NewsItem/SourceMetrics/TradingCandidate/TradingCycle
//! that every component and the persistence port agree on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Market state at the time a news item was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    PreMarket,
    Regular,
    AfterHours,
    Weekend,
}

/// Editorial-reliability bucket, 1 (institutional wires) to 5 (unknown).
pub type SourceTier = u8;

/// Recognized catalyst keyword categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordCategory {
    Earnings,
    Fda,
    Merger,
    Guidance,
    Lawsuit,
    Bankruptcy,
    Insider,
    Short,
    Pump,
    Dump,
    Breakthrough,
    Concerns,
}

impl KeywordCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordCategory::Earnings => "earnings",
            KeywordCategory::Fda => "fda",
            KeywordCategory::Merger => "merger",
            KeywordCategory::Guidance => "guidance",
            KeywordCategory::Lawsuit => "lawsuit",
            KeywordCategory::Bankruptcy => "bankruptcy",
            KeywordCategory::Insider => "insider",
            KeywordCategory::Short => "short",
            KeywordCategory::Pump => "pump",
            KeywordCategory::Dump => "dump",
            KeywordCategory::Breakthrough => "breakthrough",
            KeywordCategory::Concerns => "concerns",
        }
    }
}

/// Primary catalyst classification carried by a `TradingCandidate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryCatalyst {
    Earnings,
    Fda,
    Merger,
    Guidance,
    Lawsuit,
    Bankruptcy,
    Insider,
    Generic,
}

impl From<KeywordCategory> for PrimaryCatalyst {
    fn from(cat: KeywordCategory) -> Self {
        match cat {
            KeywordCategory::Earnings => PrimaryCatalyst::Earnings,
            KeywordCategory::Fda => PrimaryCatalyst::Fda,
            KeywordCategory::Merger => PrimaryCatalyst::Merger,
            KeywordCategory::Guidance => PrimaryCatalyst::Guidance,
            KeywordCategory::Lawsuit => PrimaryCatalyst::Lawsuit,
            KeywordCategory::Bankruptcy => PrimaryCatalyst::Bankruptcy,
            KeywordCategory::Insider => PrimaryCatalyst::Insider,
            _ => PrimaryCatalyst::Generic,
        }
    }
}

/// Confirmation lifecycle of a `NewsItem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Unconfirmed,
    Confirmed,
}

impl Default for ConfirmationStatus {
    fn default() -> Self {
        ConfirmationStatus::Unconfirmed
    }
}

/// Immutable-after-insertion news record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    /// 64 hex-char SHA-256 fingerprint over (normalized_headline, source, published_minute).
    pub fingerprint: String,
    pub primary_symbol: Option<String>,
    pub headline: String,
    pub source: String,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub collected_at: DateTime<Utc>,
    pub content_snippet: String,
    pub keywords: BTreeSet<KeywordCategory>,
    pub mentioned_tickers: BTreeSet<String>,
    pub market_state: MarketState,
    pub is_breaking_news: bool,
    pub source_tier: SourceTier,
    pub cluster_id: Option<String>,
    pub sentiment_keywords: BTreeSet<String>,

    pub update_count: u32,
    pub last_seen: DateTime<Utc>,

    // Mutable outcome fields, appended later, never rewritten once set.
    pub price_move_1h: Option<f64>,
    pub price_move_24h: Option<f64>,
    pub volume_surge_ratio: Option<f64>,
    pub was_accurate: Option<bool>,
    pub confirmation_status: ConfirmationStatus,
    pub confirmed_by: Option<String>,
    pub confirmation_delay_minutes: Option<i64>,
}

impl NewsItem {
    pub fn content_snippet_truncated(snippet: &str) -> String {
        snippet.chars().take(500).collect()
    }
}

/// One row per source name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub source: String,
    pub tier: SourceTier,
    pub total_articles: u64,
    pub confirmed: u64,
    pub accurate: u64,
    pub false_count: u64,
    pub accuracy_rate: f64,
    pub avg_early_minutes: f64,
    pub narrative_cluster_count: u64,
    pub frequent_beneficiaries: BTreeSet<String>,
}

impl SourceMetrics {
    pub fn new(source: impl Into<String>, tier: SourceTier) -> Self {
        Self {
            source: source.into(),
            tier,
            total_articles: 0,
            confirmed: 0,
            accurate: 0,
            false_count: 0,
            accuracy_rate: 0.0,
            avg_early_minutes: 0.0,
            narrative_cluster_count: 0,
            frequent_beneficiaries: BTreeSet::new(),
        }
    }

    /// `accurate + false ≤ confirmed ≤ total`.
    pub fn invariant_holds(&self) -> bool {
        self.accurate + self.false_count <= self.confirmed && self.confirmed <= self.total_articles
    }

    pub fn recompute_accuracy_rate(&mut self) {
        self.accuracy_rate = if self.confirmed == 0 {
            0.0
        } else {
            self.accurate as f64 / self.confirmed as f64
        };
    }
}

/// Per-scan trading candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingCandidate {
    pub scan_id: String,
    pub symbol: String,
    pub selected_at: DateTime<Utc>,
    pub catalyst_score: f64,
    pub news_count: u32,
    pub primary_catalyst: PrimaryCatalyst,
    pub catalyst_keywords: BTreeSet<KeywordCategory>,
    pub current_price: f64,
    pub current_volume: u64,
    pub relative_volume: f64,
    pub price_change_pct: f64,
    pub premarket_volume: Option<u64>,
    pub premarket_change_pct: Option<f64>,
    pub has_pre_market_news: bool,
    pub technical_score: f64,
    pub combined_score: f64,
    pub selection_rank: u32,
    pub technical_validated: bool,
}

/// Status of a `TradingCycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Running,
    Completed,
    Failed,
}

/// Scheduler mode selected from wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
    Aggressive,
    Normal,
    Light,
    Minimal,
}

impl CycleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleMode::Aggressive => "aggressive",
            CycleMode::Normal => "normal",
            CycleMode::Light => "light",
            CycleMode::Minimal => "minimal",
        }
    }
}

/// The ordered stages a cycle executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Collect,
    Scan,
    Analyze,
    Signal,
    Execute,
    Finalize,
}

impl CycleStage {
    pub const ORDER: [CycleStage; 6] = [
        CycleStage::Collect,
        CycleStage::Scan,
        CycleStage::Analyze,
        CycleStage::Signal,
        CycleStage::Execute,
        CycleStage::Finalize,
    ];
}

/// One entry in a cycle's `workflow_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowLogEntry {
    pub stage: CycleStage,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub record_count: u32,
    pub partial: bool,
}

/// One row per coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingCycle {
    pub cycle_id: String,
    pub mode: CycleMode,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub fail_reason: Option<String>,
    pub workflow_log: Vec<WorkflowLogEntry>,

    pub news_collected: u32,
    pub candidates_selected: u32,
    pub patterns_analyzed: u32,
    pub signals_generated: u32,
    pub trades_executed: u32,
    pub cycle_pnl: f64,
    pub success_rate: f64,
}

impl TradingCycle {
    pub fn new(cycle_id: impl Into<String>, mode: CycleMode, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            mode,
            status: CycleStatus::Running,
            started_at,
            ended_at: None,
            fail_reason: None,
            workflow_log: Vec::new(),
            news_collected: 0,
            candidates_selected: 0,
            patterns_analyzed: 0,
            signals_generated: 0,
            trades_executed: 0,
            cycle_pnl: 0.0,
            success_rate: 0.0,
        }
    }

    /// `running -> (completed | failed)` only.
    pub fn transition(&mut self, status: CycleStatus, at: DateTime<Utc>, reason: Option<String>) {
        debug_assert_eq!(self.status, CycleStatus::Running, "cycle already terminal");
        self.status = status;
        self.ended_at = Some(at);
        self.fail_reason = reason;
    }
}

/// A point-in-time projection of the active cycle (coordinator `getCurrentCycle`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleView {
    pub cycle_id: String,
    pub mode: CycleMode,
    pub status: CycleStatus,
    pub current_stage: Option<CycleStage>,
    pub elapsed_seconds: i64,
    pub news_collected: u32,
    pub candidates_selected: u32,
    pub patterns_analyzed: u32,
    pub signals_generated: u32,
    pub trades_executed: u32,
}

/// Narrative cluster surfaced by the hourly coordinated-narrative sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeCluster {
    pub cluster_id: String,
    pub symbol: String,
    pub keyword_categories: BTreeSet<KeywordCategory>,
    pub article_count: u32,
    pub distinct_sources: u32,
    pub time_spread_hours: f64,
    pub coordination_score: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// Report returned by `News Collector.collect(mode)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionReport {
    pub articles: u32,
    pub new: u32,
    pub duplicate: u32,
    pub per_source_counts: HashMap<String, u32>,
    pub errors: Vec<String>,
}

/// Outcome payload applied via `updateOutcome`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewsOutcome {
    pub price_move_1h: Option<f64>,
    pub price_move_24h: Option<f64>,
    pub volume_surge_ratio: Option<f64>,
    pub was_accurate: Option<bool>,
}

/// Result returned by `Catalyst Scanner.scan(mode)` / `scanSymbols` / `getScanResults`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_id: String,
    pub candidates: Vec<TradingCandidate>,
    pub universe_size: usize,
    pub catalyst_filtered: usize,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_metrics_invariant_detects_violation() {
        let mut m = SourceMetrics::new("Reuters", 1);
        m.total_articles = 10;
        m.confirmed = 5;
        m.accurate = 3;
        m.false_count = 3; // 3 + 3 > 5, violates the invariant
        assert!(!m.invariant_holds());
    }

    #[test]
    fn source_metrics_invariant_holds_for_consistent_counts() {
        let mut m = SourceMetrics::new("Reuters", 1);
        m.total_articles = 10;
        m.confirmed = 5;
        m.accurate = 3;
        m.false_count = 2;
        assert!(m.invariant_holds());
    }

    #[test]
    fn cycle_transitions_to_terminal_state_once() {
        let now = Utc::now();
        let mut cycle = TradingCycle::new("c1", CycleMode::Normal, now);
        assert_eq!(cycle.status, CycleStatus::Running);
        cycle.transition(CycleStatus::Completed, now, None);
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert!(cycle.ended_at.is_some());
    }
}
