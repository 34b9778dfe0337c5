//! The persistence port: the interface the three components consume.
//! Mission: one abstract boundary in front of the relational store + cache,
//! so the core never speaks SQL directly.

use crate::models::{
    CollectionReport, NarrativeCluster, NewsItem, NewsOutcome, SourceMetrics, TradingCandidate,
    TradingCycle, WorkflowLogEntry,
};
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Filters accepted by `read_news_range`.
#[derive(Debug, Clone, Default)]
pub struct NewsRangeFilter {
    pub symbol: Option<String>,
    pub min_tier: Option<u8>,
    pub limit: Option<usize>,
}

/// Result of a single `upsert_news_item` call, distinguishing fresh inserts
/// from idempotent re-submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Duplicate,
}

#[async_trait]
pub trait PersistencePort: Send + Sync {
    /// Idempotent upsert keyed by fingerprint. On conflict, bumps
    /// `update_count`/`last_seen` and unions ticker/keyword sets without
    /// overwriting original immutable fields.
    async fn upsert_news_item(&self, item: NewsItem) -> Result<UpsertOutcome, CoreError>;

    async fn read_news_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<NewsItem>, CoreError>;

    /// Single-writer, idempotent outcome update.
    async fn update_news_outcome(
        &self,
        fingerprint: &str,
        outcome: NewsOutcome,
    ) -> Result<(), CoreError>;

    /// Mark a news item confirmed by a higher-tier article, and fold
    /// `delay_minutes` into the confirmed item's source's running
    /// `avg_early_minutes`.
    async fn confirm_news_item(
        &self,
        fingerprint: &str,
        confirmed_by: &str,
        delay_minutes: i64,
    ) -> Result<(), CoreError>;

    async fn read_news_range(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        filter: NewsRangeFilter,
    ) -> Result<Vec<NewsItem>, CoreError>;

    /// Every unconfirmed news item still eligible for confirmation matching
    /// (published within the last `within_hours`).
    async fn read_unconfirmed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NewsItem>, CoreError>;

    /// All-or-nothing insert of a scan's candidate list.
    async fn insert_candidates(
        &self,
        scan_id: &str,
        candidates: &[TradingCandidate],
    ) -> Result<(), CoreError>;

    async fn read_candidates(&self, scan_id: &str) -> Result<Vec<TradingCandidate>, CoreError>;

    async fn insert_cycle(&self, cycle: &TradingCycle) -> Result<(), CoreError>;

    async fn update_cycle_stage(
        &self,
        cycle_id: &str,
        entry: WorkflowLogEntry,
    ) -> Result<(), CoreError>;

    async fn finalize_cycle(&self, cycle: &TradingCycle) -> Result<(), CoreError>;

    async fn read_cycle(&self, cycle_id: &str) -> Result<Option<TradingCycle>, CoreError>;

    async fn read_config(&self, key: &str) -> Result<Option<String>, CoreError>;

    async fn write_config(&self, key: &str, value: &str, modifier: &str)
        -> Result<(), CoreError>;

    /// Transactionally updates a source's totals.
    async fn increment_source_metrics(
        &self,
        source: &str,
        tier: u8,
        confirmed_delta: i64,
        accurate_delta: i64,
        false_delta: i64,
    ) -> Result<(), CoreError>;

    async fn read_source_metrics(&self, source: &str) -> Result<Option<SourceMetrics>, CoreError>;

    async fn read_all_source_metrics(&self) -> Result<Vec<SourceMetrics>, CoreError>;

    async fn insert_narrative_cluster(&self, cluster: &NarrativeCluster) -> Result<(), CoreError>;

    async fn read_narrative_clusters(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NarrativeCluster>, CoreError>;

    /// Per-source collection counters for a completed collection run, used to
    /// build the `CollectionReport` surfaced to operators.
    async fn record_collection_report(&self, report: &CollectionReport) -> Result<(), CoreError>;

    /// Raw cache read, keyed by a well-known prefix (`news:`, `candidates:`,
    /// `config:`). Implementations decide whether this backs onto a real
    /// cache or is always a miss.
    async fn cache_get(&self, key: &str) -> Option<String>;

    async fn cache_set(&self, key: &str, value: String, ttl: Duration);

    /// Drop every cached entry whose key starts with `prefix`, used by
    /// writers to invalidate the read paths they just made stale.
    async fn cache_invalidate_pattern(&self, prefix: &str);
}
