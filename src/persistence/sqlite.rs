//! SQLite implementation of the persistence port.
//! Pilot in Command: durable storage
//! Mission: read-committed transactions for multi-row writes, idempotent
//! upserts, never lose a byte the core already committed.

use super::cache::{TtlCache, CANDIDATE_LIST_TTL, CONFIG_VALUE_TTL, NEWS_BY_ID_TTL};
use super::pool::Pool;
use super::port::{NewsRangeFilter, PersistencePort, UpsertOutcome};
use crate::models::{
    CollectionReport, ConfirmationStatus, CycleMode, CycleStage, CycleStatus, KeywordCategory,
    MarketState, NarrativeCluster, NewsItem, NewsOutcome, PrimaryCatalyst, SourceMetrics,
    TradingCandidate, TradingCycle, WorkflowLogEntry,
};
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS news_raw (
    fingerprint TEXT PRIMARY KEY,
    primary_symbol TEXT,
    headline TEXT NOT NULL,
    source TEXT NOT NULL,
    source_url TEXT,
    published_at TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    content_snippet TEXT NOT NULL,
    keywords TEXT NOT NULL,
    mentioned_tickers TEXT NOT NULL,
    market_state TEXT NOT NULL,
    is_breaking_news INTEGER NOT NULL,
    source_tier INTEGER NOT NULL,
    cluster_id TEXT,
    sentiment_keywords TEXT NOT NULL,
    update_count INTEGER NOT NULL,
    last_seen TEXT NOT NULL,
    price_move_1h REAL,
    price_move_24h REAL,
    volume_surge_ratio REAL,
    was_accurate INTEGER,
    confirmation_status TEXT NOT NULL,
    confirmed_by TEXT,
    confirmation_delay_minutes INTEGER
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_news_symbol_time ON news_raw(primary_symbol, published_at DESC);
CREATE INDEX IF NOT EXISTS idx_news_unconfirmed ON news_raw(confirmation_status, published_at DESC);

CREATE TABLE IF NOT EXISTS source_metrics (
    source TEXT PRIMARY KEY,
    tier INTEGER NOT NULL,
    total_articles INTEGER NOT NULL,
    confirmed INTEGER NOT NULL,
    accurate INTEGER NOT NULL,
    false_count INTEGER NOT NULL,
    accuracy_rate REAL NOT NULL,
    avg_early_minutes REAL NOT NULL,
    early_samples INTEGER NOT NULL DEFAULT 0,
    narrative_cluster_count INTEGER NOT NULL,
    frequent_beneficiaries TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS trading_candidates (
    scan_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    selected_at TEXT NOT NULL,
    catalyst_score REAL NOT NULL,
    news_count INTEGER NOT NULL,
    primary_catalyst TEXT NOT NULL,
    catalyst_keywords TEXT NOT NULL,
    current_price REAL NOT NULL,
    current_volume INTEGER NOT NULL,
    relative_volume REAL NOT NULL,
    price_change_pct REAL NOT NULL,
    premarket_volume INTEGER,
    premarket_change_pct REAL,
    has_pre_market_news INTEGER NOT NULL,
    technical_score REAL NOT NULL,
    combined_score REAL NOT NULL,
    selection_rank INTEGER NOT NULL,
    technical_validated INTEGER NOT NULL,
    PRIMARY KEY (scan_id, symbol)
);

CREATE TABLE IF NOT EXISTS trading_cycles (
    cycle_id TEXT PRIMARY KEY,
    mode TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    fail_reason TEXT,
    news_collected INTEGER NOT NULL,
    candidates_selected INTEGER NOT NULL,
    patterns_analyzed INTEGER NOT NULL,
    signals_generated INTEGER NOT NULL,
    trades_executed INTEGER NOT NULL,
    cycle_pnl REAL NOT NULL,
    success_rate REAL NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS workflow_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cycle_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    record_count INTEGER NOT NULL,
    partial INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS narrative_clusters (
    cluster_id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    keyword_categories TEXT NOT NULL,
    article_count INTEGER NOT NULL,
    distinct_sources INTEGER NOT NULL,
    time_spread_hours REAL NOT NULL,
    coordination_score REAL NOT NULL,
    window_start TEXT NOT NULL,
    window_end TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS config_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    modifier TEXT,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS collection_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collected_at TEXT NOT NULL,
    articles INTEGER NOT NULL,
    new_count INTEGER NOT NULL,
    duplicate_count INTEGER NOT NULL,
    per_source_counts TEXT NOT NULL,
    errors TEXT NOT NULL
);
"#;

pub struct SqlitePersistence {
    pool: Arc<Pool>,
    cache: TtlCache,
}

impl SqlitePersistence {
    pub async fn new(pool: Arc<Pool>) -> Result<Self, CoreError> {
        {
            let conn = pool.get().await;
            conn.execute_batch(SCHEMA_SQL)?;
        }
        Ok(Self { pool, cache: TtlCache::new() })
    }

    pub async fn open_file(path: &str, pool_size: usize) -> Result<Self, CoreError> {
        let pool = Pool::new(path, pool_size).map_err(CoreError::from)?;
        Self::new(pool).await
    }

    pub async fn open_in_memory(pool_size: usize) -> Result<Self, CoreError> {
        let pool = Pool::new_in_memory(pool_size).map_err(CoreError::from)?;
        Self::new(pool).await
    }
}

fn keywords_to_json(keywords: &BTreeSet<KeywordCategory>) -> String {
    serde_json::to_string(keywords).unwrap_or_else(|_| "[]".to_string())
}

fn keywords_from_json(s: &str) -> BTreeSet<KeywordCategory> {
    serde_json::from_str(s).unwrap_or_default()
}

fn strings_to_json(set: &BTreeSet<String>) -> String {
    serde_json::to_string(set).unwrap_or_else(|_| "[]".to_string())
}

fn strings_from_json(s: &str) -> BTreeSet<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn market_state_str(state: MarketState) -> &'static str {
    match state {
        MarketState::PreMarket => "pre_market",
        MarketState::Regular => "regular",
        MarketState::AfterHours => "after_hours",
        MarketState::Weekend => "weekend",
    }
}

fn market_state_from_str(s: &str) -> MarketState {
    match s {
        "pre_market" => MarketState::PreMarket,
        "regular" => MarketState::Regular,
        "after_hours" => MarketState::AfterHours,
        _ => MarketState::Weekend,
    }
}

fn confirmation_status_str(status: ConfirmationStatus) -> &'static str {
    match status {
        ConfirmationStatus::Unconfirmed => "unconfirmed",
        ConfirmationStatus::Confirmed => "confirmed",
    }
}

fn row_to_news_item(row: &rusqlite::Row) -> rusqlite::Result<NewsItem> {
    let keywords_json: String = row.get("keywords")?;
    let tickers_json: String = row.get("mentioned_tickers")?;
    let sentiment_json: String = row.get("sentiment_keywords")?;
    let market_state: String = row.get("market_state")?;
    let confirmation_status: String = row.get("confirmation_status")?;
    let was_accurate: Option<i64> = row.get("was_accurate")?;

    Ok(NewsItem {
        fingerprint: row.get("fingerprint")?,
        primary_symbol: row.get("primary_symbol")?,
        headline: row.get("headline")?,
        source: row.get("source")?,
        source_url: row.get("source_url")?,
        published_at: row.get("published_at")?,
        collected_at: row.get("collected_at")?,
        content_snippet: row.get("content_snippet")?,
        keywords: keywords_from_json(&keywords_json),
        mentioned_tickers: strings_from_json(&tickers_json),
        market_state: market_state_from_str(&market_state),
        is_breaking_news: row.get::<_, i64>("is_breaking_news")? != 0,
        source_tier: row.get::<_, i64>("source_tier")? as u8,
        cluster_id: row.get("cluster_id")?,
        sentiment_keywords: strings_from_json(&sentiment_json),
        update_count: row.get::<_, i64>("update_count")? as u32,
        last_seen: row.get("last_seen")?,
        price_move_1h: row.get("price_move_1h")?,
        price_move_24h: row.get("price_move_24h")?,
        volume_surge_ratio: row.get("volume_surge_ratio")?,
        was_accurate: was_accurate.map(|v| v != 0),
        confirmation_status: if confirmation_status == "confirmed" {
            ConfirmationStatus::Confirmed
        } else {
            ConfirmationStatus::Unconfirmed
        },
        confirmed_by: row.get("confirmed_by")?,
        confirmation_delay_minutes: row.get("confirmation_delay_minutes")?,
    })
}

#[async_trait]
impl PersistencePort for SqlitePersistence {
    async fn upsert_news_item(&self, item: NewsItem) -> Result<UpsertOutcome, CoreError> {
        let conn = self.pool.get().await;
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT mentioned_tickers, keywords FROM news_raw WHERE fingerprint = ?1",
                params![item.fingerprint],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((tickers_json, keywords_json)) => {
                let mut tickers = strings_from_json(&tickers_json);
                tickers.extend(item.mentioned_tickers.clone());
                let mut keywords = keywords_from_json(&keywords_json);
                keywords.extend(item.keywords.clone());

                conn.execute(
                    "UPDATE news_raw SET update_count = update_count + 1, last_seen = ?2,
                         mentioned_tickers = ?3, keywords = ?4 WHERE fingerprint = ?1",
                    params![
                        item.fingerprint,
                        item.last_seen,
                        strings_to_json(&tickers),
                        keywords_to_json(&keywords),
                    ],
                )?;
                self.cache.invalidate_pattern(&format!("news:{}", item.fingerprint));
                Ok(UpsertOutcome::Duplicate)
            }
            None => {
                conn.execute(
                    "INSERT INTO news_raw (
                        fingerprint, primary_symbol, headline, source, source_url,
                        published_at, collected_at, content_snippet, keywords,
                        mentioned_tickers, market_state, is_breaking_news, source_tier,
                        cluster_id, sentiment_keywords, update_count, last_seen,
                        price_move_1h, price_move_24h, volume_surge_ratio, was_accurate,
                        confirmation_status, confirmed_by, confirmation_delay_minutes
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,
                              ?18,?19,?20,?21,?22,?23,?24)",
                    params![
                        item.fingerprint,
                        item.primary_symbol,
                        item.headline,
                        item.source,
                        item.source_url,
                        item.published_at,
                        item.collected_at,
                        item.content_snippet,
                        keywords_to_json(&item.keywords),
                        strings_to_json(&item.mentioned_tickers),
                        market_state_str(item.market_state),
                        item.is_breaking_news as i64,
                        item.source_tier as i64,
                        item.cluster_id,
                        strings_to_json(&item.sentiment_keywords),
                        0i64,
                        item.last_seen,
                        item.price_move_1h,
                        item.price_move_24h,
                        item.volume_surge_ratio,
                        item.was_accurate.map(|b| b as i64),
                        confirmation_status_str(item.confirmation_status),
                        item.confirmed_by,
                        item.confirmation_delay_minutes,
                    ],
                )?;
                conn.execute(
                    "INSERT INTO source_metrics (
                        source, tier, total_articles, confirmed, accurate, false_count,
                        accuracy_rate, avg_early_minutes, early_samples, narrative_cluster_count,
                        frequent_beneficiaries
                     ) VALUES (?1,?2,1,0,0,0,0.0,0.0,0,0,'[]')
                     ON CONFLICT(source) DO UPDATE SET total_articles = total_articles + 1",
                    params![item.source, item.source_tier as i64],
                )?;
                self.cache.invalidate_pattern(&format!("news:{}", item.fingerprint));
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn read_news_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<NewsItem>, CoreError> {
        let cache_key = format!("news:{fingerprint}");
        if let Some(cached) = self.cache.get(&cache_key) {
            if let Ok(item) = serde_json::from_str::<NewsItem>(&cached) {
                return Ok(Some(item));
            }
        }
        let conn = self.pool.get().await;
        let item = conn
            .query_row(
                "SELECT * FROM news_raw WHERE fingerprint = ?1",
                params![fingerprint],
                row_to_news_item,
            )
            .optional()?;
        if let Some(item) = &item {
            if let Ok(json) = serde_json::to_string(item) {
                self.cache.set(&cache_key, json, NEWS_BY_ID_TTL);
            }
        }
        Ok(item)
    }

    async fn update_news_outcome(
        &self,
        fingerprint: &str,
        outcome: NewsOutcome,
    ) -> Result<(), CoreError> {
        let conn = self.pool.get().await;
        let changed = conn.execute(
            "UPDATE news_raw SET
                price_move_1h = COALESCE(price_move_1h, ?2),
                price_move_24h = COALESCE(price_move_24h, ?3),
                volume_surge_ratio = COALESCE(volume_surge_ratio, ?4),
                was_accurate = COALESCE(was_accurate, ?5)
             WHERE fingerprint = ?1",
            params![
                fingerprint,
                outcome.price_move_1h,
                outcome.price_move_24h,
                outcome.volume_surge_ratio,
                outcome.was_accurate.map(|b| b as i64),
            ],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("news_id {fingerprint}")));
        }
        self.cache.invalidate_pattern(&format!("news:{fingerprint}"));
        Ok(())
    }

    async fn confirm_news_item(
        &self,
        fingerprint: &str,
        confirmed_by: &str,
        delay_minutes: i64,
    ) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE news_raw SET confirmation_status = 'confirmed', confirmed_by = ?2,
                 confirmation_delay_minutes = ?3
             WHERE fingerprint = ?1 AND confirmation_status = 'unconfirmed'",
            params![fingerprint, confirmed_by, delay_minutes],
        )?;
        if changed > 0 {
            let source: Option<(String, i64)> = tx
                .query_row(
                    "SELECT source, source_tier FROM news_raw WHERE fingerprint = ?1",
                    params![fingerprint],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            if let Some((source, tier)) = source {
                tx.execute(
                    "INSERT INTO source_metrics (
                        source, tier, total_articles, confirmed, accurate, false_count,
                        accuracy_rate, avg_early_minutes, early_samples, narrative_cluster_count,
                        frequent_beneficiaries
                     ) VALUES (?1,?2,0,0,0,0,0.0,0.0,0,0,'[]')
                     ON CONFLICT(source) DO UPDATE SET total_articles = total_articles",
                    params![source, tier],
                )?;
                tx.execute(
                    "UPDATE source_metrics SET
                         avg_early_minutes = (avg_early_minutes * early_samples + ?2) / (early_samples + 1),
                         early_samples = early_samples + 1
                     WHERE source = ?1",
                    params![source, delay_minutes as f64],
                )?;
            }
        }
        tx.commit()?;
        self.cache.invalidate_pattern(&format!("news:{fingerprint}"));
        Ok(())
    }

    async fn read_news_range(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        filter: NewsRangeFilter,
    ) -> Result<Vec<NewsItem>, CoreError> {
        let conn = self.pool.get().await;
        let limit = filter.limit.unwrap_or(1000) as i64;

        let sql = "SELECT * FROM news_raw WHERE published_at >= ?1 AND published_at <= ?2
                 AND (?3 IS NULL OR primary_symbol = ?3)
                 AND (?4 IS NULL OR source_tier <= ?4)
                 ORDER BY published_at DESC LIMIT ?5";
        let mut stmt = conn.prepare(sql)?;
        let items = stmt
            .query_map(
                params![
                    since,
                    until,
                    filter.symbol,
                    filter.min_tier.map(|t| t as i64),
                    limit.max(0),
                ],
                row_to_news_item,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn read_unconfirmed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NewsItem>, CoreError> {
        let conn = self.pool.get().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM news_raw WHERE confirmation_status = 'unconfirmed'
                 AND published_at >= ?1 ORDER BY published_at ASC",
        )?;
        let items = stmt
            .query_map(params![since], row_to_news_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn insert_candidates(
        &self,
        scan_id: &str,
        candidates: &[TradingCandidate],
    ) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await;
        let tx = conn.transaction()?;
        for c in candidates {
            tx.execute(
                "INSERT INTO trading_candidates (
                    scan_id, symbol, selected_at, catalyst_score, news_count,
                    primary_catalyst, catalyst_keywords, current_price, current_volume,
                    relative_volume, price_change_pct, premarket_volume,
                    premarket_change_pct, has_pre_market_news, technical_score,
                    combined_score, selection_rank, technical_validated
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
                params![
                    scan_id,
                    c.symbol,
                    c.selected_at,
                    c.catalyst_score,
                    c.news_count as i64,
                    format!("{:?}", c.primary_catalyst),
                    keywords_to_json(&c.catalyst_keywords),
                    c.current_price,
                    c.current_volume as i64,
                    c.relative_volume,
                    c.price_change_pct,
                    c.premarket_volume.map(|v| v as i64),
                    c.premarket_change_pct,
                    c.has_pre_market_news as i64,
                    c.technical_score,
                    c.combined_score,
                    c.selection_rank as i64,
                    c.technical_validated as i64,
                ],
            )?;
        }
        tx.commit()?;
        self.cache.invalidate_pattern(&format!("candidates:{scan_id}"));
        Ok(())
    }

    async fn read_candidates(&self, scan_id: &str) -> Result<Vec<TradingCandidate>, CoreError> {
        let cache_key = format!("candidates:{scan_id}");
        if let Some(cached) = self.cache.get(&cache_key) {
            if let Ok(list) = serde_json::from_str::<Vec<TradingCandidate>>(&cached) {
                return Ok(list);
            }
        }
        let conn = self.pool.get().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM trading_candidates WHERE scan_id = ?1 ORDER BY selection_rank ASC",
        )?;
        let rows = stmt
            .query_map(params![scan_id], |row| {
                let primary_catalyst_str: String = row.get("primary_catalyst")?;
                let keywords_json: String = row.get("catalyst_keywords")?;
                Ok(TradingCandidate {
                    scan_id: row.get("scan_id")?,
                    symbol: row.get("symbol")?,
                    selected_at: row.get("selected_at")?,
                    catalyst_score: row.get("catalyst_score")?,
                    news_count: row.get::<_, i64>("news_count")? as u32,
                    primary_catalyst: primary_catalyst_from_debug_str(&primary_catalyst_str),
                    catalyst_keywords: keywords_from_json(&keywords_json),
                    current_price: row.get("current_price")?,
                    current_volume: row.get::<_, i64>("current_volume")? as u64,
                    relative_volume: row.get("relative_volume")?,
                    price_change_pct: row.get("price_change_pct")?,
                    premarket_volume: row
                        .get::<_, Option<i64>>("premarket_volume")?
                        .map(|v| v as u64),
                    premarket_change_pct: row.get("premarket_change_pct")?,
                    has_pre_market_news: row.get::<_, i64>("has_pre_market_news")? != 0,
                    technical_score: row.get("technical_score")?,
                    combined_score: row.get("combined_score")?,
                    selection_rank: row.get::<_, i64>("selection_rank")? as u32,
                    technical_validated: row.get::<_, i64>("technical_validated")? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if let Ok(json) = serde_json::to_string(&rows) {
            self.cache.set(&cache_key, json, CANDIDATE_LIST_TTL);
        }
        Ok(rows)
    }

    async fn insert_cycle(&self, cycle: &TradingCycle) -> Result<(), CoreError> {
        let conn = self.pool.get().await;
        conn.execute(
            "INSERT INTO trading_cycles (
                cycle_id, mode, status, started_at, ended_at, fail_reason,
                news_collected, candidates_selected, patterns_analyzed,
                signals_generated, trades_executed, cycle_pnl, success_rate
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                cycle.cycle_id,
                cycle_mode_str(cycle.mode),
                cycle_status_str(cycle.status),
                cycle.started_at,
                cycle.ended_at,
                cycle.fail_reason,
                cycle.news_collected as i64,
                cycle.candidates_selected as i64,
                cycle.patterns_analyzed as i64,
                cycle.signals_generated as i64,
                cycle.trades_executed as i64,
                cycle.cycle_pnl,
                cycle.success_rate,
            ],
        )?;
        Ok(())
    }

    async fn update_cycle_stage(
        &self,
        cycle_id: &str,
        entry: WorkflowLogEntry,
    ) -> Result<(), CoreError> {
        let conn = self.pool.get().await;
        conn.execute(
            "INSERT INTO workflow_log (cycle_id, stage, started_at, ended_at, record_count, partial)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                cycle_id,
                cycle_stage_str(entry.stage),
                entry.started_at,
                entry.ended_at,
                entry.record_count as i64,
                entry.partial as i64,
            ],
        )?;
        Ok(())
    }

    async fn finalize_cycle(&self, cycle: &TradingCycle) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE trading_cycles SET status = ?2, ended_at = ?3, fail_reason = ?4,
                 news_collected = ?5, candidates_selected = ?6, patterns_analyzed = ?7,
                 signals_generated = ?8, trades_executed = ?9, cycle_pnl = ?10,
                 success_rate = ?11
             WHERE cycle_id = ?1",
            params![
                cycle.cycle_id,
                cycle_status_str(cycle.status),
                cycle.ended_at,
                cycle.fail_reason,
                cycle.news_collected as i64,
                cycle.candidates_selected as i64,
                cycle.patterns_analyzed as i64,
                cycle.signals_generated as i64,
                cycle.trades_executed as i64,
                cycle.cycle_pnl,
                cycle.success_rate,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn read_cycle(&self, cycle_id: &str) -> Result<Option<TradingCycle>, CoreError> {
        let conn = self.pool.get().await;
        let cycle = conn
            .query_row(
                "SELECT * FROM trading_cycles WHERE cycle_id = ?1",
                params![cycle_id],
                |row| {
                    let mode: String = row.get("mode")?;
                    let status: String = row.get("status")?;
                    Ok(TradingCycle {
                        cycle_id: row.get("cycle_id")?,
                        mode: cycle_mode_from_str(&mode),
                        status: cycle_status_from_str(&status),
                        started_at: row.get("started_at")?,
                        ended_at: row.get("ended_at")?,
                        fail_reason: row.get("fail_reason")?,
                        workflow_log: Vec::new(),
                        news_collected: row.get::<_, i64>("news_collected")? as u32,
                        candidates_selected: row.get::<_, i64>("candidates_selected")? as u32,
                        patterns_analyzed: row.get::<_, i64>("patterns_analyzed")? as u32,
                        signals_generated: row.get::<_, i64>("signals_generated")? as u32,
                        trades_executed: row.get::<_, i64>("trades_executed")? as u32,
                        cycle_pnl: row.get("cycle_pnl")?,
                        success_rate: row.get("success_rate")?,
                    })
                },
            )
            .optional()?;
        Ok(cycle)
    }

    async fn read_config(&self, key: &str) -> Result<Option<String>, CoreError> {
        let cache_key = format!("config:{key}");
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(Some(cached));
        }
        let conn = self.pool.get().await;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM config_entries WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(v) = &value {
            self.cache.set(&cache_key, v.clone(), CONFIG_VALUE_TTL);
        }
        Ok(value)
    }

    async fn write_config(
        &self,
        key: &str,
        value: &str,
        modifier: &str,
    ) -> Result<(), CoreError> {
        let conn = self.pool.get().await;
        conn.execute(
            "INSERT INTO config_entries (key, value, modifier, updated_at) VALUES (?1,?2,?3,?4)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, modifier = excluded.modifier,
                 updated_at = excluded.updated_at",
            params![key, value, modifier, Utc::now()],
        )?;
        self.cache.invalidate_pattern(&format!("config:{key}"));
        Ok(())
    }

    async fn increment_source_metrics(
        &self,
        source: &str,
        tier: u8,
        confirmed_delta: i64,
        accurate_delta: i64,
        false_delta: i64,
    ) -> Result<(), CoreError> {
        let mut conn = self.pool.get().await;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO source_metrics (
                source, tier, total_articles, confirmed, accurate, false_count,
                accuracy_rate, avg_early_minutes, narrative_cluster_count, frequent_beneficiaries
             ) VALUES (?1,?2,1,0,0,0,0.0,0.0,0,'[]')
             ON CONFLICT(source) DO UPDATE SET total_articles = total_articles",
            params![source, tier as i64],
        )?;
        tx.execute(
            "UPDATE source_metrics SET
                 confirmed = confirmed + ?2,
                 accurate = accurate + ?3,
                 false_count = false_count + ?4
             WHERE source = ?1",
            params![source, confirmed_delta, accurate_delta, false_delta],
        )?;
        let (confirmed, accurate): (i64, i64) = tx.query_row(
            "SELECT confirmed, accurate FROM source_metrics WHERE source = ?1",
            params![source],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let rate = if confirmed > 0 {
            accurate as f64 / confirmed as f64
        } else {
            0.0
        };
        tx.execute(
            "UPDATE source_metrics SET accuracy_rate = ?2 WHERE source = ?1",
            params![source, rate],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn read_source_metrics(&self, source: &str) -> Result<Option<SourceMetrics>, CoreError> {
        let conn = self.pool.get().await;
        let metrics = conn
            .query_row(
                "SELECT * FROM source_metrics WHERE source = ?1",
                params![source],
                row_to_source_metrics,
            )
            .optional()?;
        Ok(metrics)
    }

    async fn read_all_source_metrics(&self) -> Result<Vec<SourceMetrics>, CoreError> {
        let conn = self.pool.get().await;
        let mut stmt = conn.prepare("SELECT * FROM source_metrics")?;
        let rows = stmt
            .query_map([], row_to_source_metrics)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn insert_narrative_cluster(&self, cluster: &NarrativeCluster) -> Result<(), CoreError> {
        let conn = self.pool.get().await;
        conn.execute(
            "INSERT INTO narrative_clusters (
                cluster_id, symbol, keyword_categories, article_count, distinct_sources,
                time_spread_hours, coordination_score, window_start, window_end
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT(cluster_id) DO UPDATE SET
                 article_count = excluded.article_count,
                 distinct_sources = excluded.distinct_sources,
                 time_spread_hours = excluded.time_spread_hours,
                 coordination_score = excluded.coordination_score,
                 window_end = excluded.window_end",
            params![
                cluster.cluster_id,
                cluster.symbol,
                keywords_to_json(&cluster.keyword_categories),
                cluster.article_count as i64,
                cluster.distinct_sources as i64,
                cluster.time_spread_hours,
                cluster.coordination_score,
                cluster.window_start,
                cluster.window_end,
            ],
        )?;
        Ok(())
    }

    async fn read_narrative_clusters(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<NarrativeCluster>, CoreError> {
        let conn = self.pool.get().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM narrative_clusters WHERE window_end >= ?1 ORDER BY window_end DESC",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                let keywords_json: String = row.get("keyword_categories")?;
                Ok(NarrativeCluster {
                    cluster_id: row.get("cluster_id")?,
                    symbol: row.get("symbol")?,
                    keyword_categories: keywords_from_json(&keywords_json),
                    article_count: row.get::<_, i64>("article_count")? as u32,
                    distinct_sources: row.get::<_, i64>("distinct_sources")? as u32,
                    time_spread_hours: row.get("time_spread_hours")?,
                    coordination_score: row.get("coordination_score")?,
                    window_start: row.get("window_start")?,
                    window_end: row.get("window_end")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn record_collection_report(&self, report: &CollectionReport) -> Result<(), CoreError> {
        let conn = self.pool.get().await;
        conn.execute(
            "INSERT INTO collection_reports (
                collected_at, articles, new_count, duplicate_count, per_source_counts, errors
             ) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                Utc::now(),
                report.articles as i64,
                report.new as i64,
                report.duplicate as i64,
                serde_json::to_string(&report.per_source_counts).unwrap_or_default(),
                serde_json::to_string(&report.errors).unwrap_or_default(),
            ],
        )?;
        Ok(())
    }

    async fn cache_get(&self, key: &str) -> Option<String> {
        self.cache.get(key)
    }

    async fn cache_set(&self, key: &str, value: String, ttl: Duration) {
        self.cache.set(key, value, ttl);
    }

    async fn cache_invalidate_pattern(&self, prefix: &str) {
        self.cache.invalidate_pattern(prefix);
    }
}

fn row_to_source_metrics(row: &rusqlite::Row) -> rusqlite::Result<SourceMetrics> {
    let beneficiaries_json: String = row.get("frequent_beneficiaries")?;
    Ok(SourceMetrics {
        source: row.get("source")?,
        tier: row.get::<_, i64>("tier")? as u8,
        total_articles: row.get::<_, i64>("total_articles")? as u64,
        confirmed: row.get::<_, i64>("confirmed")? as u64,
        accurate: row.get::<_, i64>("accurate")? as u64,
        false_count: row.get::<_, i64>("false_count")? as u64,
        accuracy_rate: row.get("accuracy_rate")?,
        avg_early_minutes: row.get("avg_early_minutes")?,
        narrative_cluster_count: row.get::<_, i64>("narrative_cluster_count")? as u64,
        frequent_beneficiaries: strings_from_json(&beneficiaries_json),
    })
}

fn cycle_mode_str(mode: CycleMode) -> &'static str {
    match mode {
        CycleMode::Aggressive => "aggressive",
        CycleMode::Normal => "normal",
        CycleMode::Light => "light",
        CycleMode::Minimal => "minimal",
    }
}

fn cycle_mode_from_str(s: &str) -> CycleMode {
    match s {
        "aggressive" => CycleMode::Aggressive,
        "light" => CycleMode::Light,
        "minimal" => CycleMode::Minimal,
        _ => CycleMode::Normal,
    }
}

fn cycle_status_str(status: CycleStatus) -> &'static str {
    match status {
        CycleStatus::Running => "running",
        CycleStatus::Completed => "completed",
        CycleStatus::Failed => "failed",
    }
}

fn cycle_status_from_str(s: &str) -> CycleStatus {
    match s {
        "completed" => CycleStatus::Completed,
        "failed" => CycleStatus::Failed,
        _ => CycleStatus::Running,
    }
}

fn cycle_stage_str(stage: CycleStage) -> &'static str {
    match stage {
        CycleStage::Collect => "collect",
        CycleStage::Scan => "scan",
        CycleStage::Analyze => "analyze",
        CycleStage::Signal => "signal",
        CycleStage::Execute => "execute",
        CycleStage::Finalize => "finalize",
    }
}

fn primary_catalyst_from_debug_str(s: &str) -> PrimaryCatalyst {
    match s {
        "Earnings" => PrimaryCatalyst::Earnings,
        "Fda" => PrimaryCatalyst::Fda,
        "Merger" => PrimaryCatalyst::Merger,
        "Guidance" => PrimaryCatalyst::Guidance,
        "Lawsuit" => PrimaryCatalyst::Lawsuit,
        "Bankruptcy" => PrimaryCatalyst::Bankruptcy,
        "Insider" => PrimaryCatalyst::Insider,
        _ => PrimaryCatalyst::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::normalize;

    fn sample_item(headline: &str, source: &str, published_at: DateTime<Utc>) -> NewsItem {
        let fingerprint = normalize::fingerprint(headline, source, published_at);
        NewsItem {
            fingerprint,
            primary_symbol: Some("ACME".to_string()),
            headline: headline.to_string(),
            source: source.to_string(),
            source_url: None,
            published_at,
            collected_at: published_at,
            content_snippet: headline.to_string(),
            keywords: BTreeSet::from([KeywordCategory::Earnings]),
            mentioned_tickers: BTreeSet::from(["ACME".to_string()]),
            market_state: MarketState::Regular,
            is_breaking_news: false,
            source_tier: 1,
            cluster_id: None,
            sentiment_keywords: BTreeSet::new(),
            update_count: 0,
            last_seen: published_at,
            price_move_1h: None,
            price_move_24h: None,
            volume_surge_ratio: None,
            was_accurate: None,
            confirmation_status: ConfirmationStatus::Unconfirmed,
            confirmed_by: None,
            confirmation_delay_minutes: None,
        }
    }

    #[tokio::test]
    async fn duplicate_submission_is_idempotent_no_op() {
        let store = SqlitePersistence::open_in_memory(2).await.unwrap();
        let at = Utc::now();
        let item = sample_item("ACME beats Q3 earnings", "Reuters", at);

        let first = store.upsert_news_item(item.clone()).await.unwrap();
        assert_eq!(first, UpsertOutcome::Inserted);

        for _ in 0..3 {
            let outcome = store.upsert_news_item(item.clone()).await.unwrap();
            assert_eq!(outcome, UpsertOutcome::Duplicate);
        }

        let stored = store
            .read_news_by_fingerprint(&item.fingerprint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.update_count, 3);
        assert_eq!(stored.headline, "ACME beats Q3 earnings");
    }

    #[tokio::test]
    async fn round_trip_preserves_immutable_fields() {
        let store = SqlitePersistence::open_in_memory(2).await.unwrap();
        let at = Utc::now();
        let item = sample_item("Merger announced", "Bloomberg", at);
        store.upsert_news_item(item.clone()).await.unwrap();

        let stored = store
            .read_news_by_fingerprint(&item.fingerprint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.fingerprint, item.fingerprint);
        assert_eq!(stored.source, item.source);
        assert_eq!(stored.published_at, item.published_at);
    }

    #[tokio::test]
    async fn outcome_update_is_idempotent() {
        let store = SqlitePersistence::open_in_memory(2).await.unwrap();
        let at = Utc::now();
        let item = sample_item("Guidance cut", "PRNewswire", at);
        store.upsert_news_item(item.clone()).await.unwrap();

        let outcome = NewsOutcome {
            price_move_1h: Some(1.5),
            price_move_24h: Some(3.0),
            volume_surge_ratio: Some(2.0),
            was_accurate: Some(true),
        };
        store
            .update_news_outcome(&item.fingerprint, outcome.clone())
            .await
            .unwrap();
        store
            .update_news_outcome(&item.fingerprint, outcome)
            .await
            .unwrap();

        let stored = store
            .read_news_by_fingerprint(&item.fingerprint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.price_move_1h, Some(1.5));
        assert_eq!(stored.was_accurate, Some(true));
    }

    #[tokio::test]
    async fn candidates_insert_all_or_nothing_and_are_readable_by_rank() {
        let store = SqlitePersistence::open_in_memory(2).await.unwrap();
        let candidates = vec![
            TradingCandidate {
                scan_id: "s1".to_string(),
                symbol: "AAA".to_string(),
                selected_at: Utc::now(),
                catalyst_score: 90.0,
                news_count: 2,
                primary_catalyst: PrimaryCatalyst::Earnings,
                catalyst_keywords: BTreeSet::from([KeywordCategory::Earnings]),
                current_price: 50.0,
                current_volume: 1_000_000,
                relative_volume: 2.0,
                price_change_pct: 3.0,
                premarket_volume: None,
                premarket_change_pct: None,
                has_pre_market_news: false,
                technical_score: 60.0,
                combined_score: 81.0,
                selection_rank: 1,
                technical_validated: true,
            },
            TradingCandidate {
                scan_id: "s1".to_string(),
                symbol: "BBB".to_string(),
                selected_at: Utc::now(),
                catalyst_score: 60.0,
                news_count: 1,
                primary_catalyst: PrimaryCatalyst::Generic,
                catalyst_keywords: BTreeSet::new(),
                current_price: 20.0,
                current_volume: 700_000,
                relative_volume: 1.6,
                price_change_pct: 1.0,
                premarket_volume: None,
                premarket_change_pct: None,
                has_pre_market_news: false,
                technical_score: 50.0,
                combined_score: 57.0,
                selection_rank: 2,
                technical_validated: true,
            },
        ];
        store.insert_candidates("s1", &candidates).await.unwrap();
        let read_back = store.read_candidates("s1").await.unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].selection_rank, 1);
        assert!(read_back[0].combined_score >= read_back[1].combined_score);
    }

    #[tokio::test]
    async fn candidate_reads_are_cached_and_invalidated_on_rewrite() {
        let store = SqlitePersistence::open_in_memory(2).await.unwrap();
        let candidate = TradingCandidate {
            scan_id: "s1".to_string(),
            symbol: "AAA".to_string(),
            selected_at: Utc::now(),
            catalyst_score: 90.0,
            news_count: 1,
            primary_catalyst: PrimaryCatalyst::Earnings,
            catalyst_keywords: BTreeSet::new(),
            current_price: 50.0,
            current_volume: 1_000_000,
            relative_volume: 2.0,
            price_change_pct: 3.0,
            premarket_volume: None,
            premarket_change_pct: None,
            has_pre_market_news: false,
            technical_score: 60.0,
            combined_score: 81.0,
            selection_rank: 1,
            technical_validated: true,
        };
        store.insert_candidates("s1", &[candidate]).await.unwrap();
        store.read_candidates("s1").await.unwrap();
        assert!(store.cache_get("candidates:s1").await.is_some());

        store.insert_candidates("s1", &[]).await.unwrap();
        assert!(store.cache_get("candidates:s1").await.is_none());
    }

    #[tokio::test]
    async fn config_reads_are_cached_and_invalidated_on_write() {
        let store = SqlitePersistence::open_in_memory(2).await.unwrap();
        store.write_config("min_price", "2.0", "operator").await.unwrap();
        assert_eq!(store.read_config("min_price").await.unwrap(), Some("2.0".to_string()));
        assert!(store.cache_get("config:min_price").await.is_some());

        store.write_config("min_price", "3.0", "operator").await.unwrap();
        assert!(store.cache_get("config:min_price").await.is_none());
        assert_eq!(store.read_config("min_price").await.unwrap(), Some("3.0".to_string()));
    }
}
