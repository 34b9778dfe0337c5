//! End-to-end behavioral checks driven through public component APIs:
//! collection/dedup, scoring arithmetic, confirmation tracking, full-cycle
//! ordering, aggressive-mode threshold relaxation, and operator cancellation.

use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use catalyst_core::clock::{SessionWindows, SystemClock};
use catalyst_core::config::ConfigStore;
use catalyst_core::coordinator::collaborators::HttpCollaborator;
use catalyst_core::coordinator::{Coordinator, CycleState, Scheduler, StageRunner};
use catalyst_core::models::{
    ConfirmationStatus, CycleMode, CycleStatus, KeywordCategory, MarketState, NewsItem,
};
use catalyst_core::news::source::{NewsSource, RateSpec, RawArticle};
use catalyst_core::news::NewsCollector;
use catalyst_core::persistence::{PersistencePort, SqlitePersistence};
use catalyst_core::retry::BackoffPolicy;
use catalyst_core::scanner::market_data::{FakeMarketDataClient, MarketSnapshot};
use catalyst_core::scanner::{scoring, CatalystScanner};
use catalyst_core::CoreError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

struct FixedSource {
    name: String,
    tier: u8,
    articles: Vec<RawArticle>,
}

#[async_trait]
impl NewsSource for FixedSource {
    fn source_name(&self) -> &str {
        &self.name
    }
    fn source_tier(&self) -> u8 {
        self.tier
    }
    fn rate_limit(&self) -> RateSpec {
        RateSpec::new(10_000.0, 10_000.0)
    }
    async fn fetch(&self, _since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>, CoreError> {
        Ok(self.articles.iter().take(limit).cloned().collect())
    }
}

fn article(headline: &str, at: DateTime<Utc>) -> RawArticle {
    RawArticle {
        headline: headline.to_string(),
        source_url: None,
        published_at: at,
        content_snippet: headline.to_string(),
    }
}

fn snapshot(price: f64, volume: u64, rv: f64, change: f64) -> MarketSnapshot {
    MarketSnapshot {
        price,
        volume,
        relative_volume: rv,
        price_change_pct: change,
        premarket_volume: None,
        premarket_change_pct: None,
    }
}

async fn seed_news(store: &SqlitePersistence, symbol: &str, tier: u8, category: KeywordCategory, at: DateTime<Utc>) {
    seed_news_aged(store, symbol, tier, category, at, ChronoDuration::hours(1)).await
}

async fn seed_news_aged(
    store: &SqlitePersistence,
    symbol: &str,
    tier: u8,
    category: KeywordCategory,
    at: DateTime<Utc>,
    age: ChronoDuration,
) {
    let item = NewsItem {
        fingerprint: format!("{symbol}-{tier}-{}", at.to_rfc3339()),
        primary_symbol: Some(symbol.to_string()),
        headline: "catalyst headline".to_string(),
        source: "Reuters".to_string(),
        source_url: None,
        published_at: at - age,
        collected_at: at,
        content_snippet: "x".to_string(),
        keywords: BTreeSet::from([category]),
        mentioned_tickers: BTreeSet::from([symbol.to_string()]),
        market_state: MarketState::Regular,
        is_breaking_news: false,
        source_tier: tier,
        cluster_id: None,
        sentiment_keywords: BTreeSet::new(),
        update_count: 0,
        last_seen: at,
        price_move_1h: None,
        price_move_24h: None,
        volume_surge_ratio: None,
        was_accurate: None,
        confirmation_status: ConfirmationStatus::Unconfirmed,
        confirmed_by: None,
        confirmation_delay_minutes: None,
    };
    store.upsert_news_item(item).await.unwrap();
}

/// Waits for a cycle to leave `Running`, polling the persisted record. Avoids
/// a fixed sleep since stage timing varies with collaborator latency.
async fn wait_for_terminal(
    persistence: &SqlitePersistence,
    cycle_id: &str,
) -> catalyst_core::models::TradingCycle {
    for _ in 0..200 {
        if let Some(cycle) = persistence.read_cycle(cycle_id).await.unwrap() {
            if cycle.status != CycleStatus::Running {
                return cycle;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("cycle {cycle_id} did not reach a terminal state in time");
}

async fn spawn_router(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn duplicate_article_collapses_to_one_row_with_update_count_one() {
    let persistence: Arc<dyn PersistencePort> =
        Arc::new(SqlitePersistence::open_in_memory(2).await.unwrap());
    let at = DateTime::parse_from_rfc3339("2025-01-15T13:05:00Z").unwrap().with_timezone(&Utc);
    let source: Arc<dyn NewsSource> = Arc::new(FixedSource {
        name: "Reuters".to_string(),
        tier: 1,
        articles: vec![article("ACME beats Q3 earnings", at)],
    });
    let collector = NewsCollector::new(
        vec![source],
        persistence.clone(),
        4,
        "America/New_York".parse().unwrap(),
        BTreeSet::from(["ACME".to_string()]),
    );

    collector.collect(CycleMode::Normal).await.unwrap();
    collector.collect(CycleMode::Normal).await.unwrap();

    let range = persistence
        .read_news_range(at - ChronoDuration::days(1), at + ChronoDuration::days(1), Default::default())
        .await
        .unwrap();
    assert_eq!(range.len(), 1);
    assert_eq!(range[0].update_count, 1);
}

#[test]
fn worked_example_produces_the_documented_scores() {
    let at = Utc::now();
    let item = NewsItem {
        fingerprint: "x".to_string(),
        primary_symbol: Some("ACME".to_string()),
        headline: "ACME beats Q3 earnings".to_string(),
        source: "Reuters".to_string(),
        source_url: None,
        published_at: at - ChronoDuration::hours(1),
        collected_at: at,
        content_snippet: "x".to_string(),
        keywords: BTreeSet::from([KeywordCategory::Earnings]),
        mentioned_tickers: BTreeSet::from(["ACME".to_string()]),
        market_state: MarketState::Regular,
        is_breaking_news: false,
        source_tier: 1,
        cluster_id: None,
        sentiment_keywords: BTreeSet::new(),
        update_count: 0,
        last_seen: at,
        price_move_1h: None,
        price_move_24h: None,
        volume_surge_ratio: None,
        was_accurate: None,
        confirmation_status: ConfirmationStatus::Unconfirmed,
        confirmed_by: None,
        confirmation_delay_minutes: None,
    };

    let item_score = scoring::item_score(&item, at);
    assert!((item_score - 0.934).abs() < 0.001, "item_score was {item_score}");

    let catalyst = scoring::catalyst_score(std::iter::once(&item), at);
    assert!((catalyst - 93.4).abs() < 0.1, "catalyst_score was {catalyst}");

    let technical = scoring::technical_score(2.0, 3.0);
    assert!((technical - 59.0).abs() < 0.1, "technical_score was {technical}");

    let combined = scoring::combined_score(catalyst, technical);
    assert!((combined - 83.1).abs() < 0.1, "combined_score was {combined}");
}

#[tokio::test]
async fn tier_three_article_confirmed_by_tier_one_forty_five_minutes_later() {
    let persistence = Arc::new(SqlitePersistence::open_in_memory(2).await.unwrap());
    let base = DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z").unwrap().with_timezone(&Utc);

    let tier3: Arc<dyn NewsSource> = Arc::new(FixedSource {
        name: "ChatterBlog".to_string(),
        tier: 3,
        articles: vec![article("SYMB fda review pending", base)],
    });
    let collector_tier3 = NewsCollector::new(
        vec![tier3],
        persistence.clone() as Arc<dyn PersistencePort>,
        4,
        "America/New_York".parse().unwrap(),
        BTreeSet::from(["SYMB".to_string()]),
    );
    collector_tier3.collect(CycleMode::Normal).await.unwrap();

    let tier1: Arc<dyn NewsSource> = Arc::new(FixedSource {
        name: "Reuters".to_string(),
        tier: 1,
        articles: vec![article("SYMB fda approval granted", base + ChronoDuration::minutes(45))],
    });
    let collector_tier1 = NewsCollector::new(
        vec![tier1],
        persistence.clone() as Arc<dyn PersistencePort>,
        4,
        "America/New_York".parse().unwrap(),
        BTreeSet::from(["SYMB".to_string()]),
    );
    collector_tier1.collect(CycleMode::Normal).await.unwrap();

    let range = persistence
        .read_news_range(base - ChronoDuration::days(1), base + ChronoDuration::days(1), Default::default())
        .await
        .unwrap();
    let confirmed = range
        .iter()
        .find(|n| n.source_tier == 3)
        .expect("tier-3 article present");
    assert_eq!(confirmed.confirmation_status, ConfirmationStatus::Confirmed);
    assert_eq!(confirmed.confirmed_by.as_deref(), Some("Reuters"));
    assert_eq!(confirmed.confirmation_delay_minutes, Some(45));
}

#[tokio::test]
async fn aggressive_mode_admits_a_symbol_normal_mode_would_reject() {
    let store = SqlitePersistence::open_in_memory(2).await.unwrap();
    // tier_weight(4) = 0.4, default keyword weight = 1.0, 2h-old => exp(-0.5)
    // = 0.6065: item_score ~= 0.2426, catalyst_score ~= 24.3 -- below normal's
    // 30-point floor but above aggressive's relaxed 20-point floor.
    let at = Utc::now();
    seed_news_aged(&store, "PRE", 4, KeywordCategory::Concerns, at, ChronoDuration::hours(2)).await;

    let market_data = FakeMarketDataClient::default().with("PRE", snapshot(50.0, 150_000, 2.0, 1.0));
    let scanner = CatalystScanner::new(Arc::new(store), Arc::new(market_data), Vec::new());

    let normal = scanner.scan(CycleMode::Normal).await.unwrap();
    assert!(!normal.candidates.iter().any(|c| c.symbol == "PRE"));

    let aggressive = scanner.scan(CycleMode::Aggressive).await.unwrap();
    assert!(aggressive.candidates.iter().any(|c| c.symbol == "PRE"));
}

fn collaborator_router() -> Router {
    Router::new()
        .route(
            "/analyze",
            post(|Json(body): Json<serde_json::Value>| async move {
                let symbol = body["symbol"].as_str().unwrap().to_string();
                Json(json!({"symbol": symbol, "pattern": "breakout", "confidence": 0.9}))
            }),
        )
        .route(
            "/signal",
            post(|Json(body): Json<serde_json::Value>| async move {
                let symbol = body["symbol"].as_str().unwrap().to_string();
                let confidence = match symbol.as_str() {
                    "AAA" | "BBB" | "CCC" => 0.8,
                    _ => 0.3,
                };
                Json(json!({"symbol": symbol, "confidence": confidence, "direction": "long"}))
            }),
        )
        .route(
            "/execute",
            post(|Json(body): Json<serde_json::Value>| async move {
                let symbol = body["symbol"].as_str().unwrap().to_string();
                Json(json!({"trade_id": format!("trade-{symbol}"), "symbol": symbol}))
            }),
        )
}

async fn build_coordinator(
    persistence: Arc<SqlitePersistence>,
    market_data: FakeMarketDataClient,
    base_url: &str,
) -> (Coordinator, Arc<SqlitePersistence>) {
    let persistence_port: Arc<dyn PersistencePort> = persistence.clone();
    let sources: Vec<Arc<dyn NewsSource>> = Vec::new();
    let news = Arc::new(NewsCollector::new(
        sources,
        persistence_port.clone(),
        4,
        "America/New_York".parse().unwrap(),
        BTreeSet::from(["AAA".to_string(), "BBB".to_string(), "CCC".to_string(), "DDD".to_string(), "EEE".to_string()]),
    ));
    let scanner = Arc::new(CatalystScanner::new(persistence_port.clone(), Arc::new(market_data), Vec::new()));
    let state = Arc::new(CycleState::new());
    let timeout = Duration::from_secs(10);
    let runner = Arc::new(StageRunner {
        news,
        scanner,
        pattern: Arc::new(HttpCollaborator::new("pattern", base_url, timeout)),
        technical: Arc::new(HttpCollaborator::new("technical", base_url, timeout)),
        trading: Arc::new(HttpCollaborator::new("trading", base_url, timeout)),
        persistence: persistence_port.clone(),
        state: state.clone(),
        retry_policy: BackoffPolicy { max_retries: 0, ..BackoffPolicy::default() },
    });
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(SystemClock),
        SessionWindows::default(),
        "America/New_York".parse().unwrap(),
        state.clone(),
        runner.clone(),
    ));
    let coordinator = Coordinator {
        state,
        runner,
        config: Arc::new(ConfigStore::new(Duration::from_secs(60))),
        collaborators: Vec::new(),
        persistence: persistence_port,
        scheduler,
    };
    (coordinator, persistence)
}

#[tokio::test]
async fn normal_mode_cycle_counters_match_stage_outputs_in_order() {
    let store = Arc::new(SqlitePersistence::open_in_memory(4).await.unwrap());
    let at = Utc::now();
    for symbol in ["AAA", "BBB", "CCC", "DDD", "EEE"] {
        seed_news(&store, symbol, 1, KeywordCategory::Earnings, at).await;
    }
    let market_data = FakeMarketDataClient::default()
        .with("AAA", snapshot(50.0, 2_000_000, 2.0, 3.0))
        .with("BBB", snapshot(50.0, 2_000_000, 2.0, 3.0))
        .with("CCC", snapshot(50.0, 2_000_000, 2.0, 3.0))
        .with("DDD", snapshot(50.0, 2_000_000, 2.0, 3.0))
        .with("EEE", snapshot(50.0, 2_000_000, 2.0, 3.0));

    let base_url = spawn_router(collaborator_router()).await;
    let (coordinator, persistence) = build_coordinator(store, market_data, &base_url).await;

    let cycle_id = coordinator.start_cycle(Some(CycleMode::Normal)).await.unwrap();
    let finished = wait_for_terminal(&persistence, &cycle_id).await;

    assert_eq!(finished.status, CycleStatus::Completed);
    assert_eq!(finished.candidates_selected, 5);
    assert_eq!(finished.patterns_analyzed, 5);
    assert_eq!(finished.signals_generated, 3);
    assert_eq!(finished.trades_executed, 3);
}

fn slow_analyze_router() -> Router {
    Router::new()
        .route(
            "/analyze",
            post(|Json(body): Json<serde_json::Value>| async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                let symbol = body["symbol"].as_str().unwrap().to_string();
                Json(json!({"symbol": symbol, "pattern": "breakout", "confidence": 0.9}))
            }),
        )
        .route(
            "/signal",
            post(|Json(body): Json<serde_json::Value>| async move {
                let symbol = body["symbol"].as_str().unwrap().to_string();
                Json(json!({"symbol": symbol, "confidence": 0.8, "direction": "long"}))
            }),
        )
        .route(
            "/execute",
            post(|Json(body): Json<serde_json::Value>| async move {
                let symbol = body["symbol"].as_str().unwrap().to_string();
                Json(json!({"trade_id": format!("trade-{symbol}"), "symbol": symbol}))
            }),
        )
}

#[tokio::test]
async fn operator_cancel_marks_cycle_failed_with_partial_counters() {
    let store = Arc::new(SqlitePersistence::open_in_memory(4).await.unwrap());
    let at = Utc::now();
    for symbol in ["AAA", "BBB", "CCC"] {
        seed_news(&store, symbol, 1, KeywordCategory::Earnings, at).await;
    }
    let market_data = FakeMarketDataClient::default()
        .with("AAA", snapshot(50.0, 2_000_000, 2.0, 3.0))
        .with("BBB", snapshot(50.0, 2_000_000, 2.0, 3.0))
        .with("CCC", snapshot(50.0, 2_000_000, 2.0, 3.0));

    let base_url = spawn_router(slow_analyze_router()).await;
    let (coordinator, persistence) = build_coordinator(store, market_data, &base_url).await;

    let started = std::time::Instant::now();
    let cycle_id = coordinator.start_cycle(Some(CycleMode::Normal)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(coordinator.cancel_cycle());

    let finished = wait_for_terminal(&persistence, &cycle_id).await;
    let elapsed = started.elapsed();

    assert_eq!(finished.status, CycleStatus::Failed);
    assert_eq!(finished.fail_reason.as_deref(), Some("cancelled"));
    assert!(finished.patterns_analyzed < 3, "expected a partial analyze count, got {}", finished.patterns_analyzed);
    assert!(elapsed < Duration::from_secs(2), "cancellation took {elapsed:?}, expected well under 2s");
}

#[tokio::test]
async fn completed_cycle_is_retrievable_by_id_and_unknown_id_is_not_found() {
    let store = Arc::new(SqlitePersistence::open_in_memory(2).await.unwrap());
    let at = Utc::now();
    seed_news(&store, "AAA", 1, KeywordCategory::Earnings, at).await;
    let market_data = FakeMarketDataClient::default().with("AAA", snapshot(50.0, 2_000_000, 2.0, 3.0));

    let base_url = spawn_router(collaborator_router()).await;
    let (coordinator, persistence) = build_coordinator(store, market_data, &base_url).await;

    let cycle_id = coordinator.start_cycle(Some(CycleMode::Normal)).await.unwrap();
    wait_for_terminal(&persistence, &cycle_id).await;

    let looked_up = coordinator.get_cycle(&cycle_id).await.unwrap();
    assert_eq!(looked_up.cycle_id, cycle_id);

    let missing = coordinator.get_cycle("no-such-cycle").await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn reload_rereads_premarket_boundary_from_the_configuration_store() {
    let store = Arc::new(SqlitePersistence::open_in_memory(2).await.unwrap());
    let market_data = FakeMarketDataClient::default();
    let base_url = spawn_router(collaborator_router()).await;
    let (coordinator, _persistence) = build_coordinator(store, market_data, &base_url).await;

    coordinator.update_config(
        "premarket_start",
        catalyst_core::config::ConfigValue::Text("05:00".to_string()),
    );
    coordinator.reload();

    assert!(coordinator.config.read("_reloaded_at").is_some());
}

#[tokio::test]
async fn single_source_metrics_lookup_matches_the_aggregate_view() {
    let store = Arc::new(SqlitePersistence::open_in_memory(2).await.unwrap());
    let at = Utc::now();
    seed_news(&store, "AAA", 1, KeywordCategory::Earnings, at).await;

    let persistence_port: Arc<dyn PersistencePort> = store.clone();
    let news = NewsCollector::new(
        Vec::new(),
        persistence_port,
        4,
        "America/New_York".parse().unwrap(),
        BTreeSet::from(["AAA".to_string()]),
    );

    let metrics = news.source_metrics("Reuters").await.unwrap();
    assert_eq!(metrics.source, "Reuters");
    assert_eq!(metrics.total_articles, 1);

    let missing = news.source_metrics("Unknown Wire").await;
    assert!(matches!(missing, Err(CoreError::NotFound(_))));
}
