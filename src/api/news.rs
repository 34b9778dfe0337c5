//! News Collector HTTP surface (port 5008): collection triggers, search,
//! outcome feedback, per-source accuracy, and coordinated-narrative reads.

use crate::api::envelope::{envelope, ok};
use crate::api::AppState;
use crate::models::{CycleMode, NewsOutcome};
use crate::persistence::NewsRangeFilter;
use crate::CoreError;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/collect_news", post(collect_news))
        .route("/search_news", get(search_news))
        .route("/trending_news", get(trending_news))
        .route("/update_outcome", post(update_outcome))
        .route("/source_analysis", get(source_analysis))
        .route("/source_metrics", get(source_metrics))
        .route("/coordinated_narratives", get(coordinated_narratives))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> axum::response::Response {
    envelope("news-collector", json!({ "market_state": state.news.market_state_now() }))
}

#[derive(Debug, Deserialize)]
struct CollectNewsRequest {
    #[serde(default)]
    mode: Option<CycleMode>,
}

async fn collect_news(
    State(state): State<AppState>,
    body: Option<Json<CollectNewsRequest>>,
) -> Result<axum::response::Response, CoreError> {
    let mode = body.and_then(|Json(r)| r.mode).unwrap_or(CycleMode::Normal);
    let report = state.news.collect(mode).await?;
    Ok(ok("news-collector", "report", report))
}

#[derive(Debug, Deserialize)]
struct SearchNewsQuery {
    symbol: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    min_tier: Option<u8>,
    limit: Option<usize>,
}

async fn search_news(
    State(state): State<AppState>,
    Query(q): Query<SearchNewsQuery>,
) -> Result<axum::response::Response, CoreError> {
    let until = q.until.unwrap_or_else(Utc::now);
    let since = q.since.unwrap_or_else(|| until - ChronoDuration::hours(24));
    let filter = NewsRangeFilter { symbol: q.symbol, min_tier: q.min_tier, limit: q.limit };
    let items = state.news.search(filter, since, until).await?;
    Ok(ok("news-collector", "items", items))
}

#[derive(Debug, Deserialize)]
struct TrendingNewsQuery {
    window_h: Option<i64>,
}

async fn trending_news(
    State(state): State<AppState>,
    Query(q): Query<TrendingNewsQuery>,
) -> Result<axum::response::Response, CoreError> {
    let until = Utc::now();
    let since = until - ChronoDuration::hours(q.window_h.unwrap_or(24));
    let items = state
        .news
        .search(NewsRangeFilter::default(), since, until)
        .await?;
    Ok(ok("news-collector", "items", sort_by_cluster_size(items)))
}

/// Groups items by `cluster_id` (uncategorized items form their own
/// singleton groups) and orders the window so the largest narrative
/// clusters come first, mirroring the grouping sweep in `news::narrative`.
fn sort_by_cluster_size(items: Vec<crate::models::NewsItem>) -> Vec<crate::models::NewsItem> {
    use std::collections::HashMap;

    let mut cluster_sizes: HashMap<String, usize> = HashMap::new();
    for item in &items {
        if let Some(cluster_id) = &item.cluster_id {
            *cluster_sizes.entry(cluster_id.clone()).or_default() += 1;
        }
    }

    let mut items = items;
    items.sort_by(|a, b| {
        let size_a = a.cluster_id.as_ref().and_then(|c| cluster_sizes.get(c)).copied().unwrap_or(1);
        let size_b = b.cluster_id.as_ref().and_then(|c| cluster_sizes.get(c)).copied().unwrap_or(1);
        size_b.cmp(&size_a).then_with(|| b.published_at.cmp(&a.published_at))
    });
    items
}

#[derive(Debug, Deserialize)]
struct UpdateOutcomeRequest {
    news_id: String,
    #[serde(flatten)]
    outcome: NewsOutcome,
}

async fn update_outcome(
    State(state): State<AppState>,
    Json(req): Json<UpdateOutcomeRequest>,
) -> Result<axum::response::Response, CoreError> {
    state.news.update_outcome(&req.news_id, req.outcome).await?;
    Ok(ok("news-collector", "news_id", req.news_id))
}

async fn source_analysis(State(state): State<AppState>) -> Result<axum::response::Response, CoreError> {
    let metrics = state.news.source_analysis().await?;
    Ok(ok("news-collector", "sources", metrics))
}

#[derive(Debug, Deserialize)]
struct SourceMetricsQuery {
    source: String,
}

async fn source_metrics(
    State(state): State<AppState>,
    Query(q): Query<SourceMetricsQuery>,
) -> Result<axum::response::Response, CoreError> {
    let metrics = state.news.source_metrics(&q.source).await?;
    Ok(ok("news-collector", "metrics", metrics))
}

#[derive(Debug, Deserialize)]
struct CoordinatedNarrativesQuery {
    hours: Option<i64>,
}

async fn coordinated_narratives(
    State(state): State<AppState>,
    Query(q): Query<CoordinatedNarrativesQuery>,
) -> Result<axum::response::Response, CoreError> {
    let clusters = state.narratives.recent(q.hours.unwrap_or(24)).await?;
    Ok(ok("news-collector", "clusters", clusters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConfirmationStatus, KeywordCategory, MarketState, NewsItem};
    use std::collections::BTreeSet;

    fn item(headline: &str, cluster_id: Option<&str>, published_at: DateTime<Utc>) -> NewsItem {
        NewsItem {
            fingerprint: headline.to_string(),
            primary_symbol: Some("ACME".to_string()),
            headline: headline.to_string(),
            source: "Reuters".to_string(),
            source_url: None,
            published_at,
            collected_at: published_at,
            content_snippet: headline.to_string(),
            keywords: BTreeSet::from([KeywordCategory::Earnings]),
            mentioned_tickers: BTreeSet::new(),
            market_state: MarketState::Regular,
            is_breaking_news: false,
            source_tier: 1,
            cluster_id: cluster_id.map(|c| c.to_string()),
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

    #[test]
    fn largest_cluster_sorts_first_ahead_of_newer_singletons() {
        let t0 = Utc::now();
        let items = vec![
            item("solo newest", None, t0),
            item("cluster-a 1", Some("c-a"), t0 - ChronoDuration::minutes(10)),
            item("cluster-b 1", Some("c-b"), t0 - ChronoDuration::minutes(20)),
            item("cluster-b 2", Some("c-b"), t0 - ChronoDuration::minutes(30)),
            item("cluster-b 3", Some("c-b"), t0 - ChronoDuration::minutes(40)),
        ];
        let sorted = sort_by_cluster_size(items);
        assert!(sorted.iter().take(3).all(|i| i.cluster_id.as_deref() == Some("c-b")));
        assert_eq!(sorted[3].cluster_id.as_deref(), Some("c-a"));
        assert_eq!(sorted[4].headline, "solo newest");
    }
}
