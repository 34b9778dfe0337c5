//! News Collector: concurrent multi-source fan-out, normalization,
//! deduplication, tiering, and confirmation tracking.

use crate::clock::SessionWindows;
use crate::models::{
    CollectionReport, ConfirmationStatus, KeywordCategory, MarketState, NewsItem, NewsOutcome,
};
use crate::news::normalize;
use crate::news::source::{NewsSource, TokenBucket};
use crate::persistence::{NewsRangeFilter, PersistencePort, UpsertOutcome};
use crate::retry::{retry_with_backoff, BackoffPolicy};
use crate::CoreError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Per-mode source policy.
struct ModePolicy {
    min_tier: Option<u8>,
    per_source_cap: usize,
    budget: Duration,
}

fn mode_policy(mode: crate::models::CycleMode) -> ModePolicy {
    use crate::models::CycleMode::*;
    match mode {
        Aggressive => ModePolicy { min_tier: None, per_source_cap: 100, budget: Duration::from_secs(120) },
        Normal => ModePolicy { min_tier: None, per_source_cap: 50, budget: Duration::from_secs(180) },
        Light => ModePolicy { min_tier: Some(3), per_source_cap: 30, budget: Duration::from_secs(180) },
        Minimal => ModePolicy { min_tier: Some(2), per_source_cap: 20, budget: Duration::from_secs(300) },
    }
}

const CONFIRMATION_WINDOW_HOURS: i64 = 4;

pub struct NewsCollector {
    sources: Vec<Arc<dyn NewsSource>>,
    limiters: HashMap<String, Arc<TokenBucket>>,
    persistence: Arc<dyn PersistencePort>,
    concurrency: usize,
    session_windows: SessionWindows,
    market_tz: Tz,
    lexicon: Vec<(KeywordCategory, &'static [&'static str])>,
    symbol_allowlist: BTreeSet<String>,
    retry_policy: BackoffPolicy,
}

impl NewsCollector {
    pub fn new(
        sources: Vec<Arc<dyn NewsSource>>,
        persistence: Arc<dyn PersistencePort>,
        concurrency: usize,
        market_tz: Tz,
        symbol_allowlist: BTreeSet<String>,
    ) -> Self {
        let limiters = sources
            .iter()
            .map(|s| (s.source_name().to_string(), Arc::new(TokenBucket::new(s.rate_limit()))))
            .collect();
        Self {
            sources,
            limiters,
            persistence,
            concurrency,
            session_windows: SessionWindows::default(),
            market_tz,
            lexicon: normalize::default_lexicon(),
            symbol_allowlist,
            retry_policy: BackoffPolicy::default(),
        }
    }

    fn active_sources(&self, policy: &ModePolicy) -> Vec<Arc<dyn NewsSource>> {
        self.sources
            .iter()
            .filter(|s| policy.min_tier.map(|t| s.source_tier() <= t).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Run one collection cycle.
    pub async fn collect(&self, mode: crate::models::CycleMode) -> Result<CollectionReport, CoreError> {
        let policy = mode_policy(mode);
        let active = self.active_sources(&policy);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let since = Utc::now() - ChronoDuration::hours(24);

        let mut report = CollectionReport::default();
        let mut handles = Vec::with_capacity(active.len());

        for source in active {
            let semaphore = semaphore.clone();
            let limiter = self
                .limiters
                .get(source.source_name())
                .cloned()
                .expect("limiter registered for every configured source");
            let per_source_cap = policy.per_source_cap;
            let retry_policy = self.retry_policy.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                limiter.acquire().await;
                let name = source.source_name().to_string();
                let fetched = retry_with_backoff(retry_policy, &name, || {
                    let source = source.clone_ref();
                    async move { source.fetch(since, per_source_cap).await }
                })
                .await;
                (name, fetched)
            }));
        }

        let mut fetched_by_source = Vec::new();
        let overall = tokio::time::timeout(policy.budget, async {
            for handle in handles {
                match handle.await {
                    Ok((name, Ok(articles))) => fetched_by_source.push((name, articles)),
                    Ok((name, Err(e))) => {
                        warn!(source = %name, error = %e, "source fetch exhausted retries");
                        report.errors.push(format!("{name}: {e}"));
                    }
                    Err(join_err) => {
                        report.errors.push(format!("task join error: {join_err}"));
                    }
                }
            }
        })
        .await;
        if overall.is_err() {
            report.errors.push("collection budget exceeded; remaining sources dropped".to_string());
        }

        for (source_name, articles) in fetched_by_source {
            report.articles += articles.len() as u32;
            let mut source_count = 0u32;
            for raw in articles {
                let tier = self
                    .sources
                    .iter()
                    .find(|s| s.source_name() == source_name)
                    .map(|s| s.source_tier())
                    .unwrap_or(5);
                let item = self.normalize(raw, &source_name, tier);
                match self.persistence.upsert_news_item(item.clone()).await? {
                    UpsertOutcome::Inserted => {
                        report.new += 1;
                        if tier <= 2 {
                            self.try_confirm_earlier_articles(&item).await?;
                        }
                    }
                    UpsertOutcome::Duplicate => report.duplicate += 1,
                }
                source_count += 1;
            }
            *report.per_source_counts.entry(source_name).or_insert(0) += source_count;
        }

        self.persistence.record_collection_report(&report).await?;
        info!(new = report.new, duplicate = report.duplicate, "collection cycle complete");
        Ok(report)
    }

    fn normalize(&self, raw: crate::news::source::RawArticle, source: &str, tier: u8) -> NewsItem {
        let collected_at = Utc::now();
        let source_url = raw.source_url.map(|u| normalize::strip_tracking_params(&u));
        let fingerprint = normalize::fingerprint(&raw.headline, source, raw.published_at);
        let mentioned_tickers = normalize::extract_tickers(&raw.headline, &self.symbol_allowlist);
        let primary_symbol = mentioned_tickers.iter().next().cloned();
        let market_state = normalize::classify_market_state(&self.session_windows, raw.published_at, self.market_tz);
        let keywords = normalize::extract_keywords(&raw.headline, &self.lexicon);
        let is_breaking_news = normalize::is_breaking_news(tier, raw.published_at, collected_at, &raw.headline);
        let cluster_id = normalize::cluster_id(primary_symbol.as_deref(), raw.published_at, &keywords);

        NewsItem {
            fingerprint,
            primary_symbol,
            headline: raw.headline,
            source: source.to_string(),
            source_url,
            published_at: raw.published_at,
            collected_at,
            content_snippet: NewsItem::content_snippet_truncated(&raw.content_snippet),
            keywords,
            mentioned_tickers,
            market_state,
            is_breaking_news,
            source_tier: tier,
            cluster_id,
            sentiment_keywords: BTreeSet::new(),
            update_count: 0,
            last_seen: collected_at,
            price_move_1h: None,
            price_move_24h: None,
            volume_surge_ratio: None,
            was_accurate: None,
            confirmation_status: ConfirmationStatus::Unconfirmed,
            confirmed_by: None,
            confirmation_delay_minutes: None,
        }
    }

    /// A fresh tier-1/2 item confirms an earlier unconfirmed tier-3-5 item
    /// sharing symbol and keyword overlap within the confirmation window.
    async fn try_confirm_earlier_articles(&self, confirming: &NewsItem) -> Result<(), CoreError> {
        let Some(symbol) = confirming.primary_symbol.as_deref() else {
            return Ok(());
        };
        let window_start = confirming.published_at - ChronoDuration::hours(CONFIRMATION_WINDOW_HOURS);
        let candidates = self.persistence.read_unconfirmed_since(window_start).await?;

        for candidate in candidates {
            if candidate.source_tier < 3 {
                continue;
            }
            if candidate.primary_symbol.as_deref() != Some(symbol) {
                continue;
            }
            if candidate.published_at > confirming.published_at {
                continue;
            }
            if candidate.keywords.is_disjoint(&confirming.keywords) {
                continue;
            }
            let delay = (confirming.published_at - candidate.published_at).num_minutes();
            self.persistence
                .confirm_news_item(&candidate.fingerprint, &confirming.source, delay)
                .await?;
        }
        Ok(())
    }

    /// Range-and-filter query over persisted news.
    pub async fn search(
        &self,
        filter: NewsRangeFilter,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<NewsItem>, CoreError> {
        self.persistence.read_news_range(since, until, filter).await
    }

    /// Single-writer, idempotent outcome update for a news item.
    pub async fn update_outcome(&self, news_id: &str, outcome: NewsOutcome) -> Result<(), CoreError> {
        self.persistence.update_news_outcome(news_id, outcome).await
    }

    pub fn market_state_now(&self) -> MarketState {
        self.session_windows.classify(Utc::now(), self.market_tz)
    }

    /// Per-source accuracy ledger, for the `source_analysis` operator view.
    pub async fn source_analysis(&self) -> Result<Vec<crate::models::SourceMetrics>, CoreError> {
        self.persistence.read_all_source_metrics().await
    }

    /// Single-source accuracy ledger lookup; `NotFound` if the source has
    /// never reported an article.
    pub async fn source_metrics(&self, source: &str) -> Result<crate::models::SourceMetrics, CoreError> {
        self.persistence
            .read_source_metrics(source)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("source {source}")))
    }
}

/// `Arc<dyn NewsSource>` is `Clone` through the `Arc`, but async closures that
/// move a trait object into a spawned task need an explicit clone hook rather
/// than relying on `dyn` auto-traits.
trait CloneableSource {
    fn clone_ref(&self) -> Arc<dyn NewsSource>;
}

impl CloneableSource for Arc<dyn NewsSource> {
    fn clone_ref(&self) -> Arc<dyn NewsSource> {
        self.clone()
    }
}
