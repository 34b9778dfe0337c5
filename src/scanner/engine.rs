//! Catalyst Scanner: multi-stage candidate filtering and ranking.

use crate::config::ConfigStore;
use crate::models::{CycleMode, MarketState, NewsItem, PrimaryCatalyst, ScanResult, TradingCandidate};
use crate::persistence::{NewsRangeFilter, PersistencePort};
use crate::scanner::market_data::MarketDataClient;
use crate::scanner::scoring;
use crate::CoreError;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const CATALYST_FILTER_CAP: usize = 20;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_BASELINE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct ScanThresholds {
    pub min_catalyst_score: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub min_volume: u64,
    pub min_relative_volume: f64,
    pub top_k: usize,
}

impl ScanThresholds {
    /// Aggressive mode relaxes the catalyst-score and volume floors to widen
    /// the pre-market candidate pool. These are the hardcoded fallbacks used
    /// when no `ConfigStore` override is wired in; see `for_mode_with_config`.
    pub fn for_mode(mode: CycleMode) -> Self {
        let base = Self {
            min_catalyst_score: 30.0,
            min_price: 1.0,
            max_price: 500.0,
            min_volume: 500_000,
            min_relative_volume: 1.5,
            top_k: DEFAULT_TOP_K,
        };
        match mode {
            CycleMode::Aggressive => Self {
                min_catalyst_score: 20.0,
                min_volume: 100_000,
                ..base
            },
            _ => base,
        }
    }

    /// Same as `for_mode`, but reads the operator-writable overrides
    /// (`min_catalyst_score`, `min_price`, `max_price`, `min_volume`,
    /// `min_relative_volume`) from `config` where present.
    pub fn for_mode_with_config(mode: CycleMode, config: &ConfigStore) -> Self {
        let mut thresholds = Self::for_mode(mode);
        if let Some(v) = config.read("min_catalyst_score").and_then(|v| v.as_f64()) {
            thresholds.min_catalyst_score = v;
        }
        if let Some(v) = config.read("min_price").and_then(|v| v.as_f64()) {
            thresholds.min_price = v;
        }
        if let Some(v) = config.read("max_price").and_then(|v| v.as_f64()) {
            thresholds.max_price = v;
        }
        if let Some(v) = config.read("min_volume").and_then(|v| v.as_f64()) {
            thresholds.min_volume = v as u64;
        }
        if let Some(v) = config.read("min_relative_volume").and_then(|v| v.as_f64()) {
            thresholds.min_relative_volume = v;
        }
        thresholds
    }
}

pub struct CatalystScanner {
    persistence: Arc<dyn PersistencePort>,
    market_data: Arc<dyn MarketDataClient>,
    /// Configured most-active symbol baseline, default empty.
    baseline_universe: Vec<String>,
    config: Option<Arc<ConfigStore>>,
}

impl CatalystScanner {
    pub fn new(
        persistence: Arc<dyn PersistencePort>,
        market_data: Arc<dyn MarketDataClient>,
        baseline_universe: Vec<String>,
    ) -> Self {
        Self { persistence, market_data, baseline_universe, config: None }
    }

    /// Wire in the operator-writable configuration store so thresholds track
    /// live overrides instead of the hardcoded defaults.
    pub fn with_config(mut self, config: Arc<ConfigStore>) -> Self {
        self.config = Some(config);
        self
    }

    fn thresholds_for(&self, mode: CycleMode) -> ScanThresholds {
        match &self.config {
            Some(config) => ScanThresholds::for_mode_with_config(mode, config),
            None => ScanThresholds::for_mode(mode),
        }
    }

    /// Discover a universe from recent news plus the configured baseline,
    /// then filter and rank it for the given cycle mode.
    pub async fn scan(&self, mode: CycleMode) -> Result<ScanResult, CoreError> {
        let start = Instant::now();
        let now = Utc::now();
        let since = now - ChronoDuration::hours(24);
        let news = self
            .persistence
            .read_news_range(since, now, NewsRangeFilter::default())
            .await?;

        let news_by_symbol = group_by_symbol(news);
        let mut universe: BTreeSet<String> = news_by_symbol.keys().cloned().collect();
        universe.extend(
            self.baseline_universe
                .iter()
                .take(DEFAULT_BASELINE_SIZE)
                .cloned(),
        );
        let universe_size = universe.len();

        self.rank(mode, universe, news_by_symbol, start, now).await
    }

    /// Rank a caller-supplied symbol set directly, skipping universe discovery.
    pub async fn scan_symbols(&self, symbols: &[String]) -> Result<ScanResult, CoreError> {
        let start = Instant::now();
        let now = Utc::now();
        let since = now - ChronoDuration::hours(24);
        let news = self
            .persistence
            .read_news_range(since, now, NewsRangeFilter::default())
            .await?;
        let news_by_symbol = group_by_symbol(news);
        let universe: BTreeSet<String> = symbols.iter().cloned().collect();

        self.rank(CycleMode::Normal, universe.clone(), news_by_symbol, start, now).await
    }

    /// Idempotent read of a previously persisted scan's candidates.
    pub async fn get_scan_results(&self, scan_id: &str) -> Result<ScanResult, CoreError> {
        let candidates = self.persistence.read_candidates(scan_id).await?;
        Ok(ScanResult {
            scan_id: scan_id.to_string(),
            universe_size: candidates.len(),
            catalyst_filtered: candidates.len(),
            candidates,
            duration_ms: 0,
        })
    }

    async fn rank(
        &self,
        mode: CycleMode,
        universe: BTreeSet<String>,
        news_by_symbol: HashMap<String, Vec<NewsItem>>,
        start: Instant,
        at: chrono::DateTime<Utc>,
    ) -> Result<ScanResult, CoreError> {
        let thresholds = self.thresholds_for(mode);
        let universe_size = universe.len();

        let mut scored: Vec<(String, f64)> = universe
            .into_iter()
            .map(|symbol| {
                let score = news_by_symbol
                    .get(&symbol)
                    .map(|news| scoring::catalyst_score(news.iter(), at))
                    .unwrap_or(0.0);
                (symbol, score)
            })
            .filter(|(_, score)| *score >= thresholds.min_catalyst_score)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(CATALYST_FILTER_CAP);
        let catalyst_filtered = scored.len();

        let mut attempted = 0usize;
        let mut succeeded = 0usize;
        let mut candidates = Vec::new();

        for (symbol, catalyst_score) in &scored {
            attempted += 1;
            match self.market_data.snapshot(symbol).await {
                Ok(snapshot) => {
                    succeeded += 1;
                    if snapshot.price < thresholds.min_price
                        || snapshot.price > thresholds.max_price
                        || snapshot.volume < thresholds.min_volume
                        || snapshot.relative_volume < thresholds.min_relative_volume
                    {
                        continue;
                    }
                    let technical_score =
                        scoring::technical_score(snapshot.relative_volume, snapshot.price_change_pct);
                    let combined = scoring::combined_score(*catalyst_score, technical_score);
                    let news = news_by_symbol.get(symbol);
                    candidates.push(build_candidate(
                        symbol,
                        *catalyst_score,
                        technical_score,
                        combined,
                        true,
                        news,
                        Some(&snapshot),
                        at,
                    ));
                }
                Err(_) => continue,
            }
        }

        // Total market-data outage: every attempted lookup failed. Fall back
        // to catalyst-only candidates.
        if attempted > 0 && succeeded == 0 {
            for (symbol, catalyst_score) in &scored {
                let news = news_by_symbol.get(symbol);
                candidates.push(build_candidate(
                    symbol,
                    *catalyst_score,
                    0.0,
                    *catalyst_score,
                    false,
                    news,
                    None,
                    at,
                ));
            }
        }

        sort_candidates(&mut candidates, mode);
        candidates.truncate(thresholds.top_k);
        for (i, c) in candidates.iter_mut().enumerate() {
            c.selection_rank = (i + 1) as u32;
        }

        let scan_id = Uuid::new_v4().to_string();
        for c in &mut candidates {
            c.scan_id = scan_id.clone();
        }
        self.persistence.insert_candidates(&scan_id, &candidates).await?;

        Ok(ScanResult {
            scan_id,
            candidates,
            universe_size,
            catalyst_filtered,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn group_by_symbol(news: Vec<NewsItem>) -> HashMap<String, Vec<NewsItem>> {
    let mut map: HashMap<String, Vec<NewsItem>> = HashMap::new();
    for item in news {
        if let Some(symbol) = item.primary_symbol.clone() {
            map.entry(symbol).or_default().push(item);
        }
    }
    map
}

fn primary_catalyst_for(news: Option<&Vec<NewsItem>>) -> (PrimaryCatalyst, BTreeSet<crate::models::KeywordCategory>) {
    let Some(news) = news else {
        return (PrimaryCatalyst::Generic, BTreeSet::new());
    };
    let keywords: BTreeSet<_> = news.iter().flat_map(|n| n.keywords.iter().copied()).collect();
    let primary = keywords.iter().next().copied().map(PrimaryCatalyst::from).unwrap_or(PrimaryCatalyst::Generic);
    (primary, keywords)
}

#[allow(clippy::too_many_arguments)]
fn build_candidate(
    symbol: &str,
    catalyst_score: f64,
    technical_score: f64,
    combined_score: f64,
    technical_validated: bool,
    news: Option<&Vec<NewsItem>>,
    snapshot: Option<&crate::scanner::market_data::MarketSnapshot>,
    at: chrono::DateTime<Utc>,
) -> TradingCandidate {
    let (primary_catalyst, catalyst_keywords) = primary_catalyst_for(news);
    let has_pre_market_news = news
        .map(|items| items.iter().any(|n| n.market_state == MarketState::PreMarket))
        .unwrap_or(false);

    TradingCandidate {
        scan_id: String::new(),
        symbol: symbol.to_string(),
        selected_at: at,
        catalyst_score,
        news_count: news.map(|n| n.len() as u32).unwrap_or(0),
        primary_catalyst,
        catalyst_keywords,
        current_price: snapshot.map(|s| s.price).unwrap_or(0.0),
        current_volume: snapshot.map(|s| s.volume).unwrap_or(0),
        relative_volume: snapshot.map(|s| s.relative_volume).unwrap_or(0.0),
        price_change_pct: snapshot.map(|s| s.price_change_pct).unwrap_or(0.0),
        premarket_volume: snapshot.and_then(|s| s.premarket_volume),
        premarket_change_pct: snapshot.and_then(|s| s.premarket_change_pct),
        has_pre_market_news,
        technical_score,
        combined_score,
        selection_rank: 0,
        technical_validated,
    }
}

/// Sort descending by combined_score, tie-broken by symbol. In `aggressive`
/// mode, pre-market news presence is promoted ahead of score.
fn sort_candidates(candidates: &mut [TradingCandidate], mode: CycleMode) {
    candidates.sort_by(|a, b| {
        if mode == CycleMode::Aggressive {
            b.has_pre_market_news
                .cmp(&a.has_pre_market_news)
                .then_with(|| b.combined_score.partial_cmp(&a.combined_score).unwrap())
        } else {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap()
                .then_with(|| b.has_pre_market_news.cmp(&a.has_pre_market_news))
        }
        .then_with(|| a.symbol.cmp(&b.symbol))
    });
}
