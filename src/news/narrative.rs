//! Coordinated-narrative detection: an hourly sweep that groups the last 24 h
//! of articles by `cluster_id` and flags clusters that look coordinated.

use crate::models::{NarrativeCluster, NewsItem};
use crate::persistence::{NewsRangeFilter, PersistencePort};
use crate::CoreError;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const MIN_ARTICLES: usize = 4;
const MIN_DISTINCT_SOURCES: usize = 3;
const MAX_SPREAD_HOURS: f64 = 2.0;

/// `min(100, 20*distinct_sources + 10*articles - 5*time_spread_hours)`, clamped
/// to zero.
pub fn coordination_score(distinct_sources: usize, articles: usize, time_spread_hours: f64) -> f64 {
    let raw = 20.0 * distinct_sources as f64 + 10.0 * articles as f64 - 5.0 * time_spread_hours;
    raw.min(100.0).max(0.0)
}

pub struct NarrativeSweep {
    persistence: Arc<dyn PersistencePort>,
}

impl NarrativeSweep {
    pub fn new(persistence: Arc<dyn PersistencePort>) -> Self {
        Self { persistence }
    }

    /// Run one sweep over the last 24 hours of news, persisting any cluster
    /// that meets the coordination thresholds.
    pub async fn run(&self) -> Result<Vec<NarrativeCluster>, CoreError> {
        let until = Utc::now();
        let since = until - ChronoDuration::hours(24);
        let items = self
            .persistence
            .read_news_range(since, until, NewsRangeFilter::default())
            .await?;

        let mut by_cluster: HashMap<String, Vec<NewsItem>> = HashMap::new();
        for item in items {
            if let Some(cluster_id) = item.cluster_id.clone() {
                by_cluster.entry(cluster_id).or_default().push(item);
            }
        }

        let mut persisted = Vec::new();
        for (cluster_id, articles) in by_cluster {
            if articles.len() < MIN_ARTICLES {
                continue;
            }
            let distinct_sources: std::collections::BTreeSet<&str> =
                articles.iter().map(|a| a.source.as_str()).collect();
            if distinct_sources.len() < MIN_DISTINCT_SOURCES {
                continue;
            }
            let earliest = articles.iter().map(|a| a.published_at).min().unwrap();
            let latest = articles.iter().map(|a| a.published_at).max().unwrap();
            let spread_hours = (latest - earliest).num_seconds() as f64 / 3600.0;
            if spread_hours >= MAX_SPREAD_HOURS {
                continue;
            }

            let score = coordination_score(distinct_sources.len(), articles.len(), spread_hours);
            let symbol = articles
                .iter()
                .find_map(|a| a.primary_symbol.clone())
                .unwrap_or_default();
            let keyword_categories = articles
                .iter()
                .flat_map(|a| a.keywords.iter().copied())
                .collect();

            let cluster = NarrativeCluster {
                cluster_id,
                symbol,
                keyword_categories,
                article_count: articles.len() as u32,
                distinct_sources: distinct_sources.len() as u32,
                time_spread_hours: spread_hours,
                coordination_score: score,
                window_start: earliest,
                window_end: latest,
            };
            self.persistence.insert_narrative_cluster(&cluster).await?;
            persisted.push(cluster);
        }

        info!(clusters = persisted.len(), "coordinated-narrative sweep complete");
        Ok(persisted)
    }

    /// Persisted clusters with a window overlapping the last `hours`, for the
    /// `coordinated_narratives` operator view (does not trigger a fresh sweep).
    pub async fn recent(&self, hours: i64) -> Result<Vec<NarrativeCluster>, CoreError> {
        let since = Utc::now() - ChronoDuration::hours(hours);
        self.persistence.read_narrative_clusters(since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_matches_weighted_formula() {
        assert_eq!(coordination_score(3, 4, 1.0), 20.0 * 3.0 + 10.0 * 4.0 - 5.0);
    }

    #[test]
    fn score_is_clamped_to_one_hundred() {
        assert_eq!(coordination_score(10, 20, 0.0), 100.0);
    }

    #[test]
    fn score_never_goes_negative() {
        assert_eq!(coordination_score(0, 0, 50.0), 0.0);
    }
}
