//! Catalyst and technical scoring formulas.
//!
//! `catalyst_score` scales the sum of per-item weights onto a 0-100 band: a
//! single tier-1 earnings item one hour old in a regular session scores
//! `item_score ≈ 0.934`, `catalyst_score ≈ 93.4` —
//! the ×100 factor is carried here, not in `item_score` itself.

use crate::models::{KeywordCategory, MarketState, NewsItem};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub fn tier_weight(tier: u8) -> f64 {
    match tier {
        1 => 1.0,
        2 => 0.8,
        3 => 0.6,
        4 => 0.4,
        _ => 0.2,
    }
}

pub fn market_weight(state: MarketState) -> f64 {
    match state {
        MarketState::PreMarket => 2.0,
        MarketState::Regular => 1.0,
        MarketState::AfterHours => 0.8,
        MarketState::Weekend => 0.5,
    }
}

fn keyword_weight_one(category: KeywordCategory) -> f64 {
    match category {
        KeywordCategory::Earnings => 1.2,
        KeywordCategory::Fda => 1.5,
        KeywordCategory::Merger => 1.3,
        KeywordCategory::Bankruptcy => 1.3,
        KeywordCategory::Guidance => 1.15,
        _ => 1.0,
    }
}

/// Multiplicative composition of per-category weights, capped at 2.0.
pub fn keyword_weight(categories: &BTreeSet<KeywordCategory>) -> f64 {
    let product: f64 = categories.iter().map(|c| keyword_weight_one(*c)).product();
    if categories.is_empty() {
        1.0
    } else {
        product.min(2.0)
    }
}

fn age_hours(published_at: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    (at - published_at).num_seconds().max(0) as f64 / 3600.0
}

/// `W_tier · exp(-age_hours/4) · W_keyword · W_market`.
pub fn item_score(item: &NewsItem, at: DateTime<Utc>) -> f64 {
    tier_weight(item.source_tier)
        * (-age_hours(item.published_at, at) / 4.0).exp()
        * keyword_weight(&item.keywords)
        * market_weight(item.market_state)
}

/// `min(100, 100 · Σ item_score(n))` over a symbol's last-24h news.
pub fn catalyst_score<'a>(news: impl Iterator<Item = &'a NewsItem>, at: DateTime<Utc>) -> f64 {
    let sum: f64 = news.map(|n| item_score(n, at)).sum();
    (sum * 100.0).min(100.0)
}

/// `50 + 10·log10(relative_volume) + 2·price_change_pct`, clipped to [0,100].
pub fn technical_score(relative_volume: f64, price_change_pct: f64) -> f64 {
    let raw = 50.0 + 10.0 * relative_volume.max(f64::MIN_POSITIVE).log10() + 2.0 * price_change_pct;
    raw.clamp(0.0, 100.0)
}

/// `0.70·catalyst_score + 0.30·technical_score`.
pub fn combined_score(catalyst_score: f64, technical_score: f64) -> f64 {
    0.70 * catalyst_score + 0.30 * technical_score
}
