//! Raw-article normalization: fingerprinting, ticker extraction, keyword
//! lexicon matching, and narrative-cluster id derivation.

use crate::clock::SessionWindows;
use crate::models::{KeywordCategory, MarketState};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn ticker_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$?\b[A-Z]{1,5}\b").unwrap())
}

/// A minimal known-symbol allow-list. In production this is seeded from the
/// persistence port's symbol universe table; tests exercise it directly.
pub fn is_known_symbol(allowlist: &BTreeSet<String>, candidate: &str) -> bool {
    allowlist.contains(candidate)
}

/// Strip common tracking query parameters (utm_*, fbclid, gclid) from a URL.
/// Falls back to the original string if it does not parse as a URL.
pub fn strip_tracking_params(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            !(key.starts_with("utm_") || key == "fbclid" || key == "gclid" || key == "ref")
        })
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

fn normalize_headline_for_hash(headline: &str) -> String {
    headline.trim().to_lowercase()
}

/// SHA-256 fingerprint over `(normalized_headline, source, rounded_published_minute)`,
/// truncated to 64 hex characters. A pure function of its
/// inputs: identical articles always hash identically.
pub fn fingerprint(headline: &str, source: &str, published_at: DateTime<Utc>) -> String {
    let rounded = published_at
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(published_at);
    let mut hasher = Sha256::new();
    hasher.update(normalize_headline_for_hash(headline).as_bytes());
    hasher.update([0x1f]);
    hasher.update(source.as_bytes());
    hasher.update([0x1f]);
    hasher.update(rounded.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract mentioned tickers: `\$?[A-Z]{1,5}\b` filtered against an allow-list
/// of known symbols.
pub fn extract_tickers(text: &str, allowlist: &BTreeSet<String>) -> BTreeSet<String> {
    ticker_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim_start_matches('$').to_string())
        .filter(|sym| is_known_symbol(allowlist, sym))
        .collect()
}

pub fn classify_market_state(
    windows: &SessionWindows,
    published_at: DateTime<Utc>,
    tz: Tz,
) -> MarketState {
    windows.classify(published_at, tz)
}

/// Case-insensitive substring lexicon. Real deployments load this from
/// configuration; these defaults cover the recognized catalyst categories.
pub fn default_lexicon() -> Vec<(KeywordCategory, &'static [&'static str])> {
    vec![
        (KeywordCategory::Earnings, &["earnings", "eps", "quarterly results", "revenue beat"]),
        (KeywordCategory::Fda, &["fda", "clinical trial", "phase 3", "drug approval"]),
        (KeywordCategory::Merger, &["merger", "acquisition", "acquire", "buyout"]),
        (KeywordCategory::Guidance, &["guidance", "outlook", "forecast raised", "forecast cut"]),
        (KeywordCategory::Lawsuit, &["lawsuit", "litigation", "sec investigation", "subpoena"]),
        (KeywordCategory::Bankruptcy, &["bankruptcy", "chapter 11", "insolvency"]),
        (KeywordCategory::Insider, &["insider buying", "insider selling", "form 4"]),
        (KeywordCategory::Short, &["short interest", "short squeeze", "short seller"]),
        (KeywordCategory::Pump, &["pump", "hype", "moon"]),
        (KeywordCategory::Dump, &["dump", "sell-off", "selloff"]),
        (KeywordCategory::Breakthrough, &["breakthrough", "milestone", "patent granted"]),
        (KeywordCategory::Concerns, &["concerns", "warning", "downgrade", "recall"]),
    ]
}

pub fn extract_keywords(
    headline: &str,
    lexicon: &[(KeywordCategory, &[&str])],
) -> BTreeSet<KeywordCategory> {
    let lower = headline.to_lowercase();
    lexicon
        .iter()
        .filter(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
        .map(|(cat, _)| *cat)
        .collect()
}

fn breaking_news_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(breaking|just in|developing|alert)\b").unwrap()
    })
}

/// `is_breaking_news = (tier ≤ 2) ∧ (age < 30 min) ∧ (headline matches breaking pattern)`.
pub fn is_breaking_news(
    tier: u8,
    published_at: DateTime<Utc>,
    collected_at: DateTime<Utc>,
    headline: &str,
) -> bool {
    let age_minutes = (collected_at - published_at).num_minutes();
    tier <= 2 && age_minutes < 30 && age_minutes >= 0 && breaking_news_pattern().is_match(headline)
}

/// `cluster_id = sha1(symbol || date || sorted(keyword_categories))`, only
/// when a primary symbol is known.
pub fn cluster_id(
    symbol: Option<&str>,
    published_at: DateTime<Utc>,
    keywords: &BTreeSet<KeywordCategory>,
) -> Option<String> {
    let symbol = symbol?;
    let date = published_at.format("%Y-%m-%d").to_string();
    let keyword_str: String = keywords.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",");
    let mut hasher = sha1::Sha1::new();
    use sha1::Digest as Sha1Digest;
    hasher.update(symbol.as_bytes());
    hasher.update([0x1f]);
    hasher.update(date.as_bytes());
    hasher.update([0x1f]);
    hasher.update(keyword_str.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identical_articles_hash_identically() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 13, 5, 0).unwrap();
        let a = fingerprint("ACME beats Q3 earnings", "Reuters", at);
        let b = fingerprint("  ACME Beats Q3 Earnings  ", "Reuters", at);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_source_changes_fingerprint() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 13, 5, 0).unwrap();
        let a = fingerprint("ACME beats Q3 earnings", "Reuters", at);
        let b = fingerprint("ACME beats Q3 earnings", "Bloomberg", at);
        assert_ne!(a, b);
    }

    #[test]
    fn strips_utm_params_but_keeps_meaningful_query() {
        let url = "https://example.com/a?utm_source=x&id=42&fbclid=abc";
        assert_eq!(strip_tracking_params(url), "https://example.com/a?id=42");
    }

    #[test]
    fn extracts_allowlisted_tickers_only() {
        let allow = BTreeSet::from(["ACME".to_string(), "FOO".to_string()]);
        let found = extract_tickers("ACME and ZZZZZ both moved, $FOO too", &allow);
        assert_eq!(found, BTreeSet::from(["ACME".to_string(), "FOO".to_string()]));
    }

    #[test]
    fn extracts_multiple_keyword_categories() {
        let lexicon = default_lexicon();
        let found = extract_keywords("ACME reports earnings beat; FDA approval expected", &lexicon);
        assert!(found.contains(&KeywordCategory::Earnings));
        assert!(found.contains(&KeywordCategory::Fda));
    }

    #[test]
    fn breaking_news_requires_recency_and_low_tier() {
        let published = Utc.with_ymd_and_hms(2025, 1, 15, 13, 0, 0).unwrap();
        let fresh = published + chrono::Duration::minutes(5);
        let stale = published + chrono::Duration::minutes(45);
        assert!(is_breaking_news(1, published, fresh, "BREAKING: ACME halts trading"));
        assert!(!is_breaking_news(1, published, stale, "BREAKING: ACME halts trading"));
        assert!(!is_breaking_news(4, published, fresh, "BREAKING: ACME halts trading"));
        assert!(!is_breaking_news(1, published, fresh, "ACME halts trading"));
    }

    #[test]
    fn cluster_id_is_none_without_symbol() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 13, 0, 0).unwrap();
        let keywords = BTreeSet::from([KeywordCategory::Fda]);
        assert!(cluster_id(None, at, &keywords).is_none());
        assert!(cluster_id(Some("ACME"), at, &keywords).is_some());
    }

    #[test]
    fn cluster_id_is_stable_regardless_of_keyword_insertion_order() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 13, 0, 0).unwrap();
        let a = BTreeSet::from([KeywordCategory::Fda, KeywordCategory::Merger]);
        let b = BTreeSet::from([KeywordCategory::Merger, KeywordCategory::Fda]);
        assert_eq!(cluster_id(Some("ACME"), at, &a), cluster_id(Some("ACME"), at, &b));
    }
}
