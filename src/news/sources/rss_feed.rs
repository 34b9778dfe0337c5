//! RSS/Atom feed news source.

use crate::news::source::{NewsSource, RateSpec, RawArticle};
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rss::Channel;
use std::time::Duration;

pub struct RssSource {
    client: reqwest::Client,
    name: String,
    tier: u8,
    feed_url: String,
    rate_limit: RateSpec,
}

impl RssSource {
    pub fn new(
        name: impl Into<String>,
        tier: u8,
        feed_url: impl Into<String>,
        rate_limit: RateSpec,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client"),
            name: name.into(),
            tier,
            feed_url: feed_url.into(),
            rate_limit,
        }
    }
}

#[async_trait]
impl NewsSource for RssSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn source_tier(&self) -> u8 {
        self.tier
    }

    fn rate_limit(&self) -> RateSpec {
        self.rate_limit
    }

    async fn fetch(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>, CoreError> {
        let bytes = self
            .client
            .get(&self.feed_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let channel = Channel::read_from(&bytes[..])
            .map_err(|e| CoreError::TransientNetwork(format!("rss parse: {e}")))?;

        let articles = channel
            .items()
            .iter()
            .filter_map(|item| {
                let published_at = item
                    .pub_date()
                    .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                    .map(|d| d.with_timezone(&Utc))?;
                if published_at < since {
                    return None;
                }
                Some(RawArticle {
                    headline: item.title().unwrap_or_default().to_string(),
                    source_url: item.link().map(|s| s.to_string()),
                    published_at,
                    content_snippet: item.description().unwrap_or_default().to_string(),
                })
            })
            .take(limit)
            .collect();
        Ok(articles)
    }
}
