//! Paginated-search news source: walks numbered pages until a page returns
//! fewer than the page size or the overall `limit` is reached.

use crate::news::source::{NewsSource, RateSpec, RawArticle};
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct PageArticle {
    headline: String,
    link: Option<String>,
    #[serde(rename = "date")]
    published_at: DateTime<Utc>,
    #[serde(default)]
    excerpt: String,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    results: Vec<PageArticle>,
}

const PAGE_SIZE: usize = 25;
const MAX_PAGES: usize = 20;

pub struct PaginatedSearchSource {
    client: reqwest::Client,
    name: String,
    tier: u8,
    endpoint: String,
    rate_limit: RateSpec,
}

impl PaginatedSearchSource {
    pub fn new(
        name: impl Into<String>,
        tier: u8,
        endpoint: impl Into<String>,
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
            endpoint: endpoint.into(),
            rate_limit,
        }
    }
}

#[async_trait]
impl NewsSource for PaginatedSearchSource {
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
        let mut collected = Vec::new();
        for page in 0..MAX_PAGES {
            if collected.len() >= limit {
                break;
            }
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("since", since.to_rfc3339()),
                    ("page", page.to_string()),
                    ("page_size", PAGE_SIZE.to_string()),
                ])
                .send()
                .await?
                .error_for_status()?;
            let body: PageResponse = response.json().await?;
            let returned = body.results.len();
            collected.extend(body.results.into_iter().map(|a| RawArticle {
                headline: a.headline,
                source_url: a.link,
                published_at: a.published_at,
                content_snippet: a.excerpt,
            }));
            if returned < PAGE_SIZE {
                break;
            }
        }
        collected.truncate(limit);
        Ok(collected)
    }
}
