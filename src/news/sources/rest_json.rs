//! REST-JSON news source with keyed auth, e.g. a newswire's article-search
//! endpoint: a bare `reqwest::Client`, a tiny response DTO, and a
//! `fetch`-shaped entry point.

use crate::news::source::{NewsSource, RateSpec, RawArticle};
use crate::CoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ApiArticle {
    title: String,
    url: Option<String>,
    published_at: DateTime<Utc>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    articles: Vec<ApiArticle>,
}

pub struct RestJsonSource {
    client: reqwest::Client,
    name: String,
    tier: u8,
    endpoint: String,
    api_key: String,
    rate_limit: RateSpec,
}

impl RestJsonSource {
    pub fn new(
        name: impl Into<String>,
        tier: u8,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
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
            api_key: api_key.into(),
            rate_limit,
        }
    }
}

#[async_trait]
impl NewsSource for RestJsonSource {
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
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.api_key)
            .query(&[("since", since.to_rfc3339()), ("limit", limit.to_string())])
            .send()
            .await?
            .error_for_status()?;

        let body: ApiResponse = response.json().await?;
        Ok(body
            .articles
            .into_iter()
            .take(limit)
            .map(|a| RawArticle {
                headline: a.title,
                source_url: a.url,
                published_at: a.published_at,
                content_snippet: a.summary,
            })
            .collect())
    }
}
