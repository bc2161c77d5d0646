//! HTTP Evidence Provider
//!
//! Talks to the public status page, a social search API, a web search API
//! and arbitrary result pages over one shared HTTP client.

use crate::error::EvidenceError;
use crate::text::{extract_page_text, parse_post_time, RawText};
use crate::EvidenceProvider;
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("StatusSentinel/", env!("CARGO_PKG_VERSION"));

/// Hard caps imposed by the upstream search APIs
const MAX_SOCIAL_LIMIT: usize = 20;
const MAX_WEB_RESULTS: usize = 5;

/// Evidence provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Status page summary endpoint (statuspage.io v2 format)
    pub status_url: String,
    /// Social search endpoint
    pub social_search_url: String,
    /// Social search API key; social evidence is skipped when unset
    pub social_api_key: Option<String>,
    /// Number of posts requested per search (capped at 20)
    pub social_limit: usize,
    /// Web search endpoint (Custom Search JSON API)
    pub web_search_url: String,
    /// Web search API key; web evidence is skipped when unset
    pub web_api_key: Option<String>,
    /// Web search engine id
    pub web_search_cx: Option<String>,
    /// Number of web results requested (capped at 5)
    pub web_results: usize,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Retries on 429/5xx and transport errors
    pub max_retries: u8,
    /// Retry backoff base in milliseconds, doubled per attempt
    pub retry_backoff_ms: u64,
    /// Total time one call may spend across attempts and backoff
    /// (milliseconds). Must stay below the caller's own timeout so the last
    /// failure is reported instead of cancelled.
    pub retry_budget_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            status_url: "https://status.vrchat.com/api/v2/status.json".to_string(),
            social_search_url: "https://api.twitterapi.io/twitter/tweet/advanced_search".to_string(),
            social_api_key: None,
            social_limit: 10,
            web_search_url: "https://www.googleapis.com/customsearch/v1".to_string(),
            web_api_key: None,
            web_search_cx: None,
            web_results: 3,
            request_timeout_ms: 5_000,
            max_retries: 3,
            retry_backoff_ms: 1000,
            retry_budget_ms: 12_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusPage {
    status: StatusIndicator,
}

#[derive(Debug, Deserialize)]
struct StatusIndicator {
    #[serde(default)]
    indicator: String,
    #[serde(default)]
    description: String,
}

/// Evidence provider backed by real HTTP endpoints
pub struct HttpEvidenceProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpEvidenceProvider {
    /// Create a new provider with its own connection pool
    pub fn new(config: ProviderConfig) -> Result<Self, EvidenceError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| EvidenceError::Transport {
                source_name: "http-client",
                message: e.to_string(),
            })?;

        info!(
            "Creating HTTP evidence provider (social: {}, web: {})",
            config.social_api_key.is_some(),
            config.web_api_key.is_some() && config.web_search_cx.is_some()
        );

        Ok(Self { client, config })
    }

    /// Send a request, retrying throttling, server errors and transport
    /// failures with exponential backoff inside `retry_budget_ms`.
    ///
    /// When the next backoff would overrun the budget the last failure is
    /// returned as is.
    async fn send_with_retry<F>(&self, source: &'static str, build: F) -> Result<Response, EvidenceError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let deadline = Instant::now() + Duration::from_millis(self.config.retry_budget_ms);
        let request_timeout = Duration::from_millis(self.config.request_timeout_ms);
        let mut attempt: u8 = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let failure = match build().timeout(request_timeout.min(remaining)).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let failure = EvidenceError::Status {
                        source_name: source,
                        status: response.status().as_u16(),
                    };
                    if !is_retryable(response.status()) {
                        return Err(failure);
                    }
                    failure
                }
                Err(e) if e.is_builder() => return Err(map_transport(source, e, self.config.request_timeout_ms)),
                Err(e) => map_transport(source, e, self.config.request_timeout_ms),
            };

            if attempt >= self.config.max_retries {
                return Err(failure);
            }
            let delay = Duration::from_millis(
                self.config
                    .retry_backoff_ms
                    .saturating_mul(1u64 << u32::from(attempt.min(16))),
            );
            if Instant::now() + delay >= deadline {
                warn!("{} retry budget spent after {} attempt(s): {}", source, attempt + 1, failure);
                return Err(failure);
            }

            warn!("{} failed (attempt {}): {}, retrying", source, attempt + 1, failure);
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }

    async fn read_json(source: &'static str, response: Response) -> Result<Value, EvidenceError> {
        response.json::<Value>().await.map_err(|e| EvidenceError::InvalidResponse {
            source_name: source,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl EvidenceProvider for HttpEvidenceProvider {
    async fn fetch_official_status(&self) -> Result<Option<RawText>, EvidenceError> {
        const SOURCE: &str = "status-page";
        let response = self
            .send_with_retry(SOURCE, || self.client.get(&self.config.status_url))
            .await?;

        let page: StatusPage = response.json().await.map_err(|e| EvidenceError::InvalidResponse {
            source_name: SOURCE,
            message: e.to_string(),
        })?;

        let indicator = if page.status.indicator.is_empty() {
            "unknown"
        } else {
            page.status.indicator.as_str()
        };
        debug!("Official status indicator: {}", indicator);

        Ok(Some(RawText::new(format!(
            "Official status: {} - {}",
            indicator, page.status.description
        ))))
    }

    async fn search_social(&self, query: &str) -> Result<Vec<RawText>, EvidenceError> {
        const SOURCE: &str = "social-search";
        let Some(api_key) = self.config.social_api_key.as_deref() else {
            debug!("Social search API key not set, skipping");
            return Ok(Vec::new());
        };

        let final_query = if query.contains("filter:") {
            query.to_string()
        } else {
            format!("{} -filter:retweets", query)
        };
        let limit = self.config.social_limit.min(MAX_SOCIAL_LIMIT).to_string();

        let response = self
            .send_with_retry(SOURCE, || {
                self.client
                    .get(&self.config.social_search_url)
                    .header("X-API-Key", api_key)
                    .query(&[
                        ("query", final_query.as_str()),
                        ("queryType", "Latest"),
                        ("limit", limit.as_str()),
                    ])
            })
            .await?;
        let body = Self::read_json(SOURCE, response).await?;

        let posts = body["tweets"]
            .as_array()
            .map(|tweets| tweets.iter().filter_map(render_post).collect::<Vec<_>>())
            .unwrap_or_default();
        debug!("Social search returned {} posts", posts.len());
        Ok(posts)
    }

    async fn search_web(&self, query: &str) -> Result<Vec<RawText>, EvidenceError> {
        const SOURCE: &str = "web-search";
        let (Some(api_key), Some(cx)) = (
            self.config.web_api_key.as_deref(),
            self.config.web_search_cx.as_deref(),
        ) else {
            debug!("Web search API key/cx not set, skipping");
            return Ok(Vec::new());
        };

        let num = self.config.web_results.min(MAX_WEB_RESULTS).to_string();
        let response = self
            .send_with_retry(SOURCE, || {
                self.client.get(&self.config.web_search_url).query(&[
                    ("key", api_key),
                    ("cx", cx),
                    ("q", query),
                    ("num", num.as_str()),
                ])
            })
            .await?;
        let body = Self::read_json(SOURCE, response).await?;

        let hits = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        RawText::new(format!(
                            "Title: {}\nURL: {}\nSnippet: {}",
                            item["title"].as_str().unwrap_or("No Title"),
                            item["link"].as_str().unwrap_or(""),
                            item["snippet"].as_str().unwrap_or("")
                        ))
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        debug!("Web search returned {} results", hits.len());
        Ok(hits)
    }

    async fn fetch_page(&self, url: &str) -> Result<Option<RawText>, EvidenceError> {
        const SOURCE: &str = "page-fetch";
        let response = self.send_with_retry(SOURCE, || self.client.get(url)).await?;
        let html = response.text().await.map_err(|e| EvidenceError::InvalidResponse {
            source_name: SOURCE,
            message: e.to_string(),
        })?;

        let text = extract_page_text(&html);
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawText::new(format!("URL: {}\n\n{}", url, text))))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

fn map_transport(source: &'static str, err: reqwest::Error, timeout_ms: u64) -> EvidenceError {
    if err.is_timeout() {
        EvidenceError::Timeout(source, timeout_ms)
    } else {
        EvidenceError::Transport {
            source_name: source,
            message: err.to_string(),
        }
    }
}

fn render_post(tweet: &Value) -> Option<RawText> {
    let text = tweet["text"].as_str()?;
    let author = tweet
        .get("author")
        .filter(|a| a.is_object())
        .or_else(|| tweet.get("user"))
        .and_then(|a| a["userName"].as_str())
        .unwrap_or("unknown");
    let created_at = tweet["createdAt"]
        .as_str()
        .or_else(|| tweet["created_at"].as_str())
        .unwrap_or("");
    // Normalized so the investigation stage can read post times back
    let created_at = parse_post_time(created_at)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| created_at.to_string());
    Some(RawText::new(format!("@{} ({}): {}", author, created_at, text)))
}
