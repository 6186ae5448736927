//! Page fetching.
//!
//! The scrape pipeline only needs "give me the markup for this URL", so
//! transports sit behind the [`Fetcher`] trait:
//!
//! | Config Value | Fetcher |
//! |--------------|---------|
//! | `"http"` | [`HttpFetcher`], plain GET |
//! | `"firecrawl"` | [`FirecrawlFetcher`], Firecrawl `/v1/scrape` |
//!
//! A response without markup counts as a failure for both.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::{FetchConfig, ScrapeConfig};
use crate::error::FetchError;

/// Options forwarded to the fetch backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Ask the backend to drop navigation, headers, and footers.
    pub only_main_content: bool,
    /// Output formats requested from the backend (e.g. `html`).
    pub formats: Vec<String>,
}

impl FetchOptions {
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self {
            only_main_content: config.only_main_content,
            formats: config.formats.clone(),
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&ScrapeConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub markup: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedPage, FetchError>;
}

/// Build the fetcher selected by `fetch.provider`.
pub fn create_fetcher(config: &FetchConfig) -> Result<Box<dyn Fetcher>, FetchError> {
    match config.provider.as_str() {
        "firecrawl" => Ok(Box::new(FirecrawlFetcher::from_config(config)?)),
        _ => Ok(Box::new(HttpFetcher::new(config.timeout_secs)?)),
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    Url::parse(url).map_err(|source| FetchError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

fn build_client(timeout_secs: u64, url: &str) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("shelf/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
}

// ============ Plain HTTP ============

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout_secs, "<client>")?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str, _options: &FetchOptions) -> Result<FetchedPage, FetchError> {
        let parsed = parse_url(url)?;
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(parsed).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let markup = response.text().await.map_err(transport)?;
        if markup.trim().is_empty() {
            return Err(FetchError::EmptyPayload {
                url: url.to_string(),
            });
        }

        Ok(FetchedPage {
            url: url.to_string(),
            markup,
        })
    }
}

// ============ Firecrawl ============

/// Fetches through the Firecrawl scrape API.
///
/// Requires the API key in the environment variable named by
/// `fetch.api_key_env` (default `FIRECRAWL_API_KEY`).
pub struct FirecrawlFetcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct FirecrawlResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<FirecrawlData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlData {
    #[serde(default)]
    html: Option<String>,
}

impl FirecrawlFetcher {
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| FetchError::MissingCredential(config.api_key_env.clone()))?;
        Self::new(&config.endpoint, api_key, config.timeout_secs)
    }

    pub fn new(endpoint: &str, api_key: String, timeout_secs: u64) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout_secs, endpoint)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Fetcher for FirecrawlFetcher {
    fn name(&self) -> &str {
        "firecrawl"
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedPage, FetchError> {
        parse_url(url)?;
        let api_url = format!("{}/v1/scrape", self.endpoint);
        let transport = |source| FetchError::Transport {
            url: api_url.clone(),
            source,
        };

        let body = serde_json::json!({
            "url": url,
            "formats": options.formats,
            "onlyMainContent": options.only_main_content,
        });
        tracing::debug!(%api_url, params = %body, "requesting firecrawl scrape");

        let response = self
            .client
            .post(&api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: api_url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: FirecrawlResponse = response.json().await.map_err(transport)?;
        if !parsed.success {
            tracing::warn!(error = parsed.error.as_deref().unwrap_or(""), "firecrawl reported failure");
        }

        let markup = parsed
            .data
            .and_then(|data| data.html)
            .filter(|html| !html.trim().is_empty())
            .ok_or_else(|| FetchError::EmptyPayload {
                url: url.to_string(),
            })?;

        Ok(FetchedPage {
            url: url.to_string(),
            markup,
        })
    }
}
