//! HTTP review source
//!
//! This module fetches review pages over plain HTTP, including:
//! - Building HTTP clients with a request timeout
//! - Rotating the user agent per request
//! - Loading the expanded ("show all") variant of a review page
//! - Classifying request failures as transient or fatal

use crate::config::SourceConfig;
use crate::crawler::{ReviewPage, ReviewSource, SourceError};
use crate::{ConfigError, CrawlError};
use async_trait::async_trait;
use reqwest::{header::USER_AGENT, Client};
use std::time::Duration;
use url::Url;

/// User agent sent when no rotation pool is configured
const DEFAULT_USER_AGENT: &str = concat!("review-crawler/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client for review fetching
///
/// # Arguments
///
/// * `config` - The review source configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &SourceConfig) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches review pages from an IMDb-style site
#[derive(Debug, Clone)]
pub struct HttpReviewSource {
    client: Client,
    base_url: Url,
    review_path: String,
    expand_path: String,
    user_agents: Vec<String>,
}

impl HttpReviewSource {
    pub fn new(config: &SourceConfig) -> Result<Self, CrawlError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        Ok(Self {
            client: build_http_client(config)?,
            base_url,
            review_path: config.review_path.clone(),
            expand_path: config.expand_path.clone(),
            user_agents: config.user_agents.clone(),
        })
    }

    fn page_url(&self, template: &str, id: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(&template.replace("{id}", id))
            .map_err(|e| SourceError::Fatal(format!("cannot build review URL for {}: {}", id, e)))
    }

    async fn get(&self, id: &str, url: Url) -> Result<ReviewPage, SourceError> {
        tracing::trace!("GET {}", url);

        let mut request = self.client.get(url);
        if !self.user_agents.is_empty() {
            let agent = &self.user_agents[fastrand::usize(..self.user_agents.len())];
            request = request.header(USER_AGENT, agent.as_str());
        }

        let response = request.send().await.map_err(|e| classify(id, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Navigation {
                id: id.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| classify(id, e))?;
        Ok(ReviewPage::new(id, body))
    }
}

/// Maps a request error onto the transient/fatal taxonomy
fn classify(id: &str, error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout { id: id.to_string() }
    } else if error.is_builder() {
        SourceError::Fatal(format!("invalid request for {}: {}", id, error))
    } else {
        SourceError::Navigation {
            id: id.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl ReviewSource for HttpReviewSource {
    async fn fetch_page(&self, id: &str) -> Result<ReviewPage, SourceError> {
        let url = self.page_url(&self.review_path, id)?;
        self.get(id, url).await
    }

    async fn expand_pagination(&self, page: &ReviewPage) -> Result<ReviewPage, SourceError> {
        let url = self.page_url(&self.expand_path, &page.id)?;
        self.get(&page.id, url).await
    }

    async fn close(&self) {
        tracing::debug!("Closing HTTP review source for {}", self.base_url);
    }
}
