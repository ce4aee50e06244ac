//! Per-item fetch with bounded retries
//!
//! This module turns one work item into one [`FetchOutcome`]:
//! - Loads the review page through the [`ReviewSource`]
//! - Short-circuits titles that declare zero reviews
//! - Expands pagination when the declared total crosses a threshold
//! - Retries transient failures under a [`BackoffPolicy`]
//!
//! Only fatal source errors escape as `Err`; everything else is an outcome.

use crate::config::Config;
use crate::crawler::{BackoffPolicy, PageParser, ReviewPage, ReviewSource, SourceError};
use crate::dataset::WorkItem;
use crate::{ConfigResult, CrawlError};
use std::sync::Arc;

/// Terminal result of fetching one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page was read and its reviews extracted
    Success {
        /// Total the page declared, which may exceed what was extracted
        declared_total: u64,
        /// Review texts in page order
        records: Vec<String>,
    },

    /// The title exists but declares no reviews
    EmptyResult,

    /// Every attempt failed with a transient error
    ExhaustedFailure {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last_error: String,
    },
}

impl FetchOutcome {
    /// Number of records for the output sink; `None` when the item failed
    pub fn record_count(&self) -> Option<usize> {
        match self {
            Self::Success { records, .. } => Some(records.len()),
            Self::EmptyResult => Some(0),
            Self::ExhaustedFailure { .. } => None,
        }
    }
}

/// Attempt bookkeeping for a single fetch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Failed attempts so far
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
        }
    }

    /// Counts a failed attempt and reports whether another one is allowed
    pub fn record_failure(&mut self) -> bool {
        self.attempt += 1;
        self.attempt < self.max_attempts
    }
}

/// Fetches work items through a review source, retrying transient failures
pub struct RetryingFetcher {
    source: Arc<dyn ReviewSource>,
    parser: PageParser,
    max_attempts: u32,
    expansion_threshold: u64,
    backoff: BackoffPolicy,
}

impl RetryingFetcher {
    pub fn new(
        source: Arc<dyn ReviewSource>,
        parser: PageParser,
        max_attempts: u32,
        expansion_threshold: u64,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            source,
            parser,
            max_attempts: max_attempts.max(1),
            expansion_threshold,
            backoff,
        }
    }

    /// Builds a fetcher from the `[crawler]` and `[source]` sections
    pub fn from_config(source: Arc<dyn ReviewSource>, config: &Config) -> ConfigResult<Self> {
        Ok(Self::new(
            source,
            PageParser::from_config(&config.source)?,
            config.crawler.max_attempts,
            config.crawler.expansion_threshold,
            BackoffPolicy::from_config(&config.crawler),
        ))
    }

    pub fn source(&self) -> &Arc<dyn ReviewSource> {
        &self.source
    }

    /// Fetches one item to a terminal outcome
    ///
    /// # Returns
    ///
    /// * `Ok(FetchOutcome)` - Success, an empty result, or exhaustion after `max_attempts`
    /// * `Err(CrawlError::FatalSource)` - The source reported a non-retryable error
    pub async fn fetch(&self, item: &WorkItem) -> Result<FetchOutcome, CrawlError> {
        let mut state = RetryState::new(self.max_attempts);

        loop {
            let error = match self.attempt(item).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if !e.is_transient() => {
                    return Err(CrawlError::FatalSource {
                        id: item.id.clone(),
                        message: e.to_string(),
                    })
                }
                Err(e) => e,
            };

            if !state.record_failure() {
                tracing::error!(
                    "Giving up on {} ({}) after {} attempts: {}",
                    item.id,
                    item.label,
                    state.attempt,
                    error
                );
                return Ok(FetchOutcome::ExhaustedFailure {
                    attempts: state.attempt,
                    last_error: error.to_string(),
                });
            }

            let delay = self.backoff.delay(state.attempt);
            tracing::warn!(
                "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                state.attempt,
                state.max_attempts,
                item.id,
                error,
                delay
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn attempt(&self, item: &WorkItem) -> Result<FetchOutcome, SourceError> {
        let page = self.source.fetch_page(&item.id).await?;

        let declared_total = self
            .parser
            .declared_total(&page.body)
            .map_err(|message| SourceError::MalformedPage {
                id: item.id.clone(),
                message,
            })?;

        if declared_total == 0 {
            tracing::debug!("{} declares no reviews", item.id);
            return Ok(FetchOutcome::EmptyResult);
        }

        let page = if declared_total >= self.expansion_threshold {
            self.expand(page).await?
        } else {
            page
        };

        let records = self.parser.extract_reviews(&page.body);
        tracing::debug!(
            "Extracted {} of {} declared reviews for {}",
            records.len(),
            declared_total,
            item.id
        );

        Ok(FetchOutcome::Success {
            declared_total,
            records,
        })
    }

    /// Expands the page, keeping the unexpanded one after a transient failure
    async fn expand(&self, page: ReviewPage) -> Result<ReviewPage, SourceError> {
        match self.source.expand_pagination(&page).await {
            Ok(expanded) => Ok(expanded),
            Err(e) if !e.is_transient() => Err(e),
            Err(e) => {
                tracing::warn!("Could not expand reviews for {}, keeping first page: {}", page.id, e);
                Ok(page)
            }
        }
    }
}
