//! The fetch capability the crawler drives
//!
//! A `ReviewSource` knows how to load the review page of one title and how
//! to reveal every review on it. The HTTP implementation lives in
//! [`crate::crawler::HttpReviewSource`]; tests substitute scripted doubles.

use async_trait::async_trait;
use thiserror::Error;

/// Raw content of a title's review page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPage {
    /// Title the page belongs to
    pub id: String,

    /// Page HTML
    pub body: String,
}

impl ReviewPage {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
        }
    }
}

/// Failures reported by a review source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Timed out loading reviews for {id}")]
    Timeout { id: String },

    #[error("Navigation to reviews for {id} failed: {message}")]
    Navigation { id: String, message: String },

    #[error("Unexpected review page for {id}: {message}")]
    MalformedPage { id: String, message: String },

    #[error("{0}")]
    Fatal(String),
}

impl SourceError {
    /// Returns true if the same fetch may succeed when tried again
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Loads the review page for `id`
    async fn fetch_page(&self, id: &str) -> Result<ReviewPage, SourceError>;

    /// Reveals all reviews on a page whose declared total crosses the expansion threshold
    async fn expand_pagination(&self, page: &ReviewPage) -> Result<ReviewPage, SourceError>;

    /// Releases whatever the source holds; called once when a run ends
    async fn close(&self) {}
}
