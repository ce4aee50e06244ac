//! Output traits and types
//!
//! This module defines the record written for every completed item and the
//! trait interface for remote sync targets.

use crate::crawler::FetchOutcome;
use crate::dataset::WorkItem;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output sink writer has stopped")]
    Closed,

    #[error("Sync to {target} failed: {message}")]
    Sync { target: String, message: String },

    #[error("Invalid sync target: {0}")]
    InvalidTarget(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One row of the output sink, plus the review texts behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    /// Title id
    pub id: String,

    /// Extracted review count; `None` when every attempt failed
    pub review_count: Option<usize>,

    /// Review texts, written to a per-title file when one is configured
    pub reviews: Vec<String>,
}

impl OutputRecord {
    pub fn from_outcome(item: &WorkItem, outcome: &FetchOutcome) -> Self {
        let reviews = match outcome {
            FetchOutcome::Success { records, .. } => records.clone(),
            _ => Vec::new(),
        };

        Self {
            id: item.id.clone(),
            review_count: outcome.record_count(),
            reviews,
        }
    }
}

/// Durable remote store receiving whole-file snapshots of the output sink
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Short description for log lines (e.g. `dir:/mnt/backup/reviews`)
    fn describe(&self) -> String;

    /// Uploads `local` under `object_name`, replacing any previous copy
    async fn push(&self, local: &Path, object_name: &str) -> OutputResult<()>;
}
