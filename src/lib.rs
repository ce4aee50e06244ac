//! Review Crawler: a resumable bulk review crawler
//!
//! This crate drives a bounded pool of fetches over an ordered list of title
//! identifiers, retrying transient failures, checkpointing the contiguous
//! progress of the run and periodically pushing the accumulated output to a
//! durable sync target.

pub mod config;
pub mod crawler;
pub mod dataset;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for pipeline-scope failures
///
/// Per-item fetch failures never surface here; they are normalized into
/// [`crawler::FetchOutcome`] values. Everything in this enum terminates a run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] dataset::DatasetError),

    #[error("Checkpoint storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Fatal review source error while fetching {id}: {message}")]
    FatalSource { id: String, message: String },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid pipeline transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PipelineState,
        to: state::PipelineState,
    },

    #[error("Dataset '{dataset}' contains no work items")]
    EmptyWorkList { dataset: String },

    #[error("No saved checkpoint to resume from")]
    NothingToResume,

    #[error("Worker task for {id} failed: {message}")]
    Worker { id: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchOutcome, Orchestrator, RetryingFetcher, ReviewSource, WorkerPool};
pub use dataset::WorkItem;
pub use state::PipelineState;
pub use storage::{Checkpoint, CheckpointStore, FileCheckpointStore};
