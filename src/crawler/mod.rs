//! Crawler module for fetching review pages
//!
//! This module contains the core crawling logic, including:
//! - The review source interface and its HTTP implementation
//! - Review page parsing
//! - Per-item fetching with retry and backoff
//! - The bounded worker pool
//! - Overall run coordination

mod backoff;
mod coordinator;
mod fetcher;
mod http;
mod parser;
mod pool;
mod source;

pub use backoff::BackoffPolicy;
pub use coordinator::{Orchestrator, RunPlan, StartPosition};
pub use fetcher::{FetchOutcome, RetryState, RetryingFetcher};
pub use http::{build_http_client, HttpReviewSource};
pub use parser::{parse_total_count, PageParser};
pub use pool::{Completion, JitterRange, PoolReport, PoolRun, WorkerPool};
pub use source::{ReviewPage, ReviewSource, SourceError};
