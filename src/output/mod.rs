//! Output module for crawl results
//!
//! This module handles:
//! - The append-only output sink, written by a single writer task
//! - Per-title review files
//! - Periodic snapshots of the sink to a remote sync target
//! - Run summaries and sink statistics

mod sink;
pub mod stats;
mod sync;
mod traits;

pub use sink::{OutputSink, SINK_HEADER};
pub use stats::{load_sink_statistics, print_sink_statistics, print_summary, RunSummary, SinkStatistics};
pub use sync::{
    build_sync_target, object_name_for, DirectoryTarget, HttpTarget, RemoteSync, SyncScheduler,
};
pub use traits::{OutputError, OutputRecord, OutputResult, SyncTarget};
