//! Run summaries and output sink statistics
//!
//! This module provides the summary printed when a run ends and the
//! statistics shown by `--stats` for an existing output sink.

use crate::crawler::FetchOutcome;
use crate::output::{OutputError, OutputResult};
use crate::state::PipelineState;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;

/// Outcome counts for one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub dataset_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub final_state: PipelineState,

    /// Index of the first item this run processed
    pub start_index: usize,

    /// Items in the loaded work list
    pub total_items: usize,

    pub successes: usize,
    pub empty: usize,
    pub exhausted: usize,

    /// Review texts extracted across all successes
    pub records: usize,

    /// Items never fetched because the run was stopped
    pub unsubmitted: usize,

    pub cancelled: bool,

    /// Checkpoint id at exit
    pub last_completed_id: String,

    /// Successful remote pushes
    pub syncs: u64,
}

impl RunSummary {
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            started_at: Utc::now(),
            finished_at: None,
            final_state: PipelineState::Idle,
            start_index: 0,
            total_items: 0,
            successes: 0,
            empty: 0,
            exhausted: 0,
            records: 0,
            unsubmitted: 0,
            cancelled: false,
            last_completed_id: String::new(),
            syncs: 0,
        }
    }

    /// Counts one outcome
    pub fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Success { records, .. } => {
                self.successes += 1;
                self.records += records.len();
            }
            FetchOutcome::EmptyResult => self.empty += 1,
            FetchOutcome::ExhaustedFailure { .. } => self.exhausted += 1,
        }
    }

    /// Items that reached a terminal outcome
    pub fn processed(&self) -> usize {
        self.successes + self.empty + self.exhausted
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Run:");
    println!("  Dataset: {}", summary.dataset_name);
    println!("  State: {}", summary.final_state);
    println!("  Started: {}", summary.started_at.to_rfc3339());
    if let Some(finished) = summary.finished_at {
        println!("  Finished: {}", finished.to_rfc3339());
    }
    if let Some(seconds) = summary.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    if summary.cancelled {
        println!("  Stopped early: {} items not started", summary.unsubmitted);
    }
    println!();

    println!("Items:");
    println!(
        "  Work list: {} (started at index {})",
        summary.total_items, summary.start_index
    );
    println!("  Processed: {}", summary.processed());
    println!("  With reviews: {}", summary.successes);
    println!("  No reviews: {}", summary.empty);
    println!("  Failed after retries: {}", summary.exhausted);
    println!("  Reviews extracted: {}", summary.records);
    println!();

    if !summary.last_completed_id.is_empty() {
        println!("Checkpoint: {}", summary.last_completed_id);
    }
    if summary.syncs > 0 {
        println!("Remote syncs: {}", summary.syncs);
    }
}

/// Aggregate view of an output sink
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStatistics {
    /// Data rows in the sink
    pub rows: u64,

    /// Distinct ids (rows minus duplicates from resumed runs)
    pub distinct_ids: u64,

    /// Rows recording zero reviews
    pub zero_rows: u64,

    /// Rows with no count (every attempt failed)
    pub failed_rows: u64,

    /// Sum of review counts
    pub total_reviews: u64,
}

/// Reads an `imdb_id,review_count` sink and aggregates it
pub fn load_sink_statistics(path: &Path) -> OutputResult<SinkStatistics> {
    if !path.exists() {
        return Err(OutputError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("output sink {} does not exist", path.display()),
        )));
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut stats = SinkStatistics::default();
    let mut ids = HashSet::new();

    for record in reader.records() {
        let record = record?;
        let id = record.get(0).unwrap_or("").trim();
        if id.is_empty() {
            continue;
        }

        stats.rows += 1;
        if ids.insert(id.to_string()) {
            stats.distinct_ids += 1;
        }

        match record.get(1).map(str::trim).filter(|c| !c.is_empty()) {
            None => stats.failed_rows += 1,
            Some(count) => match count.parse::<u64>() {
                Ok(0) => stats.zero_rows += 1,
                Ok(n) => stats.total_reviews += n,
                Err(_) => {
                    tracing::warn!("Unreadable review count {:?} for {}", count, id);
                    stats.failed_rows += 1;
                }
            },
        }
    }

    Ok(stats)
}

/// Prints sink statistics to stdout
pub fn print_sink_statistics(path: &Path, stats: &SinkStatistics) {
    println!("=== Output Statistics ===\n");
    println!("Sink: {}", path.display());
    println!("  Rows: {}", stats.rows);
    println!("  Distinct titles: {}", stats.distinct_ids);
    println!("  Titles with no reviews: {}", stats.zero_rows);
    println!("  Failed titles: {}", stats.failed_rows);
    println!("  Total reviews: {}", stats.total_reviews);

    let counted = stats.rows - stats.failed_rows;
    let average = if counted > 0 {
        stats.total_reviews as f64 / counted as f64
    } else {
        0.0
    };
    println!("  Average reviews per title: {:.1}", average);
}
