//! Work list handling
//!
//! This module loads the ordered list of titles a run walks through, filters
//! raw title listings into new work lists, and exports them so a later resume
//! can reload the same list by its dataset name.

mod filter;
mod loader;

pub use filter::{filter_titles, DatasetFilter};
pub use loader::{export_work_items, load_work_items, work_list_path};

use std::path::PathBuf;
use thiserror::Error;

/// One unit of crawl work
///
/// Immutable once loaded. `position` is the index in the source list and is
/// what resume and the completion high-water mark are expressed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Stable title identifier (e.g. `tt0111161`)
    pub id: String,

    /// Display name
    pub label: String,

    /// Index in the ordered source list
    pub position: usize,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>, position: usize) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            position,
        }
    }
}

/// Errors raised while reading or writing work lists
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Work list not found: {0}")]
    NotFound(PathBuf),

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path} has no id column (expected one of: {expected})")]
    MissingIdColumn { path: PathBuf, expected: String },

    #[error("{path} row {row} has an empty id")]
    EmptyId { path: PathBuf, row: usize },

    #[error("{path} lists id {id} more than once")]
    DuplicateId { path: PathBuf, id: String },
}

/// Result type alias for dataset operations
pub type DatasetResult<T> = std::result::Result<T, DatasetError>;
