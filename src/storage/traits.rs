//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and the
//! helpers that map a checkpoint onto a loaded work list.

use crate::dataset::WorkItem;
use crate::storage::Checkpoint;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint lock poisoned: {0}")]
    Poisoned(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for checkpoint backends
///
/// Only the orchestrator's completion loop writes through this trait, so
/// implementations need not coordinate concurrent writers. They must however
/// never expose a partially written checkpoint to a reader.
pub trait CheckpointStore: Send + Sync {
    /// Loads the last saved checkpoint
    ///
    /// Missing or unreadable records are treated as absent and logged; this
    /// never fails. A store with nothing saved returns [`Checkpoint::default`].
    fn load(&self) -> Checkpoint;

    /// Persists all fields of the checkpoint as one unit
    fn save(&self, checkpoint: &Checkpoint) -> StorageResult<()>;
}

/// Index of the first item still to process after `checkpoint`
///
/// This is one past the position of `last_completed_id`. An empty checkpoint
/// or an id that is not part of `items` restarts from 0; the latter is logged
/// as a warning since it usually means the work list changed.
///
/// # Example
///
/// ```
/// use review_crawler::dataset::WorkItem;
/// use review_crawler::storage::{resume_index, Checkpoint};
///
/// let items = vec![
///     WorkItem::new("A", "a", 0),
///     WorkItem::new("B", "b", 1),
///     WorkItem::new("C", "c", 2),
/// ];
/// let checkpoint = Checkpoint::for_dataset("movies").advanced_to("B");
/// assert_eq!(resume_index(&items, &checkpoint), 2);
/// ```
pub fn resume_index(items: &[WorkItem], checkpoint: &Checkpoint) -> usize {
    if checkpoint.last_completed_id.is_empty() {
        return 0;
    }

    match items
        .iter()
        .position(|item| item.id == checkpoint.last_completed_id)
    {
        Some(idx) => idx + 1,
        None => {
            tracing::warn!(
                "Checkpoint id {} not found in dataset '{}', starting from the beginning",
                checkpoint.last_completed_id,
                checkpoint.dataset_name
            );
            0
        }
    }
}

/// Index of a named item, used to start a run at (and including) that item
///
/// Falls back to 0 with a warning when the id is not in the list.
pub fn start_index_for(items: &[WorkItem], id: &str) -> usize {
    match items.iter().position(|item| item.id == id) {
        Some(idx) => idx,
        None => {
            tracing::warn!("Start id {} not found in the work list, starting from the beginning", id);
            0
        }
    }
}
