//! Storage module for persisting crawl position
//!
//! This module handles the durable checkpoint of a run:
//! - The checkpoint record (last completed id, dataset name, derived id)
//! - File-backed storage with write-replace publishing
//! - In-memory storage for tests and dry runs
//! - Mapping a checkpoint back onto a loaded work list

mod file;
mod memory;
mod traits;

pub use file::{FileCheckpointStore, DATASET_FILE, DERIVED_ID_FILE, LAST_ID_FILE};
pub use memory::InMemoryCheckpointStore;
pub use traits::{resume_index, start_index_for, CheckpointStore, StorageError, StorageResult};

/// Durable record of where a run stands
///
/// A zero value (all fields empty) means no progress has been recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Id of the last item of the contiguous completed prefix
    pub last_completed_id: String,

    /// Name of the work list the id belongs to
    pub dataset_name: String,

    /// Last id processed by a downstream derivation step, carried untouched
    pub last_derived_id: Option<String>,
}

impl Checkpoint {
    /// Creates a checkpoint for a dataset with no completed items
    pub fn for_dataset(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            ..Self::default()
        }
    }

    /// Returns true when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.last_completed_id.is_empty()
            && self.dataset_name.is_empty()
            && self.last_derived_id.is_none()
    }

    /// Returns a copy advanced to `id`
    pub fn advanced_to(&self, id: &str) -> Self {
        Self {
            last_completed_id: id.to_string(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_checkpoint_is_empty() {
        assert!(Checkpoint::default().is_empty());
        assert!(!Checkpoint::for_dataset("movies").is_empty());
    }

    #[test]
    fn test_advance_keeps_other_fields() {
        let checkpoint = Checkpoint {
            last_completed_id: "tt1".to_string(),
            dataset_name: "movies".to_string(),
            last_derived_id: Some("tt0".to_string()),
        };

        let advanced = checkpoint.advanced_to("tt2");
        assert_eq!(advanced.last_completed_id, "tt2");
        assert_eq!(advanced.dataset_name, "movies");
        assert_eq!(advanced.last_derived_id.as_deref(), Some("tt0"));
    }
}
