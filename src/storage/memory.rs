//! In-memory checkpoint storage
//!
//! Used by dry runs and tests. Every save is also appended to a history so
//! tests can assert on the sequence of checkpoints a run produced.

use crate::storage::{Checkpoint, CheckpointStore, StorageError, StorageResult};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    history: Mutex<Vec<Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `checkpoint`
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            history: Mutex::new(vec![checkpoint]),
        }
    }

    /// All checkpoints saved so far, oldest first
    pub fn history(&self) -> Vec<Checkpoint> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> Checkpoint {
        match self.history.lock() {
            Ok(history) => history.last().cloned().unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Checkpoint lock poisoned, loading empty checkpoint: {}", e);
                Checkpoint::default()
            }
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> StorageResult<()> {
        self.history
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))?
            .push(checkpoint.clone());
        Ok(())
    }
}
