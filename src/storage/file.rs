//! File-backed checkpoint storage
//!
//! The checkpoint is stored as three small text records inside a generation
//! directory (`checkpoint-<n>/`). A save writes a complete new generation
//! under a staging name, renames it into place, then swaps the `CURRENT`
//! pointer file with a rename. A reader therefore sees either the previous
//! checkpoint or the new one, never a mix of the two.
//!
//! Directories written before the pointer existed keep the three records
//! directly in the state directory; those are still read when `CURRENT` is
//! absent.

use crate::storage::{Checkpoint, CheckpointStore, StorageResult};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Record holding the id of the last completed item
pub const LAST_ID_FILE: &str = "last_scraped_id.txt";

/// Record holding the dataset name
pub const DATASET_FILE: &str = "last_dataset_name.txt";

/// Record holding the derivation step's last id
pub const DERIVED_ID_FILE: &str = "last_sentiment_id.txt";

const CURRENT_FILE: &str = "CURRENT";
const CURRENT_STAGING_FILE: &str = "CURRENT.tmp";
const GENERATION_PREFIX: &str = "checkpoint-";

/// Checkpoint store rooted at a state directory
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `dir`; the directory is created on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn generation_dir(&self, generation: u64) -> PathBuf {
        self.dir.join(format!("{}{}", GENERATION_PREFIX, generation))
    }

    /// Reads the generation named by `CURRENT`
    ///
    /// Returns `Ok(None)` when no pointer has been written yet.
    fn current_generation(&self) -> io::Result<Option<u64>> {
        let raw = match fs::read_to_string(self.dir.join(CURRENT_FILE)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        raw.trim()
            .strip_prefix(GENERATION_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed checkpoint pointer: {:?}", raw.trim()),
                )
            })
    }

    /// Directory the records should be read from
    fn record_dir(&self) -> PathBuf {
        match self.current_generation() {
            Ok(Some(generation)) => {
                let dir = self.generation_dir(generation);
                if !dir.is_dir() {
                    tracing::warn!("Checkpoint generation {} is missing", dir.display());
                }
                dir
            }
            Ok(None) => self.dir.clone(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable checkpoint pointer in {}: {}", self.dir.display(), e);
                self.dir.clone()
            }
        }
    }
}

/// Reads one record, mapping a missing or unreadable file to `None`
fn read_record(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(value) => Some(value.trim().to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!("Ignoring unreadable checkpoint record {}: {}", path.display(), e);
            None
        }
    }
}

fn write_record(path: &Path, value: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Checkpoint {
        let dir = self.record_dir();

        let checkpoint = Checkpoint {
            last_completed_id: read_record(&dir.join(LAST_ID_FILE)).unwrap_or_default(),
            dataset_name: read_record(&dir.join(DATASET_FILE)).unwrap_or_default(),
            last_derived_id: read_record(&dir.join(DERIVED_ID_FILE)).filter(|id| !id.is_empty()),
        };

        tracing::debug!("Loaded checkpoint {:?} from {}", checkpoint, dir.display());
        checkpoint
    }

    fn save(&self, checkpoint: &Checkpoint) -> StorageResult<()> {
        fs::create_dir_all(&self.dir)?;

        let previous = self.current_generation().unwrap_or_else(|e| {
            tracing::warn!("Overwriting unreadable checkpoint pointer: {}", e);
            None
        });
        let next = previous.map_or(1, |n| n + 1);

        let staging = self.dir.join(format!(".{}{}.tmp", GENERATION_PREFIX, next));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir(&staging)?;

        write_record(&staging.join(LAST_ID_FILE), &checkpoint.last_completed_id)?;
        write_record(&staging.join(DATASET_FILE), &checkpoint.dataset_name)?;
        if let Some(derived) = &checkpoint.last_derived_id {
            write_record(&staging.join(DERIVED_ID_FILE), derived)?;
        }

        // Left behind by a save interrupted after this rename
        let target = self.generation_dir(next);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staging, &target)?;

        let pointer = self.dir.join(CURRENT_STAGING_FILE);
        write_record(&pointer, &format!("{}{}", GENERATION_PREFIX, next))?;
        fs::rename(&pointer, self.dir.join(CURRENT_FILE))?;

        if let Some(previous) = previous {
            if let Err(e) = fs::remove_dir_all(self.generation_dir(previous)) {
                tracing::debug!("Could not remove checkpoint generation {}: {}", previous, e);
            }
        }

        tracing::debug!(
            "Saved checkpoint {} ({}) as generation {}",
            checkpoint.last_completed_id,
            checkpoint.dataset_name,
            next
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn checkpoint(id: &str) -> Checkpoint {
        Checkpoint {
            last_completed_id: id.to_string(),
            dataset_name: "movies_genre_Horror".to_string(),
            last_derived_id: None,
        }
    }

    #[test]
    fn test_fresh_directory_loads_empty_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("state"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        let mut saved = checkpoint("tt0000042");
        saved.last_derived_id = Some("tt0000007".to_string());
        store.save(&saved).unwrap();

        assert_eq!(store.load(), saved);
    }

    #[test]
    fn test_later_save_replaces_earlier_generation() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save(&checkpoint("tt1")).unwrap();
        store.save(&checkpoint("tt2")).unwrap();

        assert_eq!(store.load().last_completed_id, "tt2");
        assert!(!dir.path().join("checkpoint-1").exists());
        assert!(dir.path().join("checkpoint-2").is_dir());
        assert!(!dir.path().join(CURRENT_STAGING_FILE).exists());
    }

    #[test]
    fn test_absent_derived_id_is_not_written() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save(&checkpoint("tt1")).unwrap();
        assert!(!dir.path().join("checkpoint-1").join(DERIVED_ID_FILE).exists());
        assert_eq!(store.load().last_derived_id, None);
    }

    #[test]
    fn test_interrupted_staging_is_not_visible() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.save(&checkpoint("tt1")).unwrap();

        // A crash between staging and publishing leaves a partial generation
        let staging = dir.path().join(".checkpoint-2.tmp");
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join(LAST_ID_FILE), "tt9").unwrap();

        assert_eq!(store.load().last_completed_id, "tt1");

        store.save(&checkpoint("tt2")).unwrap();
        assert_eq!(store.load(), checkpoint("tt2"));
        assert!(!staging.exists());
    }

    #[test]
    fn test_legacy_flat_records_are_read() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LAST_ID_FILE), "tt0000005\n").unwrap();
        fs::write(dir.path().join(DATASET_FILE), "movies").unwrap();

        let loaded = FileCheckpointStore::new(dir.path()).load();
        assert_eq!(loaded.last_completed_id, "tt0000005");
        assert_eq!(loaded.dataset_name, "movies");
        assert_eq!(loaded.last_derived_id, None);
    }

    #[test]
    fn test_corrupt_pointer_does_not_fail_load() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURRENT_FILE), "garbage").unwrap();

        let store = FileCheckpointStore::new(dir.path());
        assert!(store.load().is_empty());

        store.save(&checkpoint("tt3")).unwrap();
        assert_eq!(store.load().last_completed_id, "tt3");
    }

    #[test]
    fn test_pointer_to_missing_generation_loads_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURRENT_FILE), "checkpoint-9").unwrap();

        assert!(FileCheckpointStore::new(dir.path()).load().is_empty());
    }

    #[test]
    fn test_non_utf8_record_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        store.save(&checkpoint("tt1")).unwrap();

        fs::write(dir.path().join("checkpoint-1").join(DATASET_FILE), [0xff, 0xfe, 0x00]).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.last_completed_id, "tt1");
        assert_eq!(loaded.dataset_name, "");
    }
}
