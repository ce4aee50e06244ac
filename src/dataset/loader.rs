//! Reading and writing ordered work lists

use crate::dataset::{DatasetError, DatasetResult, WorkItem};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Header names accepted for the id column, in order of preference
const ID_COLUMNS: [&str; 4] = ["imdb_id", "tconst", "IMDb ID", "id"];

/// Header names accepted for the label column, in order of preference
const LABEL_COLUMNS: [&str; 3] = ["primaryTitle", "title", "label"];

/// Header written by [`export_work_items`]
const EXPORT_HEADER: [&str; 2] = ["imdb_id", "primaryTitle"];

/// Picks the field delimiter from the file extension (`.tsv` is tab separated)
pub(crate) fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

pub(crate) fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> DatasetError + '_ {
    move |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

pub(crate) fn open_reader(path: &Path) -> DatasetResult<csv::Reader<std::fs::File>> {
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }

    let delimiter = delimiter_for(path);
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        // IMDb dumps are unquoted TSV; titles may contain bare quotes
        .quoting(delimiter != b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(csv_error(path))
}

/// Loads an ordered list of work items from a CSV or TSV file
///
/// The id column is the first header found among `imdb_id`, `tconst`,
/// `IMDb ID` and `id`. The label column is optional and falls back to the id.
///
/// # Errors
///
/// A missing id column, an empty id or a repeated id make the whole list
/// unusable and are reported as errors rather than skipped.
pub fn load_work_items(path: &Path) -> DatasetResult<Vec<WorkItem>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(csv_error(path))?.clone();

    let id_idx = ID_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        .ok_or_else(|| DatasetError::MissingIdColumn {
            path: path.to_path_buf(),
            expected: ID_COLUMNS.join(", "),
        })?;
    let label_idx = LABEL_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name));

    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error(path))?;
        let id = record.get(id_idx).unwrap_or("").trim();

        if id.is_empty() {
            return Err(DatasetError::EmptyId {
                path: path.to_path_buf(),
                row: row + 1,
            });
        }

        if !seen.insert(id.to_string()) {
            return Err(DatasetError::DuplicateId {
                path: path.to_path_buf(),
                id: id.to_string(),
            });
        }

        let label = label_idx
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or(id);

        let position = items.len();
        items.push(WorkItem::new(id, label, position));
    }

    tracing::info!("Loaded {} work items from {}", items.len(), path.display());
    Ok(items)
}

/// Writes a work list as `imdb_id,primaryTitle` CSV, replacing any existing file
pub fn export_work_items(items: &[WorkItem], path: &Path) -> DatasetResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;
    writer.write_record(EXPORT_HEADER).map_err(csv_error(path))?;
    for item in items {
        writer
            .write_record([item.id.as_str(), item.label.as_str()])
            .map_err(csv_error(path))?;
    }
    writer.flush()?;

    tracing::info!("Exported {} work items to {}", items.len(), path.display());
    Ok(())
}

/// Location of the exported work list for a dataset name
pub fn work_list_path(dataset_dir: &Path, dataset_name: &str) -> PathBuf {
    dataset_dir.join(format!("{}.csv", dataset_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_filtered_csv_keeps_order() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "movies.csv",
            "imdb_id,primaryTitle,startYear\ntt0000003,Third,1999\ntt0000001,\"First, Again\",2001\n",
        );

        let items = load_work_items(&path).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], WorkItem::new("tt0000003", "Third", 0));
        assert_eq!(items[1].label, "First, Again");
        assert_eq!(items[1].position, 1);
    }

    #[test]
    fn test_load_tsv_with_tconst_and_no_label() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "part_1.tsv", "tconst\n tt01 \ntt02\n");

        let items = load_work_items(&path).unwrap();
        assert_eq!(items[0].id, "tt01");
        assert_eq!(items[0].label, "tt01");
        assert_eq!(items[1].position, 1);
    }

    #[test]
    fn test_missing_id_column_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.csv", "name,year\nx,1\n");

        let err = load_work_items(&path).unwrap_err();
        assert!(matches!(err, DatasetError::MissingIdColumn { .. }));
    }

    #[test]
    fn test_duplicate_and_empty_ids_are_errors() {
        let dir = TempDir::new().unwrap();
        let dup = write(&dir, "dup.csv", "imdb_id\ntt1\ntt2\ntt1\n");
        assert!(matches!(
            load_work_items(&dup).unwrap_err(),
            DatasetError::DuplicateId { id, .. } if id == "tt1"
        ));

        let empty = write(&dir, "empty.csv", "imdb_id,primaryTitle\ntt1,A\n,B\n");
        assert!(matches!(
            load_work_items(&empty).unwrap_err(),
            DatasetError::EmptyId { row: 2, .. }
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load_work_items(Path::new("/nonexistent/movies.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }

    #[test]
    fn test_exported_list_reloads_by_dataset_name() {
        let dir = TempDir::new().unwrap();
        let items = vec![
            WorkItem::new("tt1", "Alien", 0),
            WorkItem::new("tt2", "The Thing", 1),
        ];

        let path = work_list_path(&dir.path().join("movie_data"), "movies_genre_Horror");
        export_work_items(&items, &path).unwrap();

        assert!(path.ends_with("movie_data/movies_genre_Horror.csv"));
        assert_eq!(load_work_items(&path).unwrap(), items);
    }
}
