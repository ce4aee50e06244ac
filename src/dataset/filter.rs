//! Filtering raw title listings into work lists
//!
//! The input is an IMDb `title.basics`-style TSV (`tconst`, `titleType`,
//! `primaryTitle`, `isAdult`, `startYear`, `genres`, ...) where `\N` marks a
//! missing value.

use crate::dataset::loader::{csv_error, open_reader};
use crate::dataset::{DatasetError, DatasetResult, WorkItem};
use std::path::Path;

/// Null marker used by the IMDb dumps
const NULL: &str = "\\N";

/// Title type used when none is requested
const DEFAULT_TITLE_TYPE: &str = "movie";

/// Criteria selecting titles for a new work list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetFilter {
    /// Genre that must appear in the title's genre list (case-insensitive)
    pub genre: Option<String>,

    /// Title type to keep; `movie` when unset
    pub title_type: Option<String>,

    /// Earliest start year, inclusive
    pub start_year: Option<u16>,

    /// Latest start year, inclusive
    pub end_year: Option<u16>,

    /// Required adult flag; both kinds are kept when unset
    pub is_adult: Option<bool>,
}

impl DatasetFilter {
    /// Name under which the filtered list is exported and checkpointed
    ///
    /// # Example
    ///
    /// ```
    /// use review_crawler::dataset::DatasetFilter;
    ///
    /// let filter = DatasetFilter {
    ///     genre: Some("Horror".to_string()),
    ///     start_year: Some(1980),
    ///     ..Default::default()
    /// };
    /// assert_eq!(filter.dataset_name(), "movies_genre_Horror_start_1980");
    /// ```
    pub fn dataset_name(&self) -> String {
        let mut parts = vec!["movies".to_string()];
        if let Some(title_type) = self.title_type.as_deref().filter(|t| *t != DEFAULT_TITLE_TYPE) {
            parts.push(format!("type_{}", title_type));
        }
        if let Some(genre) = &self.genre {
            parts.push(format!("genre_{}", genre));
        }
        if let Some(start) = self.start_year {
            parts.push(format!("start_{}", start));
        }
        if let Some(end) = self.end_year {
            parts.push(format!("end_{}", end));
        }
        match self.is_adult {
            Some(true) => parts.push("adult".to_string()),
            Some(false) => parts.push("nonadult".to_string()),
            None => {}
        }
        parts.join("_")
    }

    fn matches(&self, title_type: &str, is_adult: Option<bool>, year: Option<u16>, genres: &str) -> bool {
        let wanted_type = self.title_type.as_deref().unwrap_or(DEFAULT_TITLE_TYPE);
        if title_type != wanted_type {
            return false;
        }

        if let Some(genre) = &self.genre {
            if !genres.split(',').any(|g| g.trim().eq_ignore_ascii_case(genre)) {
                return false;
            }
        }

        if self.start_year.is_some() || self.end_year.is_some() {
            let Some(year) = year else {
                return false;
            };
            if self.start_year.is_some_and(|start| year < start) {
                return false;
            }
            if self.end_year.is_some_and(|end| year > end) {
                return false;
            }
        }

        match self.is_adult {
            Some(wanted) => is_adult == Some(wanted),
            None => true,
        }
    }
}

fn nullable(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty() && *v != NULL)
}

/// Filters a title listing into an ordered work list
///
/// Positions are renumbered from zero in the order titles appear.
pub fn filter_titles(path: &Path, filter: &DatasetFilter) -> DatasetResult<Vec<WorkItem>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(csv_error(path))?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);

    let id_idx = column("tconst").ok_or_else(|| DatasetError::MissingIdColumn {
        path: path.to_path_buf(),
        expected: "tconst".to_string(),
    })?;
    let type_idx = column("titleType");
    let title_idx = column("primaryTitle");
    let adult_idx = column("isAdult");
    let year_idx = column("startYear");
    let genres_idx = column("genres");

    let mut items = Vec::new();
    let mut scanned = 0usize;

    for record in reader.records() {
        let record = record.map_err(csv_error(path))?;
        scanned += 1;

        let Some(id) = nullable(record.get(id_idx)) else {
            continue;
        };
        let field = |idx: Option<usize>| nullable(idx.and_then(|i| record.get(i)));

        let title_type = field(type_idx).unwrap_or("");
        let is_adult = field(adult_idx).map(|v| v == "1");
        let year = field(year_idx).and_then(|v| v.parse::<u16>().ok());
        let genres = field(genres_idx).unwrap_or("");

        if filter.matches(title_type, is_adult, year, genres) {
            let label = field(title_idx).unwrap_or(id);
            let position = items.len();
            items.push(WorkItem::new(id, label, position));
        }
    }

    tracing::info!(
        "Filter {:?} kept {} of {} titles from {}",
        filter,
        items.len(),
        scanned,
        path.display()
    );
    Ok(items)
}
