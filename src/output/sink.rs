//! Append-only output sink
//!
//! All rows go through one writer task fed by a channel, so no two callers
//! ever write the file at the same time. The sink file gets its header once,
//! when it is created (or found empty), and is flushed after every row.
//! [`OutputSink::append`] returns only once the writer has flushed the row, so
//! anything recorded after an append (such as a checkpoint) never runs ahead
//! of the file.

use crate::output::{OutputError, OutputRecord, OutputResult};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Header of the output sink
pub const SINK_HEADER: [&str; 2] = ["imdb_id", "review_count"];

/// Header of a per-title review file
const REVIEW_HEADER: &str = "Review";

/// Commands buffered ahead of the writer
const COMMAND_BUFFER: usize = 64;

enum SinkCommand {
    Append(OutputRecord, oneshot::Sender<OutputResult<()>>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task
pub struct OutputSink {
    path: PathBuf,
    tx: mpsc::Sender<SinkCommand>,
    writer: JoinHandle<OutputResult<usize>>,
}

impl OutputSink {
    /// Opens (or creates) the sink at `path` and starts its writer
    ///
    /// # Arguments
    ///
    /// * `path` - Sink CSV file; parent directories are created
    /// * `reviews_dir` - Directory for `reviews_<id>.csv` files, if wanted
    pub fn open(path: impl Into<PathBuf>, reviews_dir: Option<PathBuf>) -> OutputResult<Self> {
        let path = path.into();
        let writer = SinkWriter::open(&path, reviews_dir)?;

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let writer = tokio::spawn(writer.run(rx));

        Ok(Self { path, tx, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a row and waits until it is flushed to the sink file
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The row (and its review file, if any) is on disk
    /// * `Err(OutputError)` - The write failed or the writer has stopped
    pub async fn append(&self, record: OutputRecord) -> OutputResult<()> {
        let (done, written) = oneshot::channel();
        self.tx
            .send(SinkCommand::Append(record, done))
            .await
            .map_err(|_| OutputError::Closed)?;
        written.await.map_err(|_| OutputError::Closed)?
    }

    /// Waits until every row queued before this call is on disk
    pub async fn flush(&self) -> OutputResult<()> {
        let (done, wait) = oneshot::channel();
        self.tx
            .send(SinkCommand::Flush(done))
            .await
            .map_err(|_| OutputError::Closed)?;
        wait.await.map_err(|_| OutputError::Closed)
    }

    /// Stops the writer after it has written every queued row
    ///
    /// # Returns
    ///
    /// The number of rows written through this handle, or the error that
    /// stopped the writer
    pub async fn close(self) -> OutputResult<usize> {
        drop(self.tx);
        self.writer.await.map_err(|e| {
            OutputError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?
    }
}

struct SinkWriter {
    csv: csv::Writer<File>,
    reviews_dir: Option<PathBuf>,
    rows: usize,
}

impl SinkWriter {
    fn open(path: &Path, reviews_dir: Option<PathBuf>) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            csv.write_record(SINK_HEADER)?;
            csv.flush()?;
            tracing::debug!("Created output sink {}", path.display());
        }

        if let Some(dir) = &reviews_dir {
            fs::create_dir_all(dir)?;
        }

        Ok(Self {
            csv,
            reviews_dir,
            rows: 0,
        })
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SinkCommand>) -> OutputResult<usize> {
        while let Some(command) = rx.recv().await {
            match command {
                SinkCommand::Append(record, done) => {
                    let result = self.write(&record);
                    if let Err(e) = &result {
                        tracing::error!("Failed to write output row for {}: {}", record.id, e);
                    }
                    let _ = done.send(result);
                }
                SinkCommand::Flush(done) => {
                    self.csv.flush()?;
                    let _ = done.send(());
                }
            }
        }

        self.csv.flush()?;
        Ok(self.rows)
    }

    fn write(&mut self, record: &OutputRecord) -> OutputResult<()> {
        let count = record.review_count.map(|c| c.to_string()).unwrap_or_default();
        self.csv.write_record([record.id.as_str(), count.as_str()])?;
        self.csv.flush()?;
        self.rows += 1;

        if let Some(dir) = &self.reviews_dir {
            if !record.reviews.is_empty() {
                let path = dir.join(format!("reviews_{}.csv", record.id));
                let mut reviews = csv::Writer::from_path(&path)?;
                reviews.write_record([REVIEW_HEADER])?;
                for review in &record.reviews {
                    reviews.write_record([review.as_str()])?;
                }
                reviews.flush()?;
                tracing::debug!("Saved {} reviews to {}", record.reviews.len(), path.display());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, count: Option<usize>, reviews: &[&str]) -> OutputRecord {
        OutputRecord {
            id: id.to_string(),
            review_count: count,
            reviews: reviews.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output").join("title_with_reviews.csv");

        let sink = OutputSink::open(&path, None).unwrap();
        sink.append(record("tt1", Some(0), &[])).await.unwrap();
        assert_eq!(sink.close().await.unwrap(), 1);

        let sink = OutputSink::open(&path, None).unwrap();
        sink.append(record("tt2", Some(12), &[])).await.unwrap();
        sink.append(record("tt3", None, &[])).await.unwrap();
        assert_eq!(sink.close().await.unwrap(), 2);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "imdb_id,review_count\ntt1,0\ntt2,12\ntt3,\n");
    }

    #[tokio::test]
    async fn test_append_returns_after_row_is_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sink.csv");

        let sink = OutputSink::open(&path, None).unwrap();
        for i in 0..5 {
            let id = format!("tt{}", i);
            sink.append(record(&id, Some(i), &[])).await.unwrap();
            let content = fs::read_to_string(&path).unwrap();
            assert!(content.ends_with(&format!("{},{}\n", id, i)), "row {} missing", id);
        }
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_to_caller() {
        let dir = TempDir::new().unwrap();
        let reviews_dir = dir.path().join("reviews");

        let sink = OutputSink::open(dir.path().join("sink.csv"), Some(reviews_dir.clone())).unwrap();
        // A directory where the review file should go makes the write fail
        fs::create_dir_all(reviews_dir.join("reviews_tt1.csv")).unwrap();

        let result = sink.append(record("tt1", Some(1), &["text"])).await;
        assert!(result.is_err());

        sink.append(record("tt2", Some(0), &[])).await.unwrap();
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_makes_rows_visible() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sink.csv");

        let sink = OutputSink::open(&path, None).unwrap();
        sink.append(record("tt1", Some(3), &[])).await.unwrap();
        sink.flush().await.unwrap();

        assert!(fs::read_to_string(&path).unwrap().ends_with("tt1,3\n"));
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_interleaved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sink.csv");
        let sink = std::sync::Arc::new(OutputSink::open(&path, None).unwrap());

        let mut tasks = Vec::new();
        for i in 0..20 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                sink.append(record(&format!("tt{:04}", i), Some(i), &[])).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        sink.flush().await.unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 20);
        assert!(rows.iter().all(|r| r.len() == 2 && r[0].starts_with("tt")));
    }

    #[tokio::test]
    async fn test_review_files() {
        let dir = TempDir::new().unwrap();
        let reviews_dir = dir.path().join("reviews").join("movies");

        let sink = OutputSink::open(dir.path().join("sink.csv"), Some(reviews_dir.clone())).unwrap();
        sink.append(record("tt1", Some(2), &["Loved it", "Too long, \"honestly\""]))
            .await
            .unwrap();
        sink.append(record("tt2", Some(0), &[])).await.unwrap();
        sink.close().await.unwrap();

        let mut reader = csv::Reader::from_path(reviews_dir.join("reviews_tt1.csv")).unwrap();
        assert_eq!(reader.headers().unwrap().iter().collect::<Vec<_>>(), vec!["Review"]);
        let reviews: Vec<String> = reader.records().map(|r| r.unwrap()[0].to_string()).collect();
        assert_eq!(reviews, vec!["Loved it", "Too long, \"honestly\""]);

        assert!(!reviews_dir.join("reviews_tt2.csv").exists());
    }
}
