//! Integration tests for the crawler
//!
//! These tests drive the whole orchestrator with scripted review sources and
//! a wiremock-backed HTTP source, checking the sink, the checkpoint and
//! resume behaviour end-to-end.

use async_trait::async_trait;
use review_crawler::config::parse_config;
use review_crawler::crawler::{
    BackoffPolicy, HttpReviewSource, JitterRange, Orchestrator, PageParser, RetryingFetcher,
    ReviewPage, ReviewSource, RunPlan, SourceError, StartPosition, WorkerPool,
};
use review_crawler::dataset::WorkItem;
use review_crawler::output::{load_sink_statistics, OutputSink};
use review_crawler::storage::{Checkpoint, CheckpointStore, FileCheckpointStore};
use review_crawler::{CrawlError, PipelineState};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn review_html(count: u64, reviews: usize) -> String {
    let bodies: String = (0..reviews)
        .map(|i| format!(r#"<div class="ipc-html-content-inner-div">Review number {}</div>"#, i))
        .collect();
    format!(
        r#"<html><body><div data-testid="tturv-total-reviews">{} reviews</div>{}</body></html>"#,
        count, bodies
    )
}

/// Scripted source recording every call
#[derive(Default)]
struct ScriptedSource {
    counts: HashMap<String, u64>,
    fatal: Option<String>,
    stop_at: Option<(String, CancellationToken)>,
    fetched: Mutex<Vec<String>>,
    expanded: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl ScriptedSource {
    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewSource for ScriptedSource {
    async fn fetch_page(&self, id: &str) -> Result<ReviewPage, SourceError> {
        self.fetched.lock().unwrap().push(id.to_string());

        if let Some((stop_id, cancel)) = &self.stop_at {
            if stop_id == id {
                cancel.cancel();
            }
        }
        if self.fatal.as_deref() == Some(id) {
            return Err(SourceError::Fatal("renderer binary not found".to_string()));
        }

        let count = self.counts.get(id).copied().unwrap_or(1);
        Ok(ReviewPage::new(id, review_html(count, count.min(1) as usize)))
    }

    async fn expand_pagination(&self, page: &ReviewPage) -> Result<ReviewPage, SourceError> {
        self.expanded.lock().unwrap().push(page.id.clone());
        let count = self.counts.get(&page.id).copied().unwrap_or(1);
        Ok(ReviewPage::new(page.id.clone(), review_html(count, 5)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn work_items(ids: &[&str]) -> Vec<WorkItem> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| WorkItem::new(*id, format!("Title {}", id), i))
        .collect()
}

/// Creates an orchestrator with no retry delay and no pacing
fn create_test_orchestrator(
    source: Arc<ScriptedSource>,
    state_dir: &Path,
    sink_path: &Path,
    concurrency: usize,
    cancel: CancellationToken,
) -> Orchestrator {
    let parser = PageParser::new(
        "div[data-testid='tturv-total-reviews']",
        "div.ipc-html-content-inner-div",
    )
    .unwrap();
    let fetcher = Arc::new(RetryingFetcher::new(source, parser, 3, 25, BackoffPolicy::None));
    let pool = WorkerPool::new(concurrency, JitterRange::none(), cancel.clone());
    let store = Arc::new(FileCheckpointStore::new(state_dir));
    let sink = OutputSink::open(sink_path, None).unwrap();

    Orchestrator::new(fetcher, pool, store, sink, cancel)
}

fn sink_rows(path: &Path) -> Vec<(String, String)> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r[0].to_string(), r[1].to_string())
        })
        .collect()
}

#[tokio::test]
async fn test_stop_and_resume_processes_exactly_the_rest() {
    let ids = ["tt01", "tt02", "tt03", "tt04", "tt05", "tt06"];

    for k in [0usize, 1, 3, 5, 6] {
        let dir = TempDir::new().unwrap();
        let sink = dir.path().join("out.csv");

        // First run: stop once the k-th item is being fetched
        if k > 0 {
            let cancel = CancellationToken::new();
            let source = Arc::new(ScriptedSource {
                stop_at: Some((ids[k - 1].to_string(), cancel.clone())),
                ..Default::default()
            });
            let orchestrator = create_test_orchestrator(source.clone(), dir.path(), &sink, 1, cancel);

            let summary = orchestrator
                .run(RunPlan::new("movies", work_items(&ids), StartPosition::Beginning))
                .await
                .unwrap();

            assert_eq!(source.fetched(), ids[..k].to_vec(), "first run, k = {}", k);
            assert_eq!(summary.final_state, PipelineState::Finished);
            assert_eq!(
                FileCheckpointStore::new(dir.path()).load().last_completed_id,
                ids[k - 1]
            );
        }

        // Resume
        let source = Arc::new(ScriptedSource::default());
        let orchestrator =
            create_test_orchestrator(source.clone(), dir.path(), &sink, 1, CancellationToken::new());
        orchestrator
            .run(RunPlan::new("movies", work_items(&ids), StartPosition::Checkpoint))
            .await
            .unwrap();

        assert_eq!(source.fetched(), ids[k..].to_vec(), "resumed run, k = {}", k);

        let written: Vec<String> = sink_rows(&sink).into_iter().map(|(id, _)| id).collect();
        assert_eq!(written, ids.to_vec(), "no gaps or repeats, k = {}", k);
    }
}

#[tokio::test]
async fn test_resume_after_checkpoint_processes_only_the_remainder() {
    let dir = TempDir::new().unwrap();
    FileCheckpointStore::new(dir.path())
        .save(&Checkpoint {
            last_completed_id: "B".to_string(),
            dataset_name: "movies".to_string(),
            last_derived_id: None,
        })
        .unwrap();

    let source = Arc::new(ScriptedSource::default());
    let orchestrator = create_test_orchestrator(
        source.clone(),
        dir.path(),
        &dir.path().join("out.csv"),
        2,
        CancellationToken::new(),
    );

    let summary = orchestrator
        .run(RunPlan::new("movies", work_items(&["A", "B", "C"]), StartPosition::Checkpoint))
        .await
        .unwrap();

    assert_eq!(source.fetched(), vec!["C"]);
    assert_eq!(summary.start_index, 2);
    assert_eq!(FileCheckpointStore::new(dir.path()).load().last_completed_id, "C");
}

#[tokio::test]
async fn test_zero_count_and_expanded_count() {
    let dir = TempDir::new().unwrap();
    let sink = dir.path().join("out.csv");
    let source = Arc::new(ScriptedSource {
        counts: HashMap::from([("A".to_string(), 0), ("B".to_string(), 30)]),
        ..Default::default()
    });
    let orchestrator =
        create_test_orchestrator(source.clone(), dir.path(), &sink, 2, CancellationToken::new());

    orchestrator
        .run(RunPlan::new("movies", work_items(&["A", "B"]), StartPosition::Beginning))
        .await
        .unwrap();

    let mut rows = sink_rows(&sink);
    rows.sort();
    assert_eq!(
        rows,
        vec![
            ("A".to_string(), "0".to_string()),
            ("B".to_string(), "5".to_string())
        ]
    );
    assert_eq!(*source.expanded.lock().unwrap(), vec!["B".to_string()]);
}

#[tokio::test]
async fn test_fatal_error_aborts_run_and_closes_source() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource {
        fatal: Some("B".to_string()),
        ..Default::default()
    });
    let orchestrator = create_test_orchestrator(
        source.clone(),
        dir.path(),
        &dir.path().join("out.csv"),
        1,
        CancellationToken::new(),
    );

    let err = orchestrator
        .run(RunPlan::new("movies", work_items(&["A", "B", "C"]), StartPosition::Beginning))
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::FatalSource { ref id, .. } if id == "B"));
    assert!(source.closed.load(Ordering::SeqCst));

    let checkpoint = FileCheckpointStore::new(dir.path()).load();
    assert_eq!(checkpoint.last_completed_id, "A");
    assert_eq!(checkpoint.dataset_name, "movies");
}

#[tokio::test]
async fn test_http_crawl_end_to_end() {
    let server = MockServer::start().await;

    // Expanded page for the title above the threshold
    Mock::given(method("GET"))
        .and(path("/title/tt0000002/reviews"))
        .and(query_param("showAll", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_string(review_html(30, 4)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/title/tt0000002/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_string(review_html(30, 1)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/title/tt0000001/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_string(review_html(0, 0)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/title/tt0000003/reviews"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().display();
    let config = parse_config(&format!(
        r#"
[crawler]
concurrency = 2
max-attempts = 2
retry-delay-ms = 0
jitter-min-ms = 0
jitter-max-ms = 0

[source]
base-url = "{uri}"
review-path = "/title/{{id}}/reviews"
expand-path = "/title/{{id}}/reviews?showAll=true"
count-selector = "div[data-testid='tturv-total-reviews']"
review-selector = "div.ipc-html-content-inner-div"
request-timeout-secs = 5

[output]
sink-path = "{root}/output/title_with_reviews.csv"
state-dir = "{root}/state"
reviews-dir = "{root}/reviews"

[sync]
bucket = "reviews"
interval = 100
timeout-secs = 600
mirror-dir = "{root}/mirror"
"#,
        uri = server.uri(),
        root = root
    ))
    .unwrap();

    let source = Arc::new(HttpReviewSource::new(&config.source).unwrap());
    let reviews_dir = dir.path().join("reviews").join("movies");
    let sink = OutputSink::open(&config.output.sink_path, Some(reviews_dir.clone())).unwrap();
    let orchestrator =
        Orchestrator::from_config(&config, source, sink, CancellationToken::new()).unwrap();

    let summary = orchestrator
        .run(RunPlan::new(
            "movies",
            work_items(&["tt0000001", "tt0000002", "tt0000003"]),
            StartPosition::Beginning,
        ))
        .await
        .unwrap();

    assert_eq!(summary.empty, 1);
    assert_eq!(summary.successes, 1);
    assert_eq!(summary.exhausted, 1);
    assert_eq!(summary.records, 4);
    assert_eq!(summary.syncs, 1);

    let sink_path = Path::new(&config.output.sink_path);
    let stats = load_sink_statistics(sink_path).unwrap();
    assert_eq!(stats.rows, 3);
    assert_eq!(stats.zero_rows, 1);
    assert_eq!(stats.failed_rows, 1);
    assert_eq!(stats.total_reviews, 4);

    assert!(reviews_dir.join("reviews_tt0000002.csv").exists());
    assert!(!reviews_dir.join("reviews_tt0000001.csv").exists());

    let checkpoint = FileCheckpointStore::new(dir.path().join("state")).load();
    assert_eq!(checkpoint.last_completed_id, "tt0000003");
    assert_eq!(checkpoint.dataset_name, "movies");

    let mirrored = dir
        .path()
        .join("mirror/reviews/output/title_with_reviews.csv");
    assert_eq!(
        std::fs::read_to_string(mirrored).unwrap(),
        std::fs::read_to_string(sink_path).unwrap()
    );
}
