//! Bounded-concurrency driver for the retrying fetcher
//!
//! The pool keeps at most `concurrency` fetches in flight, submits the next
//! item as soon as one finishes, and paces submissions with a random delay.
//! Completions are delivered in completion order over a channel. Once the
//! pool stops submitting (input exhausted, cancellation, or the receiver
//! going away) it still waits for every in-flight fetch before returning.

use crate::config::CrawlerConfig;
use crate::crawler::{FetchOutcome, RetryingFetcher};
use crate::dataset::WorkItem;
use crate::CrawlError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Uniform range the pause between two submissions is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JitterRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl JitterRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms,
            max_ms: max_ms.max(min_ms),
        }
    }

    /// No pause between submissions
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.max_ms == 0
    }

    pub fn sample(&self) -> Duration {
        Duration::from_millis(fastrand::u64(self.min_ms..=self.max_ms.max(self.min_ms)))
    }
}

/// One finished item
#[derive(Debug)]
pub struct Completion {
    pub item: WorkItem,

    /// `Err` only for fatal source errors and worker panics
    pub outcome: Result<FetchOutcome, CrawlError>,
}

/// What the dispatcher did, reported once it has drained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Items handed to a worker
    pub submitted: usize,

    /// Items whose fetch finished (always equal to `submitted` after draining)
    pub finished: usize,

    /// Items never submitted because the pool was stopped
    pub unsubmitted: usize,
}

/// Handles to a running pool
pub struct PoolRun {
    /// Completions in completion order; closed once the pool has drained
    pub completions: mpsc::Receiver<Completion>,

    /// Resolves after every submitted fetch has finished
    pub dispatcher: JoinHandle<PoolReport>,
}

/// Bounded worker pool
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    jitter: JitterRange,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(concurrency: usize, jitter: JitterRange, cancel: CancellationToken) -> Self {
        Self {
            concurrency: concurrency.max(1),
            jitter,
            cancel,
        }
    }

    pub fn from_config(config: &CrawlerConfig, cancel: CancellationToken) -> Self {
        Self::new(
            config.concurrency as usize,
            JitterRange::new(config.jitter_min_ms, config.jitter_max_ms),
            cancel,
        )
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts fetching `items` in the background
    ///
    /// Every item is submitted at most once and, unless the pool is stopped,
    /// exactly once.
    pub fn run(&self, items: Vec<WorkItem>, fetcher: Arc<RetryingFetcher>) -> PoolRun {
        let (tx, rx) = mpsc::channel(self.concurrency);
        let dispatcher = tokio::spawn(dispatch(
            items,
            fetcher,
            self.concurrency,
            self.jitter,
            self.cancel.clone(),
            tx,
        ));

        PoolRun {
            completions: rx,
            dispatcher,
        }
    }
}

fn spawn_fetch(in_flight: &mut JoinSet<Completion>, item: WorkItem, fetcher: Arc<RetryingFetcher>) {
    in_flight.spawn(async move {
        let task_item = item.clone();
        // Inner task so a panicking fetch still reports which item it was
        let outcome = match tokio::spawn(async move { fetcher.fetch(&task_item).await }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(CrawlError::Worker {
                id: item.id.clone(),
                message: e.to_string(),
            }),
        };
        Completion { item, outcome }
    });
}

async fn dispatch(
    items: Vec<WorkItem>,
    fetcher: Arc<RetryingFetcher>,
    concurrency: usize,
    jitter: JitterRange,
    cancel: CancellationToken,
    tx: mpsc::Sender<Completion>,
) -> PoolReport {
    let total = items.len();
    let mut report = PoolReport::default();
    let mut queue = items.into_iter();
    let mut in_flight = JoinSet::new();
    let mut stopping = false;

    loop {
        while !stopping && in_flight.len() < concurrency {
            if cancel.is_cancelled() || tx.is_closed() {
                stopping = true;
                break;
            }
            let Some(item) = queue.next() else {
                break;
            };

            if report.submitted > 0 && !jitter.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        stopping = true;
                        break;
                    }
                    _ = tokio::time::sleep(jitter.sample()) => {}
                }
            }

            tracing::debug!("Submitting {} (position {})", item.id, item.position);
            spawn_fetch(&mut in_flight, item, fetcher.clone());
            report.submitted += 1;
        }

        let completion = match in_flight.join_next().await {
            Some(Ok(completion)) => completion,
            Some(Err(e)) => {
                tracing::error!("Worker task failed to join: {}", e);
                report.finished += 1;
                continue;
            }
            None => break,
        };
        report.finished += 1;

        if tx.send(completion).await.is_err() && !stopping {
            tracing::debug!("Completion receiver dropped, draining in-flight fetches");
            stopping = true;
        }
    }

    report.unsubmitted = total - report.submitted;
    if report.unsubmitted > 0 {
        tracing::info!(
            "Worker pool stopped with {} of {} items unsubmitted",
            report.unsubmitted,
            total
        );
    }
    report
}
