//! Run coordinator
//!
//! The orchestrator ties the crawl together:
//! 1. Loads the checkpoint and works out where the run starts
//! 2. Hands the remaining work items to the worker pool
//! 3. Records every completion in the output sink
//! 4. Advances the checkpoint along the contiguous completed prefix
//! 5. Pushes the sink to the sync target on its count/time cadence
//! 6. On exit (normal, stop request or fatal error) drains in-flight work,
//!    pushes a final snapshot and releases the review source

use crate::config::Config;
use crate::crawler::{Completion, FetchOutcome, RetryingFetcher, ReviewSource, WorkerPool};
use crate::dataset::WorkItem;
use crate::output::{build_sync_target, OutputRecord, OutputSink, RemoteSync, RunSummary, SyncScheduler};
use crate::state::{CompletionTracker, PipelineState};
use crate::storage::{resume_index, start_index_for, Checkpoint, CheckpointStore, FileCheckpointStore};
use crate::{CrawlError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Tick used when no sync target is configured; the tick branch is disabled then
const IDLE_TICK: Duration = Duration::from_secs(3600);

/// Shortest interval between timer-driven sync checks
const MIN_SYNC_TICK: Duration = Duration::from_millis(100);

/// Where in the work list a run begins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPosition {
    /// One past the saved checkpoint (the start of the list if there is none)
    Checkpoint,

    /// The first item, ignoring any saved checkpoint
    Beginning,

    /// The named item, inclusive
    FromId(String),
}

/// The work one run is asked to do
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub dataset_name: String,
    pub items: Vec<WorkItem>,
    pub start: StartPosition,
}

impl RunPlan {
    pub fn new(dataset_name: impl Into<String>, items: Vec<WorkItem>, start: StartPosition) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            items,
            start,
        }
    }
}

/// Main orchestrator for a crawl run
pub struct Orchestrator {
    fetcher: Arc<RetryingFetcher>,
    pool: WorkerPool,
    store: Arc<dyn CheckpointStore>,
    sink: OutputSink,
    sync: Option<RemoteSync>,
    cancel: CancellationToken,
    progress_interval: usize,
    state: PipelineState,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<RetryingFetcher>,
        pool: WorkerPool,
        store: Arc<dyn CheckpointStore>,
        sink: OutputSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            pool,
            store,
            sink,
            sync: None,
            cancel,
            progress_interval: 10,
            state: PipelineState::Idle,
        }
    }

    /// Builds an orchestrator from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `source` - Review source the fetcher drives; closed when the run ends
    /// * `sink` - Output sink for the run
    /// * `cancel` - Token that stops submission of new items when cancelled
    pub fn from_config(
        config: &Config,
        source: Arc<dyn ReviewSource>,
        sink: OutputSink,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let fetcher = Arc::new(RetryingFetcher::from_config(source, config)?);
        let pool = WorkerPool::from_config(&config.crawler, cancel.clone());
        let store = Arc::new(FileCheckpointStore::new(&config.output.state_dir));

        let mut orchestrator = Self::new(fetcher, pool, store, sink, cancel)
            .with_progress_interval(config.crawler.progress_interval as usize);

        if let Some(sync_config) = &config.sync {
            let target = build_sync_target(sync_config)?;
            let scheduler = SyncScheduler::from_config(sync_config, Instant::now());
            let sync = RemoteSync::new(scheduler, target, orchestrator.sink.path());
            orchestrator = orchestrator.with_sync(sync);
        }

        Ok(orchestrator)
    }

    pub fn with_sync(mut self, sync: RemoteSync) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs the plan to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - All work consumed, or a stop request drained cleanly
    /// * `Err(CrawlError)` - A fatal error aborted the run; the checkpoint
    ///   still holds the furthest contiguous progress
    pub async fn run(mut self, plan: RunPlan) -> Result<RunSummary> {
        let mut summary = RunSummary::new(plan.dataset_name.clone());

        let mut result = self.execute(&plan, &mut summary).await;

        self.final_sync(&mut summary).await;
        self.fetcher.source().close().await;

        match self.sink.close().await {
            Ok(rows) => tracing::debug!("Output sink closed after {} rows", rows),
            Err(e) => {
                if result.is_ok() {
                    result = Err(e.into());
                } else {
                    tracing::warn!("Output sink closed with error: {}", e);
                }
            }
        }

        let next = if result.is_ok() {
            PipelineState::Finished
        } else {
            PipelineState::Aborted
        };
        if let Err(e) = self.state.transition(next) {
            tracing::warn!("{}", e);
        }

        summary.final_state = self.state;
        summary.finished_at = Some(Utc::now());

        match result {
            Ok(()) => {
                tracing::info!(
                    "Run of '{}' {}: {} items processed ({} with reviews, {} empty, {} failed)",
                    summary.dataset_name,
                    self.state,
                    summary.processed(),
                    summary.successes,
                    summary.empty,
                    summary.exhausted
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!(
                    "Run of '{}' aborted after {} items: {}",
                    summary.dataset_name,
                    summary.processed(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn execute(&mut self, plan: &RunPlan, summary: &mut RunSummary) -> Result<()> {
        self.state.transition(PipelineState::Resuming)?;

        if plan.items.is_empty() {
            return Err(CrawlError::EmptyWorkList {
                dataset: plan.dataset_name.clone(),
            });
        }

        // Progress is tracked by index into this plan, whatever list the items came from
        let items: Vec<WorkItem> = plan
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| WorkItem {
                position,
                ..item.clone()
            })
            .collect();

        let saved = self.store.load();
        let start = match &plan.start {
            StartPosition::Checkpoint => {
                if !saved.dataset_name.is_empty() && saved.dataset_name != plan.dataset_name {
                    tracing::warn!(
                        "Checkpoint belongs to dataset '{}', not '{}'",
                        saved.dataset_name,
                        plan.dataset_name
                    );
                }
                resume_index(&items, &saved)
            }
            StartPosition::Beginning => 0,
            StartPosition::FromId(id) => start_index_for(&items, id),
        };

        // Everything before `start` counts as done for this dataset
        let mut checkpoint = Checkpoint {
            last_completed_id: start
                .checked_sub(1)
                .map(|idx| items[idx].id.clone())
                .unwrap_or_default(),
            dataset_name: plan.dataset_name.clone(),
            last_derived_id: saved.last_derived_id.clone(),
        };
        self.store.save(&checkpoint)?;

        summary.start_index = start;
        summary.total_items = items.len();
        summary.last_completed_id = checkpoint.last_completed_id.clone();

        self.state.transition(PipelineState::Running)?;

        let remaining = &items[start..];
        if remaining.is_empty() {
            tracing::info!(
                "Nothing left to process in '{}' ({} items already done)",
                plan.dataset_name,
                start
            );
            self.state.transition(PipelineState::Draining)?;
            return Ok(());
        }

        tracing::info!(
            "Processing {} of {} items from '{}' starting at index {} ({}) with {} workers",
            remaining.len(),
            items.len(),
            plan.dataset_name,
            start,
            remaining[0].id,
            self.pool.concurrency()
        );

        let mut tracker = CompletionTracker::new(start);
        let mut run = self.pool.run(remaining.to_vec(), self.fetcher.clone());
        let mut fatal: Option<CrawlError> = None;
        let started = Instant::now();

        let tick = self
            .sync
            .as_ref()
            .map(|sync| (sync.timeout() / 2).max(MIN_SYNC_TICK))
            .unwrap_or(IDLE_TICK);
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let has_sync = self.sync.is_some();

        loop {
            tokio::select! {
                completion = run.completions.recv() => {
                    let Some(completion) = completion else {
                        break;
                    };

                    let handled = self
                        .handle_completion(completion, &items, &mut tracker, &mut checkpoint, summary)
                        .await;
                    if let Err(e) = handled {
                        if fatal.is_none() {
                            tracing::error!("Fatal error, stopping submissions: {}", e);
                            self.cancel.cancel();
                            fatal = Some(e);
                        } else {
                            tracing::debug!("Further error while draining: {}", e);
                        }
                    }

                    let processed = summary.processed();
                    if processed > 0 && processed % self.progress_interval == 0 {
                        let elapsed = started.elapsed().as_secs_f64();
                        let rate = if elapsed > 0.0 { processed as f64 / elapsed } else { 0.0 };
                        tracing::info!(
                            "Progress: {}/{} items processed ({:.2} items/sec), checkpoint at {} ({} finished past it)",
                            processed,
                            remaining.len(),
                            rate,
                            checkpoint.last_completed_id,
                            tracker.waiting()
                        );
                    }
                }
                _ = self.cancel.cancelled(), if self.state == PipelineState::Running => {
                    tracing::info!("Stop requested, waiting for in-flight items to finish");
                    self.state.transition(PipelineState::Draining)?;
                }
                _ = ticker.tick(), if has_sync => {
                    self.sync_if_due(summary.processed() as u64).await;
                }
            }
        }

        if self.state == PipelineState::Running {
            self.state.transition(PipelineState::Draining)?;
        }

        let report = run.dispatcher.await.map_err(|e| CrawlError::Worker {
            id: "dispatcher".to_string(),
            message: e.to_string(),
        })?;
        summary.unsubmitted = report.unsubmitted;
        summary.cancelled = self.cancel.is_cancelled();

        // Persist the final position even when aborting
        if let Err(e) = self.store.save(&checkpoint) {
            match fatal {
                Some(_) => tracing::error!("Could not save final checkpoint: {}", e),
                None => return Err(e.into()),
            }
        }
        summary.last_completed_id = checkpoint.last_completed_id.clone();

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn handle_completion(
        &mut self,
        completion: Completion,
        items: &[WorkItem],
        tracker: &mut CompletionTracker,
        checkpoint: &mut Checkpoint,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let Completion { item, outcome } = completion;
        let outcome = outcome?;

        match &outcome {
            FetchOutcome::Success {
                declared_total,
                records,
            } => tracing::info!(
                "{} ({}): {} reviews ({} declared)",
                item.id,
                item.label,
                records.len(),
                declared_total
            ),
            FetchOutcome::EmptyResult => tracing::info!("{} ({}): no reviews", item.id, item.label),
            FetchOutcome::ExhaustedFailure { attempts, last_error } => tracing::warn!(
                "{} ({}): failed after {} attempts: {}",
                item.id,
                item.label,
                attempts,
                last_error
            ),
        }

        summary.record(&outcome);
        self.sink.append(OutputRecord::from_outcome(&item, &outcome)).await?;

        if let Some(position) = tracker.record(item.position) {
            *checkpoint = checkpoint.advanced_to(&items[position].id);
            self.store.save(checkpoint)?;
            summary.last_completed_id = checkpoint.last_completed_id.clone();
        }

        self.sync_if_due(summary.processed() as u64).await;
        Ok(())
    }

    async fn sync_if_due(&mut self, processed: u64) {
        let Some(sync) = self.sync.as_mut() else {
            return;
        };
        if !sync.is_due(processed, Instant::now()) {
            return;
        }

        if let Err(e) = self.sink.flush().await {
            tracing::warn!("Skipping sync, output sink could not be flushed: {}", e);
            return;
        }
        sync.push(self.sink.path(), processed).await;
    }

    async fn final_sync(&mut self, summary: &mut RunSummary) {
        let Some(sync) = self.sync.as_mut() else {
            return;
        };

        if let Err(e) = self.sink.flush().await {
            tracing::warn!("Output sink could not be flushed before final sync: {}", e);
        }
        sync.final_push(self.sink.path(), summary.processed() as u64).await;
        summary.syncs = sync.pushes();
    }
}
