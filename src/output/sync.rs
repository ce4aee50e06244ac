//! Periodic offload of the output sink to durable storage
//!
//! [`SyncScheduler`] only decides *when* a push is due; it performs no I/O.
//! [`RemoteSync`] pairs it with a [`SyncTarget`] and pushes the whole sink
//! file, so every remote copy is a complete snapshot and a failed push is
//! simply repeated on the next trigger.

use crate::config::SyncConfig;
use crate::output::{OutputError, OutputResult, SyncTarget};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Count/time trigger for remote pushes
#[derive(Debug, Clone)]
pub struct SyncScheduler {
    interval: u64,
    timeout: Duration,
    last_sync: Instant,
    last_count: Option<u64>,
}

impl SyncScheduler {
    /// Creates a scheduler whose timer starts at `now`
    ///
    /// An `interval` of 0 disables the count trigger.
    pub fn new(interval: u64, timeout: Duration, now: Instant) -> Self {
        Self {
            interval,
            timeout,
            last_sync: now,
            last_count: None,
        }
    }

    pub fn from_config(config: &SyncConfig, now: Instant) -> Self {
        Self::new(config.interval, Duration::from_secs(config.timeout_secs), now)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns true if a push is due, and if so restarts the timer
    ///
    /// A push is due when `processed` is a new multiple of the interval or
    /// when more than the timeout has passed since the last push.
    pub fn maybe_sync(&mut self, processed: u64, now: Instant) -> bool {
        let count_due = self.interval > 0
            && processed > 0
            && processed % self.interval == 0
            && self.last_count != Some(processed);
        let time_due = now.saturating_duration_since(self.last_sync) > self.timeout;

        if count_due || time_due {
            self.mark_synced(processed, now);
            true
        } else {
            false
        }
    }

    /// Records a push made outside the trigger (e.g. the final one)
    pub fn mark_synced(&mut self, processed: u64, now: Instant) {
        self.last_sync = now;
        self.last_count = Some(processed);
    }
}

/// Copies the sink into a mirror directory
///
/// The copy is written next to its destination and renamed over it, so the
/// mirror never holds a truncated snapshot.
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    root: PathBuf,
}

impl DirectoryTarget {
    pub fn new(mirror_dir: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            root: mirror_dir.as_ref().join(bucket),
        }
    }
}

#[async_trait]
impl SyncTarget for DirectoryTarget {
    fn describe(&self) -> String {
        format!("dir:{}", self.root.display())
    }

    async fn push(&self, local: &Path, object_name: &str) -> OutputResult<()> {
        let dest = self.root.join(object_name);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging = dest.with_extension("partial");
        tokio::fs::copy(local, &staging).await?;
        tokio::fs::rename(&staging, &dest).await?;
        Ok(())
    }
}

/// Uploads the sink with `PUT {endpoint}/{bucket}/{object}`
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: Client,
    endpoint: Url,
    bucket: String,
}

impl HttpTarget {
    pub fn new(client: Client, endpoint: &str, bucket: &str) -> OutputResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| OutputError::InvalidTarget(format!("{}: {}", endpoint, e)))?;

        Ok(Self {
            client,
            endpoint,
            bucket: bucket.to_string(),
        })
    }

    fn object_url(&self, object_name: &str) -> OutputResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| OutputError::InvalidTarget(self.endpoint.to_string()))?
            .pop_if_empty()
            .push(&self.bucket)
            .extend(object_name.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl SyncTarget for HttpTarget {
    fn describe(&self) -> String {
        format!("{}{}", self.endpoint, self.bucket)
    }

    async fn push(&self, local: &Path, object_name: &str) -> OutputResult<()> {
        let url = self.object_url(object_name)?;
        let body = tokio::fs::read(local).await?;

        let sync_error = |message: String| OutputError::Sync {
            target: url.to_string(),
            message,
        };

        let response = self
            .client
            .put(url.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| sync_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(sync_error(format!("HTTP {}", response.status().as_u16())));
        }
        Ok(())
    }
}

/// Builds the target named by a `[sync]` section
pub fn build_sync_target(config: &SyncConfig) -> OutputResult<Arc<dyn SyncTarget>> {
    match (&config.endpoint, &config.mirror_dir) {
        (Some(endpoint), None) => {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.max(1)))
                .build()
                .map_err(|e| OutputError::InvalidTarget(e.to_string()))?;
            Ok(Arc::new(HttpTarget::new(client, endpoint, &config.bucket)?))
        }
        (None, Some(dir)) => Ok(Arc::new(DirectoryTarget::new(dir, &config.bucket))),
        _ => Err(OutputError::InvalidTarget(
            "exactly one of endpoint or mirror-dir must be set".to_string(),
        )),
    }
}

/// Remote object name for a sink file: `output/<file name>`
pub fn object_name_for(sink_path: &Path) -> String {
    let file_name = sink_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.csv".to_string());
    format!("output/{}", file_name)
}

/// Scheduler, target and object name for one run
pub struct RemoteSync {
    scheduler: SyncScheduler,
    target: Arc<dyn SyncTarget>,
    object_name: String,
    pushes: u64,
}

impl RemoteSync {
    pub fn new(scheduler: SyncScheduler, target: Arc<dyn SyncTarget>, sink_path: &Path) -> Self {
        Self {
            scheduler,
            target,
            object_name: object_name_for(sink_path),
            pushes: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.scheduler.timeout()
    }

    /// Successful pushes so far
    pub fn pushes(&self) -> u64 {
        self.pushes
    }

    /// Returns true if a push is due; see [`SyncScheduler::maybe_sync`]
    pub fn is_due(&mut self, processed: u64, now: Instant) -> bool {
        self.scheduler.maybe_sync(processed, now)
    }

    /// Unconditional push made at shutdown
    pub async fn final_push(&mut self, local: &Path, processed: u64) -> bool {
        self.scheduler.mark_synced(processed, Instant::now());
        self.push(local, processed).await
    }

    /// Pushes the whole of `local`
    ///
    /// Failures are logged and left for the next trigger.
    pub async fn push(&mut self, local: &Path, processed: u64) -> bool {
        if !local.exists() {
            tracing::debug!("Nothing to sync yet, {} does not exist", local.display());
            return false;
        }

        match self.target.push(local, &self.object_name).await {
            Ok(()) => {
                self.pushes += 1;
                tracing::info!(
                    "Synced {} to {} as {} after {} items",
                    local.display(),
                    self.target.describe(),
                    self.object_name,
                    processed
                );
                true
            }
            Err(e) => {
                tracing::warn!("Sync to {} failed, will retry on next trigger: {}", self.target.describe(), e);
                false
            }
        }
    }
}
