use serde::Deserialize;

/// Main configuration structure for Review Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    pub output: OutputConfig,
    /// Remote sync is disabled when this section is absent
    #[serde(default)]
    pub sync: Option<SyncConfig>,
}

/// Retry, pacing and concurrency behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of fetches kept in flight
    pub concurrency: u32,

    /// Total attempts per item before it is recorded as an exhausted failure
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay between attempts (milliseconds); base delay for exponential backoff
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Backoff shape between attempts
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Upper bound for exponential backoff delays (milliseconds)
    #[serde(rename = "max-retry-delay-ms", default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Declared review count at or above which the "show all" expansion is issued
    #[serde(rename = "expansion-threshold", default = "default_expansion_threshold")]
    pub expansion_threshold: u64,

    /// Lower bound of the pacing delay between submissions (milliseconds)
    #[serde(rename = "jitter-min-ms")]
    pub jitter_min_ms: u64,

    /// Upper bound of the pacing delay between submissions (milliseconds)
    #[serde(rename = "jitter-max-ms")]
    pub jitter_max_ms: u64,

    /// Completions between progress log lines
    #[serde(rename = "progress-interval", default = "default_progress_interval")]
    pub progress_interval: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Where and how review pages are fetched
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path template of the review page; `{id}` is replaced by the item id
    #[serde(rename = "review-path")]
    pub review_path: String,

    /// Path template of the fully expanded review page
    #[serde(rename = "expand-path")]
    pub expand_path: String,

    /// CSS selector of the element holding the declared total ("14 reviews")
    #[serde(rename = "count-selector")]
    pub count_selector: String,

    /// CSS selector of each review body
    #[serde(rename = "review-selector")]
    pub review_selector: String,

    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Optional pool of user agents, one picked at random per request
    #[serde(rename = "user-agents", default)]
    pub user_agents: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.imdb.com".to_string(),
            review_path: "/title/{id}/reviews".to_string(),
            expand_path: "/title/{id}/reviews?spoiler=include&showAll=true".to_string(),
            count_selector: "div[data-testid='tturv-total-reviews']".to_string(),
            review_selector: "div.ipc-html-content-inner-div".to_string(),
            request_timeout_secs: 10,
            user_agents: Vec::new(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Append-only CSV of `imdb_id,review_count` rows
    #[serde(rename = "sink-path")]
    pub sink_path: String,

    /// Directory holding the checkpoint records
    #[serde(rename = "state-dir", default = "default_state_dir")]
    pub state_dir: String,

    /// Directory of exported work lists, reloaded by dataset name on resume
    #[serde(rename = "dataset-dir", default = "default_dataset_dir")]
    pub dataset_dir: String,

    /// When set, review bodies are written per item under `<dir>/<dataset>/`
    #[serde(rename = "reviews-dir", default)]
    pub reviews_dir: Option<String>,
}

/// Periodic snapshot upload of the output sink
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub bucket: String,

    /// Push after every `interval` completions
    pub interval: u64,

    /// Push when this many seconds passed since the last push
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Base URL of an object store accepting `PUT <endpoint>/<bucket>/<object>`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Local directory standing in for the bucket (mounted volume, NFS, ...)
    #[serde(rename = "mirror-dir", default)]
    pub mirror_dir: Option<String>,
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_expansion_threshold() -> u64 {
    25
}

fn default_progress_interval() -> u64 {
    10
}

fn default_state_dir() -> String {
    ".".to_string()
}

fn default_dataset_dir() -> String {
    "movie_data".to_string()
}
