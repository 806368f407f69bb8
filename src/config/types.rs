use serde::Deserialize;
use url::Url;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    pub storage: StorageConfig,
}

/// The single origin being crawled
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Origin every extracted link is resolved against
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path of the root catalog page listing every category
    #[serde(rename = "catalog-path", default = "default_catalog_path")]
    pub catalog_path: String,
}

impl SiteConfig {
    /// Parses the base origin
    pub fn base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    /// Absolute URL of the root catalog page
    pub fn catalog_url(&self) -> Result<Url, url::ParseError> {
        self.base()?.join(&self.catalog_path)
    }
}

/// Dispatcher sizing
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of listing workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the bounded job queue
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// HTTP timeouts and retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TCP connect timeout (seconds)
    #[serde(
        rename = "connect-timeout-secs",
        default = "default_connect_timeout_secs"
    )]
    pub connect_timeout_secs: u64,

    /// Extra attempts after the first failure
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds), doubled on each retry
    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the retry delay (milliseconds)
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// How record candidates are picked on a listing page
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Number of records fetched per listing
    #[serde(default = "default_sample_count")]
    pub count: usize,

    #[serde(default)]
    pub selection: Selection,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            count: default_sample_count(),
            selection: Selection::default(),
        }
    }
}

/// Candidate selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Selection {
    #[default]
    UniformRandom,
    First,
}

/// SQLite location and connection pool bounds
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    #[serde(
        rename = "max-open-connections",
        default = "default_max_open_connections"
    )]
    pub max_open_connections: usize,

    #[serde(
        rename = "max-idle-connections",
        default = "default_max_idle_connections"
    )]
    pub max_idle_connections: usize,
}

fn default_catalog_path() -> String {
    "/".to_string()
}

fn default_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_sample_count() -> usize {
    1
}

fn default_max_open_connections() -> usize {
    4
}

fn default_max_idle_connections() -> usize {
    2
}
