//! Configuration types for pixiv-ingest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Worker loop configuration (polling cadence, retry bound)
///
/// Groups settings for the outer consumer loop. Used as a nested sub-config
/// within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Pause after every processed task, success or failure (default: 5 seconds)
    #[serde(default = "default_inter_task_delay", with = "duration_serde")]
    pub inter_task_delay: Duration,

    /// First idle sleep after an empty poll (default: 1 second)
    ///
    /// Doubles after each consecutive empty poll and resets the moment a task
    /// is found.
    #[serde(default = "default_idle_backoff_start", with = "duration_serde")]
    pub idle_backoff_start: Duration,

    /// Upper bound for the idle sleep (default: 60 seconds)
    #[serde(default = "default_idle_backoff_cap", with = "duration_serde")]
    pub idle_backoff_cap: Duration,

    /// Run attempts before a failing task is moved to Dead (default: 3)
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inter_task_delay: default_inter_task_delay(),
            idle_backoff_start: default_idle_backoff_start(),
            idle_backoff_cap: default_idle_backoff_cap(),
            max_retry: default_max_retry(),
        }
    }
}

/// Fixed-window rate throttle configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Calls allowed per window before the throttle trips (default: 60)
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    /// How long the tripping call is suspended before the counter resets
    /// (default: 240 seconds)
    #[serde(default = "default_cooldown", with = "duration_serde")]
    pub cooldown: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            cooldown: default_cooldown(),
        }
    }
}

/// Per-task ingestion pipeline configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Page downloads in flight at once within a task (default: 2)
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,

    /// Pages considered per illustration; longer sets are truncated
    /// (default: 20)
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Pause before each page fetch to respect upstream pacing
    /// (default: 2 seconds)
    #[serde(default = "default_page_delay", with = "duration_serde")]
    pub page_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_concurrency: default_page_concurrency(),
            max_pages: default_max_pages(),
            page_delay: default_page_delay(),
        }
    }
}

/// In-memory metadata cache configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a fetched metadata entry stays fresh (default: 3600 seconds)
    #[serde(default = "default_metadata_ttl", with = "duration_serde")]
    pub metadata_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl: default_metadata_ttl(),
        }
    }
}

/// Upstream gallery endpoint configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GalleryConfig {
    /// Base URL of the gallery service (default: "https://www.pixiv.net")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Referer header sent with page fetches; the image CDN rejects bare
    /// requests (default: "https://www.pixiv.net/")
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Optional HTTP(S) proxy URL for all gallery traffic
    #[serde(default)]
    pub proxy: Option<String>,

    /// Timeout for a single gallery request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header for gallery requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            referer: default_referer(),
            proxy: None,
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Notification configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook to POST fire-and-forget notifications to (None = disabled)
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// Webhook endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Data storage configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file (default: "pixiv-ingest.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for the ingestion worker
///
/// Fields are organized into logical sub-configs:
/// - [`worker`](WorkerConfig) — polling cadence, retry bound
/// - [`throttle`](ThrottleConfig) — fixed-window call budget
/// - [`pipeline`](PipelineConfig) — page concurrency, truncation, pacing
/// - [`cache`](CacheConfig) — metadata TTL
/// - [`gallery`](GalleryConfig) — upstream endpoints, proxy, headers
/// - [`notification`](NotificationConfig) — fire-and-forget webhook
/// - [`persistence`](PersistenceConfig) — database location
///
/// The crate is a library; the host application builds this struct (typically
/// by deserializing its own settings file) and passes it in at construction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Worker loop settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Rate throttle settings
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Ingestion pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Metadata cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Gallery endpoint settings
    #[serde(default)]
    pub gallery: GalleryConfig,

    /// Notification settings
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Data storage settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check the configuration for values the worker cannot run with.
    ///
    /// Called once at construction; the worker fails fast on a bad config
    /// rather than discovering it mid-loop.
    pub fn validate(&self) -> Result<()> {
        if self.throttle.max_calls == 0 {
            return Err(Error::Config {
                message: "max_calls must be at least 1".into(),
                key: Some("throttle.max_calls".into()),
            });
        }
        if self.pipeline.page_concurrency == 0 {
            return Err(Error::Config {
                message: "page_concurrency must be at least 1".into(),
                key: Some("pipeline.page_concurrency".into()),
            });
        }
        if self.pipeline.max_pages == 0 {
            return Err(Error::Config {
                message: "max_pages must be at least 1".into(),
                key: Some("pipeline.max_pages".into()),
            });
        }
        if self.worker.idle_backoff_start.is_zero() {
            return Err(Error::Config {
                message: "idle_backoff_start must be non-zero or the idle sleep never grows".into(),
                key: Some("worker.idle_backoff_start".into()),
            });
        }
        if Url::parse(&self.gallery.base_url).is_err() {
            return Err(Error::Config {
                message: format!("base_url is not a valid URL: {}", self.gallery.base_url),
                key: Some("gallery.base_url".into()),
            });
        }
        if let Some(proxy) = &self.gallery.proxy
            && Url::parse(proxy).is_err()
        {
            return Err(Error::Config {
                message: format!("proxy is not a valid URL: {proxy}"),
                key: Some("gallery.proxy".into()),
            });
        }
        Ok(())
    }
}

// Default value functions
fn default_inter_task_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_idle_backoff_start() -> Duration {
    Duration::from_secs(1)
}

fn default_idle_backoff_cap() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retry() -> u32 {
    3
}

fn default_max_calls() -> u32 {
    60
}

fn default_cooldown() -> Duration {
    Duration::from_secs(4 * 60) // 4 minutes
}

fn default_page_concurrency() -> usize {
    2
}

fn default_max_pages() -> usize {
    20
}

fn default_page_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_metadata_ttl() -> Duration {
    Duration::from_secs(60 * 60) // 1 hour
}

fn default_base_url() -> String {
    "https://www.pixiv.net".into()
}

fn default_referer() -> String {
    "https://www.pixiv.net/".into()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .into()
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("pixiv-ingest.db")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
