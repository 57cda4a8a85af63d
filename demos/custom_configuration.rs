//! Custom configuration example
//!
//! This example shows how to configure pixiv-ingest with various options:
//! - Polling cadence and the retry bound
//! - Rate throttle budget and cooldown
//! - Page concurrency, truncation and pacing
//! - Metadata cache lifetime
//! - Gallery endpoints, proxy and headers
//! - Webhook notifications
//! - Database location

use pixiv_ingest::config::{
    CacheConfig, Config, GalleryConfig, NotificationConfig, PersistenceConfig, PipelineConfig,
    ThrottleConfig, WebhookConfig, WorkerConfig,
};
use pixiv_ingest::{IngestWorker, run_with_shutdown};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let config = Config {
        worker: WorkerConfig {
            inter_task_delay: Duration::from_secs(10),
            idle_backoff_start: Duration::from_secs(2),
            idle_backoff_cap: Duration::from_secs(120),
            max_retry: 5, // More patient than the default 3
        },
        throttle: ThrottleConfig {
            max_calls: 30, // Half the default call budget
            cooldown: Duration::from_secs(600),
        },
        pipeline: PipelineConfig {
            page_concurrency: 1, // Strictly serial page fetches
            max_pages: 50,
            page_delay: Duration::from_secs(5),
        },
        cache: CacheConfig {
            metadata_ttl: Duration::from_secs(7200),
        },
        gallery: GalleryConfig {
            proxy: Some("http://127.0.0.1:8118".to_string()),
            user_agent: "my-archiver/1.0".to_string(),
            ..GalleryConfig::default()
        },
        notification: NotificationConfig {
            webhook: Some(WebhookConfig {
                url: "https://hooks.example.com/ingest".to_string(),
                auth_header: Some("Bearer your-token".to_string()),
                timeout: Duration::from_secs(10),
            }),
        },
        persistence: PersistenceConfig {
            database_path: "data/archive.db".into(),
        },
    };

    let worker = IngestWorker::new(config).await?;
    println!(
        "Worker ready, database at {:?}",
        worker.config().persistence.database_path
    );

    worker.enqueue("129876543").await?;

    run_with_shutdown(worker).await?;

    Ok(())
}
