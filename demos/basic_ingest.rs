//! Basic ingestion example
//!
//! This example demonstrates the core functionality of pixiv-ingest:
//! - Building a configuration
//! - Creating a worker instance
//! - Subscribing to lifecycle events
//! - Enqueueing illustration ids
//! - Running the poll loop until Ctrl-C

use pixiv_ingest::{Config, Event, IngestWorker, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    // Build configuration
    let mut config = Config::default();
    config.persistence.database_path = "pixiv-ingest.db".into();
    config.throttle.max_calls = 60;

    // Create worker instance
    let worker = IngestWorker::new(config).await?;

    // Subscribe to events
    let mut events = worker.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::TaskStarted { id, illust_id } => {
                    println!("▶ Task #{id}: illust {illust_id}");
                }
                Event::PageStored {
                    illust_id,
                    pixiv_addr,
                } => {
                    println!("  ✓ {illust_id}: stored {pixiv_addr}");
                }
                Event::PageSkipped {
                    illust_id,
                    pixiv_addr,
                    reason,
                } => {
                    println!("  - {illust_id}: skipped {pixiv_addr} ({reason})");
                }
                Event::TaskSucceeded { id, outcome, .. } => {
                    println!("✓ Task #{id} finished: {outcome:?}");
                }
                Event::TaskFailed {
                    id,
                    error,
                    retry_count,
                    ..
                } => {
                    println!("✗ Task #{id} failed (attempt {retry_count}): {error}");
                }
                Event::TaskDead { id, error, .. } => {
                    println!("✗ Task #{id} retired: {error}");
                }
                _ => {}
            }
        }
    });

    // Queue a couple of works; already-known ids are ignored
    for illust_id in ["129876543", "129876544"] {
        if worker.enqueue(illust_id).await? {
            println!("Queued illust {illust_id}");
        }
    }

    // Poll until SIGTERM/SIGINT; an in-flight task always finishes first
    run_with_shutdown(worker).await?;

    Ok(())
}
