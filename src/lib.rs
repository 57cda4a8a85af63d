//! # pixiv-ingest
//!
//! Background worker library for ingesting pixiv illustrations into a local
//! image collection.
//!
//! The worker polls a SQLite-backed task queue that a surrounding discovery
//! job fills with illustration ids, and takes each task through metadata
//! fetch, content policy checks, tag translation, and a rate-limited walk
//! over the illustration's pages. Page bytes are persisted out-of-band by an
//! external proxy; this crate records the bookkeeping.
//!
//! ## Design
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Single consumer** - One worker loop per task store; politeness toward
//!   the upstream gallery is built in (fixed-window throttle, pacing delays)
//! - **Event-driven observability** - Consumers subscribe to a broadcast
//!   channel of lifecycle events, no polling required
//! - **Recoverable by construction** - Tasks retry up to a bound, then park
//!   as dead letters for manual review
//!
//! ## Quick Start
//!
//! ```no_run
//! use pixiv_ingest::{Config, IngestWorker, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.persistence.database_path = "ingest.db".into();
//!
//!     let worker = IngestWorker::new(config).await?;
//!
//!     // The discovery job enqueues; the worker polls and ingests
//!     worker.enqueue("129876543").await?;
//!
//!     // Subscribe to events
//!     let mut events = worker.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Run with automatic signal handling
//!     run_with_shutdown(worker).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// In-memory TTL cache for illustration metadata
pub mod cache;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Per-task ingestion pipeline
pub mod pipeline;
/// Bounded-concurrency batch runner
pub mod pool;
/// Gallery, moderation, and notification collaborators
pub mod source;
/// Fixed-window rate throttle
pub mod throttle;
/// Core types and events
pub mod types;
/// The long-lived worker loop
pub mod worker;

// Re-export commonly used types
pub use cache::MetadataCache;
pub use config::Config;
pub use db::Database;
pub use error::{DatabaseError, Error, GalleryError, Result};
pub use pipeline::IngestionPipeline;
pub use source::{GallerySource, HttpGallerySource, ModerationList, Notifier, WebhookNotifier};
pub use throttle::RateThrottle;
pub use types::{
    Event, IllustKind, IllustMetadata, IllustPage, IllustTag, IngestOutcome, TagHint, TaskId,
    TaskStats, TaskStatus,
};
pub use worker::{IdleBackoff, IngestWorker};

/// Run the worker with graceful signal handling.
///
/// Spawns the poll loop, waits for a termination signal, cancels the
/// worker's shutdown token, and waits for the loop to finish its in-flight
/// task before returning.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with a ctrl_c fallback if
///   signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use pixiv_ingest::{Config, IngestWorker, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let worker = IngestWorker::new(Config::default()).await?;
///     run_with_shutdown(worker).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(worker: IngestWorker) -> Result<()> {
    let worker = std::sync::Arc::new(worker);
    let token = worker.shutdown_token();

    let loop_handle = {
        let worker = std::sync::Arc::clone(&worker);
        tokio::spawn(async move { worker.run().await })
    };

    wait_for_signal().await;
    tracing::info!("Shutting down, waiting for any in-flight task");
    token.cancel();

    if let Err(e) = loop_handle.await {
        tracing::warn!(error = %e, "Worker loop task ended abnormally");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        _ => {
            // Restricted environments (containers, tests) may refuse signal
            // registration
            tracing::warn!("Could not register unix signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
