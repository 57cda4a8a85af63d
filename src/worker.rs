//! The long-lived worker loop.
//!
//! [`IngestWorker`] owns the database, the rate throttle, and the ingestion
//! pipeline, and polls the task store until its shutdown token is cancelled.
//! One worker per task store: the loop assumes no other poller competes for
//! tasks, which is a deployment rule rather than something enforced here.

use crate::config::Config;
use crate::db::{Database, DownloadTask};
use crate::error::Result;
use crate::pipeline::IngestionPipeline;
use crate::source::{GallerySource, HttpGallerySource, ModerationList};
use crate::throttle::RateThrottle;
use crate::types::{Event, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Adaptive sleep for empty polls.
///
/// Starts at a configured delay, doubles after each consecutive empty poll up
/// to a cap, and resets the moment a task is found. Kept as its own struct so
/// the doubling arithmetic is testable without sleeping.
#[derive(Clone, Debug)]
pub struct IdleBackoff {
    start: Duration,
    cap: Duration,
    current: Duration,
}

impl IdleBackoff {
    /// Create a backoff beginning at `start` and capped at `cap`.
    #[must_use]
    pub fn new(start: Duration, cap: Duration) -> Self {
        Self {
            start,
            cap,
            current: start,
        }
    }

    /// The sleep to apply for this empty poll; the next one doubles.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    /// Back to the starting delay; called when a poll finds a task.
    pub fn reset(&mut self) {
        self.current = self.start;
    }

    /// The delay the next empty poll would sleep.
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// The ingestion worker: task store, throttle, pipeline, and the poll loop
pub struct IngestWorker {
    /// Database handle; doubles as the task store and, by default, the
    /// moderation list. Exposed so the host (e.g. the discovery job) can
    /// enqueue tasks and read statistics.
    pub db: Arc<Database>,
    pipeline: IngestionPipeline,
    throttle: RateThrottle,
    config: Config,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,
}

impl IngestWorker {
    /// Create a worker from configuration.
    ///
    /// Validates the configuration, opens and migrates the database, and
    /// builds the HTTP gallery source. Any of these failing is fatal: a
    /// worker that cannot reach its store or upstream should not start.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let source: Arc<dyn GallerySource> = Arc::new(HttpGallerySource::new(&config.gallery)?);
        let moderation: Arc<dyn ModerationList> = Arc::clone(&db) as Arc<dyn ModerationList>;

        Self::with_collaborators(config, db, source, moderation)
    }

    /// Create a worker over externally supplied collaborators.
    ///
    /// Used by tests and by hosts that bring their own gallery source or
    /// moderation list.
    pub fn with_collaborators(
        config: Config,
        db: Arc<Database>,
        source: Arc<dyn GallerySource>,
        moderation: Arc<dyn ModerationList>,
    ) -> Result<Self> {
        config.validate()?;

        // Buffer enough events that a slow subscriber does not lag during a
        // long page walk
        let (event_tx, _rx) = broadcast::channel(1000);

        let throttle = RateThrottle::new(config.throttle.max_calls, config.throttle.cooldown);
        let pipeline = IngestionPipeline::new(
            Arc::clone(&db),
            source,
            moderation,
            &config,
            event_tx.clone(),
        );

        Ok(Self {
            db,
            pipeline,
            throttle,
            config,
            event_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe to worker events.
    ///
    /// Multiple subscribers are supported; events are observability only and
    /// nothing in the worker consumes them.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token observed when idle and between tasks.
    ///
    /// Cancelling it stops the loop after its in-flight task; a started
    /// pipeline run always completes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The configuration this worker was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Enqueue an illustration for ingestion.
    ///
    /// Returns `true` when a new task was created, `false` when a task for
    /// this illustration already exists in any status.
    pub async fn enqueue(&self, illust_id: &str) -> Result<bool> {
        self.db.insert_task_if_absent(illust_id).await
    }

    /// Run the poll loop until the shutdown token is cancelled.
    ///
    /// Each iteration polls for one pending-or-failed task. When none is
    /// found the loop sleeps with [`IdleBackoff`]; when one is found it is
    /// throttled, marked running, run through the pipeline, and marked with
    /// its result. A fixed inter-task delay follows every processed task.
    /// No single task's failure stops the loop.
    pub async fn run(&self) {
        info!("Ingestion worker started");
        match self.db.task_stats().await {
            Ok(stats) => info!(
                pending = stats.pending,
                fail = stats.fail,
                dead = stats.dead,
                success = stats.success,
                "Task store at startup"
            ),
            Err(e) => warn!(error = %e, "Failed to read task statistics at startup"),
        }

        let mut backoff = IdleBackoff::new(
            self.config.worker.idle_backoff_start,
            self.config.worker.idle_backoff_cap,
        );

        while !self.shutdown.is_cancelled() {
            // Poll-query errors are idle iterations, not loop exits
            let task = match self.db.find_one_pollable().await {
                Ok(task) => task,
                Err(e) => {
                    warn!(error = %e, "Poll query failed, treating as idle");
                    None
                }
            };

            let Some(task) = task else {
                let delay = backoff.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "No pollable task, backing off");
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                continue;
            };

            backoff.reset();
            self.process_task(task).await;
            self.pipeline.purge_metadata_cache().await;

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.worker.inter_task_delay) => {}
            }
        }

        info!("Ingestion worker stopped");
        self.emit_event(Event::WorkerStopped);
    }

    /// Take one polled task through throttle, marking, and the pipeline.
    ///
    /// Every failure is recorded on the task and logged; nothing propagates.
    async fn process_task(&self, task: DownloadTask) {
        if self.throttle.acquire().await {
            self.emit_event(Event::ThrottleCooldown {
                calls_made: self.throttle.max_calls(),
            });
        }

        let task = match self.db.mark_task_running(task.id).await {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Failed to mark task running, skipping");
                return;
            }
        };

        info!(
            task_id = %task.id,
            illust_id = %task.illust_id,
            attempt = task.retry_count,
            "Task started"
        );
        self.emit_event(Event::TaskStarted {
            id: task.id,
            illust_id: task.illust_id.clone(),
        });

        match self.pipeline.run(&task.illust_id).await {
            Ok(outcome) => {
                if let Err(e) = self.db.mark_task_success(task.id).await {
                    warn!(task_id = %task.id, error = %e, "Failed to mark task success");
                }
                info!(
                    task_id = %task.id,
                    illust_id = %task.illust_id,
                    outcome = ?outcome,
                    "Task succeeded"
                );
                self.emit_event(Event::TaskSucceeded {
                    id: task.id,
                    illust_id: task.illust_id.clone(),
                    outcome,
                });
            }
            Err(e) => {
                let error = e.to_string();
                warn!(
                    task_id = %task.id,
                    illust_id = %task.illust_id,
                    error = %error,
                    "Task failed"
                );
                match self
                    .db
                    .mark_task_failed(task.id, &error, self.config.worker.max_retry)
                    .await
                {
                    Ok(TaskStatus::Dead) => {
                        warn!(
                            task_id = %task.id,
                            illust_id = %task.illust_id,
                            "Retries exhausted, task is dead"
                        );
                        self.emit_event(Event::TaskDead {
                            id: task.id,
                            illust_id: task.illust_id.clone(),
                            error,
                        });
                    }
                    Ok(_) => {
                        self.emit_event(Event::TaskFailed {
                            id: task.id,
                            illust_id: task.illust_id.clone(),
                            error,
                            retry_count: task.retry_count,
                        });
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "Failed to record task failure");
                    }
                }
            }
        }
    }

    /// Emit an event to all subscribers.
    ///
    /// send() errs when no receivers are subscribed; the event is dropped.
    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
