//! Event-channel wait helpers for worker loop tests

use pixiv_ingest::{Event, IngestOutcome};
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of waiting for a task to leave the queue
#[derive(Debug)]
pub enum WaitResult {
    /// The task finished and reported its run outcome
    Succeeded(IngestOutcome),
    /// The task exhausted its retry budget
    Dead(String),
    /// No terminal event arrived within the timeout
    Timeout,
    /// Event channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a task to reach a terminal state (Success or Dead).
///
/// Intermediate `TaskFailed` events are swallowed. Subscribe the receiver
/// before the worker loop starts so no event is missed.
pub async fn wait_for_task_outcome(
    events: &mut broadcast::Receiver<Event>,
    illust_id: &str,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::TaskSucceeded {
                    illust_id: event_illust,
                    outcome,
                    ..
                }) if event_illust == illust_id => {
                    return WaitResult::Succeeded(outcome);
                }
                Ok(Event::TaskDead {
                    illust_id: event_illust,
                    error,
                    ..
                }) if event_illust == illust_id => {
                    return WaitResult::Dead(error);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return WaitResult::ChannelClosed;
                }
            }
        }
    })
    .await;

    match result {
        Ok(wait_result) => wait_result,
        Err(_) => WaitResult::Timeout,
    }
}

/// Wait for success and return the run outcome; panic on any other result.
pub async fn assert_task_succeeds(
    events: &mut broadcast::Receiver<Event>,
    illust_id: &str,
    timeout: Duration,
) -> IngestOutcome {
    match wait_for_task_outcome(events, illust_id, timeout).await {
        WaitResult::Succeeded(outcome) => outcome,
        WaitResult::Dead(error) => {
            panic!("Task for {} died instead of succeeding: {}", illust_id, error);
        }
        WaitResult::Timeout => {
            panic!("Timeout waiting for task {} to finish", illust_id);
        }
        WaitResult::ChannelClosed => {
            panic!("Event channel closed while waiting for task {}", illust_id);
        }
    }
}

/// Collect `TaskFailed` retry counts until the task dies.
///
/// Returns the retry counts in arrival order plus the terminal error, or
/// `None` if the task did not die within the timeout.
pub async fn collect_failures_until_dead(
    events: &mut broadcast::Receiver<Event>,
    illust_id: &str,
    timeout: Duration,
) -> Option<(Vec<i32>, String)> {
    tokio::time::timeout(timeout, async {
        let mut retries = Vec::new();
        loop {
            match events.recv().await {
                Ok(Event::TaskFailed {
                    illust_id: event_illust,
                    retry_count,
                    ..
                }) if event_illust == illust_id => {
                    retries.push(retry_count);
                }
                Ok(Event::TaskDead {
                    illust_id: event_illust,
                    error,
                    ..
                }) if event_illust == illust_id => {
                    return Some((retries, error));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Wait for the first event matching a predicate.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await;

    result.ok().flatten()
}
