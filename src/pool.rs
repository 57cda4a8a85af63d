//! Bounded-parallelism executor for batches of independent async units.
//!
//! Page downloads inside a single task fan out through here with a small
//! concurrency cap. Each unit resolves to a `Result`; the pool collects
//! every outcome instead of short-circuiting, so one failing unit never
//! costs the batch a concurrency slot.

use futures::stream::{self, StreamExt};
use std::future::Future;

use crate::Result;

/// Run `units` with at most `limit` in flight at once
///
/// Results are returned in completion order, not submission order. All
/// units are driven to completion regardless of individual failures. A
/// limit of zero is treated as one so the batch always makes progress.
pub async fn run_bounded<F, T>(limit: usize, units: Vec<F>) -> Vec<Result<T>>
where
    F: Future<Output = Result<T>>,
{
    let limit = limit.max(1);

    stream::iter(units).buffer_unordered(limit).collect().await
}
