//! Fixed-window rate throttle for upstream gallery calls.
//!
//! The throttle counts calls rather than bytes: every task processed
//! charges one call, and once the window budget is spent the charging
//! call sleeps through a cooldown before the counter resets. Bursts
//! inside a window are allowed; the penalty lands entirely on the call
//! that trips the threshold.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Process-local call budget shared across loop iterations
///
/// Fixed-window semantics: the counter climbs to `max_calls`, the
/// tripping call blocks for `cooldown`, then the window starts over at
/// zero. The counter is not persisted; a process restart refills the
/// budget, which is acceptable for a single-worker deployment.
///
/// Clones share the same counter.
#[derive(Clone)]
pub struct RateThrottle {
    /// Calls allowed per window
    max_calls: u32,
    /// Pause applied when the window budget is spent
    cooldown: Duration,
    /// Calls made in the current window
    calls: Arc<AtomicU32>,
}

impl RateThrottle {
    /// Create a throttle allowing `max_calls` per window with the given cooldown
    #[must_use]
    pub fn new(max_calls: u32, cooldown: Duration) -> Self {
        Self {
            max_calls,
            cooldown,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Charge one call against the window budget
    ///
    /// Returns immediately while the budget lasts. The call that reaches
    /// `max_calls` sleeps for the full cooldown and then resets the
    /// counter. Returns `true` when this call tripped the cooldown.
    pub async fn acquire(&self) -> bool {
        let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if count < self.max_calls {
            return false;
        }

        tracing::info!(
            calls = count,
            cooldown_secs = self.cooldown.as_secs(),
            "Rate budget exhausted, cooling down"
        );
        tokio::time::sleep(self.cooldown).await;
        self.calls.store(0, Ordering::SeqCst);

        true
    }

    /// Calls charged in the current window
    pub fn calls_made(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls allowed per window
    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }
}
