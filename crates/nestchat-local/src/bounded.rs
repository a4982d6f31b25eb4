//! Bounded execution for AI calls.
//!
//! The generation backend offers no cancellation of its own, so every
//! call runs inside a spawned task that the runner aborts once the
//! caller's budget elapses. Checking elapsed time *after* completion
//! would not prevent hangs; the timeout has to wrap the wait itself.
//!
//! A semaphore caps how many calls may be outstanding at once. Waiting
//! for a slot spends the same budget as the call, so a saturated pool
//! surfaces as a timeout rather than an unbounded queue.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};

use nestchat_core::CallError;

#[derive(Clone)]
pub struct BoundedRunner {
    permits: Arc<Semaphore>,
}

impl BoundedRunner {
    pub fn new(max_calls: usize) -> Self {
        BoundedRunner {
            permits: Arc::new(Semaphore::new(max_calls.max(1))),
        }
    }

    /// Runs `fut` to completion within `budget`. The permit is held by
    /// the spawned task until it finishes or its abort lands, so an
    /// abandoned call cannot leak a pool slot.
    pub async fn run<T, F>(&self, budget: Duration, label: &str, fut: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, CallError>> + Send + 'static,
    {
        let started = Instant::now();
        let permit = match timeout(budget, self.permits.clone().acquire_owned()).await {
            Ok(Ok(p)) => p,
            // Closed semaphore only happens on shutdown.
            Ok(Err(_)) => return Err(CallError::Timeout),
            Err(_) => {
                tracing::warn!(
                    label,
                    budget_ms = budget.as_millis() as u64,
                    "no call slot within budget"
                );
                return Err(CallError::Timeout);
            }
        };

        let mut task = tokio::spawn(async move {
            let _permit = permit;
            fut.await
        });

        let remaining = budget.saturating_sub(started.elapsed());
        match timeout(remaining, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(CallError::GenerationError(format!(
                "call worker failed: {join_err}"
            ))),
            Err(_) => {
                task.abort();
                tracing::warn!(
                    label,
                    budget_ms = budget.as_millis() as u64,
                    "call aborted at budget"
                );
                Err(CallError::Timeout)
            }
        }
    }
}
