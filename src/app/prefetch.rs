//! One-time shared setup that must succeed before any job runs.

use std::path::Path;

use tracing::{error, info};

use crate::error::PreconditionError;
use crate::port::Worker;

/// Result of the shared setup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchOutcome {
    /// Setup exited 0; jobs may be dispatched.
    Ready,
    /// Setup exited nonzero; the run must stop with this code.
    Failed(i32),
}

impl PrefetchOutcome {
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Run the shared setup step once and wait for it.
///
/// # Errors
///
/// Returns a precondition error if the setup process could not be started.
pub async fn run_prefetch(
    worker: &dyn Worker,
    base_config: &Path,
) -> Result<PrefetchOutcome, PreconditionError> {
    info!(config = %base_config.display(), "prefetching historical data");
    let started = std::time::Instant::now();
    let code = worker.prefetch(base_config).await?;

    if code == 0 {
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "prefetch complete");
        Ok(PrefetchOutcome::Ready)
    } else {
        error!(code, "prefetch failed");
        Ok(PrefetchOutcome::Failed(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::worker::ScriptedWorker;

    #[tokio::test]
    async fn zero_exit_is_ready() {
        let worker = ScriptedWorker::new();
        let outcome = run_prefetch(&worker, Path::new("cfg.json")).await.unwrap();
        assert_eq!(outcome, PrefetchOutcome::Ready);
        assert_eq!(worker.prefetch_calls(), 1);
    }

    #[tokio::test]
    async fn nonzero_exit_is_propagated() {
        let worker = ScriptedWorker::new().with_prefetch_code(7);
        let outcome = run_prefetch(&worker, Path::new("cfg.json")).await.unwrap();
        assert_eq!(outcome, PrefetchOutcome::Failed(7));
        assert!(!outcome.is_ready());
    }

    #[tokio::test]
    async fn spawn_failure_is_a_precondition_error() {
        let worker = ScriptedWorker::new().with_prefetch_spawn_error();
        let result = run_prefetch(&worker, Path::new("cfg.json")).await;
        assert!(matches!(result, Err(PreconditionError::PrefetchSpawn(_))));
    }
}
