//! Worker port for external job execution.
//!
//! The orchestrator never does the heavy work itself. It hands the shared
//! setup step and each job to a [`Worker`], which runs them to completion
//! and reports a process exit code.

use async_trait::async_trait;

use crate::domain::{JobSpec, OverlayFragment};
use crate::error::{DispatchError, PreconditionError};

/// Runs external worker processes.
///
/// Implementations must be safe to call concurrently from many dispatch
/// tasks; each call blocks (asynchronously) until its process exits.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Run the one-time shared setup step against the base configuration
    /// all jobs will use. Returns the process exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be started.
    async fn prefetch(&self, base_config: &std::path::Path) -> Result<i32, PreconditionError>;

    /// Run one job with its overlay fragments applied in order after the
    /// base configuration. Returns the process exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be started or awaited.
    async fn run_job(
        &self,
        job: &JobSpec,
        overlays: &[OverlayFragment],
    ) -> Result<i32, DispatchError>;
}
