//! Resource budget types for bounded job concurrency.
//!
//! These types translate a detected core count into a per-job thread
//! allocation and a concurrency ceiling that avoid oversubscription.
//!
//! - [`choose_threads`] - Threads per job as a step function of cores
//! - [`compute_default_concurrency`] - Concurrency ceiling from threads and cores
//! - [`ConcurrencyPolicy`] - Tunable cap and slack for the derivation
//! - [`ResourceBudget`] - The resolved budget for one run

use serde::Serialize;

/// Hard cap on concurrent jobs when the ceiling is derived.
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Threads per job for a given core count.
///
/// Grows sub-linearly with `cores` so that larger hosts still run several
/// jobs side by side. Monotonic non-decreasing and never below 1.
#[must_use]
pub const fn choose_threads(cores: usize) -> usize {
    if cores <= 4 {
        1
    } else if cores <= 8 {
        2
    } else if cores <= 24 {
        4
    } else {
        6
    }
}

/// Concurrency ceiling: `clamp(cores / threads, 1, DEFAULT_MAX_CONCURRENCY)`.
#[must_use]
pub fn compute_default_concurrency(threads: usize, cores: usize) -> usize {
    ConcurrencyPolicy::default().concurrency(threads, cores)
}

/// Tunable knobs for deriving the concurrency ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyPolicy {
    /// Upper bound on the derived ceiling.
    pub max_concurrency: usize,
    /// Cores the derivation may oversubscribe by. Zero means none.
    pub slack: usize,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            slack: 0,
        }
    }
}

impl ConcurrencyPolicy {
    /// Derive the concurrency ceiling for `threads` per job on `cores`.
    #[must_use]
    pub fn concurrency(&self, threads: usize, cores: usize) -> usize {
        let k = (cores + self.slack) / threads.max(1);
        k.clamp(1, self.max_concurrency.max(1))
    }

    /// Resolve a budget, letting explicit values bypass the derivation.
    ///
    /// A `Some(0)` override is treated as absent.
    #[must_use]
    pub fn resolve(
        &self,
        cores: usize,
        threads: Option<usize>,
        concurrency: Option<usize>,
    ) -> ResourceBudget {
        let cores = cores.max(1);
        let threads_per_job = threads
            .filter(|t| *t > 0)
            .unwrap_or_else(|| choose_threads(cores));
        let concurrency = concurrency
            .filter(|k| *k > 0)
            .unwrap_or_else(|| self.concurrency(threads_per_job, cores));

        ResourceBudget {
            cores,
            threads_per_job,
            concurrency,
            slack: self.slack,
        }
    }
}

/// Resource budget for one orchestrator run.
///
/// Computed once at start. For derived values
/// `concurrency * threads_per_job <= cores + slack` always holds; explicit
/// overrides may break it, which [`ResourceBudget::is_oversubscribed`]
/// reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceBudget {
    /// Logical cores detected for the whole process.
    pub cores: usize,
    /// Threads allotted to each job.
    pub threads_per_job: usize,
    /// Maximum jobs running at once.
    pub concurrency: usize,
    /// Allowed oversubscription in cores.
    pub slack: usize,
}

impl ResourceBudget {
    /// Threads in use when every slot is busy.
    #[must_use]
    pub const fn peak_threads(&self) -> usize {
        self.concurrency * self.threads_per_job
    }

    #[must_use]
    pub const fn is_oversubscribed(&self) -> bool {
        self.peak_threads() > self.cores + self.slack
    }
}
