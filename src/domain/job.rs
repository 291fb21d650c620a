//! Units of work handed to the dispatcher and the outcomes they produce.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::id::JobKey;

/// Exit code recorded when a job fails inside the dispatcher before (or
/// around) its external process, e.g. an overlay write or spawn failure.
pub const DISPATCH_FAILURE: i32 = 99;

/// Exit code recorded when a job exceeds its wall-clock timeout.
pub const TIMEOUT: i32 = 124;

/// Overlay fragments a job asks for beyond the mandatory set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayRequest {
    /// Verbose reward logging and DEBUG log level for the worker.
    pub debug: bool,
    /// Start from scratch instead of restoring the best checkpoint.
    pub fresh: bool,
}

/// Free-form per-job parameters passed through to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobExtras {
    /// Time range the worker runs over, e.g. `20240101-20250930`.
    pub timerange: String,
    /// Model identifier, unique per job.
    pub identifier: String,
    /// Log file the worker writes to, unique per job.
    pub log_path: PathBuf,
}

/// One unit of work: a single pair run by a single worker invocation.
///
/// Created once before dispatch and never mutated afterwards; the dispatch
/// task that runs it takes ownership.
#[derive(Debug, Clone)]
pub struct JobSpec {
    key: JobKey,
    pair: String,
    base_config: Arc<Path>,
    overlays: OverlayRequest,
    threads: usize,
    extras: JobExtras,
}

impl JobSpec {
    /// Create a job for `pair` sharing the read-only `base_config`.
    pub fn new(
        pair: impl Into<String>,
        base_config: Arc<Path>,
        overlays: OverlayRequest,
        threads: usize,
        extras: JobExtras,
    ) -> Self {
        let pair = pair.into();
        Self {
            key: JobKey::from_pair(&pair),
            pair,
            base_config,
            overlays,
            threads: threads.max(1),
            extras,
        }
    }

    #[must_use]
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// The unsanitized pair name, used for the scope restriction.
    #[must_use]
    pub fn pair(&self) -> &str {
        &self.pair
    }

    #[must_use]
    pub fn base_config(&self) -> &Path {
        &self.base_config
    }

    #[must_use]
    pub fn overlays(&self) -> OverlayRequest {
        self.overlays
    }

    /// Threads allotted to this job (not the whole-run total).
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    #[must_use]
    pub fn extras(&self) -> &JobExtras {
        &self.extras
    }
}

/// Outcome of one job, keyed by job identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub key: JobKey,
    pub pair: String,
    pub code: i32,
}

impl JobResult {
    pub fn new(job: &JobSpec, code: i32) -> Self {
        Self {
            key: job.key().clone(),
            pair: job.pair().to_string(),
            code,
        }
    }

    /// Result for a job the dispatcher could not run to completion.
    pub fn dispatch_failure(job: &JobSpec) -> Self {
        Self::new(job, DISPATCH_FAILURE)
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// `OK` or `FAIL(<code>)`.
    #[must_use]
    pub fn status_label(&self) -> String {
        if self.success() {
            "OK".to_string()
        } else {
            format!("FAIL({})", self.code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(pair: &str, threads: usize) -> JobSpec {
        JobSpec::new(
            pair,
            Arc::from(Path::new("user_config/config.json")),
            OverlayRequest::default(),
            threads,
            JobExtras {
                timerange: "20240101-20250930".into(),
                identifier: "dqn-test".into(),
                log_path: PathBuf::from("user_data/logs/train-test.log"),
            },
        )
    }

    #[test]
    fn job_spec_derives_key_from_pair() {
        let spec = job("ETH/USDT:USDT", 2);
        assert_eq!(spec.key().as_str(), "ETH_USDT_USDT");
        assert_eq!(spec.pair(), "ETH/USDT:USDT");
        assert_eq!(spec.threads(), 2);
    }

    #[test]
    fn job_spec_threads_floor_at_one() {
        assert_eq!(job("BTC/USDT", 0).threads(), 1);
    }

    #[test]
    fn status_label_distinguishes_success_and_failure() {
        let spec = job("BTC/USDT", 1);
        assert_eq!(JobResult::new(&spec, 0).status_label(), "OK");
        assert_eq!(JobResult::new(&spec, 3).status_label(), "FAIL(3)");
        assert_eq!(
            JobResult::dispatch_failure(&spec).status_label(),
            "FAIL(99)"
        );
    }
}
