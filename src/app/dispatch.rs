//! Bounded fan-out of jobs to the worker.
//!
//! Every job gets its own task, but a semaphore with `K` permits keeps at
//! most `K` of them past the gate at once. A task holds its permit while it
//! writes overlays and while its worker process runs, and releases it when
//! the process exits.
//!
//! Failures stay local. An overlay write error, a spawn error or a panic in
//! the worker becomes a [`DISPATCH_FAILURE`] result for that job only; a
//! timeout becomes [`TIMEOUT`]. Siblings keep running, and every submitted
//! job produces exactly one [`JobResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::{JobResult, JobSpec, DISPATCH_FAILURE, TIMEOUT};
use crate::error::DispatchError;
use crate::infrastructure::overlay::OverlayBuilder;
use crate::port::Worker;

/// Runs jobs through a [`Worker`] with at most `concurrency` in flight.
pub struct Dispatcher {
    worker: Arc<dyn Worker>,
    overlays: Arc<OverlayBuilder>,
    concurrency: usize,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(worker: Arc<dyn Worker>, overlays: Arc<OverlayBuilder>, concurrency: usize) -> Self {
        Self {
            worker,
            overlays,
            concurrency: concurrency.max(1),
            timeout: None,
        }
    }

    /// Kill jobs that run longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every job and return one result per job, in completion order.
    ///
    /// `on_complete` is called on the caller's task as each job finishes.
    pub async fn dispatch<F>(&self, jobs: Vec<JobSpec>, mut on_complete: F) -> Vec<JobResult>
    where
        F: FnMut(&JobResult),
    {
        let total = jobs.len();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        info!(jobs = total, concurrency = self.concurrency, "dispatching jobs");

        for job in jobs {
            let permits = Arc::clone(&permits);
            let worker = Arc::clone(&self.worker);
            let overlays = Arc::clone(&self.overlays);
            let timeout = self.timeout;

            tasks.spawn(async move {
                let fallback = JobResult::dispatch_failure(&job);
                let Ok(_permit) = permits.acquire_owned().await else {
                    error!(job = %fallback.key, "worker pool closed");
                    return fallback;
                };

                // Run in a nested task so a panic in the worker is caught as
                // a JoinError and still yields a result for this job.
                match tokio::spawn(run_one(worker, overlays, job, timeout)).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(job = %fallback.key, error = %e, "dispatch task aborted");
                        fallback
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    on_complete(&result);
                    results.push(result);
                }
                Err(e) => error!(error = %e, "dispatch task lost"),
            }
        }
        results
    }
}

async fn run_one(
    worker: Arc<dyn Worker>,
    overlays: Arc<OverlayBuilder>,
    job: JobSpec,
    timeout: Option<Duration>,
) -> JobResult {
    let started = Instant::now();
    debug!(job = %job.key(), threads = job.threads(), "job started");

    let fragments = match overlays.materialize(&job) {
        Ok(fragments) => fragments,
        Err(e) => {
            error!(job = %job.key(), error = %e, "overlay write failed");
            return JobResult::dispatch_failure(&job);
        }
    };

    let run = worker.run_job(&job, &fragments);
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .unwrap_or_else(|_| {
                Err(DispatchError::Timeout {
                    job: job.key().to_string(),
                    seconds: limit.as_secs(),
                })
            }),
        None => run.await,
    };

    let code = match outcome {
        Ok(code) => code,
        Err(e @ DispatchError::Timeout { .. }) => {
            warn!(job = %job.key(), error = %e, "job timed out");
            TIMEOUT
        }
        Err(e) => {
            error!(job = %job.key(), error = %e, "job dispatch failed");
            DISPATCH_FAILURE
        }
    };

    let result = JobResult::new(&job, code);
    let elapsed_secs = started.elapsed().as_secs();
    if result.success() {
        info!(job = %job.key(), elapsed_secs, "job finished");
    } else {
        warn!(job = %job.key(), code, elapsed_secs, "job failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::fixture;
    use crate::testkit::worker::ScriptedWorker;

    fn jobs(pairs: &[&str]) -> Vec<JobSpec> {
        pairs.iter().map(|p| fixture::job(p)).collect()
    }

    fn code_of(results: &[JobResult], pair: &str) -> i32 {
        results
            .iter()
            .find(|r| r.pair == pair)
            .map(|r| r.code)
            .unwrap()
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_and_drops_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let worker = ScriptedWorker::new()
            .with_delay(Duration::from_millis(30))
            .shared();
        let dispatcher = Dispatcher::new(
            worker.clone(),
            Arc::new(OverlayBuilder::new(dir.path())),
            2,
        );

        let mut completed = 0;
        let results = dispatcher
            .dispatch(jobs(&["A", "B", "C", "D", "E"]), |_| completed += 1)
            .await;

        assert_eq!(results.len(), 5);
        assert_eq!(completed, 5);
        assert_eq!(worker.job_calls(), 5);
        assert_eq!(worker.max_running(), 2);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_job() {
        let dir = tempfile::tempdir().unwrap();
        let worker = ScriptedWorker::new()
            .with_code("B", 3)
            .with_spawn_error("C")
            .with_panic("D")
            .shared();
        let dispatcher = Dispatcher::new(worker, Arc::new(OverlayBuilder::new(dir.path())), 4);

        let results = dispatcher
            .dispatch(jobs(&["A", "B", "C", "D", "E"]), |_| {})
            .await;

        assert_eq!(results.len(), 5);
        assert_eq!(code_of(&results, "A"), 0);
        assert_eq!(code_of(&results, "B"), 3);
        assert_eq!(code_of(&results, "C"), DISPATCH_FAILURE);
        assert_eq!(code_of(&results, "D"), DISPATCH_FAILURE);
        assert_eq!(code_of(&results, "E"), 0);
    }

    #[tokio::test]
    async fn overlay_write_failure_skips_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let worker = ScriptedWorker::new().shared();
        let dispatcher = Dispatcher::new(
            worker.clone(),
            Arc::new(OverlayBuilder::new(dir.path().join("missing"))),
            2,
        );

        let results = dispatcher.dispatch(jobs(&["A", "B"]), |_| {}).await;

        assert!(results.iter().all(|r| r.code == DISPATCH_FAILURE));
        assert_eq!(worker.job_calls(), 0);
    }

    #[tokio::test]
    async fn slow_job_times_out_without_blocking_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let worker = ScriptedWorker::new()
            .with_delay_for("SLOW", Duration::from_secs(30))
            .shared();
        let dispatcher = Dispatcher::new(worker, Arc::new(OverlayBuilder::new(dir.path())), 2)
            .with_timeout(Some(Duration::from_millis(50)));

        let results = dispatcher.dispatch(jobs(&["SLOW", "FAST"]), |_| {}).await;

        assert_eq!(code_of(&results, "SLOW"), TIMEOUT);
        assert_eq!(code_of(&results, "FAST"), 0);
    }

    #[tokio::test]
    async fn worker_receives_materialized_overlays_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let worker = ScriptedWorker::new().shared();
        let dispatcher = Dispatcher::new(
            worker.clone(),
            Arc::new(OverlayBuilder::new(dir.path())),
            1,
        );

        dispatcher
            .dispatch(jobs(&["ETH/USDT:USDT"]), |_| {})
            .await;

        assert_eq!(
            worker.overlays_for("ETH/USDT:USDT").unwrap(),
            [
                "cpu-device.json",
                "id-ETH_USDT_USDT.json",
                "pairs-ETH_USDT_USDT.json"
            ]
        );
        assert!(dir.path().join("pairs-ETH_USDT_USDT.json").is_file());
    }

    #[test]
    fn zero_concurrency_is_floored() {
        let dispatcher = Dispatcher::new(
            ScriptedWorker::new().shared(),
            Arc::new(OverlayBuilder::new("unused")),
            0,
        );
        assert_eq!(dispatcher.concurrency(), 1);
    }
}
