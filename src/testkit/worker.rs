//! Scripted [`Worker`] for dispatcher and orchestrator tests.
//!
//! [`ScriptedWorker`] never spawns a process. Each pair exits with a
//! pre-loaded code (0 by default) after an optional delay, and the worker
//! records what it was asked to do so tests can assert on call counts and
//! on the peak number of jobs in flight.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{JobSpec, OverlayFragment};
use crate::error::{DispatchError, PreconditionError};
use crate::port::Worker;

/// Decrements the in-flight counter even when the job future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A worker with scripted exit codes and recorded calls.
#[derive(Default)]
pub struct ScriptedWorker {
    prefetch_code: i32,
    prefetch_spawn_error: bool,
    codes: HashMap<String, i32>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    spawn_errors: HashSet<String>,
    panics: HashSet<String>,
    prefetch_calls: AtomicUsize,
    job_calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    overlays: Mutex<HashMap<String, Vec<String>>>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code of the shared setup step.
    pub fn with_prefetch_code(mut self, code: i32) -> Self {
        self.prefetch_code = code;
        self
    }

    /// Make the shared setup step fail to start.
    pub fn with_prefetch_spawn_error(mut self) -> Self {
        self.prefetch_spawn_error = true;
        self
    }

    /// Exit code for one pair.
    pub fn with_code(mut self, pair: &str, code: i32) -> Self {
        self.codes.insert(pair.to_string(), code);
        self
    }

    /// How long every job runs before exiting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// How long one pair's job runs, overriding the default delay.
    pub fn with_delay_for(mut self, pair: &str, delay: Duration) -> Self {
        self.delays.insert(pair.to_string(), delay);
        self
    }

    /// Make one pair's job fail to start.
    pub fn with_spawn_error(mut self, pair: &str) -> Self {
        self.spawn_errors.insert(pair.to_string());
        self
    }

    /// Make one pair's job panic inside the worker.
    pub fn with_panic(mut self, pair: &str) -> Self {
        self.panics.insert(pair.to_string());
        self
    }

    /// Wrap in an `Arc` for sharing with a dispatcher.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn prefetch_calls(&self) -> usize {
        self.prefetch_calls.load(Ordering::SeqCst)
    }

    pub fn job_calls(&self) -> usize {
        self.job_calls.load(Ordering::SeqCst)
    }

    /// Highest number of jobs observed running at the same time.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Overlay file names a pair's job received, in order.
    pub fn overlays_for(&self, pair: &str) -> Option<Vec<String>> {
        self.overlays.lock().get(pair).cloned()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn prefetch(&self, _base_config: &Path) -> Result<i32, PreconditionError> {
        self.prefetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.prefetch_spawn_error {
            return Err(PreconditionError::PrefetchSpawn(io::Error::new(
                io::ErrorKind::NotFound,
                "scripted prefetch spawn failure",
            )));
        }
        Ok(self.prefetch_code)
    }

    async fn run_job(
        &self,
        job: &JobSpec,
        overlays: &[OverlayFragment],
    ) -> Result<i32, DispatchError> {
        self.job_calls.fetch_add(1, Ordering::SeqCst);
        self.overlays.lock().insert(
            job.pair().to_string(),
            overlays.iter().map(|f| f.file_name.clone()).collect(),
        );

        if self.spawn_errors.contains(job.pair()) {
            return Err(DispatchError::Spawn {
                job: job.key().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            });
        }

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.running);
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(job.pair())
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.panics.contains(job.pair()) {
            panic!("scripted panic for {}", job.pair());
        }

        Ok(self.codes.get(job.pair()).copied().unwrap_or(0))
    }
}
