//! End-to-end training run.
//!
//! A run has two phases. [`TrainPlan::prepare`] checks every precondition
//! and fixes the resource budget without starting anything. [`execute`]
//! then runs the shared setup, picks the overlay directory, fans the jobs
//! out and collects a [`RunReport`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::prefetch::{run_prefetch, PrefetchOutcome};
use super::report::RunReport;
use crate::domain::{JobExtras, JobKey, JobResult, JobSpec, OverlayRequest, ResourceBudget};
use crate::error::{PreconditionError, Result};
use crate::infrastructure::config::base::{resolve_base_path, BaseConfig};
use crate::infrastructure::config::settings::{Launcher, Settings};
use crate::infrastructure::overlay::{probe_overlay_dir, OverlayBuilder, OverlayDir};
use crate::infrastructure::resource::{CpuDetection, CpuDetector};
use crate::infrastructure::worker::{find_executable, launcher_program};
use crate::port::Worker;

/// What the caller asked for; every field is optional or has a default.
#[derive(Debug, Clone, Default)]
pub struct TrainRequest {
    /// Requested base config path.
    pub base_config: PathBuf,
    /// Explicit pairs; the base config whitelist is used when empty.
    pub pairs: Vec<String>,
    pub concurrency: Option<usize>,
    pub threads: Option<usize>,
    pub timerange: Option<String>,
    pub overlays: OverlayRequest,
    pub id_prefix: String,
    pub id_suffix: String,
    /// Overrides `run.job_timeout_secs`.
    pub job_timeout: Option<Duration>,
}

/// A validated run, ready to execute.
#[derive(Debug, Clone)]
pub struct TrainPlan {
    pub base: BaseConfig,
    pub pairs: Vec<String>,
    pub detection: CpuDetection,
    pub budget: ResourceBudget,
    pub timerange: String,
    pub job_timeout: Option<Duration>,
    overlays: OverlayRequest,
    identifier_prefix: String,
    identifier_suffix: String,
    log_dir: PathBuf,
    overlay_dir: PathBuf,
    overlay_fallback: PathBuf,
}

impl TrainPlan {
    /// Check preconditions and derive the budget.
    ///
    /// # Errors
    ///
    /// Returns a precondition or config error when the run cannot start:
    /// missing compose file, missing or unreadable base config, no pairs,
    /// two pairs that would share overlay and log paths, or a launcher
    /// executable that cannot be found.
    pub fn prepare(
        settings: &Settings,
        request: TrainRequest,
        detector: &CpuDetector,
    ) -> Result<Self> {
        if settings.worker.launcher == Launcher::Compose && !settings.compose.file.exists() {
            return Err(PreconditionError::ComposeFileMissing {
                path: settings.compose.file.clone(),
            }
            .into());
        }

        let base_path = resolve_base_path(&request.base_config)?;
        let base = BaseConfig::load(&base_path)?;
        let pairs = unique_pairs(base.job_pairs(Some(request.pairs.as_slice()))?)?;
        if pairs.is_empty() {
            return Err(PreconditionError::NoJobs.into());
        }

        let program = launcher_program(&settings.worker);
        match find_executable(program) {
            Some(path) => debug!(program, path = %path.display(), "launcher resolved"),
            None => {
                return Err(PreconditionError::ExecutableMissing {
                    program: program.to_string(),
                }
                .into())
            }
        }

        let detection = detector.detect();
        let budget = settings.policy.to_policy().resolve(
            detection.cores,
            request.threads,
            request.concurrency,
        );
        if budget.is_oversubscribed() {
            warn!(
                cores = budget.cores,
                slack = budget.slack,
                peak_threads = budget.peak_threads(),
                "explicit overrides oversubscribe the detected cores"
            );
        }

        let timerange = request
            .timerange
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| settings.default_timerange());
        let job_timeout = request
            .job_timeout
            .or(settings.run.job_timeout_secs.map(Duration::from_secs));

        info!(
            cores = detection.cores,
            source = %detection.source,
            threads_per_job = budget.threads_per_job,
            concurrency = budget.concurrency,
            pairs = pairs.len(),
            "run planned"
        );

        Ok(Self {
            base,
            pairs,
            detection,
            budget,
            timerange,
            job_timeout,
            overlays: request.overlays,
            identifier_prefix: format!("{}{}", request.id_prefix, settings.worker.identifier_stem),
            identifier_suffix: request.id_suffix,
            log_dir: PathBuf::from(&settings.worker.log_dir),
            overlay_dir: settings.overlay.dir.clone(),
            overlay_fallback: settings.overlay.fallback_dir.clone(),
        })
    }

    /// Model identifier for a job key.
    #[must_use]
    pub fn identifier(&self, key: &JobKey) -> String {
        format!(
            "{}-{}{}",
            self.identifier_prefix, key, self.identifier_suffix
        )
    }

    /// One job per pair, in pair order.
    #[must_use]
    pub fn jobs(&self) -> Vec<JobSpec> {
        let base_config: Arc<Path> = Arc::from(self.base.path());
        self.pairs
            .iter()
            .map(|pair| {
                let key = JobKey::from_pair(pair);
                JobSpec::new(
                    pair.as_str(),
                    Arc::clone(&base_config),
                    self.overlays,
                    self.budget.threads_per_job,
                    JobExtras {
                        timerange: self.timerange.clone(),
                        identifier: self.identifier(&key),
                        log_path: self.log_dir.join(format!("train-{key}.log")),
                    },
                )
            })
            .collect()
    }
}

/// Drop repeated pairs and reject distinct pairs that sanitize to one key.
fn unique_pairs(pairs: Vec<String>) -> std::result::Result<Vec<String>, PreconditionError> {
    let mut seen: HashMap<JobKey, String> = HashMap::new();
    let mut unique = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let key = JobKey::from_pair(&pair);
        match seen.get(&key) {
            Some(first) if *first == pair => debug!(pair = %pair, "ignoring repeated pair"),
            Some(first) => {
                return Err(PreconditionError::DuplicateJobKey {
                    key: key.to_string(),
                    first: first.clone(),
                    second: pair,
                })
            }
            None => {
                seen.insert(key, pair.clone());
                unique.push(pair);
            }
        }
    }
    Ok(unique)
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The shared setup failed; no job was dispatched.
    PrefetchFailed(i32),
    /// Every job ran and reported.
    Completed(RunReport),
}

impl RunOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PrefetchFailed(code) => *code,
            Self::Completed(report) => report.exit_code(),
        }
    }
}

/// Progress of a run, reported to the caller as it happens.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// Setup succeeded and the overlay directory is chosen; `jobs` jobs
    /// are about to be dispatched.
    Dispatching {
        jobs: usize,
        overlay_dir: &'a OverlayDir,
    },
    /// One job finished.
    JobFinished(&'a JobResult),
}

/// Run the shared setup, then every job in the plan.
///
/// # Errors
///
/// Returns a precondition error if the shared setup could not be started.
/// Job failures never surface here; they are recorded in the report.
pub async fn execute<F>(
    plan: &TrainPlan,
    worker: Arc<dyn Worker>,
    mut on_event: F,
) -> Result<RunOutcome>
where
    F: FnMut(RunEvent<'_>),
{
    if let PrefetchOutcome::Failed(code) = run_prefetch(worker.as_ref(), plan.base.path()).await? {
        return Ok(RunOutcome::PrefetchFailed(code));
    }

    let overlay_dir = probe_overlay_dir(&plan.overlay_dir, &plan.overlay_fallback);
    let jobs = plan.jobs();
    on_event(RunEvent::Dispatching {
        jobs: jobs.len(),
        overlay_dir: &overlay_dir,
    });

    let builder = Arc::new(OverlayBuilder::new(overlay_dir.path));
    let results = Dispatcher::new(worker, builder, plan.budget.concurrency)
        .with_timeout(plan.job_timeout)
        .dispatch(jobs, |result| on_event(RunEvent::JobFinished(result)))
        .await;

    let report: RunReport = results.into_iter().collect();
    info!(
        total = report.len(),
        failed = report.failures().len(),
        "run complete"
    );
    Ok(RunOutcome::Completed(report))
}
