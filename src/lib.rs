//! Pairtrain - resource-aware parallel training across trading pairs.
//!
//! Runs one long-lived external worker job per trading pair on shared,
//! constrained compute. The orchestrator detects the cores actually usable
//! by the process, derives a budget that does not oversubscribe them, runs a
//! blocking shared setup step, writes small per-job configuration overlays
//! instead of touching the shared base config, fans the jobs out with
//! bounded parallelism and folds their exit codes into one.
//!
//! # Architecture
//!
//! The crate follows hexagonal layering:
//!
//! - [`domain`] - Jobs, keys, budgets, overlay fragments and coverage rules
//! - [`port`] - The [`Worker`](port::Worker) trait jobs are executed through
//! - [`infrastructure`] - Config files, CPU detection, overlay files and the
//!   process-backed worker
//! - [`app`] - Prefetch, bounded dispatch, result aggregation and the run
//! - [`cli`] - Command-line surface
//!
//! # Exit codes
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | every job succeeded |
//! | 1 | the run completed with at least one failed job |
//! | 2 | a precondition failed before any job was dispatched |
//! | other | the shared setup step failed with this code |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pairtrain::app::{execute, TrainPlan, TrainRequest};
//! use pairtrain::infrastructure::config::settings::Settings;
//! use pairtrain::infrastructure::resource::CpuDetector;
//! use pairtrain::infrastructure::worker::ProcessWorker;
//!
//! # async fn run() -> pairtrain::error::Result<()> {
//! let settings = Settings::resolve(None)?;
//! let request = TrainRequest {
//!     base_config: "user_config/config.json".into(),
//!     ..TrainRequest::default()
//! };
//! let plan = TrainPlan::prepare(&settings, request, &CpuDetector::new())?;
//! let outcome = execute(&plan, Arc::new(ProcessWorker::new(&settings)), |_| {}).await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
