//! Application layer - run orchestration over the worker port.
//!
//! - [`prefetch`] - Blocking shared setup before any job
//! - [`dispatch`] - Bounded fan-out of jobs
//! - [`report`] - Fan-in of results and overall exit status
//! - [`orchestrator`] - Preconditions, planning and the full run

pub mod dispatch;
pub mod orchestrator;
pub mod prefetch;
pub mod report;

pub use dispatch::Dispatcher;
pub use orchestrator::{execute, RunEvent, RunOutcome, TrainPlan, TrainRequest};
pub use prefetch::{run_prefetch, PrefetchOutcome};
pub use report::{RunReport, EXIT_JOB_FAILURES, EXIT_PRECONDITION, EXIT_SUCCESS};
