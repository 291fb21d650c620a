//! Pure orchestration domain: jobs, budgets and coverage rules.

mod id;

pub mod budget;
pub mod coverage;
pub mod job;
pub mod overlay;

pub use budget::{
    choose_threads, compute_default_concurrency, ConcurrencyPolicy, ResourceBudget,
    DEFAULT_MAX_CONCURRENCY,
};
pub use id::{safe_name, JobKey};
pub use job::{JobExtras, JobResult, JobSpec, OverlayRequest, DISPATCH_FAILURE, TIMEOUT};
pub use overlay::{FragmentKind, OverlayFragment};
