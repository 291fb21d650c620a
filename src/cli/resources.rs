//! Handler for the `resources` command.

use serde_json::json;

use crate::cli::command::ResourcesArgs;
use crate::cli::output;
use crate::domain::ResourceBudget;
use crate::error::Result;
use crate::infrastructure::config::settings::Settings;
use crate::infrastructure::resource::{CpuDetection, CpuDetector};

/// Show detected cores and the budget a run would use.
pub fn execute(args: &ResourcesArgs, settings: &Settings) -> Result<()> {
    let detection = CpuDetector::new().detect();
    let budget = settings
        .policy
        .to_policy()
        .resolve(detection.cores, args.threads, args.concurrency);

    if output::is_json() {
        output::json_output(to_json(&detection, &budget));
        return Ok(());
    }

    output::header(env!("CARGO_PKG_VERSION"));
    output::section("Resources");
    output::field("Cores", output::highlight(detection.cores));
    output::field("Source", &detection.source);
    output::field("Threads/job", budget.threads_per_job);
    output::field("Concurrency", budget.concurrency);
    output::field("Peak threads", budget.peak_threads());
    if budget.slack > 0 {
        output::field("Slack", budget.slack);
    }
    if budget.is_oversubscribed() {
        output::warning("requested budget oversubscribes the detected cores");
    }
    Ok(())
}

fn to_json(detection: &CpuDetection, budget: &ResourceBudget) -> serde_json::Value {
    json!({
        "command": "resources",
        "detection": detection,
        "budget": budget,
        "peak_threads": budget.peak_threads(),
        "oversubscribed": budget.is_oversubscribed(),
    })
}
