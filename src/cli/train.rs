//! Handler for the `train` command.

use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use serde_json::json;
use tabled::{Table, Tabled};

use crate::app::{execute as execute_run, RunEvent, RunOutcome, RunReport, TrainPlan, TrainRequest};
use crate::cli::command::TrainArgs;
use crate::cli::output;
use crate::domain::OverlayRequest;
use crate::error::Result;
use crate::infrastructure::config::settings::{Launcher, Settings};
use crate::infrastructure::resource::CpuDetector;
use crate::infrastructure::worker::ProcessWorker;

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "Pair")]
    pair: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Status")]
    status: String,
}

fn rows(report: &RunReport) -> Vec<JobRow> {
    report
        .results()
        .map(|r| JobRow {
            pair: r.pair.clone(),
            key: r.key.to_string(),
            status: r.status_label(),
        })
        .collect()
}

fn build_request(args: &TrainArgs) -> TrainRequest {
    TrainRequest {
        base_config: args.config.clone(),
        pairs: args.pairs.clone(),
        concurrency: args.concurrency,
        threads: args.threads,
        timerange: args.timerange.clone(),
        overlays: OverlayRequest {
            debug: args.reward_debug,
            fresh: args.fresh,
        },
        id_prefix: args.id_prefix.clone(),
        id_suffix: args.id_suffix.clone(),
        job_timeout: args.job_timeout.map(Duration::from_secs),
    }
}

/// Execute the train command and return the process exit code.
pub async fn execute(args: &TrainArgs, mut settings: Settings) -> Result<i32> {
    if let Some(file) = &args.compose_file {
        settings.compose.file = file.clone();
    }
    if let Some(service) = &args.service {
        settings.compose.service = service.clone();
    }

    let plan = TrainPlan::prepare(&settings, build_request(args), &CpuDetector::new())?;
    print_plan(&plan, &settings);

    output::action("Prefetching", "historical data");
    let worker = Arc::new(ProcessWorker::new(&settings));

    let mut bar: Option<ProgressBar> = None;
    let outcome = execute_run(&plan, worker, |event| match event {
        RunEvent::Dispatching { jobs, overlay_dir } => {
            if overlay_dir.fell_back {
                output::warning(&format!(
                    "{} is not writable; overlays go to {}",
                    settings.overlay.dir.display(),
                    overlay_dir.path.display()
                ));
            }
            bar = Some(output::progress(jobs, "jobs finished"));
        }
        RunEvent::JobFinished(result) => match &bar {
            Some(pb) => {
                pb.suspend(|| output::job_status(&result.pair, result.code));
                pb.inc(1);
            }
            None => output::job_status(&result.pair, result.code),
        },
    })
    .await?;
    if let Some(pb) = bar {
        pb.finish_and_clear();
    }

    match &outcome {
        RunOutcome::PrefetchFailed(code) => {
            output::error(&format!("prefetch failed with code {code}; no jobs were started"));
        }
        RunOutcome::Completed(report) => print_report(report),
    }
    Ok(outcome.exit_code())
}

fn print_plan(plan: &TrainPlan, settings: &Settings) {
    output::header(env!("CARGO_PKG_VERSION"));
    output::section("Plan");
    output::field("Config", plan.base.path().display());
    output::field(
        "Cores",
        format!(
            "{} {}",
            plan.detection.cores,
            output::muted(format!("({})", plan.detection.source))
        ),
    );
    output::field("Threads/job", plan.budget.threads_per_job);
    output::field("Concurrency", plan.budget.concurrency);
    output::field("Timerange", &plan.timerange);
    output::field("Pairs", plan.pairs.len());
    if let Launcher::Compose = settings.worker.launcher {
        output::field("Service", &settings.compose.service);
    }
    if let Some(timeout) = plan.job_timeout {
        output::field("Job timeout", format!("{}s", timeout.as_secs()));
    }
    if output::verbosity() > 0 {
        for pair in &plan.pairs {
            output::note(&format!("- {pair}"));
        }
    }
    if plan.budget.is_oversubscribed() {
        output::warning(&format!(
            "{} threads at peak on {} cores",
            plan.budget.peak_threads(),
            plan.budget.cores
        ));
    }
}

fn print_report(report: &RunReport) {
    if output::is_json() {
        output::json_output(json!({
            "command": "train",
            "report": report.to_json(),
        }));
        return;
    }

    output::section("Summary");
    output::lines(&Table::new(rows(report)).to_string());

    let failures = report.failures();
    if failures.is_empty() {
        output::success(&format!("All {} jobs completed", report.len()));
        return;
    }

    output::section("Failures");
    for failure in &failures {
        output::error(&format!("{} ({}): {}", failure.key, failure.pair, failure.status_label()));
    }
    output::hint("per-job logs are under the worker log directory as train-<key>.log");
}
