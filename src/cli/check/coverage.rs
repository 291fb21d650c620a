//! Historical data coverage check.

use serde_json::json;

use crate::cli::command::CoverageArgs;
use crate::cli::output;
use crate::domain::coverage::{parse_listing, timerange_start, CoverageReport};
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::base::{resolve_base_path, BaseConfig};
use crate::infrastructure::config::settings::Settings;
use crate::infrastructure::worker::ProcessWorker;

/// Check that every pair/timeframe has enough history. Returns the exit code.
pub async fn execute_coverage(args: &CoverageArgs, settings: &Settings) -> Result<i32> {
    let start = timerange_start(&args.timerange)?;
    let path = resolve_base_path(&args.config)?;
    let base = BaseConfig::load(&path)?;
    let pairs = base.data_pairs();
    if pairs.is_empty() {
        return Err(ConfigError::NoPairs { path }.into());
    }

    let listing = match &args.listing {
        Some(file) => std::fs::read_to_string(file).map_err(|source| ConfigError::ReadFile {
            path: file.clone(),
            source,
        })?,
        None => {
            let pb = output::spinner("Listing available data");
            let listing = ProcessWorker::new(settings)
                .list_data(&path, &pairs, &args.timeframes)
                .await;
            pb.finish_and_clear();
            listing?
        }
    };

    let report = CoverageReport::check(
        &pairs,
        &args.timeframes,
        &parse_listing(&listing),
        start,
        args.warmup_days,
    );
    print_report(&report);

    Ok(if report.is_sufficient() { 0 } else { 1 })
}

fn print_report(report: &CoverageReport) {
    if output::is_json() {
        output::json_output(json!({
            "command": "check.coverage",
            "sufficient": report.is_sufficient(),
            "report": report,
        }));
        return;
    }

    output::section("Data coverage check");
    output::field("Timerange start", report.timerange_start);
    output::field("Warmup days", report.warmup_days);
    output::field("Required start", report.required_start);

    if report.is_sufficient() {
        output::success("All pairs/timeframes start early enough");
        return;
    }

    output::section("Insufficient coverage");
    for gap in &report.gaps {
        let starts = gap
            .starts_at
            .map_or_else(|| "no data".to_string(), |d| format!("starts at {d}"));
        output::error(&format!("{} {}: {starts}", gap.pair, gap.timeframe));
    }
    output::hint("download data from an earlier date or start the timerange later");
}
