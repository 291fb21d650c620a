use std::path::Path;

use serde_json::json;

use crate::cli::output;
use crate::error::Result;
use crate::infrastructure::config::base::{resolve_base_path, BaseConfig};
use crate::infrastructure::config::settings::{Launcher, Settings};

/// Validate the base config without starting anything.
pub fn execute_config(config_path: &Path, settings: &Settings) -> Result<()> {
    let path = resolve_base_path(config_path)?;
    let base = BaseConfig::load(&path)?;
    let pairs = base.job_pairs(None)?;
    let data_pairs = base.data_pairs();
    let compose_ready =
        settings.worker.launcher != Launcher::Compose || settings.compose.file.exists();

    if output::is_json() {
        output::json_output(json!({
            "command": "check.config",
            "config": path.display().to_string(),
            "pairs": pairs,
            "data_pairs": data_pairs,
            "compose_file_found": compose_ready,
        }));
        return Ok(());
    }

    output::section("Configuration Check");
    output::field("Config", path.display());
    output::success("Base config is valid");

    output::section("Summary");
    output::field("Pairs", pairs.len());
    output::field("Data pairs", data_pairs.len());
    output::field("Engine", &settings.worker.engine);
    match settings.worker.launcher {
        Launcher::Direct => output::field("Launcher", "direct"),
        Launcher::Compose => {
            output::field("Launcher", "compose");
            output::field("Compose file", settings.compose.file.display());
        }
    }
    if output::verbosity() > 0 {
        for pair in &pairs {
            output::note(&format!("- {pair}"));
        }
    }

    if compose_ready {
        output::success("Configuration check complete");
    } else {
        output::warning("Compose file not found; train will refuse to start");
    }
    Ok(())
}
