//! Fixtures for base configs and job specs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;

use crate::domain::{safe_name, JobExtras, JobSpec, OverlayRequest};
use crate::infrastructure::config::settings::{Launcher, Settings};

/// Direct-launcher settings with overlays under `dir`.
///
/// The engine is the running test binary so launcher resolution succeeds
/// without a real engine installed.
pub fn direct_settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.worker.launcher = Launcher::Direct;
    settings.worker.engine = std::env::current_exe()
        .expect("locate test binary")
        .display()
        .to_string();
    settings.overlay.dir = dir.join("user_data");
    settings.overlay.fallback_dir = dir.join(".overlays");
    settings
}

/// Write a minimal base config listing `pairs` into `dir`.
pub fn write_base_config(dir: &Path, pairs: &[&str]) -> PathBuf {
    let path = dir.join("config.json");
    let body = json!({
        "exchange": { "name": "binance", "pair_whitelist": pairs },
        "freqai": { "enabled": true },
    });
    std::fs::write(&path, body.to_string()).expect("write base config fixture");
    path
}

/// A job for `pair` with default overlays and one thread.
pub fn job(pair: &str) -> JobSpec {
    job_with(pair, Path::new("config.json"), OverlayRequest::default())
}

/// A job for `pair` against `base_config` with the given overlays.
pub fn job_with(pair: &str, base_config: &Path, overlays: OverlayRequest) -> JobSpec {
    let key = safe_name(pair);
    JobSpec::new(
        pair,
        Arc::from(base_config),
        overlays,
        1,
        JobExtras {
            timerange: "20240101-20250930".into(),
            identifier: format!("dqn-{key}"),
            log_path: PathBuf::from(format!("user_data/logs/train-{key}.log")),
        },
    )
}
