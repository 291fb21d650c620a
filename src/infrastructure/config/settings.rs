//! Orchestrator settings loading and validation.
//!
//! Provides the [`Settings`] struct describing how workers are launched,
//! where overlays go, and how the concurrency budget is derived. Settings
//! are loaded from an optional TOML file; every field has a default so a
//! missing `pairtrain.toml` is not an error.
//!
//! # Example
//!
//! ```no_run
//! use pairtrain::infrastructure::config::settings::Settings;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load("pairtrain.toml")?;
//!     settings.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::logging::LoggingConfig;
use crate::domain::{ConcurrencyPolicy, DEFAULT_MAX_CONCURRENCY};
use crate::error::{ConfigError, Result};

/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_SETTINGS_PATH: &str = "pairtrain.toml";

/// Timerange used when neither the CLI nor `TIMERANGE` provide one.
pub const DEFAULT_TIMERANGE: &str = "20240101-20250930";

/// How worker processes are started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Launcher {
    /// Each job runs in its own `docker compose run --rm` container.
    #[default]
    Compose,
    /// The engine binary is spawned directly on this host.
    Direct,
}

/// External worker invocation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub launcher: Launcher,
    /// Engine executable.
    pub engine: String,
    /// Engine subcommand run once per job.
    pub subcommand: String,
    pub strategy: String,
    pub strategy_path: String,
    pub freqaimodel: String,
    /// Directory for per-job log files, as seen by the worker.
    pub log_dir: String,
    /// Middle part of the model identifier: `<prefix><stem>-<pair><suffix>`.
    pub identifier_stem: String,
    /// Shared-setup command run once before any job.
    pub prefetch: Vec<String>,
    /// Extra arguments appended to every job invocation.
    pub extra_args: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            launcher: Launcher::default(),
            engine: "freqtrade".into(),
            subcommand: "backtesting".into(),
            strategy: "MyRLStrategy".into(),
            strategy_path: "user_data/strategies".into(),
            freqaimodel: "ReinforcementLearner".into(),
            log_dir: "user_data/logs".into(),
            identifier_stem: "dqn".into(),
            prefetch: vec!["bash".into(), "tools/download_data.sh".into()],
            extra_args: vec!["-vv".into()],
        }
    }
}

/// Docker Compose launcher settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub file: PathBuf,
    pub service: String,
    /// Container path the base config directory is mounted at (read-only).
    pub config_mount: String,
    /// Host directory the service already mounts at `user_data_mount`.
    pub user_data_dir: PathBuf,
    /// Container path of `user_data_dir`.
    pub user_data_mount: String,
    /// Container path overlays are mounted at when they live outside `user_data`.
    pub overlay_mount: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("docker/docker-compose.train.cpu.x86.yml"),
            service: "freqai-train-cpu-x86".into(),
            config_mount: "/freqtrade/user_config".into(),
            user_data_dir: PathBuf::from("user_data"),
            user_data_mount: "/freqtrade/user_data".into(),
            overlay_mount: "/freqtrade/overlays".into(),
        }
    }
}

/// Overlay directory settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Preferred shared output area.
    pub dir: PathBuf,
    /// Used when `dir` is not writable.
    pub fallback_dir: PathBuf,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("user_data"),
            fallback_dir: PathBuf::from(".overlays"),
        }
    }
}

/// Concurrency derivation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Hard cap on the derived concurrency ceiling.
    pub max_concurrency: usize,
    /// Cores the derived budget may oversubscribe by.
    pub slack: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            slack: 0,
        }
    }
}

impl PolicyConfig {
    #[must_use]
    pub fn to_policy(&self) -> ConcurrencyPolicy {
        ConcurrencyPolicy {
            max_concurrency: self.max_concurrency,
            slack: self.slack,
        }
    }
}

/// Run defaults that the CLI may override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Default timerange; `TIMERANGE` and `--timerange` take precedence.
    pub timerange: Option<String>,
    /// Per-job wall-clock timeout. No timeout when unset.
    pub job_timeout_secs: Option<u64>,
}

/// Main orchestrator settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// External worker invocation.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Compose launcher details; ignored by the direct launcher.
    #[serde(default)]
    pub compose: ComposeConfig,

    /// Overlay directories.
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Concurrency policy.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Run defaults.
    #[serde(default)]
    pub run: RunConfig,
}

impl Settings {
    /// Parse settings from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_toml(&content)
    }

    /// Load an explicitly requested settings file, or fall back to
    /// [`DEFAULT_SETTINGS_PATH`] and then to built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path does not exist, or if any file
    /// that does exist fails to load.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            }
            .into()),
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_SETTINGS_PATH).exists() => {
                Self::load(DEFAULT_SETTINGS_PATH)
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.worker.engine.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "worker.engine",
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        if self.worker.prefetch.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "worker.prefetch",
                reason: "must name a command".to_string(),
            }
            .into());
        }
        if self.policy.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "policy.max_concurrency",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.run.job_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "run.job_timeout_secs",
                reason: "must be greater than 0 when set".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Timerange from `TIMERANGE`, the settings file, or the built-in default.
    #[must_use]
    pub fn default_timerange(&self) -> String {
        std::env::var("TIMERANGE")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.run.timerange.clone())
            .unwrap_or_else(|| DEFAULT_TIMERANGE.to_string())
    }
}
