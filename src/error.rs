use std::path::PathBuf;

use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("failed to parse base config {}: {source}", path.display())]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no pairs found in {} under exchange.pair_whitelist", path.display())]
    NoPairs { path: PathBuf },
}

/// Conditions that make every job meaningless; the run aborts before dispatch.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("no pairs to train")]
    NoJobs,

    #[error("compose file not found: {}", path.display())]
    ComposeFileMissing { path: PathBuf },

    #[error("executable not found: {program}")]
    ExecutableMissing { program: String },

    #[error("failed to launch prefetch: {0}")]
    PrefetchSpawn(#[source] std::io::Error),

    #[error("invalid timerange '{value}': {reason}")]
    InvalidTimerange { value: String, reason: String },

    #[error("pairs '{first}' and '{second}' share the job key '{key}'")]
    DuplicateJobKey {
        key: String,
        first: String,
        second: String,
    },
}

/// Failures local to a single job. Never escape the dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to write overlay {}: {source}", path.display())]
    OverlayWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn worker for {job}: {source}")]
    Spawn {
        job: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker for {job} timed out after {seconds}s")]
    Timeout { job: String, seconds: u64 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that abort the run before any job is dispatched.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Precondition(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
