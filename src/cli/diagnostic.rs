//! Miette-based diagnostics for errors that stop a run before dispatch.

use miette::Diagnostic;
use thiserror::Error;

use crate::error::{ConfigError, Error, PreconditionError};

/// A run-stopping error with an optional fix suggestion.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(pairtrain::precondition))]
pub struct PreconditionDiagnostic {
    /// Human-readable error message.
    pub message: String,

    /// Optional help text with suggestions for fixing the error.
    #[help]
    pub help: Option<String>,
}

impl PreconditionDiagnostic {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            help: None,
        }
    }

    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Build a diagnostic for a crate error, attaching help where a fix is known.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        let diagnostic = Self::new(err.to_string());
        match help_for(err) {
            Some(help) => diagnostic.with_help(help),
            None => diagnostic,
        }
    }

    /// Render to a string the way miette's report handler would.
    #[must_use]
    pub fn render(self) -> String {
        format!("{:?}", miette::Report::new(self))
    }
}

fn help_for(err: &Error) -> Option<&'static str> {
    match err {
        Error::Config(ConfigError::NotFound { .. }) => {
            Some("pass --config with the path to your engine config.json")
        }
        Error::Config(ConfigError::NoPairs { .. }) => {
            Some("add pairs to exchange.pair_whitelist or pass --pairs")
        }
        Error::Config(ConfigError::Parse(_)) => Some("check pairtrain.toml syntax"),
        Error::Precondition(PreconditionError::ComposeFileMissing { .. }) => {
            Some("set compose.file in pairtrain.toml, pass --compose-file, or use worker.launcher = \"direct\"")
        }
        Error::Precondition(PreconditionError::ExecutableMissing { .. }) => {
            Some("install it, put it on PATH, or set worker.engine to its full path")
        }
        Error::Precondition(PreconditionError::PrefetchSpawn(_)) => {
            Some("check that the worker.prefetch command exists")
        }
        Error::Precondition(PreconditionError::DuplicateJobKey { .. }) => {
            Some("pair names may not differ only in '/', ':' and '_'")
        }
        Error::Precondition(PreconditionError::InvalidTimerange { .. }) => {
            Some("use YYYYMMDD-YYYYMMDD or YYYYMMDD-")
        }
        _ => None,
    }
}
