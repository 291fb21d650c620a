//! Overlay fragment identities.
//!
//! A fragment is a small configuration delta applied on top of the shared
//! base configuration for exactly one job (or, for shared fragments, for
//! every job with identical content).

use std::path::PathBuf;

/// The kind of override a fragment carries, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// Force the worker onto the CPU. Identical for every job.
    Device,
    /// Unique model identifier.
    Identifier,
    /// Restrict the whitelist to the job's pair.
    Pairs,
    /// Verbose reward logging.
    RewardDebug,
    /// Disable restoring the best checkpoint.
    RestoreOff,
}

impl FragmentKind {
    /// Shared fragments have the same content for every job.
    #[must_use]
    pub const fn is_shared(self) -> bool {
        matches!(self, Self::Device)
    }

    /// File name for this fragment kind and sanitized job key.
    #[must_use]
    pub fn file_name(self, key: &str) -> String {
        match self {
            Self::Device => "cpu-device.json".to_string(),
            Self::Identifier => format!("id-{key}.json"),
            Self::Pairs => format!("pairs-{key}.json"),
            Self::RewardDebug => format!("reward-debug-{key}.json"),
            Self::RestoreOff => format!("restore-false-{key}.json"),
        }
    }
}

/// A configuration delta written to its own file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFragment {
    pub kind: FragmentKind,
    pub file_name: String,
    pub host_path: PathBuf,
}
