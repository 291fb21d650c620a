//! Job-scoped configuration overlays.
//!
//! Each job gets a small stack of JSON fragments that the worker applies on
//! top of the shared base configuration, left to right. One fragment per
//! override keeps identical content shareable across jobs and lets optional
//! overrides compose by list inclusion.
//!
//! Job-specific fragment names embed the sanitized [`JobKey`], so jobs
//! running at the same time never write the same path. Fragments are never
//! deleted; they stay behind for inspection.
//!
//! [`JobKey`]: crate::domain::JobKey

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::{FragmentKind, JobSpec, OverlayFragment};
use crate::error::DispatchError;

const WRITE_PROBE: &str = ".writetest";

/// The overlay directory chosen for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayDir {
    pub path: PathBuf,
    /// True when the preferred directory was not writable.
    pub fell_back: bool,
}

/// Pick a writable overlay directory. Call once per run.
///
/// Creates `preferred` and round-trips a throwaway file through it. On
/// failure, `fallback` is created and used instead. If the fallback cannot
/// be created either it is still returned; fragment writes then fail per
/// job.
pub fn probe_overlay_dir(preferred: &Path, fallback: &Path) -> OverlayDir {
    match probe_writable(preferred) {
        Ok(()) => OverlayDir {
            path: preferred.to_path_buf(),
            fell_back: false,
        },
        Err(e) => {
            warn!(
                dir = %preferred.display(),
                fallback = %fallback.display(),
                error = %e,
                "overlay directory not writable; using fallback"
            );
            if let Err(e) = fs::create_dir_all(fallback) {
                warn!(dir = %fallback.display(), error = %e, "failed to create fallback overlay directory");
            }
            OverlayDir {
                path: fallback.to_path_buf(),
                fell_back: true,
            }
        }
    }
}

fn probe_writable(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(WRITE_PROBE);
    fs::write(&probe, b"ok")?;
    if let Err(e) = fs::remove_file(&probe) {
        debug!(path = %probe.display(), error = %e, "failed to remove write probe");
    }
    Ok(())
}

/// Materializes overlay fragments for jobs into one directory.
///
/// Shareable across dispatch tasks; the only shared state is the set of
/// shared fragments already written this run.
#[derive(Debug)]
pub struct OverlayBuilder {
    dir: PathBuf,
    shared_written: Mutex<HashSet<PathBuf>>,
}

impl OverlayBuilder {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            shared_written: Mutex::new(HashSet::new()),
        }
    }

    /// Fragment kinds for a job, in the order the worker must apply them.
    #[must_use]
    pub fn kinds(job: &JobSpec) -> Vec<FragmentKind> {
        let request = job.overlays();
        let mut kinds = vec![
            FragmentKind::Device,
            FragmentKind::Identifier,
            FragmentKind::Pairs,
        ];
        if request.debug {
            kinds.push(FragmentKind::RewardDebug);
        }
        if request.fresh {
            kinds.push(FragmentKind::RestoreOff);
        }
        kinds
    }

    /// Fragment references for a job without touching the filesystem.
    #[must_use]
    pub fn plan(&self, job: &JobSpec) -> Vec<OverlayFragment> {
        Self::kinds(job)
            .into_iter()
            .map(|kind| {
                let file_name = kind.file_name(job.key().as_str());
                OverlayFragment {
                    kind,
                    host_path: self.dir.join(&file_name),
                    file_name,
                }
            })
            .collect()
    }

    /// Write a job's fragments and return them in application order.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::OverlayWrite`] when a fragment cannot be
    /// written. Other jobs are unaffected.
    pub fn materialize(&self, job: &JobSpec) -> Result<Vec<OverlayFragment>, DispatchError> {
        let fragments = self.plan(job);
        for fragment in &fragments {
            let body = fragment_body(fragment.kind, job);
            if fragment.kind.is_shared() {
                self.write_shared(&fragment.host_path, &body)?;
            } else {
                write_if_changed(&fragment.host_path, &body)?;
            }
        }
        debug!(
            job = %job.key(),
            count = fragments.len(),
            dir = %self.dir.display(),
            "overlays ready"
        );
        Ok(fragments)
    }

    fn write_shared(&self, path: &Path, body: &[u8]) -> Result<(), DispatchError> {
        let mut written = self.shared_written.lock();
        if written.contains(path) {
            return Ok(());
        }
        write_if_changed(path, body)?;
        written.insert(path.to_path_buf());
        Ok(())
    }
}

fn fragment_body(kind: FragmentKind, job: &JobSpec) -> Vec<u8> {
    let value: Value = match kind {
        FragmentKind::Device => json!({
            "freqai": { "rl_config": { "hyperparams": { "device": "cpu" } } }
        }),
        FragmentKind::Identifier => json!({
            "freqai": { "identifier": job.extras().identifier }
        }),
        FragmentKind::Pairs => json!({
            "exchange": { "pair_whitelist": [job.pair()] }
        }),
        FragmentKind::RewardDebug => json!({
            "freqai": {
                "log_level": "DEBUG",
                "rl_config": { "reward_kwargs": { "debug_log": true } }
            }
        }),
        FragmentKind::RestoreOff => json!({
            "freqai": { "restore_best_model": false }
        }),
    };
    value.to_string().into_bytes()
}

/// Write `body` unless the file already holds exactly these bytes.
fn write_if_changed(path: &Path, body: &[u8]) -> Result<(), DispatchError> {
    if fs::read(path).is_ok_and(|existing| existing == body) {
        return Ok(());
    }
    fs::write(path, body).map_err(|source| DispatchError::OverlayWrite {
        path: path.to_path_buf(),
        source,
    })
}
