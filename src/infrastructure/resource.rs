//! Detection of the compute actually usable by this process.
//!
//! Raw host core counts overstate what a pinned process or a container may
//! use, so the detector prefers the most specific signal available:
//!
//! 1. The per-process CPU affinity mask (Linux `sched_getaffinity`).
//! 2. cgroup cpuset limit files, legacy v1 path first, then v2.
//! 3. The OS-reported logical processor count.
//!
//! The result is never less than 1.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

/// cgroup v1 cpuset file.
pub const CGROUP_V1_CPUSET: &str = "/sys/fs/cgroup/cpuset/cpuset.cpus";

/// cgroup v2 cpuset files, in lookup order.
pub const CGROUP_V2_CPUSETS: [&str; 2] = [
    "/sys/fs/cgroup/cpuset.cpus",
    "/sys/fs/cgroup/cpuset.cpus.effective",
];

/// Count the CPUs in a Linux cpuset list such as `0-3,6,8-9`.
///
/// A `start-end` token contributes `end - start + 1` (nothing when
/// `end < start`); a bare id contributes 1. Empty or malformed tokens are
/// skipped. Counts saturate at `usize::MAX` instead of overflowing.
#[must_use]
pub fn parse_cpu_set(cpuset: &str) -> usize {
    cpuset
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(cpu_token_count)
        .fold(0usize, usize::saturating_add)
}

fn cpu_token_count(token: &str) -> usize {
    match token.split_once('-') {
        Some((start, end)) => match (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
            (Ok(start), Ok(end)) if end >= start => (end - start).saturating_add(1),
            _ => 0,
        },
        None => usize::from(token.parse::<usize>().is_ok()),
    }
}

/// Which signal produced the core count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum CpuSource {
    /// Per-process affinity mask.
    Affinity,
    /// A cgroup cpuset file.
    Cgroup(PathBuf),
    /// OS-reported logical processors.
    System,
}

impl fmt::Display for CpuSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Affinity => write!(f, "affinity mask"),
            Self::Cgroup(path) => write!(f, "cgroup {}", path.display()),
            Self::System => write!(f, "system"),
        }
    }
}

/// Detected core count and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuDetection {
    pub cores: usize,
    pub source: CpuSource,
}

/// Resource detector with overridable probe locations.
#[derive(Debug, Clone)]
pub struct CpuDetector {
    use_affinity: bool,
    cgroup_paths: Vec<PathBuf>,
}

impl Default for CpuDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuDetector {
    /// Detector probing the real affinity mask and cgroup files.
    #[must_use]
    pub fn new() -> Self {
        let cgroup_paths = std::iter::once(CGROUP_V1_CPUSET)
            .chain(CGROUP_V2_CPUSETS)
            .map(PathBuf::from)
            .collect();
        Self {
            use_affinity: true,
            cgroup_paths,
        }
    }

    /// Skip the affinity probe.
    #[must_use]
    pub fn without_affinity(mut self) -> Self {
        self.use_affinity = false;
        self
    }

    /// Replace the cgroup cpuset files to probe, in order.
    #[must_use]
    pub fn with_cgroup_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.cgroup_paths = paths;
        self
    }

    /// Detect the logical cores available to this process.
    #[must_use]
    pub fn detect(&self) -> CpuDetection {
        if self.use_affinity {
            if let Some(cores) = affinity_count() {
                debug!(cores, "cores from affinity mask");
                return CpuDetection {
                    cores,
                    source: CpuSource::Affinity,
                };
            }
        }

        for path in &self.cgroup_paths {
            if let Some(cores) = read_cpuset(path) {
                debug!(cores, path = %path.display(), "cores from cgroup cpuset");
                return CpuDetection {
                    cores,
                    source: CpuSource::Cgroup(path.clone()),
                };
            }
        }

        let cores = num_cpus::get().max(1);
        debug!(cores, "cores from system count");
        CpuDetection {
            cores,
            source: CpuSource::System,
        }
    }
}

/// Logical cores available to this process, using the system probes.
#[must_use]
pub fn detect_logical_cpus() -> usize {
    CpuDetector::new().detect().cores
}

fn read_cpuset(path: &Path) -> Option<usize> {
    let content = std::fs::read_to_string(path).ok()?;
    Some(parse_cpu_set(content.trim())).filter(|n| *n > 0)
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn affinity_count() -> Option<usize> {
    // SAFETY: cpu_set_t is a plain bitmask; all-zero is the empty set, and
    // the kernel writes at most size_of::<cpu_set_t>() bytes into it.
    let count = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return None;
        }
        libc::CPU_COUNT(&set)
    };
    usize::try_from(count).ok().filter(|n| *n > 0)
}

#[cfg(not(target_os = "linux"))]
fn affinity_count() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- parse_cpu_set tests ---

    #[test]
    fn parse_cpu_set_ranges_and_singles() {
        assert_eq!(parse_cpu_set("0-3,6,8-9"), 7);
    }

    #[test]
    fn parse_cpu_set_skips_malformed_tokens() {
        assert_eq!(parse_cpu_set("0-3,,x,8-9"), 5);
        assert_eq!(parse_cpu_set("a-b,1-x,-,7"), 1);
    }

    #[test]
    fn parse_cpu_set_empty_is_zero() {
        assert_eq!(parse_cpu_set(""), 0);
        assert_eq!(parse_cpu_set(" , ,"), 0);
    }

    #[test]
    fn parse_cpu_set_reversed_range_contributes_nothing() {
        assert_eq!(parse_cpu_set("5-2,0"), 1);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn parse_cpu_set_saturates_on_huge_ranges() {
        assert_eq!(parse_cpu_set("0-18446744073709551615"), usize::MAX);
        assert_eq!(
            parse_cpu_set("0-9223372036854775807,0-9223372036854775807,1"),
            usize::MAX
        );
        assert_eq!(parse_cpu_set("0-99999999999999999999999,2"), 1);
    }

    #[test]
    fn parse_cpu_set_tolerates_whitespace_and_newline() {
        assert_eq!(parse_cpu_set(" 0-1 , 4 \n"), 3);
    }

    // --- CpuDetector tests ---

    #[test]
    fn detector_uses_first_parseable_cgroup_file() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.cpus");
        let limited = dir.path().join("limited.cpus");
        let wide = dir.path().join("wide.cpus");
        std::fs::write(&empty, "\n").unwrap();
        std::fs::write(&limited, "0-2\n").unwrap();
        std::fs::write(&wide, "0-63\n").unwrap();

        let detection = CpuDetector::new()
            .without_affinity()
            .with_cgroup_paths(vec![
                dir.path().join("missing.cpus"),
                empty,
                limited.clone(),
                wide,
            ])
            .detect();

        assert_eq!(detection.cores, 3);
        assert_eq!(detection.source, CpuSource::Cgroup(limited));
    }

    #[test]
    fn detector_falls_back_to_system_count() {
        let detection = CpuDetector::new()
            .without_affinity()
            .with_cgroup_paths(vec![PathBuf::from("/nonexistent/cpuset.cpus")])
            .detect();

        assert_eq!(detection.source, CpuSource::System);
        assert!(detection.cores >= 1);
    }

    #[test]
    fn detect_logical_cpus_is_positive() {
        assert!(detect_logical_cpus() >= 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn detector_prefers_affinity_on_linux() {
        let detection = CpuDetector::new().detect();
        assert_eq!(detection.source, CpuSource::Affinity);
        assert!(detection.cores >= 1);
    }
}
