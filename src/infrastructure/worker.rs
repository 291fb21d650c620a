//! Process-backed [`Worker`] implementation.
//!
//! Builds the external command line for the shared setup step and for each
//! job, then spawns it with `tokio::process` and waits for the exit code.
//! Two launchers are supported:
//!
//! - **direct**: the engine runs on this host with per-job thread variables
//!   in its environment.
//! - **compose**: each invocation is a `docker compose run --rm` container;
//!   the base config directory and (when needed) the overlay directory are
//!   bind-mounted read-only and paths are rewritten to their container
//!   locations.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::{JobSpec, OverlayFragment};
use crate::error::{DispatchError, PreconditionError};
use crate::infrastructure::config::settings::{ComposeConfig, Launcher, Settings, WorkerConfig};
use crate::port::Worker;

/// Thread-count variables read by BLAS, OpenMP, NumExpr and PyTorch.
pub const THREAD_ENV_VARS: [&str; 7] = [
    "OMP_NUM_THREADS",
    "OPENBLAS_NUM_THREADS",
    "MKL_NUM_THREADS",
    "BLIS_NUM_THREADS",
    "NUMEXPR_MAX_THREADS",
    "VECLIB_MAXIMUM_THREADS",
    "TORCH_NUM_THREADS",
];

/// Environment variable naming the base config for the prefetch script.
pub const PREFETCH_CONFIG_ENV: &str = "FT_CONFIG";

/// Program the compose launcher runs.
pub const COMPOSE_PROGRAM: &str = "docker";

/// Executable every job invocation starts with under `worker`'s launcher.
#[must_use]
pub fn launcher_program(worker: &WorkerConfig) -> &str {
    match worker.launcher {
        Launcher::Direct => &worker.engine,
        Launcher::Compose => COMPOSE_PROGRAM,
    }
}

/// Resolve `program` the way a spawn would.
///
/// A name containing a path separator must point at an executable file;
/// a bare name is looked up in each `PATH` directory.
#[must_use]
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        return is_executable(path).then(|| path.to_path_buf());
    }
    let dirs = std::env::var_os("PATH")?;
    std::env::split_paths(&dirs)
        .flat_map(|dir| executable_candidates(&dir, program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn executable_candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program), dir.join(format!("{program}.exe"))]
}

#[cfg(not(windows))]
fn executable_candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// `(name, value)` pairs setting every thread variable to `threads`.
#[must_use]
pub fn thread_env(threads: usize) -> Vec<(String, String)> {
    let value = threads.max(1).to_string();
    THREAD_ENV_VARS
        .iter()
        .map(|name| ((*name).to_string(), value.clone()))
        .collect()
}

/// A fully resolved external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Spawn the command and wait for it to exit.
    async fn run(&self) -> std::io::Result<i32> {
        let mut child = self.command().spawn()?;
        let status = child.wait().await?;
        Ok(exit_code(status))
    }

    /// Run to completion and return stdout followed by stderr.
    async fn capture(&self) -> std::io::Result<String> {
        let output = self.command().output().await?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

/// Exit code of a finished process; signal deaths map to `128 + signal`.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Quote a word for `bash -c` unless it is made only of safe characters.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_dir(path: &Path) -> PathBuf {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Runs the engine as external processes.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    worker: WorkerConfig,
    compose: ComposeConfig,
}

impl ProcessWorker {
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            worker: settings.worker.clone(),
            compose: settings.compose.clone(),
        }
    }

    /// Engine arguments shared by both launchers; `configs` is the base
    /// config followed by the overlay fragments, as the worker will see them.
    fn engine_args(&self, job: &JobSpec, configs: &[String]) -> Vec<String> {
        let mut args = vec![self.worker.subcommand.clone()];
        for config in configs {
            args.push("--config".into());
            args.push(config.clone());
        }
        args.extend([
            "--strategy-path".into(),
            self.worker.strategy_path.clone(),
            "--strategy".into(),
            self.worker.strategy.clone(),
            "--freqaimodel".into(),
            self.worker.freqaimodel.clone(),
            "-p".into(),
            job.pair().to_string(),
            "--timerange".into(),
            job.extras().timerange.clone(),
        ]);
        args.extend(self.worker.extra_args.iter().cloned());
        args.push("--logfile".into());
        args.push(job.extras().log_path.display().to_string());
        args
    }

    fn compose_prefix(&self) -> Vec<String> {
        vec![
            "compose".into(),
            "-f".into(),
            self.compose.file.display().to_string(),
            "run".into(),
            "--rm".into(),
        ]
    }

    fn config_mount(&self, base_config: &Path) -> String {
        let host_dir = resolve_dir(base_config.parent().unwrap_or(Path::new(".")));
        format!("{}:{}:ro", host_dir.display(), self.compose.config_mount)
    }

    /// Container directory overlays are read from, plus the bind mount
    /// needed to get them there. Overlays already inside
    /// `compose.user_data_dir` are visible through the service's own volume.
    fn overlay_location(&self, overlays: &[OverlayFragment]) -> (String, Option<String>) {
        let Some(host_dir) = overlays.first().and_then(|f| f.host_path.parent()) else {
            return (self.compose.overlay_mount.clone(), None);
        };
        let host_dir = resolve_dir(host_dir);
        if host_dir == resolve_dir(&self.compose.user_data_dir) {
            (self.compose.user_data_mount.clone(), None)
        } else {
            let mount = format!("{}:{}:ro", host_dir.display(), self.compose.overlay_mount);
            (self.compose.overlay_mount.clone(), Some(mount))
        }
    }

    /// Command line for the shared setup step.
    #[must_use]
    pub fn prefetch_invocation(&self, base_config: &Path) -> Invocation {
        let (program, rest) = match self.worker.prefetch.split_first() {
            Some((program, rest)) => (program.clone(), rest.to_vec()),
            None => (String::from("true"), Vec::new()),
        };

        match self.worker.launcher {
            Launcher::Direct => Invocation {
                program,
                args: rest,
                env: vec![(
                    PREFETCH_CONFIG_ENV.to_string(),
                    base_config.display().to_string(),
                )],
            },
            Launcher::Compose => {
                let container_cfg =
                    format!("{}/{}", self.compose.config_mount, file_name(base_config));
                let mut args = self.compose_prefix();
                args.extend([
                    "-e".into(),
                    format!("{PREFETCH_CONFIG_ENV}={container_cfg}"),
                    "-v".into(),
                    self.config_mount(base_config),
                    self.compose.service.clone(),
                    "bash".into(),
                    "-lc".into(),
                    shell_join(&self.worker.prefetch),
                ]);
                Invocation {
                    program: COMPOSE_PROGRAM.into(),
                    args,
                    env: Vec::new(),
                }
            }
        }
    }

    /// Command line for one job with its overlays applied in order.
    #[must_use]
    pub fn job_invocation(&self, job: &JobSpec, overlays: &[OverlayFragment]) -> Invocation {
        match self.worker.launcher {
            Launcher::Direct => {
                let configs: Vec<String> = std::iter::once(job.base_config().display().to_string())
                    .chain(overlays.iter().map(|f| f.host_path.display().to_string()))
                    .collect();
                Invocation {
                    program: self.worker.engine.clone(),
                    args: self.engine_args(job, &configs),
                    env: thread_env(job.threads()),
                }
            }
            Launcher::Compose => {
                let (overlay_dir, overlay_volume) = self.overlay_location(overlays);
                let configs: Vec<String> = std::iter::once(format!(
                    "{}/{}",
                    self.compose.config_mount,
                    file_name(job.base_config())
                ))
                .chain(
                    overlays
                        .iter()
                        .map(|f| format!("{overlay_dir}/{}", f.file_name)),
                )
                .collect();

                let mut engine = vec![self.worker.engine.clone()];
                engine.extend(self.engine_args(job, &configs));
                let inner = format!(
                    "mkdir -p {} && {}",
                    shell_quote(&self.worker.log_dir),
                    shell_join(&engine)
                );

                let mut args = self.compose_prefix();
                for (name, value) in thread_env(job.threads()) {
                    args.push("-e".into());
                    args.push(format!("{name}={value}"));
                }
                args.push("-v".into());
                args.push(self.config_mount(job.base_config()));
                if let Some(volume) = overlay_volume {
                    args.push("-v".into());
                    args.push(volume);
                }
                args.extend([
                    self.compose.service.clone(),
                    "bash".into(),
                    "-lc".into(),
                    inner,
                ]);

                Invocation {
                    program: COMPOSE_PROGRAM.into(),
                    args,
                    env: Vec::new(),
                }
            }
        }
    }
}

impl ProcessWorker {
    /// Command line listing where each pair/timeframe's data starts.
    #[must_use]
    pub fn list_data_invocation(
        &self,
        base_config: &Path,
        pairs: &[String],
        timeframes: &[String],
    ) -> Invocation {
        let config = match self.worker.launcher {
            Launcher::Direct => base_config.display().to_string(),
            Launcher::Compose => {
                format!("{}/{}", self.compose.config_mount, file_name(base_config))
            }
        };
        let mut engine = vec![
            self.worker.engine.clone(),
            "list-data".into(),
            "--trading-mode".into(),
            "futures".into(),
            "--config".into(),
            config,
            "--pairs".into(),
        ];
        engine.extend(pairs.iter().cloned());
        engine.push("--timeframes".into());
        engine.extend(timeframes.iter().cloned());
        engine.push("--show-timerange".into());

        match self.worker.launcher {
            Launcher::Direct => Invocation {
                program: engine.remove(0),
                args: engine,
                env: Vec::new(),
            },
            Launcher::Compose => {
                let mut args = self.compose_prefix();
                args.extend([
                    "-v".into(),
                    self.config_mount(base_config),
                    self.compose.service.clone(),
                    "bash".into(),
                    "-lc".into(),
                    shell_join(&engine),
                ]);
                Invocation {
                    program: COMPOSE_PROGRAM.into(),
                    args,
                    env: Vec::new(),
                }
            }
        }
    }

    /// Run the data listing and return its combined output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be started.
    pub async fn list_data(
        &self,
        base_config: &Path,
        pairs: &[String],
        timeframes: &[String],
    ) -> std::io::Result<String> {
        let invocation = self.list_data_invocation(base_config, pairs, timeframes);
        debug!(program = %invocation.program, args = ?invocation.args, "listing data");
        invocation.capture().await
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn prefetch(&self, base_config: &Path) -> Result<i32, PreconditionError> {
        let invocation = self.prefetch_invocation(base_config);
        debug!(program = %invocation.program, args = ?invocation.args, "launching prefetch");
        invocation
            .run()
            .await
            .map_err(PreconditionError::PrefetchSpawn)
    }

    async fn run_job(
        &self,
        job: &JobSpec,
        overlays: &[OverlayFragment],
    ) -> Result<i32, DispatchError> {
        if self.worker.launcher == Launcher::Direct {
            if let Some(dir) = job.extras().log_path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(dir).await {
                    warn!(job = %job.key(), dir = %dir.display(), error = %e, "failed to create log directory");
                }
            }
        }

        let invocation = self.job_invocation(job, overlays);
        debug!(job = %job.key(), program = %invocation.program, args = ?invocation.args, "launching job");
        invocation.run().await.map_err(|source| DispatchError::Spawn {
            job: job.key().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FragmentKind, JobExtras, OverlayRequest};
    use std::sync::Arc;

    fn job(threads: usize) -> JobSpec {
        JobSpec::new(
            "ETH/USDT:USDT",
            Arc::from(Path::new("/srv/cfg/config.json")),
            OverlayRequest::default(),
            threads,
            JobExtras {
                timerange: "20240101-20250930".into(),
                identifier: "dqn-ETH_USDT_USDT".into(),
                log_path: PathBuf::from("user_data/logs/train-ETH_USDT_USDT.log"),
            },
        )
    }

    fn fragments(dir: &Path) -> Vec<OverlayFragment> {
        [FragmentKind::Device, FragmentKind::Identifier, FragmentKind::Pairs]
            .into_iter()
            .map(|kind| {
                let file_name = kind.file_name("ETH_USDT_USDT");
                OverlayFragment {
                    kind,
                    host_path: dir.join(&file_name),
                    file_name,
                }
            })
            .collect()
    }

    fn settings(launcher: Launcher) -> Settings {
        let mut settings = Settings::default();
        settings.worker.launcher = launcher;
        settings
    }

    #[test]
    fn thread_env_sets_every_variable() {
        let env = thread_env(3);
        assert_eq!(env.len(), THREAD_ENV_VARS.len());
        assert!(env.iter().all(|(_, v)| v == "3"));
        assert!(env.iter().any(|(k, _)| k == "OMP_NUM_THREADS"));
        assert!(env.iter().any(|(k, _)| k == "TORCH_NUM_THREADS"));
    }

    #[test]
    fn shell_quote_leaves_safe_words_alone() {
        assert_eq!(shell_quote("ETH/USDT:USDT"), "ETH/USDT:USDT");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn direct_job_invocation_orders_configs_and_scope() {
        let overlay_dir = Path::new("/tmp/ov");
        let worker = ProcessWorker::new(&settings(Launcher::Direct));
        let inv = worker.job_invocation(&job(4), &fragments(overlay_dir));

        assert_eq!(inv.program, "freqtrade");
        assert_eq!(
            inv.args,
            [
                "backtesting",
                "--config",
                "/srv/cfg/config.json",
                "--config",
                "/tmp/ov/cpu-device.json",
                "--config",
                "/tmp/ov/id-ETH_USDT_USDT.json",
                "--config",
                "/tmp/ov/pairs-ETH_USDT_USDT.json",
                "--strategy-path",
                "user_data/strategies",
                "--strategy",
                "MyRLStrategy",
                "--freqaimodel",
                "ReinforcementLearner",
                "-p",
                "ETH/USDT:USDT",
                "--timerange",
                "20240101-20250930",
                "-vv",
                "--logfile",
                "user_data/logs/train-ETH_USDT_USDT.log",
            ]
        );
        assert!(inv
            .env
            .contains(&("OMP_NUM_THREADS".to_string(), "4".to_string())));
    }

    #[test]
    fn compose_job_invocation_mounts_and_rewrites_paths() {
        let overlay_dir = Path::new("/tmp/pairtrain-overlays-test");
        let worker = ProcessWorker::new(&settings(Launcher::Compose));
        let inv = worker.job_invocation(&job(2), &fragments(overlay_dir));

        assert_eq!(inv.program, "docker");
        assert_eq!(
            &inv.args[..5],
            ["compose", "-f", "docker/docker-compose.train.cpu.x86.yml", "run", "--rm"]
        );
        assert!(inv.args.contains(&"MKL_NUM_THREADS=2".to_string()));
        assert!(inv
            .args
            .contains(&"/srv/cfg:/freqtrade/user_config:ro".to_string()));
        assert!(inv
            .args
            .contains(&"/tmp/pairtrain-overlays-test:/freqtrade/overlays:ro".to_string()));

        let inner = inv.args.last().unwrap();
        assert!(inner.starts_with("mkdir -p user_data/logs && freqtrade backtesting"));
        assert!(inner.contains(
            "--config /freqtrade/user_config/config.json \
             --config /freqtrade/overlays/cpu-device.json \
             --config /freqtrade/overlays/id-ETH_USDT_USDT.json \
             --config /freqtrade/overlays/pairs-ETH_USDT_USDT.json"
        ));
        assert!(inner.contains("-p ETH/USDT:USDT"));
        assert!(inner.ends_with("--logfile user_data/logs/train-ETH_USDT_USDT.log"));
        assert!(inv.env.is_empty());
    }

    #[test]
    fn overlays_inside_user_data_dir_use_the_service_volume() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(Launcher::Compose);
        settings.compose.user_data_dir = dir.path().to_path_buf();
        let worker = ProcessWorker::new(&settings);
        let inv = worker.job_invocation(&job(1), &fragments(dir.path()));

        assert!(!inv.args.iter().any(|a| a.ends_with(":/freqtrade/overlays:ro")));
        let inner = inv.args.last().unwrap();
        assert!(inner.contains("--config /freqtrade/user_data/cpu-device.json"));
        assert!(inner.contains("--config /freqtrade/user_data/pairs-ETH_USDT_USDT.json"));
    }

    #[test]
    fn launcher_program_follows_the_launcher() {
        let mut direct = settings(Launcher::Direct);
        direct.worker.engine = "/opt/ft/bin/freqtrade".into();
        assert_eq!(launcher_program(&direct.worker), "/opt/ft/bin/freqtrade");
        assert_eq!(launcher_program(&settings(Launcher::Compose).worker), COMPOSE_PROGRAM);
    }

    #[test]
    fn find_executable_rejects_missing_paths() {
        assert_eq!(find_executable("/nonexistent/bin/freqtrade"), None);
        assert_eq!(find_executable("pairtrain-no-such-program-on-path"), None);
    }

    #[cfg(unix)]
    #[test]
    fn find_executable_checks_the_execute_bit() {
        use std::os::unix::fs::PermissionsExt;

        assert!(find_executable("sh").is_some());

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("freqtrade");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        let program = script.display().to_string();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(find_executable(&program), None);

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_executable(&program), Some(script));
        assert_eq!(find_executable(&dir.path().display().to_string()), None);
    }

    #[test]
    fn direct_prefetch_passes_base_config_in_env() {
        let worker = ProcessWorker::new(&settings(Launcher::Direct));
        let inv = worker.prefetch_invocation(Path::new("/srv/cfg/config.json"));

        assert_eq!(inv.program, "bash");
        assert_eq!(inv.args, ["tools/download_data.sh"]);
        assert_eq!(
            inv.env,
            [(
                "FT_CONFIG".to_string(),
                "/srv/cfg/config.json".to_string()
            )]
        );
    }

    #[test]
    fn compose_prefetch_uses_container_config_path() {
        let worker = ProcessWorker::new(&settings(Launcher::Compose));
        let inv = worker.prefetch_invocation(Path::new("/srv/cfg/config.json"));

        assert_eq!(inv.program, "docker");
        assert!(inv
            .args
            .contains(&"FT_CONFIG=/freqtrade/user_config/config.json".to_string()));
        assert_eq!(inv.args.last().unwrap(), "bash tools/download_data.sh");
    }

    #[test]
    fn list_data_invocation_names_pairs_and_timeframes() {
        let worker = ProcessWorker::new(&settings(Launcher::Direct));
        let inv = worker.list_data_invocation(
            Path::new("user_data/config.json"),
            &["BTC/USDT:USDT".to_string(), "ETH/USDT:USDT".to_string()],
            &["5m".to_string(), "1h".to_string()],
        );

        assert_eq!(inv.program, "freqtrade");
        assert_eq!(
            inv.args,
            [
                "list-data",
                "--trading-mode",
                "futures",
                "--config",
                "user_data/config.json",
                "--pairs",
                "BTC/USDT:USDT",
                "ETH/USDT:USDT",
                "--timeframes",
                "5m",
                "1h",
                "--show-timerange",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invocation_reports_process_exit_code() {
        let inv = Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), "exit 3".into()],
            env: thread_env(1),
        };
        assert_eq!(inv.run().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn spawn_failure_is_a_dispatch_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(Launcher::Direct);
        settings.worker.engine = "/nonexistent/engine-binary".into();
        let spec = JobSpec::new(
            "BTC/USDT",
            Arc::from(Path::new("/srv/cfg/config.json")),
            OverlayRequest::default(),
            1,
            JobExtras {
                timerange: "20240101-20250930".into(),
                identifier: "dqn-BTC_USDT".into(),
                log_path: dir.path().join("logs/train-BTC_USDT.log"),
            },
        );
        let worker = ProcessWorker::new(&settings);

        let result = worker.run_job(&spec, &[]).await;
        assert!(matches!(result, Err(DispatchError::Spawn { .. })));
        assert!(dir.path().join("logs").is_dir());
    }
}
