//! Command-line interface definitions.
//!
//! Defines the CLI structure for pairtrain using `clap`: the `train`
//! orchestrator, a `resources` report, and `check` diagnostics.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::coverage::DEFAULT_WARMUP_DAYS;
use crate::infrastructure::config::base::DEFAULT_BASE_CONFIG;

/// Resource-aware parallel training across trading pairs
#[derive(Parser, Debug)]
#[command(name = "pairtrain")]
#[command(version, about)]
pub struct Cli {
    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to orchestrator settings [default: pairtrain.toml if present]
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train one model per pair with bounded parallelism
    Train(Box<TrainArgs>),

    /// Show detected cores and the derived budget
    Resources(ResourcesArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Subcommands for `pairtrain check`.
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate the base config and list its pairs.
    Config(ConfigPathArg),
    /// Verify historical data starts early enough for a timerange.
    Coverage(CoverageArgs),
}

/// Shared argument for commands that only need a base config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Engine base config containing exchange.pair_whitelist
    #[arg(short, long, default_value = DEFAULT_BASE_CONFIG)]
    pub config: PathBuf,
}

/// Arguments for the `train` subcommand.
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Engine base config containing exchange.pair_whitelist
    #[arg(short, long, default_value = DEFAULT_BASE_CONFIG)]
    pub config: PathBuf,

    /// Max parallel jobs [default: derived from cores]
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Threads per job [default: derived from cores]
    #[arg(long)]
    pub threads: Option<usize>,

    /// Backtest timerange [default: env TIMERANGE or 20240101-20250930]
    #[arg(long)]
    pub timerange: Option<String>,

    /// Explicit pairs; overrides the config whitelist
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub pairs: Vec<String>,

    /// Log reward components and set the model log level to DEBUG
    #[arg(long)]
    pub reward_debug: bool,

    /// Train from scratch instead of restoring the best checkpoint
    #[arg(long)]
    pub fresh: bool,

    /// Prefix for the model identifier
    #[arg(long, default_value = "")]
    pub id_prefix: String,

    /// Suffix for the model identifier
    #[arg(long, default_value = "")]
    pub id_suffix: String,

    /// Kill and fail a job after this many seconds
    #[arg(long, value_name = "SECS")]
    pub job_timeout: Option<u64>,

    /// Docker compose file (compose launcher)
    #[arg(long)]
    pub compose_file: Option<PathBuf>,

    /// Compose service name (compose launcher)
    #[arg(long)]
    pub service: Option<String>,
}

/// Arguments for the `resources` subcommand.
#[derive(Parser, Debug)]
pub struct ResourcesArgs {
    /// Threads per job to plan with
    #[arg(long)]
    pub threads: Option<usize>,

    /// Concurrency to plan with
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the `check coverage` subcommand.
#[derive(Parser, Debug)]
pub struct CoverageArgs {
    /// Engine base config containing the pairs to check
    #[arg(short, long, default_value = DEFAULT_BASE_CONFIG)]
    pub config: PathBuf,

    /// Timerange to cover (YYYYMMDD-YYYYMMDD or YYYYMMDD-)
    #[arg(long)]
    pub timerange: String,

    /// Timeframes that must be covered
    #[arg(long, num_args = 1.., value_delimiter = ',', default_values_t = ["5m".to_string(), "15m".to_string(), "1h".to_string()])]
    pub timeframes: Vec<String>,

    /// Days of data required before the timerange start
    #[arg(long, env = "WARMUP_DAYS", default_value_t = DEFAULT_WARMUP_DAYS)]
    pub warmup_days: i64,

    /// Read a saved `list-data --show-timerange` output instead of running the engine
    #[arg(long, value_name = "FILE")]
    pub listing: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_name() {
        assert_eq!(Cli::command().get_name(), "pairtrain");
    }

    #[test]
    fn train_defaults() {
        let cli = Cli::try_parse_from(["pairtrain", "train"]).unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.config, PathBuf::from("user_config/config.json"));
        assert!(args.concurrency.is_none());
        assert!(args.threads.is_none());
        assert!(args.pairs.is_empty());
        assert!(!args.reward_debug);
        assert!(!args.fresh);
        assert!(args.id_prefix.is_empty());
    }

    #[test]
    fn train_accepts_space_and_comma_separated_pairs() {
        let cli = Cli::try_parse_from([
            "pairtrain",
            "train",
            "--pairs",
            "BTC/USDT:USDT",
            "ETH/USDT:USDT,SOL/USDT:USDT",
            "--concurrency",
            "3",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(
            args.pairs,
            ["BTC/USDT:USDT", "ETH/USDT:USDT", "SOL/USDT:USDT"]
        );
        assert_eq!(args.concurrency, Some(3));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pairtrain", "resources", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Resources(_)));
    }

    #[test]
    fn coverage_requires_timerange() {
        assert!(Cli::try_parse_from(["pairtrain", "check", "coverage"]).is_err());

        let cli = Cli::try_parse_from([
            "pairtrain",
            "check",
            "coverage",
            "--timerange",
            "20240101-",
            "--warmup-days",
            "30",
        ])
        .unwrap();
        let Commands::Check(CheckCommand::Coverage(args)) = cli.command else {
            panic!("expected check coverage");
        };
        assert_eq!(args.timeframes, ["5m", "15m", "1h"]);
        assert_eq!(args.warmup_days, 30);
    }
}
