//! CLI module graph and command dispatch.

pub mod check;
pub mod command;
pub mod diagnostic;
pub mod output;
pub mod resources;
pub mod train;

use crate::app::{EXIT_PRECONDITION, EXIT_SUCCESS};
use crate::error::{Error, Result};
use crate::infrastructure::config::settings::Settings;
use command::{CheckCommand, Cli, Commands};
use diagnostic::PreconditionDiagnostic;

/// Run a parsed command line and return the process exit code.
///
/// Settings are loaded and logging is initialized first, so every command
/// sees the same configuration. Errors are rendered here.
pub async fn run(cli: Cli) -> i32 {
    output::configure(output::OutputConfig::new(cli.json, cli.quiet, cli.verbose));

    let mut settings = match Settings::resolve(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => return report_error(&e),
    };
    if cli.verbose > 0 {
        settings.logging.level = "debug".to_string();
    }
    if cli.json {
        settings.logging.format = "json".to_string();
    }
    settings.init_logging();

    match dispatch(&cli.command, settings).await {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

async fn dispatch(command: &Commands, settings: Settings) -> Result<i32> {
    match command {
        Commands::Train(args) => train::execute(args, settings).await,
        Commands::Resources(args) => {
            resources::execute(args, &settings)?;
            Ok(EXIT_SUCCESS)
        }
        Commands::Check(CheckCommand::Config(arg)) => {
            check::config::execute_config(&arg.config, &settings)?;
            Ok(EXIT_SUCCESS)
        }
        Commands::Check(CheckCommand::Coverage(args)) => {
            check::coverage::execute_coverage(args, &settings).await
        }
    }
}

/// Print an error and map it to an exit code.
fn report_error(err: &Error) -> i32 {
    tracing::error!(error = %err, "aborting");
    if output::is_json() {
        output::error(&err.to_string());
    } else {
        eprintln!("{}", PreconditionDiagnostic::from_error(err).render());
    }
    // Anything escaping a command happened before dispatch.
    EXIT_PRECONDITION
}
