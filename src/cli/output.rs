//! Terminal output for CLI handlers.
//!
//! Every helper is one event. In `--json` mode the event becomes a single
//! stdout line shaped as `{"type": ..., "payload": ...}`; otherwise it is
//! printed for humans, and `--quiet` drops everything that is not a
//! warning, an error or a failed job.

use std::fmt::Display;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use parking_lot::RwLock;
use serde_json::{json, Value};

/// Output flags shared by all handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    pub json: bool,
    pub quiet: bool,
    /// Number of `-v` flags.
    pub verbose: u8,
}

impl OutputConfig {
    #[must_use]
    pub const fn new(json: bool, quiet: bool, verbose: u8) -> Self {
        Self {
            json,
            quiet,
            verbose,
        }
    }
}

static CONFIG: RwLock<OutputConfig> = parking_lot::const_rwlock(OutputConfig::new(false, false, 0));

/// Apply the global CLI flags. Called once before dispatch.
pub fn configure(config: OutputConfig) {
    *CONFIG.write() = config;
}

fn current() -> OutputConfig {
    *CONFIG.read()
}

#[must_use]
pub fn is_json() -> bool {
    current().json
}

#[must_use]
pub fn verbosity() -> u8 {
    current().verbose
}

/// Whether an event is printed even under `--quiet`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Essential,
}

fn emit(kind: &str, payload: Value, level: Level, human: impl FnOnce()) {
    let config = current();
    if config.json {
        println!("{}", json!({ "type": kind, "payload": payload }));
    } else if !config.quiet || level == Level::Essential {
        human();
    }
}

/// Name and version line.
pub fn header(version: &str) {
    emit(
        "header",
        json!({ "app": "pairtrain", "version": version }),
        Level::Info,
        || println!("{} {}\n", "pairtrain".bold(), version.dimmed()),
    );
}

/// A section title.
pub fn section(title: &str) {
    emit("section", json!({ "title": title }), Level::Info, || {
        println!("\n{}", title.bold());
    });
}

/// A labeled value.
pub fn field(label: &str, value: impl Display) {
    let value = value.to_string();
    emit(
        "field",
        json!({ "label": label, "value": value }),
        Level::Info,
        || println!("  {:<14} {value}", label.dimmed()),
    );
}

pub fn success(message: &str) {
    emit("success", json!({ "message": message }), Level::Info, || {
        println!("  {} {message}", "✓".green());
    });
}

pub fn warning(message: &str) {
    emit("warning", json!({ "message": message }), Level::Essential, || {
        println!("  {} {message}", "⚠".yellow());
    });
}

/// An error line on stderr, in both modes.
pub fn error(message: &str) {
    if is_json() {
        eprintln!(
            "{}",
            json!({ "type": "error", "payload": { "message": message } })
        );
    } else {
        eprintln!("  {} {message}", "×".red());
    }
}

pub fn note(message: &str) {
    emit("note", json!({ "message": message }), Level::Info, || {
        println!("  {}", message.dimmed());
    });
}

pub fn hint(message: &str) {
    emit("hint", json!({ "message": message }), Level::Info, || {
        println!("  {}: {}", "hint".cyan().dimmed(), message.dimmed());
    });
}

/// A step that is about to start, e.g. `Prefetching historical data...`.
pub fn action(verb: &str, target: &str) {
    emit(
        "action",
        json!({ "verb": verb, "target": target }),
        Level::Info,
        || println!("  {} {target}...", verb.bold().cyan()),
    );
}

/// Indented multi-line block such as a rendered table.
pub fn lines(content: &str) {
    emit("lines", json!({ "content": content }), Level::Info, || {
        for line in content.lines() {
            println!("  {line}");
        }
    });
}

/// One finished job. Failures are printed under `--quiet` too.
pub fn job_status(pair: &str, code: i32) {
    let level = if code == 0 {
        Level::Info
    } else {
        Level::Essential
    };
    emit(
        "job",
        json!({ "pair": pair, "code": code, "ok": code == 0 }),
        level,
        || {
            if code == 0 {
                println!("  {} {pair}: {}", "✓".green(), "OK".green());
            } else {
                println!("  {} {pair}: {}", "×".red(), format!("FAIL({code})").red());
            }
        },
    );
}

/// Print a command's own JSON document as one line.
pub fn json_output(value: Value) {
    println!("{value}");
}

pub fn highlight(value: impl Display) -> String {
    styled(current(), value, |v| v.cyan().to_string())
}

pub fn muted(value: impl Display) -> String {
    styled(current(), value, |v| v.dimmed().to_string())
}

/// Plain text in JSON mode, `paint`ed otherwise.
fn styled<T: Display>(config: OutputConfig, value: T, paint: impl FnOnce(&T) -> String) -> String {
    if config.json {
        value.to_string()
    } else {
        paint(&value)
    }
}

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn interactive(config: OutputConfig) -> bool {
    !config.json && !config.quiet
}

/// Spinner for a step of unknown length. Hidden in JSON or quiet mode.
pub fn spinner(message: &str) -> ProgressBar {
    spinner_for(current(), message)
}

fn spinner_for(config: OutputConfig, message: &str) -> ProgressBar {
    if !interactive(config) {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::default_spinner()
        .tick_strings(SPINNER_FRAMES)
        .template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = ProgressBar::new_spinner()
        .with_style(style)
        .with_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Bar counting finished jobs. Hidden in JSON or quiet mode.
pub fn progress(total: usize, message: &str) -> ProgressBar {
    progress_for(current(), total, message)
}

fn progress_for(config: OutputConfig, total: usize, message: &str) -> ProgressBar {
    if !interactive(config) {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::default_bar()
        .template("  {spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let pb = ProgressBar::new(total as u64)
        .with_style(style)
        .with_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
