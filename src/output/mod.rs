//! User-facing status lines.
//!
//! Routine messages are dimmed, warnings and errors bold. Everything goes to
//! stderr so that `list` and `diff` output on stdout stays clean. Verbosity is
//! process-wide and set once from the command line.

use crate::sync::{EntryReport, Outcome, SyncReport};
use colored::Colorize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Verbosity level for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Only warnings and errors
    Quiet = 0,
    /// Default level
    Normal = 1,
    /// Also report entries that did not change
    Verbose = 2,
}

/// Global verbosity setting (default: Normal).
static VERBOSITY: AtomicU8 = AtomicU8::new(1);

/// Sets the global verbosity level for all output functions.
pub fn set_verbosity(level: Verbosity) {
    VERBOSITY.store(level as u8, Ordering::Relaxed);
}

/// Gets the current global verbosity level.
pub fn get_verbosity() -> Verbosity {
    match VERBOSITY.load(Ordering::Relaxed) {
        0 => Verbosity::Quiet,
        2 => Verbosity::Verbose,
        _ => Verbosity::Normal,
    }
}

/// Prints a success message in green (respects quiet mode).
pub fn success(message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{}", message.green());
}

/// Prints an error message in bold red (always shown).
pub fn error(message: &str) {
    eprintln!("{}", message.red().bold());
}

/// Prints a warning message in bold yellow (always shown).
pub fn warning(message: &str) {
    eprintln!("{}", message.yellow().bold());
}

/// Prints an informational message in dimmed color (respects quiet mode).
pub fn info(message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{}", message.dimmed());
}

/// Prints a verbose message (only in verbose mode).
pub fn verbose(message: &str) {
    if get_verbosity() != Verbosity::Verbose {
        return;
    }
    eprintln!("{}", message.dimmed());
}

/// Prints `verb message` with the verb dimmed, e.g. `applied all:etc/hosts`.
pub fn action(verb: &str, message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{} {}", verb.dimmed().bold(), message);
}

/// `tag:path` as shown in status lines
fn entry_name(entry: &EntryReport) -> String {
    format!("{}:{}", entry.tag, entry.path)
}

/// Print the outcome of an operation.
///
/// Changed entries are shown with `verb`, unchanged and differing ones only
/// in verbose mode. Failures, hook failures and resolution warnings are always shown.
/// The summary line is colored by whether anything failed.
pub fn report(verb: &str, report: &SyncReport) {
    for message in &report.warnings {
        warning(&format!("warning: {message}"));
    }
    for entry in &report.entries {
        match &entry.outcome {
            Outcome::Updated => action(verb, &entry_name(entry)),
            Outcome::Unchanged => verbose(&format!("unchanged {}", entry_name(entry))),
            Outcome::Differs(comparison) => {
                let labels: Vec<&str> = comparison.iter().map(|d| d.label()).collect();
                verbose(&format!("differs {} ({})", entry_name(entry), labels.join(", ")));
            }
            Outcome::Failed(reason) => error(&format!("{}: {reason}", entry_name(entry))),
        }
    }
    for failure in &report.hook_failures {
        warning(&format!(
            "hook {} of tag {} failed: {}",
            failure.hook, failure.tag, failure.message
        ));
    }

    if report.has_failures() {
        warning(&report.summary());
    } else {
        info(&report.summary());
    }
}
