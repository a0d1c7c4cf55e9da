//! Colored progress messages on stderr.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use fleetkey_core::{ReportLevel, Reporter};

/// Writes categorized progress lines to stderr.
///
/// Quiet mode keeps warnings and errors only.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    color: bool,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(color: bool, quiet: bool) -> Self {
        Self { color, quiet }
    }

    fn format(&self, level: ReportLevel, message: &str) -> String {
        let tag = format!("[{level}]");
        if !self.color {
            return match level {
                ReportLevel::Step => format!("\n==> {message}"),
                _ => format!("{tag} {message}"),
            };
        }
        match level {
            ReportLevel::Step => format!("\n{} {}", "==>".cyan().bold(), message.bold()),
            ReportLevel::Info => format!("{} {message}", tag.blue()),
            ReportLevel::Success => format!("{} {message}", tag.green()),
            ReportLevel::Warning => format!("{} {message}", tag.yellow()),
            ReportLevel::Error => format!("{} {message}", tag.red().bold()),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, level: ReportLevel, message: &str) {
        if self.quiet && !matches!(level, ReportLevel::Warning | ReportLevel::Error) {
            return;
        }
        let line = self.format(level, message);
        let _ = writeln!(io::stderr().lock(), "{line}");
    }
}
