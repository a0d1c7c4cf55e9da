// Operator-facing progress sink.
//
// Long-running operations narrate what they do through a `Reporter`; the
// CLI renders it with colors, tests record it.

use std::sync::{Mutex, PoisonError};

/// Category of a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ReportLevel {
    Step,
    Info,
    Success,
    Warning,
    Error,
}

pub trait Reporter: Send + Sync {
    fn report(&self, level: ReportLevel, message: &str);

    /// Start of a named step.
    fn step(&self, title: &str) {
        self.report(ReportLevel::Step, title);
    }

    fn info(&self, message: &str) {
        self.report(ReportLevel::Info, message);
    }

    fn success(&self, message: &str) {
        self.report(ReportLevel::Success, message);
    }

    fn warning(&self, message: &str) {
        self.report(ReportLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.report(ReportLevel::Error, message);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _level: ReportLevel, _message: &str) {}
}

/// Keeps every message, for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<(ReportLevel, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(ReportLevel, String)> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any message at `level` contains `needle`.
    pub fn contains(&self, level: ReportLevel, needle: &str) -> bool {
        self.messages()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }

    pub fn count(&self, level: ReportLevel) -> usize {
        self.messages().iter().filter(|(l, _)| *l == level).count()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, level: ReportLevel, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_owned()));
    }
}
