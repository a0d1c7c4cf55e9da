// ── Rotation history ──
//
// Append-only JSON log of rotation events plus a derived Markdown report.
// Only the validation fields of the most recent event are ever updated.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backup::current_user;
use crate::credential::CredentialKind;
use crate::error::CoreError;
use crate::secrets::write_atomic;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RotationType {
    Scheduled,
    Emergency,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RotationMethod {
    Manual,
    Automated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Passed,
    Failed,
}

/// One rotation, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub rotation_type: RotationType,
    pub reason: String,
    pub credentials_rotated: Vec<CredentialKind>,
    pub method: RotationMethod,
    pub performed_by: String,
    #[serde(default)]
    pub notes: String,
    pub validation_status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_notes: Option<String>,
}

impl RotationEvent {
    /// A pending event stamped now, performed by the current user.
    pub fn new(
        rotation_type: RotationType,
        reason: impl Into<String>,
        credentials_rotated: Vec<CredentialKind>,
        method: RotationMethod,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            rotation_type,
            reason: reason.into(),
            credentials_rotated,
            method,
            performed_by: current_user(),
            notes: String::new(),
            validation_status: ValidationStatus::Pending,
            validation_timestamp: None,
            validation_notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RotationStats {
    pub total_rotations: usize,
    pub last_rotation: Option<DateTime<Utc>>,
    pub rotations_by_type: BTreeMap<String, usize>,
    pub rotations_by_reason: BTreeMap<String, usize>,
    /// Mean of the whole-day gaps between consecutive rotations.
    pub average_interval_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueStatus {
    pub due: bool,
    pub reason: String,
    pub days_since_last: Option<i64>,
    pub last_rotation: Option<DateTime<Utc>>,
    pub max_age_days: i64,
}

/// The rotation log backed by a JSON file.
#[derive(Debug, Clone)]
pub struct RotationHistory {
    path: PathBuf,
    events: Vec<RotationEvent>,
}

impl RotationHistory {
    /// Load the log; a missing file is an empty history.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let events = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| CoreError::data(&path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CoreError::io(&path)(e)),
        };
        Ok(Self { path, events })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events(&self) -> &[RotationEvent] {
        &self.events
    }

    /// Most recently appended event.
    pub fn last(&self) -> Option<&RotationEvent> {
        self.events.last()
    }

    /// Event with the latest timestamp. Imported logs need not be in order.
    pub fn newest(&self) -> Option<&RotationEvent> {
        self.events.iter().max_by_key(|e| e.timestamp)
    }

    /// Append and persist.
    pub fn append(&mut self, event: RotationEvent) -> Result<(), CoreError> {
        debug!(rotation_type = %event.rotation_type, reason = %event.reason, "recording rotation");
        self.events.push(event);
        self.save()
    }

    /// Set the validation outcome of the most recent event and persist.
    pub fn update_validation_status(
        &mut self,
        status: ValidationStatus,
        notes: Option<String>,
    ) -> Result<(), CoreError> {
        let last = self.events.last_mut().ok_or(CoreError::NoHistory)?;
        last.validation_status = status;
        last.validation_timestamp = Some(Utc::now());
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            last.validation_notes = Some(notes);
        }
        self.save()
    }

    fn save(&self) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(&self.events)
            .map_err(|e| CoreError::data(&self.path, e))?;
        write_atomic(&self.path, json.as_bytes())
    }

    pub fn stats(&self) -> RotationStats {
        let mut stats = RotationStats {
            total_rotations: self.events.len(),
            last_rotation: self.newest().map(|e| e.timestamp),
            ..RotationStats::default()
        };
        for event in &self.events {
            *stats
                .rotations_by_type
                .entry(event.rotation_type.to_string())
                .or_default() += 1;
            *stats
                .rotations_by_reason
                .entry(event.reason.clone())
                .or_default() += 1;
        }

        let mut times: Vec<_> = self.events.iter().map(|e| e.timestamp).collect();
        times.sort();
        let gaps: Vec<i64> = times
            .windows(2)
            .filter_map(|w| match w {
                [a, b] => Some((*b - *a).num_days()),
                _ => None,
            })
            .collect();
        if !gaps.is_empty() {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let mean = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;
            stats.average_interval_days = Some(mean);
        }
        stats
    }

    pub fn days_since_last(&self, now: DateTime<Utc>) -> Option<i64> {
        self.newest().map(|e| (now - e.timestamp).num_days())
    }

    /// Whether the newest rotation is at least `max_age_days` old.
    /// An empty history is always due.
    pub fn due(&self, max_age_days: i64, now: DateTime<Utc>) -> DueStatus {
        let Some(last) = self.newest() else {
            return DueStatus {
                due: true,
                reason: "no history".into(),
                days_since_last: None,
                last_rotation: None,
                max_age_days,
            };
        };
        let days = (now - last.timestamp).num_days();
        let due = days >= max_age_days;
        DueStatus {
            due,
            reason: if due {
                format!("last rotation was {days} days ago")
            } else {
                "recent rotation".into()
            },
            days_since_last: Some(days),
            last_rotation: Some(last.timestamp),
            max_age_days,
        }
    }

    /// Markdown report: statistics, then events newest first.
    pub fn render_report(&self, now: DateTime<Utc>) -> String {
        let stats = self.stats();
        let mut out = String::from("# ESPHome Credential Rotation Log\n\n");
        let _ = writeln!(out, "**Generated**: {}\n", now.format("%Y-%m-%d %H:%M:%S UTC"));

        out.push_str("## Rotation Statistics\n\n");
        let _ = writeln!(out, "- **Total Rotations**: {}", stats.total_rotations);
        let _ = writeln!(
            out,
            "- **Last Rotation**: {}",
            stats
                .last_rotation
                .map_or_else(|| "Never".to_owned(), |t| t.format("%Y-%m-%d").to_string())
        );
        if let Some(avg) = stats.average_interval_days {
            let _ = writeln!(out, "- **Average Interval**: {avg:.1} days");
        }

        out.push_str("\n### Rotations by Type\n\n");
        for (kind, count) in &stats.rotations_by_type {
            let _ = writeln!(out, "- **{kind}**: {count}");
        }
        out.push_str("\n### Rotations by Reason\n\n");
        for (reason, count) in &stats.rotations_by_reason {
            let _ = writeln!(out, "- **{reason}**: {count}");
        }

        out.push_str("\n## Rotation History\n\n");
        if self.events.is_empty() {
            out.push_str("*No rotation history available.*\n");
            return out;
        }

        let total = self.events.len();
        for (i, event) in self.events.iter().rev().enumerate() {
            let _ = writeln!(out, "### Rotation {}\n", total - i);
            let _ = writeln!(out, "**Date**: {}", event.timestamp.format("%Y-%m-%d"));
            let _ = writeln!(out, "**Time**: {}", event.timestamp.format("%H:%M:%S UTC"));
            let _ = writeln!(out, "**Type**: {}", event.rotation_type);
            let _ = writeln!(out, "**Reason**: {}", event.reason);
            let _ = writeln!(out, "**Method**: {}", event.method);
            let _ = writeln!(out, "**Performed By**: {}", event.performed_by);
            if !event.credentials_rotated.is_empty() {
                let names: Vec<_> = event
                    .credentials_rotated
                    .iter()
                    .map(|c| c.field_name())
                    .collect();
                let _ = writeln!(out, "**Credentials Rotated**: {}", names.join(", "));
            }
            let _ = writeln!(out, "**Validation Status**: {}", event.validation_status);
            if !event.notes.is_empty() {
                let _ = writeln!(out, "**Notes**: {}", event.notes);
            }
            if let Some(notes) = &event.validation_notes {
                let _ = writeln!(out, "**Validation Notes**: {notes}");
            }
            out.push_str("\n---\n\n");
        }
        out
    }

    pub fn write_report(&self, path: &Path, now: DateTime<Utc>) -> Result<(), CoreError> {
        fs::write(path, self.render_report(now)).map_err(CoreError::io(path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + Duration::days(n)
    }

    fn event(rotation_type: RotationType, reason: &str, when: DateTime<Utc>) -> RotationEvent {
        RotationEvent::new(
            rotation_type,
            reason,
            CredentialKind::ALL.to_vec(),
            RotationMethod::Automated,
        )
        .at(when)
    }

    #[test]
    fn empty_history_is_due() {
        let dir = TempDir::new().unwrap();
        let history = RotationHistory::load(dir.path().join("log.json")).unwrap();
        let due = history.due(90, day(0));
        assert!(due.due);
        assert_eq!(due.reason, "no history");
        assert_eq!(due.days_since_last, None);
    }

    #[test]
    fn due_compares_age_with_threshold() {
        let dir = TempDir::new().unwrap();
        let mut history = RotationHistory::load(dir.path().join("log.json")).unwrap();
        history
            .append(event(RotationType::Scheduled, "quarterly", day(0)))
            .unwrap();

        assert!(!history.due(90, day(89)).due);
        let due = history.due(90, day(90));
        assert!(due.due);
        assert_eq!(due.days_since_last, Some(90));
    }

    #[test]
    fn due_uses_newest_timestamp_not_append_order() {
        let dir = TempDir::new().unwrap();
        let mut history = RotationHistory::load(dir.path().join("log.json")).unwrap();
        history.append(event(RotationType::Scheduled, "recent", day(80))).unwrap();
        history.append(event(RotationType::Manual, "backfilled", day(0))).unwrap();

        assert_eq!(history.newest().unwrap().reason, "recent");
        assert_eq!(history.stats().last_rotation, Some(day(80)));
        assert_eq!(history.days_since_last(day(100)), Some(20));
        let due = history.due(90, day(100));
        assert!(!due.due);
        assert_eq!(due.last_rotation, Some(day(80)));
    }

    #[test]
    fn stats_count_and_average() {
        let dir = TempDir::new().unwrap();
        let mut history = RotationHistory::load(dir.path().join("log.json")).unwrap();
        // Appended out of order; the interval uses sorted timestamps.
        history.append(event(RotationType::Scheduled, "quarterly", day(0))).unwrap();
        history.append(event(RotationType::Emergency, "exposure", day(30))).unwrap();
        history.append(event(RotationType::Scheduled, "quarterly", day(10))).unwrap();

        let stats = history.stats();

        assert_eq!(stats.total_rotations, 3);
        assert_eq!(stats.rotations_by_type["scheduled"], 2);
        assert_eq!(stats.rotations_by_type["emergency"], 1);
        assert_eq!(stats.rotations_by_reason["quarterly"], 2);
        assert_eq!(stats.average_interval_days, Some(15.0));
    }

    #[test]
    fn single_event_has_no_interval() {
        let dir = TempDir::new().unwrap();
        let mut history = RotationHistory::load(dir.path().join("log.json")).unwrap();
        history.append(event(RotationType::Manual, "test", day(0))).unwrap();
        assert_eq!(history.stats().average_interval_days, None);
    }

    #[test]
    fn persisted_log_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.json");
        let mut history = RotationHistory::load(&path).unwrap();
        history
            .append(event(RotationType::Emergency, "leak", day(0)).with_notes("hotfix"))
            .unwrap();
        history
            .update_validation_status(ValidationStatus::Passed, Some("all devices ok".into()))
            .unwrap();

        let reloaded = RotationHistory::load(&path).unwrap();
        let last = reloaded.last().unwrap();
        assert_eq!(last.validation_status, ValidationStatus::Passed);
        assert_eq!(last.validation_notes.as_deref(), Some("all devices ok"));
        assert!(last.validation_timestamp.is_some());
        assert_eq!(last.notes, "hotfix");

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"type\": \"emergency\""), "{raw}");
        assert!(raw.contains("\"ota_password\""));
    }

    #[test]
    fn update_without_events_fails() {
        let dir = TempDir::new().unwrap();
        let mut history = RotationHistory::load(dir.path().join("log.json")).unwrap();
        assert!(matches!(
            history.update_validation_status(ValidationStatus::Failed, None),
            Err(CoreError::NoHistory)
        ));
    }

    #[test]
    fn report_lists_newest_first() {
        let dir = TempDir::new().unwrap();
        let mut history = RotationHistory::load(dir.path().join("log.json")).unwrap();
        history.append(event(RotationType::Scheduled, "first", day(0))).unwrap();
        history.append(event(RotationType::Emergency, "second", day(5))).unwrap();

        let report = history.render_report(day(6));

        assert!(report.contains("- **Total Rotations**: 2"));
        assert!(report.contains("- **Average Interval**: 5.0 days"));
        let newest = report.find("**Reason**: second").unwrap();
        let oldest = report.find("**Reason**: first").unwrap();
        assert!(newest < oldest);
        assert!(report.contains("### Rotation 2"));
    }

    #[test]
    fn empty_report_says_so() {
        let dir = TempDir::new().unwrap();
        let history = RotationHistory::load(dir.path().join("log.json")).unwrap();
        let report = history.render_report(day(0));
        assert!(report.contains("*No rotation history available.*"));
        assert!(report.contains("**Last Rotation**: Never"));
    }
}
