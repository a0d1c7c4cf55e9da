// ── Exposure scanner ──
//
// Walks the working tree looking for known-exposed values (exact matches,
// always a finding) and for lines that look like a hardcoded key or OTA
// password (a warning only). `!secret` references and comment lines are not
// hardcoded values.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::credential::{Blocklist, CredentialKind, ValidationPolicy};
use crate::error::CoreError;

pub const DEFAULT_EXTENSIONS: &[&str] = &["yaml", "yml", "py", "sh", "js", "ts", "json", "md"];
pub const DEFAULT_SKIP_DIRS: &[&str] = &["backups", ".esphome", "target", "node_modules"];

static HARDCODED_API_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*-?\s*["']?(?:api_)?(?:key|encryption_key)["']?\s*:\s*["']?([A-Za-z0-9+/]{43}=)["']?\s*$"#)
        .expect("valid regex")
});
static HARDCODED_OTA_PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*-?\s*["']?(?:ota_)?password["']?\s*:\s*["']?([a-fA-F0-9]{32})["']?\s*$"#)
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FindingKind {
    /// A blocklisted value appears verbatim.
    Exposed,
    /// A value shaped like a credential is written inline.
    PotentialHardcoded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub path: PathBuf,
    pub line: usize,
    pub kind: FindingKind,
    pub credential: CredentialKind,
    pub severity: FindingSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FindingSeverity {
    Warning,
    Error,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FindingKind::Exposed => write!(
                f,
                "Exposed {} found in {}:{}",
                self.credential,
                self.path.display(),
                self.line
            ),
            FindingKind::PotentialHardcoded => write!(
                f,
                "Potential hardcoded {} in {}:{}",
                self.credential.label(),
                self.path.display(),
                self.line
            ),
        }
    }
}

/// Scan result for a tree or a list of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub files_scanned: usize,
    pub findings: Vec<Finding>,
}

impl ScanReport {
    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == FindingSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == FindingSeverity::Warning)
    }

    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Turn error-severity findings into a `CoreError`.
    pub fn into_result(self) -> Result<Self, CoreError> {
        let errors: Vec<String> = self.errors().map(ToString::to_string).collect();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(CoreError::ExposureFound {
                count: errors.len(),
                summary: errors.join("; "),
            })
        }
    }
}

/// Searches files for exposed and hardcoded credentials.
#[derive(Debug, Clone)]
pub struct ExposureScanner {
    blocklist: Blocklist,
    extensions: Vec<String>,
    skip_dirs: Vec<String>,
    skip_files: Vec<PathBuf>,
    skip_paths: Vec<PathBuf>,
    transient: Vec<PathBuf>,
}

impl ExposureScanner {
    pub fn new(blocklist: Blocklist) -> Self {
        Self {
            blocklist,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_owned()).collect(),
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| (*s).to_owned()).collect(),
            skip_files: Vec::new(),
            skip_paths: Vec::new(),
            transient: Vec::new(),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_skip_dirs(mut self, dirs: Vec<String>) -> Self {
        self.skip_dirs = dirs;
        self
    }

    /// Never scan these files (e.g. the secrets file, validated separately).
    pub fn skip_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip_files.push(path.into());
        self
    }

    /// Never descend into this directory, wherever it sits in the tree.
    pub fn skip_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip_paths.push(path.into());
        self
    }

    /// Files a rotation writes on purpose with old credentials. Findings in
    /// them are warnings under the transition policy.
    pub fn with_transient(mut self, path: impl Into<PathBuf>) -> Self {
        self.transient.push(path.into());
        self
    }

    pub fn blocklist(&self) -> &Blocklist {
        &self.blocklist
    }

    /// Walk `root`, scanning every file with a configured extension.
    /// Hidden directories are skipped except `.githooks`.
    pub fn scan_tree(&self, root: &Path, policy: ValidationPolicy) -> Result<ScanReport, CoreError> {
        let mut files = Vec::new();
        self.collect(root, &mut files)?;
        files.sort();
        Ok(self.scan_files(&files, policy))
    }

    /// Scan exactly these files. Unreadable files are logged and skipped.
    pub fn scan_files(&self, files: &[PathBuf], policy: ValidationPolicy) -> ScanReport {
        let mut report = ScanReport::default();
        for path in files {
            match fs::read(path) {
                Ok(bytes) => {
                    report.files_scanned += 1;
                    let text = String::from_utf8_lossy(&bytes);
                    let transient = self.is_transient(path);
                    report
                        .findings
                        .extend(self.scan_text(path, &text, policy, transient));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to scan file"),
            }
        }
        debug!(files = report.files_scanned, findings = report.findings.len(), "scan finished");
        report
    }

    fn scan_text(
        &self,
        path: &Path,
        text: &str,
        policy: ValidationPolicy,
        transient: bool,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let exposed_severity = if transient && policy.is_transition() {
            FindingSeverity::Warning
        } else {
            FindingSeverity::Error
        };

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;

            for (credential, value) in self.blocklist.iter() {
                if line.contains(value) {
                    findings.push(Finding {
                        path: path.to_path_buf(),
                        line: line_no,
                        kind: FindingKind::Exposed,
                        credential,
                        severity: exposed_severity,
                    });
                }
            }

            let trimmed = line.trim_start();
            if trimmed.starts_with('#') || trimmed.starts_with("//") || line.contains("!secret") {
                continue;
            }
            for (credential, pattern) in [
                (CredentialKind::ApiKey, &*HARDCODED_API_KEY),
                (CredentialKind::OtaPassword, &*HARDCODED_OTA_PASSWORD),
            ] {
                let Some(value) = pattern.captures(line).and_then(|c| c.get(1)) else {
                    continue;
                };
                if self.blocklist.contains(credential, value.as_str()) {
                    continue;
                }
                findings.push(Finding {
                    path: path.to_path_buf(),
                    line: line_no,
                    kind: FindingKind::PotentialHardcoded,
                    credential,
                    severity: FindingSeverity::Warning,
                });
            }
        }
        findings
    }

    fn is_transient(&self, path: &Path) -> bool {
        self.transient.iter().any(|t| same_file(t, path))
    }

    fn is_skipped_file(&self, path: &Path) -> bool {
        self.skip_files.iter().any(|s| same_file(s, path))
    }

    fn is_skipped_dir(&self, name: &str, path: &Path) -> bool {
        self.skip_dirs.iter().any(|d| d == name)
            || self.skip_paths.iter().any(|s| same_file(s, path))
    }

    fn collect(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CoreError> {
        for entry in fs::read_dir(dir).map_err(CoreError::io(dir))? {
            let entry = entry.map_err(CoreError::io(dir))?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let file_type = entry.file_type().map_err(CoreError::io(&path))?;

            if file_type.is_dir() {
                let hidden = name.starts_with('.') && name != ".githooks";
                if hidden || self.is_skipped_dir(&name, &path) {
                    continue;
                }
                self.collect(&path, out)?;
            } else if file_type.is_file() {
                let wanted = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| self.extensions.iter().any(|x| x == ext));
                if wanted && !self.is_skipped_file(&path) {
                    out.push(path);
                }
            }
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    const EXPOSED_OTA: &str = "5929ccc1f08289c79aca50ebe0a9b7eb";

    fn scanner() -> ExposureScanner {
        ExposureScanner::new(Blocklist::default())
    }

    #[test]
    fn exact_match_is_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("porch.yaml");
        fs::write(&file, format!("ota:\n  password: \"{EXPOSED_OTA}\"\n")).unwrap();

        let report = scanner().scan_tree(dir.path(), ValidationPolicy::Strict).unwrap();

        assert_eq!(report.files_scanned, 1);
        let errors: Vec<_> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].credential, CredentialKind::OtaPassword);
        assert_eq!(errors[0].line, 2);
        assert!(!report.is_clean());
        assert!(report.into_result().is_err());
    }

    #[test]
    fn hardcoded_values_are_warnings_and_secret_refs_are_ignored() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("kitchen.yaml");
        fs::write(
            &file,
            "\
api:
  encryption:
    key: \"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\"
ota:
  - platform: esphome
    password: !secret ota_password
# password: 0123456789abcdef0123456789abcdef
wifi_ota_password: 0123456789abcdef0123456789abcdef
",
        )
        .unwrap();

        let report = scanner().scan_tree(dir.path(), ValidationPolicy::Strict).unwrap();

        assert!(report.is_clean());
        let warnings: Vec<_> = report.warnings().map(|f| (f.credential, f.line)).collect();
        assert_eq!(warnings, vec![(CredentialKind::ApiKey, 3)]);
    }

    #[test]
    fn skips_hidden_backup_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for sub in [".esphome", "backups", ".githooks", ".git", "scripts"] {
            fs::create_dir(root.join(sub)).unwrap();
        }
        let bad = format!("x: {EXPOSED_OTA}\n");
        fs::write(root.join(".esphome/build.yaml"), &bad).unwrap();
        fs::write(root.join("backups/secrets.yaml"), &bad).unwrap();
        fs::write(root.join(".git/config.json"), &bad).unwrap();
        fs::write(root.join("notes.txt"), &bad).unwrap();
        fs::write(root.join("secrets.yaml.auth"), &bad).unwrap();
        fs::write(root.join(".githooks/check.sh"), &bad).unwrap();
        fs::write(root.join("scripts/rotate.py"), &bad).unwrap();

        let report = scanner().scan_tree(root, ValidationPolicy::Strict).unwrap();

        let mut paths: Vec<_> = report
            .findings
            .iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![PathBuf::from(".githooks/check.sh"), PathBuf::from("scripts/rotate.py")]
        );
    }

    #[test]
    fn skipped_file_is_not_scanned() {
        let dir = TempDir::new().unwrap();
        let secrets = dir.path().join("secrets.yaml");
        fs::write(&secrets, format!("ota_password: \"{EXPOSED_OTA}\"\n")).unwrap();

        let report = scanner()
            .skip_file(&secrets)
            .scan_tree(dir.path(), ValidationPolicy::Strict)
            .unwrap();

        assert_eq!(report.files_scanned, 0);
    }

    #[test]
    fn skipped_dir_is_matched_by_path_not_name() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("snapshots/backup_pre-rotation_20260101_000000");
        fs::create_dir_all(&snapshot).unwrap();
        fs::write(snapshot.join("secrets.yaml"), format!("ota_password: \"{EXPOSED_OTA}\"\n")).unwrap();
        let nested = dir.path().join("docs/snapshots");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("notes.md"), format!("old key {EXPOSED_OTA}\n")).unwrap();

        let report = scanner()
            .skip_dir(dir.path().join("snapshots"))
            .scan_tree(dir.path(), ValidationPolicy::Strict)
            .unwrap();

        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].path.ends_with("docs/snapshots/notes.md"));
    }

    #[test]
    fn transient_file_is_demoted_only_in_transition() {
        let dir = TempDir::new().unwrap();
        let taskfile = dir.path().join("Taskfile.yml");
        fs::write(&taskfile, format!("vars:\n  OLD_OTA: {EXPOSED_OTA}\n")).unwrap();
        let scanner = scanner().with_transient(&taskfile);

        let strict = scanner.scan_tree(dir.path(), ValidationPolicy::Strict).unwrap();
        let transition = scanner
            .scan_tree(dir.path(), ValidationPolicy::TransitionAllowingOldCredentials)
            .unwrap();

        assert!(!strict.is_clean());
        assert!(transition.is_clean());
        assert_eq!(transition.warnings().count(), 1);
    }

    #[test]
    fn non_transient_exposure_fails_even_in_transition() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("porch.yaml"), format!("p: {EXPOSED_OTA}\n")).unwrap();

        let report = scanner()
            .scan_tree(dir.path(), ValidationPolicy::TransitionAllowingOldCredentials)
            .unwrap();

        assert!(!report.is_clean());
    }

    #[test]
    fn finding_display_names_file_and_line() {
        let finding = Finding {
            path: PathBuf::from("porch.yaml"),
            line: 4,
            kind: FindingKind::Exposed,
            credential: CredentialKind::OtaPassword,
            severity: FindingSeverity::Error,
        };
        assert_eq!(finding.to_string(), "Exposed ota_password found in porch.yaml:4");
    }
}
