// ── Backups ──
//
// A backup is a flat directory `backups/<id>/` holding copies of the
// secrets file and the security-relevant project files, plus a manifest
// `backups/<id>_manifest.json` recording the SHA-256 of each original and
// of each copy. Verification re-hashes the copies; restore copies them back
// over the originals.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::CoreError;

const MANIFEST_SUFFIX: &str = "_manifest.json";
const ID_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

const CORE_FILES: &[&str] = &[
    ".env",
    ".gitsecrets",
    ".pre-commit-config.yaml",
    "Taskfile.yml",
    "requirements.txt",
];
const SKIP_MARKERS: &[&str] = &[".backup", ".test", ".dev"];

const GITIGNORE: &str = "*\n!.gitignore\n!README.md\n";
const README: &str = "\
# Credential backups

Snapshots of the secrets file and security-relevant project files, taken
by `fleetkey backup create` and automatically before every rotation.

Everything in this directory except this README and `.gitignore` is
ignored by git. Never commit backup contents.

- List backups: `fleetkey backup list`
- Verify a backup: `fleetkey backup verify <backup_id>`
- Restore a backup: `fleetkey backup restore <backup_id> [--force]`
- Remove old backups: `fleetkey backup cleanup --keep 10`
";

/// What a backed-up file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileKind {
    Secrets,
    Core,
    Config,
    Script,
    Hook,
}

/// One file captured in a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path of the original, relative to the working directory.
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// SHA-256 of the original at backup time.
    pub hash: String,
    /// Path of the copy, relative to the backup directory.
    pub backup_path: PathBuf,
    /// SHA-256 of the copy right after it was written.
    pub backup_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backup_id: String,
    pub timestamp: DateTime<Utc>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub total_files: usize,
    pub files: Vec<FileRecord>,
}

impl BackupManifest {
    /// The record for `path` (relative to the working directory), if captured.
    pub fn file(&self, path: &Path) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Outcome of re-hashing a backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub backup_id: String,
    pub verified: usize,
    pub mismatched: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

/// Outcome of restoring a backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub backup_id: String,
    pub restored: Vec<PathBuf>,
    /// Targets left alone because they exist and `force` was off.
    pub skipped: Vec<PathBuf>,
    /// Backup copies that were missing or could not be written back.
    pub failed: Vec<(PathBuf, String)>,
}

/// Backups of one working directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
    dir: PathBuf,
    secrets_file: PathBuf,
}

impl BackupStore {
    /// `dir` and `secrets_file` are resolved against `root` when relative.
    pub fn new(root: impl Into<PathBuf>, dir: impl AsRef<Path>, secrets_file: impl AsRef<Path>) -> Self {
        let root = root.into();
        let dir = root.join(dir);
        let secrets_file = secrets_file
            .as_ref()
            .strip_prefix(&root)
            .unwrap_or(secrets_file.as_ref())
            .to_path_buf();
        Self {
            root,
            dir,
            secrets_file,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn create(&self, label: Option<&str>) -> Result<BackupManifest, CoreError> {
        self.create_at(label, Local::now())
    }

    /// Create a backup stamped with `now`.
    pub fn create_at(
        &self,
        label: Option<&str>,
        now: DateTime<Local>,
    ) -> Result<BackupManifest, CoreError> {
        self.ensure_dir()?;

        let candidates = self.collect_files()?;
        if candidates.is_empty() {
            return Err(CoreError::data(&self.root, "no files to back up"));
        }

        let backup_id = self.unique_id(label, now);
        let backup_path = self.dir.join(&backup_id);
        fs::create_dir_all(&backup_path).map_err(CoreError::io(&backup_path))?;

        let mut files = Vec::with_capacity(candidates.len());
        for (relative, kind) in candidates {
            let source = self.root.join(&relative);
            let dest_name = free_name(&backup_path, &relative);
            let dest = backup_path.join(&dest_name);
            fs::copy(&source, &dest).map_err(CoreError::io(&source))?;
            files.push(FileRecord {
                hash: hash_file(&source)?,
                backup_hash: hash_file(&dest)?,
                path: relative,
                kind,
                backup_path: PathBuf::from(dest_name),
            });
        }

        let manifest = BackupManifest {
            backup_id,
            timestamp: now.with_timezone(&Utc),
            created_by: current_user(),
            label: label.map(str::to_owned),
            total_files: files.len(),
            files,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| CoreError::data(&self.dir, e))?;
        let manifest_path = self.manifest_path(&manifest.backup_id);
        fs::write(&manifest_path, json).map_err(CoreError::io(&manifest_path))?;

        info!(backup_id = %manifest.backup_id, files = manifest.total_files, "backup created");
        Ok(manifest)
    }

    /// All backups, newest first. Unreadable manifests are skipped.
    pub fn list(&self) -> Result<Vec<BackupManifest>, CoreError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut manifests = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(CoreError::io(&self.dir))? {
            let path = entry.map_err(CoreError::io(&self.dir))?.path();
            let is_manifest = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX));
            if !is_manifest {
                continue;
            }
            match read_manifest(&path) {
                Ok(m) => manifests.push(m),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable manifest"),
            }
        }
        manifests.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.backup_id.cmp(&a.backup_id))
        });
        Ok(manifests)
    }

    pub fn load(&self, backup_id: &str) -> Result<BackupManifest, CoreError> {
        let path = self.manifest_path(backup_id);
        if !path.is_file() {
            return Err(CoreError::BackupNotFound {
                id: backup_id.to_owned(),
            });
        }
        read_manifest(&path)
    }

    /// Newest backup whose label is `label`.
    pub fn latest_with_label(&self, label: &str) -> Result<Option<BackupManifest>, CoreError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|m| m.label.as_deref() == Some(label)))
    }

    /// Contents of the backed-up copy of `path`, if the backup has one.
    pub fn read_file(
        &self,
        manifest: &BackupManifest,
        path: &Path,
    ) -> Result<Option<String>, CoreError> {
        let Some(record) = manifest.file(path) else {
            return Ok(None);
        };
        let copy = self.dir.join(&manifest.backup_id).join(&record.backup_path);
        fs::read_to_string(&copy)
            .map(Some)
            .map_err(CoreError::io(&copy))
    }

    /// The secrets file as captured by `manifest`.
    pub fn read_secrets(&self, manifest: &BackupManifest) -> Result<Option<String>, CoreError> {
        self.read_file(manifest, &self.secrets_file)
    }

    pub fn verify(&self, backup_id: &str) -> Result<VerifyReport, CoreError> {
        let manifest = self.load(backup_id)?;
        let backup_path = self.dir.join(backup_id);
        let mut report = VerifyReport {
            backup_id: backup_id.to_owned(),
            ..VerifyReport::default()
        };

        for record in &manifest.files {
            let copy = backup_path.join(&record.backup_path);
            if !copy.is_file() {
                report.missing.push(record.backup_path.clone());
                continue;
            }
            if hash_file(&copy)? == record.backup_hash {
                report.verified += 1;
            } else {
                report.mismatched.push(record.backup_path.clone());
            }
        }

        debug!(backup_id, ok = report.is_ok(), "backup verified");
        Ok(report)
    }

    /// Copy files back. Existing targets are skipped unless `force`.
    /// Fails when nothing at all was restored.
    pub fn restore(&self, backup_id: &str, force: bool) -> Result<RestoreReport, CoreError> {
        let manifest = self.load(backup_id)?;
        let backup_path = self.dir.join(backup_id);
        let mut report = RestoreReport {
            backup_id: backup_id.to_owned(),
            ..RestoreReport::default()
        };

        for record in &manifest.files {
            let copy = backup_path.join(&record.backup_path);
            let target = self.root.join(&record.path);

            if !copy.is_file() {
                report
                    .failed
                    .push((record.path.clone(), "backup copy missing".into()));
                continue;
            }
            if target.exists() && !force {
                report.skipped.push(record.path.clone());
                continue;
            }
            let result = target
                .parent()
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| fs::copy(&copy, &target));
            match result {
                Ok(_) => report.restored.push(record.path.clone()),
                Err(e) => report.failed.push((record.path.clone(), e.to_string())),
            }
        }

        if report.restored.is_empty() {
            let reason = if report.skipped.is_empty() {
                "no backup copies could be restored".to_owned()
            } else {
                format!(
                    "{} existing file(s) skipped; use --force to overwrite",
                    report.skipped.len()
                )
            };
            return Err(CoreError::RestoreFailed {
                id: backup_id.to_owned(),
                reason,
            });
        }

        info!(backup_id, restored = report.restored.len(), "backup restored");
        Ok(report)
    }

    /// Remove all but the `keep` newest backups. Returns the removed ids.
    pub fn cleanup(&self, keep: usize) -> Result<Vec<String>, CoreError> {
        let mut removed = Vec::new();
        for manifest in self.list()?.into_iter().skip(keep) {
            let id = manifest.backup_id;
            let backup_path = self.dir.join(&id);
            if backup_path.is_dir() {
                fs::remove_dir_all(&backup_path).map_err(CoreError::io(&backup_path))?;
            }
            let manifest_path = self.manifest_path(&id);
            fs::remove_file(&manifest_path).map_err(CoreError::io(&manifest_path))?;
            debug!(backup_id = %id, "backup removed");
            removed.push(id);
        }
        Ok(removed)
    }

    fn manifest_path(&self, backup_id: &str) -> PathBuf {
        self.dir.join(format!("{backup_id}{MANIFEST_SUFFIX}"))
    }

    fn ensure_dir(&self) -> Result<(), CoreError> {
        fs::create_dir_all(&self.dir).map_err(CoreError::io(&self.dir))?;
        for (name, contents) in [(".gitignore", GITIGNORE), ("README.md", README)] {
            let path = self.dir.join(name);
            if !path.exists() {
                fs::write(&path, contents).map_err(CoreError::io(&path))?;
            }
        }
        Ok(())
    }

    fn unique_id(&self, label: Option<&str>, now: DateTime<Local>) -> String {
        let stamp = now.format(ID_TIME_FORMAT);
        let base = match label {
            Some(label) if !label.is_empty() => format!("backup_{}_{stamp}", sanitize(label)),
            _ => format!("backup_{stamp}"),
        };
        let mut id = base.clone();
        let mut n = 2;
        while self.dir.join(&id).exists() || self.manifest_path(&id).exists() {
            id = format!("{base}_{n}");
            n += 1;
        }
        id
    }

    /// Files to capture, relative to the working directory.
    fn collect_files(&self) -> Result<Vec<(PathBuf, FileKind)>, CoreError> {
        let mut seen = BTreeSet::new();
        let mut files = Vec::new();
        let mut push = |path: PathBuf, kind: FileKind| {
            if self.root.join(&path).is_file() && seen.insert(path.clone()) {
                files.push((path, kind));
            }
        };

        push(self.secrets_file.clone(), FileKind::Secrets);
        for name in CORE_FILES {
            push(PathBuf::from(name), FileKind::Core);
        }

        for name in sorted_names(&self.root)? {
            let is_yaml = name.ends_with(".yaml") || name.ends_with(".yml");
            if is_yaml
                && !name.starts_with('.')
                && !SKIP_MARKERS.iter().any(|m| name.contains(m))
            {
                push(PathBuf::from(name), FileKind::Config);
            }
        }

        let scripts = self.root.join("scripts");
        if scripts.is_dir() {
            for name in sorted_names(&scripts)? {
                if name.ends_with(".py") {
                    push(Path::new("scripts").join(name), FileKind::Script);
                }
            }
        }

        let hooks = self.root.join(".githooks");
        if hooks.is_dir() {
            for name in sorted_names(&hooks)? {
                push(Path::new(".githooks").join(name), FileKind::Hook);
            }
        }

        Ok(files)
    }
}

fn sorted_names(dir: &Path) -> Result<Vec<String>, CoreError> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(CoreError::io(dir))?
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    Ok(names)
}

/// A file name inside `dir` not yet taken, derived from `source`'s name:
/// `name.ext`, then `name_1.ext`, `name_2.ext`, ...
fn free_name(dir: &Path, source: &Path) -> String {
    let name = source
        .file_name()
        .map_or_else(|| "file".to_owned(), |n| n.to_string_lossy().into_owned());
    if !dir.join(&name).exists() {
        return name;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_owned(), Some(ext.to_owned())),
        _ => (name.clone(), None),
    };
    (1..)
        .map(|n| match &ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        })
        .find(|candidate| !dir.join(candidate).exists())
        .unwrap_or(name)
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn read_manifest(path: &Path) -> Result<BackupManifest, CoreError> {
    let text = fs::read_to_string(path).map_err(CoreError::io(path))?;
    serde_json::from_str(&text).map_err(|e| CoreError::data(path, e))
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> Result<String, CoreError> {
    let bytes = fs::read(path).map_err(CoreError::io(path))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub(crate) fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn workspace() -> (TempDir, BackupStore) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("secrets.yaml"), "api_key: \"one\"\n").unwrap();
        fs::write(root.join("kitchen.yaml"), "esphome:\n  name: kitchen\n").unwrap();
        fs::write(root.join("kitchen.backup.yaml"), "stale\n").unwrap();
        fs::write(root.join("Taskfile.yml"), "version: 3\n").unwrap();
        fs::create_dir(root.join("scripts")).unwrap();
        fs::write(root.join("scripts/tool.py"), "print()\n").unwrap();
        fs::write(root.join("scripts/notes.txt"), "x\n").unwrap();
        fs::create_dir(root.join(".githooks")).unwrap();
        fs::write(root.join(".githooks/check.sh"), "#!/bin/sh\n").unwrap();
        let store = BackupStore::new(root, "backups", "secrets.yaml");
        (dir, store)
    }

    fn at(secs: i64) -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn create_collects_expected_files() {
        let (_dir, store) = workspace();
        let manifest = store.create_at(Some("pre-rotation"), at(0)).unwrap();

        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("secrets.yaml"),
                PathBuf::from("Taskfile.yml"),
                PathBuf::from("kitchen.yaml"),
                PathBuf::from("scripts/tool.py"),
                PathBuf::from(".githooks/check.sh"),
            ]
        );
        assert!(manifest.backup_id.starts_with("backup_pre-rotation_"));
        assert_eq!(manifest.file(Path::new("secrets.yaml")).unwrap().kind, FileKind::Secrets);
        assert!(store.dir().join(".gitignore").is_file());
        assert!(store.dir().join("README.md").is_file());
    }

    #[test]
    fn round_trip_restore_recovers_content() {
        let (dir, store) = workspace();
        let secrets = dir.path().join("secrets.yaml");
        let original = fs::read(&secrets).unwrap();
        let manifest = store.create(None).unwrap();

        fs::write(&secrets, "api_key: \"mutated\"\n").unwrap();
        let report = store.restore(&manifest.backup_id, true).unwrap();

        assert!(report.restored.contains(&PathBuf::from("secrets.yaml")));
        assert_eq!(fs::read(&secrets).unwrap(), original);
    }

    #[test]
    fn restore_without_force_skips_existing() {
        let (_dir, store) = workspace();
        let manifest = store.create(None).unwrap();

        let err = store.restore(&manifest.backup_id, false).unwrap_err();
        assert!(matches!(err, CoreError::RestoreFailed { .. }), "{err}");
    }

    #[test]
    fn restore_recreates_deleted_file_without_force() {
        let (dir, store) = workspace();
        let manifest = store.create(None).unwrap();
        fs::remove_file(dir.path().join("kitchen.yaml")).unwrap();

        let report = store.restore(&manifest.backup_id, false).unwrap();

        assert_eq!(report.restored, vec![PathBuf::from("kitchen.yaml")]);
        assert!(!report.skipped.is_empty());
    }

    #[test]
    fn verify_unmodified_backup_is_clean() {
        let (_dir, store) = workspace();
        let manifest = store.create(None).unwrap();
        let report = store.verify(&manifest.backup_id).unwrap();
        assert!(report.is_ok());
        assert_eq!(report.verified, manifest.total_files);
    }

    #[test]
    fn verify_detects_tampering_and_missing_copies() {
        let (_dir, store) = workspace();
        let manifest = store.create(None).unwrap();
        let backup = store.dir().join(&manifest.backup_id);
        fs::write(backup.join("secrets.yaml"), "tampered").unwrap();
        fs::remove_file(backup.join("tool.py")).unwrap();

        let report = store.verify(&manifest.backup_id).unwrap();

        assert_eq!(report.mismatched, vec![PathBuf::from("secrets.yaml")]);
        assert_eq!(report.missing, vec![PathBuf::from("tool.py")]);
    }

    #[test]
    fn restore_with_all_copies_missing_fails_cleanly() {
        let (_dir, store) = workspace();
        let manifest = store.create(None).unwrap();
        fs::remove_dir_all(store.dir().join(&manifest.backup_id)).unwrap();

        let err = store.restore(&manifest.backup_id, true).unwrap_err();
        assert!(matches!(err, CoreError::RestoreFailed { .. }));
    }

    #[test]
    fn unknown_backup_is_not_found() {
        let (_dir, store) = workspace();
        assert!(matches!(
            store.verify("backup_nope"),
            Err(CoreError::BackupNotFound { .. })
        ));
    }

    #[test]
    fn list_is_newest_first_and_cleanup_keeps_newest() {
        let (_dir, store) = workspace();
        let first = store.create_at(None, at(0)).unwrap();
        let second = store.create_at(Some("pre-rotation"), at(60)).unwrap();
        let third = store.create_at(None, at(120)).unwrap();

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|m| m.backup_id).collect();
        assert_eq!(
            ids,
            vec![
                third.backup_id.clone(),
                second.backup_id.clone(),
                first.backup_id.clone()
            ]
        );

        let latest = store.latest_with_label("pre-rotation").unwrap().unwrap();
        assert_eq!(latest.backup_id, second.backup_id);
        assert_eq!(
            store.read_secrets(&latest).unwrap().as_deref(),
            Some("api_key: \"one\"\n")
        );

        let removed = store.cleanup(1).unwrap();
        assert_eq!(removed, vec![second.backup_id, first.backup_id.clone()]);
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(!store.dir().join(&first.backup_id).exists());
    }

    #[test]
    fn same_second_backups_get_distinct_ids() {
        let (_dir, store) = workspace();
        let a = store.create_at(None, at(0)).unwrap();
        let b = store.create_at(None, at(0)).unwrap();
        assert_ne!(a.backup_id, b.backup_id);
    }

    #[test]
    fn colliding_names_are_suffixed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), "").unwrap();
        assert_eq!(free_name(dir.path(), Path::new("x/b.yaml")), "b.yaml");
        assert_eq!(free_name(dir.path(), Path::new("y/a.yaml")), "a_1.yaml");
    }
}
