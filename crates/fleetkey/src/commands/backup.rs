//! Backup command handlers.

use std::fmt::Write as _;

use tabled::Tabled;

use fleetkey_core::{BackupManifest, Reporter};

use crate::cli::{BackupArgs, BackupCommand, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "By")]
    created_by: String,
}

impl From<&BackupManifest> for BackupRow {
    fn from(m: &BackupManifest) -> Self {
        Self {
            id: m.backup_id.clone(),
            created: m.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            label: m.label.clone().unwrap_or_default(),
            files: m.total_files,
            created_by: m.created_by.clone(),
        }
    }
}

fn detail(m: &BackupManifest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ID:       {}", m.backup_id);
    let _ = writeln!(out, "Created:  {}", m.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "By:       {}", m.created_by);
    let _ = write!(out, "Files:    {}", m.total_files);
    for file in &m.files {
        let _ = write!(out, "\n  {} ({})", file.path.display(), file.kind);
    }
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: BackupArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let store = ctx.backups();
    let reporter = &ctx.reporter;

    match args.command {
        BackupCommand::Create { label } => {
            let manifest = store.create(label.as_deref())?;
            reporter.success(&format!(
                "Backup {} created with {} file(s)",
                manifest.backup_id, manifest.total_files
            ));
            let out = output::render_single(&global.output, &manifest, detail, |m| {
                m.backup_id.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        BackupCommand::List => {
            let manifests = store.list()?;
            if manifests.is_empty() {
                reporter.info("No backups found");
            }
            let out = output::render_list(
                &global.output,
                &manifests,
                |m| BackupRow::from(m),
                |m| m.backup_id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        BackupCommand::Verify { id } => {
            let report = store.verify(&id)?;
            for path in &report.mismatched {
                reporter.error(&format!("Hash mismatch: {}", path.display()));
            }
            for path in &report.missing {
                reporter.error(&format!("Missing from backup: {}", path.display()));
            }
            if report.is_ok() {
                reporter.success(&format!("Backup {id} verified ({} file(s))", report.verified));
                Ok(())
            } else {
                Err(CliError::ChecksFailed {
                    count: report.mismatched.len() + report.missing.len(),
                })
            }
        }

        BackupCommand::Restore { id, force } => {
            if force
                && !util::confirm(
                    &format!("Overwrite existing files with the contents of backup {id}?"),
                    "backup restore --force",
                    global.yes,
                )?
            {
                reporter.info("Restore cancelled");
                return Ok(());
            }
            let report = store.restore(&id, force)?;
            for path in &report.restored {
                reporter.success(&format!("Restored {}", path.display()));
            }
            for path in &report.skipped {
                reporter.warning(&format!("Skipped existing {} (use --force)", path.display()));
            }
            for (path, reason) in &report.failed {
                reporter.error(&format!("Could not restore {}: {reason}", path.display()));
            }
            reporter.info(&format!(
                "{} restored, {} skipped, {} failed",
                report.restored.len(),
                report.skipped.len(),
                report.failed.len()
            ));
            Ok(())
        }

        BackupCommand::Cleanup { keep } => {
            let keep = keep.unwrap_or(ctx.config.backup.keep);
            let removed = store.cleanup(keep)?;
            for id in &removed {
                reporter.info(&format!("Removed {id}"));
            }
            reporter.success(&format!(
                "Removed {} backup(s), kept the newest {keep}",
                removed.len()
            ));
            Ok(())
        }
    }
}
