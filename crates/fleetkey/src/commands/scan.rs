//! `fleetkey scan`: exposure scan of files or the working tree.
//!
//! Exits non-zero on error-severity findings, so it can serve as the
//! credential-detection hook itself.

use std::path::PathBuf;

use tabled::Tabled;

use fleetkey_core::{CoreError, Finding, Reporter, ValidationPolicy};

use crate::cli::{GlobalOpts, ScanArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Line")]
    line: usize,
    #[tabled(rename = "Finding")]
    kind: String,
    #[tabled(rename = "Credential")]
    credential: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

pub fn handle(args: &ScanArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let ws = &ctx.workspace;
    let scanner = ctx.config.scanner();

    let report = if args.files.is_empty() {
        scanner
            .skip_file(ws.secrets_file.clone())
            .skip_file(ws.auth_bundle_file.clone())
            .skip_dir(ws.backup_dir.clone())
            .scan_tree(ctx.root(), ValidationPolicy::Strict)?
    } else {
        let files: Vec<PathBuf> = args.files.iter().map(|f| ws.resolve(f)).collect();
        scanner.scan_files(&files, ValidationPolicy::Strict)
    };

    let row = |f: &Finding| FindingRow {
        file: ws.relative(&f.path).display().to_string(),
        line: f.line,
        kind: f.kind.to_string(),
        credential: f.credential.to_string(),
        severity: f.severity.to_string(),
    };
    if !report.findings.is_empty() {
        let out = output::render_list(&global.output, &report.findings, row, |f| {
            format!("{}:{}", ws.relative(&f.path).display(), f.line)
        })?;
        output::print_output(&out, global.quiet);
    }

    let files_scanned = report.files_scanned;
    let report = report.into_result().map_err(|e| match e {
        CoreError::ExposureFound { count, .. } => CliError::Exposure {
            summary: format!("{count} finding(s) in {files_scanned} file(s)"),
        },
        other => other.into(),
    })?;
    ctx.reporter.success(&format!(
        "No exposed credentials in {files_scanned} file(s) ({} warning(s))",
        report.warnings().count()
    ));
    Ok(())
}
