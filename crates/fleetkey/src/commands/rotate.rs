//! `fleetkey rotate`: run (or resume) a two-stage rotation.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;

use fleetkey_core::{
    Collaborators, DeploymentSummary, Reporter, RotationRequest, RotationSummary, Rotator,
};

use crate::cli::{GlobalOpts, RotateArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::util;

fn request(args: RotateArgs) -> RotationRequest {
    let request = RotationRequest::new(args.rotation_type.into(), args.reason);
    match args.notes {
        Some(notes) => request.with_notes(notes),
        None => request,
    }
}

fn pass_line(name: &str, pass: &DeploymentSummary) -> String {
    format!(
        "{name:<9}{} deployed, {} offline, {} failed",
        pass.deployed().count(),
        pass.offline().count(),
        pass.failed().count()
    )
}

fn detail(summary: &RotationSummary) -> String {
    let mut out = String::new();
    if let Some(ref id) = summary.backup_id {
        let _ = writeln!(out, "Backup:  {id}");
    }
    if let Some(ref stage1) = summary.stage1 {
        let _ = writeln!(out, "{}", pass_line("Stage 1:", stage1));
    }
    let _ = writeln!(out, "{}", pass_line("Stage 2:", &summary.stage2));
    let _ = writeln!(
        out,
        "Alive:   {}",
        if summary.alive.is_empty() {
            "-".to_owned()
        } else {
            summary.alive.join(", ")
        }
    );
    if !summary.unreachable.is_empty() {
        let _ = writeln!(out, "Unreachable: {}", summary.unreachable.join(", "));
    }
    let _ = write!(out, "Final scan findings: {}", summary.final_scan_findings);
    out
}

/// Drive `work` until it finishes or `interrupt` fires. On `None`, `work`
/// has already been dropped.
async fn unless_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future,
) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        _ = interrupt => None,
    }
}

pub async fn handle(args: RotateArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let resume = args.resume;
    if !resume
        && !util::confirm(
            "Rotate the API key, OTA password and fallback password on every device?",
            "rotate",
            global.yes,
        )?
    {
        ctx.reporter.info("Rotation cancelled");
        return Ok(());
    }
    let request = request(args);

    let rotator = Rotator::new(
        ctx.workspace.clone(),
        ctx.config.vault_layout(),
        ctx.config.rotation_settings(),
        ctx.config.scanner(),
        Collaborators {
            vault: ctx.vault(),
            deployer: Arc::new(ctx.deployer()?),
            probe: Arc::new(ctx.probe()),
            hook: Arc::new(ctx.hook()),
            reporter: Arc::new(ctx.reporter),
        },
    );

    let rotation = async {
        if resume {
            rotator.resume(&request).await
        } else {
            rotator.run(&request).await
        }
    };
    // Dropping the rotation future restores the secrets file.
    let Some(result) = unless_interrupted(rotation, tokio::signal::ctrl_c()).await else {
        ctx.reporter.error("Interrupted; the active secrets file was restored");
        return Err(rotator.interrupted().into());
    };
    let summary = result?;

    let out = output::render_single(&global.output, &summary, detail, |s| {
        s.stage2.deployed().collect::<Vec<_>>().join("\n")
    })?;
    output::print_output(&out, global.quiet);

    let failed = summary.failed_devices();
    if failed.is_empty() {
        ctx.reporter.success("Credential rotation completed");
        Ok(())
    } else {
        Err(CliError::DeploymentFailed {
            devices: failed.join(", "),
        })
    }
}
