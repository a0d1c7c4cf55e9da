//! `fleetkey track-rotation`: rotation history, due checks, statistics.

use std::fmt::Write as _;
use std::io::IsTerminal;

use chrono::Utc;
use dialoguer::{Input, Select};

use fleetkey_core::{
    CredentialKind, DueStatus, Reporter, RotationEvent, RotationStats, RotationType,
    ValidationStatus, VaultCredentials, VerdictKind, validate,
};

use crate::cli::{GlobalOpts, MarkStatus, TrackCommand, TrackRotationArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

// ── Detail views ────────────────────────────────────────────────────

fn stats_detail(stats: &RotationStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total rotations:  {}", stats.total_rotations);
    let _ = writeln!(
        out,
        "Last rotation:    {}",
        stats
            .last_rotation
            .map_or_else(|| "Never".to_owned(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string())
    );
    if let Some(avg) = stats.average_interval_days {
        let _ = writeln!(out, "Average interval: {avg:.1} days");
    }
    if !stats.rotations_by_type.is_empty() {
        out.push_str("\nRotations by type:");
        for (kind, count) in &stats.rotations_by_type {
            let _ = write!(out, "\n  {kind}: {count}");
        }
    }
    out.trim_end().to_owned()
}

fn due_detail(due: &DueStatus) -> String {
    let mut out = format!("Rotation due: {}\nReason:       {}", due.due, due.reason);
    if let Some(days) = due.days_since_last {
        let _ = write!(out, "\nDays since last rotation: {days} (max {})", due.max_age_days);
    }
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: TrackRotationArgs,
    ctx: &Context,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let max_age = |flag: Option<i64>| flag.unwrap_or(ctx.config.security.max_age_days);

    match args.command {
        TrackCommand::Check { max_age_days } => {
            ctx.reporter.step("Rotation check");
            let history = ctx.history()?;
            let due = history.due(max_age(max_age_days), Utc::now());
            if due.due {
                ctx.reporter.warning(&format!("Rotation due: {}", due.reason));
            } else {
                ctx.reporter.success(&format!("No rotation due: {}", due.reason));
            }
            let validation = validate_vault(ctx).await;
            let stats = history.stats();
            ctx.reporter
                .info(&format!("Total rotations performed: {}", stats.total_rotations));
            if let Some(last) = stats.last_rotation {
                ctx.reporter.info(&format!("Last rotation: {}", last.format("%Y-%m-%d")));
            }
            validation
        }

        TrackCommand::Stats => {
            let stats = ctx.history()?.stats();
            let out = output::render_single(&global.output, &stats, stats_detail, |s| {
                s.total_rotations.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TrackCommand::Report => {
            let history = ctx.history()?;
            let path = &ctx.workspace.report_file;
            history.write_report(path, Utc::now())?;
            ctx.reporter.success(&format!(
                "Report written to {}",
                ctx.workspace.relative(path).display()
            ));
            Ok(())
        }

        TrackCommand::Validate => validate_vault(ctx).await,

        TrackCommand::Due { max_age_days } => {
            let due = ctx.history()?.due(max_age(max_age_days), Utc::now());
            let out = output::render_single(&global.output, &due, due_detail, |d| {
                d.due.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TrackCommand::Add {
            rotation_type,
            reason,
            credentials,
            method,
            notes,
        } => {
            let rotation_type = match rotation_type {
                Some(t) => t.into(),
                None => prompt_rotation_type()?,
            };
            let reason = match reason {
                Some(r) => r,
                None => prompt_text("Reason for rotation")?,
            };
            let credentials: Vec<CredentialKind> = if credentials.is_empty() {
                CredentialKind::ALL.to_vec()
            } else {
                credentials.into_iter().map(Into::into).collect()
            };
            let event = RotationEvent::new(rotation_type, reason, credentials, method.into())
                .with_notes(notes.unwrap_or_default());

            let mut history = ctx.history()?;
            history.append(event)?;
            ctx.reporter.success("Rotation entry added");
            Ok(())
        }

        TrackCommand::Mark { status, notes } => {
            let status = match status {
                MarkStatus::Passed => ValidationStatus::Passed,
                MarkStatus::Failed => ValidationStatus::Failed,
            };
            let mut history = ctx.history()?;
            history.update_validation_status(status, notes)?;
            ctx.reporter
                .success(&format!("Most recent rotation marked {status}"));
            Ok(())
        }
    }
}

/// Validate the credentials the vault holds now. Only exposure fails.
async fn validate_vault(ctx: &Context) -> Result<(), CliError> {
    let reporter = &ctx.reporter;
    let vault = ctx.vault();
    let layout = ctx.config.vault_layout();
    let creds = VaultCredentials::new(&*vault, &layout);
    let blocklist = ctx.config.blocklist();

    reporter.info("Validating current credentials");
    let mut exposed = 0;
    for kind in CredentialKind::ALL {
        let Some(value) = creds.credential(kind).await? else {
            reporter.warning(&format!("{}: not found in the vault", kind.label()));
            continue;
        };
        let verdict = validate(kind, &value, &blocklist);
        match verdict.kind {
            VerdictKind::Valid => reporter.success(&format!("{}: valid", kind.label())),
            VerdictKind::Exposed => {
                exposed += 1;
                reporter.error(&verdict.detail);
            }
            VerdictKind::WrongLength | VerdictKind::WrongFormat => {
                reporter.warning(&verdict.detail);
            }
        }
    }

    if exposed > 0 {
        reporter.error("Exposed credentials detected - immediate rotation required");
        return Err(CliError::Exposure {
            summary: format!("{exposed} vault credential(s) are known to be exposed"),
        });
    }
    Ok(())
}

fn require_terminal(flag: &str) -> Result<(), CliError> {
    if std::io::stdin().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Validation {
            field: flag.into(),
            reason: "required when not running interactively".into(),
        })
    }
}

fn prompt_rotation_type() -> Result<RotationType, CliError> {
    require_terminal("--type")?;
    let choices = [
        RotationType::Scheduled,
        RotationType::Emergency,
        RotationType::Manual,
    ];
    let labels: Vec<String> = choices.iter().map(ToString::to_string).collect();
    let index = Select::new()
        .with_prompt("Rotation type")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(choices.get(index).copied().unwrap_or(RotationType::Scheduled))
}

fn prompt_text(prompt: &str) -> Result<String, CliError> {
    require_terminal("--reason")?;
    Input::<String>::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}
