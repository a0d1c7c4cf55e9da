//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError`, `ConfigError` and `RotationFailure` into categorized
//! user-facing errors carrying the command that fixes them.

use miette::Diagnostic;
use thiserror::Error;

use fleetkey_config::ConfigError;
use fleetkey_core::{CoreError, RotationFailure, RotationState};

/// Process exit codes. Clap keeps its own status 2 for usage errors.
pub mod exit_code {
    pub const FAILURE: i32 = 1;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Credentials ──────────────────────────────────────────────────
    #[error("{label} failed validation: {detail}")]
    #[diagnostic(code(fleetkey::invalid_credential))]
    InvalidCredential {
        label: String,
        detail: String,
        #[help]
        remediation: Option<String>,
    },

    #[error("{count} problem(s) found")]
    #[diagnostic(
        code(fleetkey::validation_failed),
        help(
            "Regenerate malformed values with: fleetkey generate <kind>\n\
             Rotate exposed values with: fleetkey rotate --type emergency"
        )
    )]
    ChecksFailed { count: usize },

    #[error("Exposed credentials found: {summary}")]
    #[diagnostic(
        code(fleetkey::exposure),
        help(
            "Remove the values from the listed files, then rotate:\n\
             fleetkey rotate --type emergency --reason exposure"
        )
    )]
    Exposure { summary: String },

    #[error("Credential detection hook missed: {missed}")]
    #[diagnostic(
        code(fleetkey::hook),
        help("Update the hook's known-credential patterns so it flags every listed fixture.")
    )]
    HookSelfTest { missed: String },

    // ── Secrets file ─────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(fleetkey::secrets_file),
        help(
            "Regenerate the secrets file from the vault with a rotation,\n\
             or restore one with: fleetkey backup list && fleetkey backup restore <id>"
        )
    )]
    SecretsFile { message: String },

    // ── Vault ────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(fleetkey::vault),
        help(
            "Check that the vault is reachable and unlocked.\n\
             For 1Password: op signin (set OP_ACCOUNT or vault.account to pick the account)"
        )
    )]
    Vault { message: String },

    // ── Environment ──────────────────────────────────────────────────
    #[error("Prerequisites not met: {missing}")]
    #[diagnostic(
        code(fleetkey::prerequisites),
        help("Install the missing tools, sign in to the vault, and check paths.hook in fleetkey.toml.")
    )]
    Prerequisites { missing: String },

    #[error("External tool failed: {message}")]
    #[diagnostic(code(fleetkey::tool))]
    Tool { message: String },

    #[error("{program} timed out after {seconds}s")]
    #[diagnostic(
        code(fleetkey::timeout),
        help("Raise firmware.timeout_secs or vault.timeout_secs in fleetkey.toml.")
    )]
    Timeout { program: String, seconds: u64 },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(fleetkey::not_found),
        help("Run: fleetkey {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("No rotation history recorded")]
    #[diagnostic(
        code(fleetkey::no_history),
        help("Record one with: fleetkey track-rotation add")
    )]
    NoHistory,

    // ── Deployment ───────────────────────────────────────────────────
    #[error("Deployment failed for: {devices}")]
    #[diagnostic(
        code(fleetkey::deployment_failed),
        help("Retry a single device with: fleetkey deploy <device>")
    )]
    DeploymentFailed { devices: String },

    #[error("Backup {id} could not be restored: {reason}")]
    #[diagnostic(code(fleetkey::restore_failed))]
    RestoreFailed { id: String, reason: String },

    // ── Rotation ─────────────────────────────────────────────────────
    #[error("Rotation failed during {failed_step} (last completed: {last_completed})")]
    #[diagnostic(code(fleetkey::rotation_failed))]
    Rotation {
        failed_step: String,
        last_completed: String,
        #[source]
        source: Box<CliError>,
        #[help]
        recovery: Option<String>,
    },

    #[error("Rotation interrupted")]
    #[diagnostic(code(fleetkey::interrupted))]
    Interrupted,

    // ── Validation / configuration ───────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetkey::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(fleetkey::config),
        help("Inspect the effective configuration with: fleetkey config show")
    )]
    Config(#[from] ConfigError),

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(fleetkey::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / data ────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(fleetkey::io))]
    Data { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Exit code for process termination: every failure is 1.
    #[allow(clippy::unused_self)]
    pub fn exit_code(&self) -> i32 {
        exit_code::FAILURE
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidCredential { kind, detail, .. } => CliError::InvalidCredential {
                label: kind.label().into(),
                detail,
                remediation: Some(format!(
                    "Generate a valid value with: fleetkey generate {}\n(or: {})",
                    kind.command_name(),
                    kind.openssl_equivalent()
                )),
            },

            CoreError::ValidationFailed { count } => CliError::ChecksFailed { count },

            CoreError::ExposureFound { summary, .. } => CliError::Exposure { summary },

            CoreError::HookSelfTestFailed { missed } => CliError::HookSelfTest {
                missed: missed.join(", "),
            },

            e @ (CoreError::SecretsFileMissing { .. } | CoreError::SecretsFieldMissing { .. }) => {
                CliError::SecretsFile {
                    message: e.to_string(),
                }
            }

            e @ (CoreError::VaultUnavailable { .. }
            | CoreError::VaultFieldMissing { .. }
            | CoreError::VaultMismatch { .. }
            | CoreError::Vault { .. }) => CliError::Vault {
                message: e.to_string(),
            },

            CoreError::Prerequisites { missing } => CliError::Prerequisites {
                missing: missing.join(", "),
            },

            CoreError::ExternalTool { message } => CliError::Tool { message },

            CoreError::Timeout {
                program,
                timeout_secs,
            } => CliError::Timeout {
                program,
                seconds: timeout_secs,
            },

            CoreError::DeviceNotFound { name } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: name,
                list_command: "devices".into(),
            },

            CoreError::BackupNotFound { id } => CliError::NotFound {
                resource_type: "backup".into(),
                identifier: id,
                list_command: "backup list".into(),
            },

            CoreError::DeploymentFailed { devices } => CliError::DeploymentFailed {
                devices: devices.join(", "),
            },

            CoreError::RestoreFailed { id, reason } => CliError::RestoreFailed { id, reason },

            CoreError::NoHistory => CliError::NoHistory,

            CoreError::Interrupted => CliError::Interrupted,

            e @ (CoreError::Io { .. } | CoreError::Data { .. }) => CliError::Data {
                message: e.to_string(),
            },
        }
    }
}

impl From<RotationFailure> for CliError {
    fn from(failure: RotationFailure) -> Self {
        let recovery = if failure.last_completed >= RotationState::Stage1Deployed {
            Some(
                "Stage 1 completed; finish with: fleetkey rotate --resume\n\
                 The vault already holds the new credentials."
                    .to_owned(),
            )
        } else if failure.last_completed >= RotationState::VaultUpdated {
            Some(
                "The vault holds new credentials but no device was flashed yet.\n\
                 Start over with: fleetkey rotate"
                    .to_owned(),
            )
        } else {
            None
        };
        CliError::Rotation {
            failed_step: failure.failed_step.title().to_owned(),
            last_completed: failure.last_completed.to_string(),
            source: Box::new(failure.error.into()),
            recovery,
        }
    }
}

#[cfg(test)]
mod tests {
    use fleetkey_core::CredentialKind;

    use super::*;

    #[test]
    fn format_errors_carry_the_regeneration_command() {
        let err: CliError = CoreError::InvalidCredential {
            kind: CredentialKind::OtaPassword,
            verdict: fleetkey_core::VerdictKind::WrongLength,
            detail: "must be exactly 32 hexadecimal characters".into(),
        }
        .into();
        let CliError::InvalidCredential { remediation, .. } = err else {
            panic!("unexpected mapping");
        };
        assert!(remediation.is_some_and(|r| r.contains("fleetkey generate ota-password")));
    }

    #[test]
    fn failures_after_stage1_point_at_resume() {
        let err: CliError = RotationFailure {
            last_completed: RotationState::Stage1Deployed,
            failed_step: RotationState::Stage2Deployed,
            error: CoreError::Interrupted,
        }
        .into();
        let CliError::Rotation { recovery, .. } = &err else {
            panic!("unexpected mapping");
        };
        assert!(recovery.as_deref().is_some_and(|r| r.contains("--resume")));
        assert_eq!(err.exit_code(), exit_code::FAILURE);
    }

    #[test]
    fn early_failures_have_no_recovery_hint() {
        let err: CliError = RotationFailure {
            last_completed: RotationState::Idle,
            failed_step: RotationState::PrerequisitesChecked,
            error: CoreError::Prerequisites {
                missing: vec!["tool `esphome`".into()],
            },
        }
        .into();
        assert!(matches!(err, CliError::Rotation { recovery: None, .. }));
    }
}
