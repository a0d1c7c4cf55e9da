// ── Core error types ──
//
// Domain errors from fleetkey-core. Consumers never see raw process exit
// codes or spawn failures; the `From<fleetkey_api::Error>` impl translates
// adapter errors into the categories an operator acts on.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::credential::{CredentialKind, VerdictKind};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Credential errors ────────────────────────────────────────────
    #[error("{} failed validation: {detail}", kind.label())]
    InvalidCredential {
        kind: CredentialKind,
        verdict: VerdictKind,
        detail: String,
    },

    #[error("{count} credential problem(s) found")]
    ValidationFailed { count: usize },

    #[error("Exposed credentials found: {summary}")]
    ExposureFound { count: usize, summary: String },

    #[error("Credential detection hook missed: {}", missed.join(", "))]
    HookSelfTestFailed { missed: Vec<String> },

    // ── Secrets file errors ──────────────────────────────────────────
    #[error("Secrets file not found: {}", path.display())]
    SecretsFileMissing { path: PathBuf },

    #[error("{field} missing from secrets file {}", path.display())]
    SecretsFieldMissing { path: PathBuf, field: String },

    // ── Vault errors ─────────────────────────────────────────────────
    #[error("Secret vault not available ({backend})")]
    VaultUnavailable { backend: String },

    #[error("Vault field not found: {vault}/{item}/{field}")]
    VaultFieldMissing {
        vault: String,
        item: String,
        field: String,
    },

    #[error("Vault read-back mismatch for {field}")]
    VaultMismatch { field: String },

    #[error("Vault error: {message}")]
    Vault { message: String },

    // ── Environment errors ───────────────────────────────────────────
    #[error("Prerequisites not met: {}", missing.join(", "))]
    Prerequisites { missing: Vec<String> },

    #[error("External tool failed: {message}")]
    ExternalTool { message: String },

    #[error("{program} timed out after {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device not found: {name}")]
    DeviceNotFound { name: String },

    #[error("Deployment failed for: {}", devices.join(", "))]
    DeploymentFailed { devices: Vec<String> },

    // ── Backup errors ────────────────────────────────────────────────
    #[error("Backup not found: {id}")]
    BackupNotFound { id: String },

    #[error("Backup {id} could not be restored: {reason}")]
    RestoreFailed { id: String, reason: String },

    // ── History errors ───────────────────────────────────────────────
    #[error("No rotation history recorded")]
    NoHistory,

    // ── Rotation control ─────────────────────────────────────────────
    #[error("Rotation interrupted")]
    Interrupted,

    // ── IO / data errors ─────────────────────────────────────────────
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid data in {}: {message}", path.display())]
    Data { path: PathBuf, message: String },
}

impl CoreError {
    /// Adapter for `map_err` on filesystem calls.
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| Self::Io { path, source }
    }

    pub fn data(path: impl AsRef<Path>, message: impl ToString) -> Self {
        Self::Data {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }
}

// ── Conversion from adapter errors ───────────────────────────────────

impl From<fleetkey_api::Error> for CoreError {
    fn from(err: fleetkey_api::Error) -> Self {
        match err {
            fleetkey_api::Error::Timeout {
                program,
                timeout_secs,
            } => CoreError::Timeout {
                program,
                timeout_secs,
            },
            fleetkey_api::Error::Vault { message } => CoreError::Vault { message },
            fleetkey_api::Error::Keyring(e) => CoreError::Vault {
                message: e.to_string(),
            },
            fleetkey_api::Error::CommandFailed {
                program,
                status,
                stderr,
            } => CoreError::ExternalTool {
                message: format!("{program} exited with {status}: {stderr}"),
            },
            other => CoreError::ExternalTool {
                message: other.to_string(),
            },
        }
    }
}
