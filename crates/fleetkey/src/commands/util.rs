//! Shared helpers for command handlers.

use std::io::IsTerminal;

use fleetkey_core::{CredentialKind, RotationMethod, RotationType};

use crate::cli::{CredentialArg, MethodArg, RotationTypeArg};
use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal to ask on, the operation is refused.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

impl From<CredentialArg> for CredentialKind {
    fn from(arg: CredentialArg) -> Self {
        match arg {
            CredentialArg::ApiKey => Self::ApiKey,
            CredentialArg::OtaPassword => Self::OtaPassword,
            CredentialArg::FallbackPassword => Self::FallbackPassword,
        }
    }
}

impl From<RotationTypeArg> for RotationType {
    fn from(arg: RotationTypeArg) -> Self {
        match arg {
            RotationTypeArg::Scheduled => Self::Scheduled,
            RotationTypeArg::Emergency => Self::Emergency,
            RotationTypeArg::Manual => Self::Manual,
        }
    }
}

impl From<MethodArg> for RotationMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Manual => Self::Manual,
            MethodArg::Automated => Self::Automated,
        }
    }
}
