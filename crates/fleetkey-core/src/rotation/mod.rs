//! Two-stage credential rotation.
//!
//! A rotation walks a fixed sequence of states. Each step starts only if
//! its predecessor completed; the first error halts the run and is
//! reported together with the last state reached.
//!
//! ```text
//! Idle → PrerequisitesChecked → CredentialsGenerated → VaultUpdated
//!      → Stage1Deployed → Stage2Deployed → Verified → Documented
//! ```
//!
//! Between stage 1 and stage 2 the fleet is deliberately inconsistent:
//! devices flashed in stage 1 carry the new API key and fallback password
//! but still authenticate with the previous OTA password, while the local
//! secrets file has been restored to its pre-rotation content. Re-running
//! from stage 2 ([`Rotator::resume`]) is the recovery path.

mod rotator;

use std::fmt;

use serde::Serialize;

use crate::deploy::DeploymentSummary;
use crate::error::CoreError;
use crate::history::{RotationMethod, RotationType};

pub use rotator::{Collaborators, Rotator};

/// Label of the backup taken before stage 1.
pub const PRE_ROTATION_LABEL: &str = "pre-rotation";

// ── RotationState ────────────────────────────────────────────────

/// Progress of a rotation, observable through [`Rotator::state`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RotationState {
    Idle,
    PrerequisitesChecked,
    CredentialsGenerated,
    VaultUpdated,
    Stage1Deployed,
    Stage2Deployed,
    Verified,
    Documented,
    Failed,
}

impl RotationState {
    /// The step that follows this one in a full run.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::PrerequisitesChecked,
            Self::PrerequisitesChecked => Self::CredentialsGenerated,
            Self::CredentialsGenerated => Self::VaultUpdated,
            Self::VaultUpdated => Self::Stage1Deployed,
            Self::Stage1Deployed => Self::Stage2Deployed,
            Self::Stage2Deployed => Self::Verified,
            Self::Verified | Self::Documented => Self::Documented,
            Self::Failed => Self::Failed,
        }
    }

    /// Operator-facing step title.
    pub fn title(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PrerequisitesChecked => "Checking prerequisites",
            Self::CredentialsGenerated => "Generating new credentials",
            Self::VaultUpdated => "Updating secret vault",
            Self::Stage1Deployed => "Stage 1: deploying with previous OTA password",
            Self::Stage2Deployed => "Stage 2: deploying with new credentials",
            Self::Verified => "Verifying rotation",
            Self::Documented => "Recording rotation",
            Self::Failed => "Failed",
        }
    }
}

// ── Request / outcome ────────────────────────────────────────────

/// What the operator asked for.
#[derive(Debug, Clone)]
pub struct RotationRequest {
    pub rotation_type: RotationType,
    pub reason: String,
    pub notes: Option<String>,
    pub method: RotationMethod,
}

impl RotationRequest {
    pub fn new(rotation_type: RotationType, reason: impl Into<String>) -> Self {
        Self {
            rotation_type,
            reason: reason.into(),
            notes: None,
            method: RotationMethod::Automated,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Result of a completed rotation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RotationSummary {
    pub backup_id: Option<String>,
    pub stage1: Option<DeploymentSummary>,
    pub stage2: DeploymentSummary,
    /// Devices answering the liveness probe after stage 2.
    pub alive: Vec<String>,
    pub unreachable: Vec<String>,
    /// Findings of the final, non-fatal exposure scan.
    pub final_scan_findings: usize,
}

impl RotationSummary {
    /// Devices stage 2 could not bring onto the new credentials.
    pub fn failed_devices(&self) -> Vec<String> {
        self.stage2.failed().map(str::to_owned).collect()
    }
}

/// A rotation that stopped.
#[derive(Debug)]
pub struct RotationFailure {
    /// Last state that completed successfully.
    pub last_completed: RotationState,
    /// Step that was running when the error occurred.
    pub failed_step: RotationState,
    pub error: CoreError,
}

impl fmt::Display for RotationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rotation failed during {} (last completed: {}): {}",
            self.failed_step, self.last_completed, self.error
        )
    }
}

impl std::error::Error for RotationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
