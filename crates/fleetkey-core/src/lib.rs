// fleetkey-core: credential lifecycle and two-stage rotation between
// fleetkey-api (external tools) and the CLI.

pub mod backup;
pub mod config;
pub mod credential;
pub mod deploy;
pub mod devices;
pub mod error;
pub mod history;
pub mod hook_check;
pub mod reporter;
pub mod rotation;
pub mod scan;
pub mod secrets;
pub mod vault;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backup::{BackupManifest, BackupStore, FileKind, FileRecord, RestoreReport, VerifyReport};
pub use config::{RotationSettings, VaultLayout, Workspace};
pub use credential::{
    Blocklist, CredentialKind, CredentialSet, Severity, ValidationPolicy, Verdict, VerdictKind,
    validate, validate_wifi,
};
pub use deploy::{
    DeployOutcome, DeployPlan, Deployer, DeploymentSummary, DeviceReport, DeviceResult,
    FirmwareDeployer, Variant, deploy_device, deploy_fleet,
};
pub use devices::{DeviceConfig, DeviceFilter, DeviceRegistry, has_fallback_hotspot};
pub use error::CoreError;
pub use history::{
    DueStatus, RotationEvent, RotationHistory, RotationMethod, RotationStats, RotationType,
    ValidationStatus,
};
pub use hook_check::self_test_hook;
pub use reporter::{NullReporter, RecordingReporter, ReportLevel, Reporter};
pub use rotation::{
    Collaborators, PRE_ROTATION_LABEL, RotationFailure, RotationRequest, RotationState,
    RotationSummary, Rotator,
};
pub use scan::{ExposureScanner, Finding, FindingKind, FindingSeverity, ScanReport};
pub use secrets::{ActiveSecretsFile, SecretsBundle, SecretsGuard, WifiCredentials};
pub use vault::VaultCredentials;
