// ── Deployment executor ──
//
// Builds and uploads one configuration file per call, and classifies what
// happened from the tool's exit status and output. Devices are processed
// strictly one at a time; one device failing never stops the loop.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use fleetkey_api::{FirmwareAction, FirmwareTool, ProcessOutput};
use serde::Serialize;
use tracing::{debug, info};

use crate::devices::{DeviceConfig, DeviceRegistry, has_fallback_hotspot};
use crate::reporter::Reporter;

const OFFLINE_MARKERS: &[&str] = &[
    "Error resolving IP address",
    "Network is unreachable",
    "No route to host",
    "Host is unreachable",
];
const AUTH_MARKERS: &[&str] = &["Authentication failed", "Invalid password"];

/// Classified result of one compile+upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeployOutcome {
    Success,
    /// The device could not be reached. Not an error.
    Offline,
    /// The device rejected the OTA password.
    AuthFailure { output: String },
    /// Anything else, including timeouts and build failures.
    OtherFailure { output: String },
}

impl DeployOutcome {
    /// Classify a finished upload. Offline markers win over auth markers.
    pub fn classify(output: &ProcessOutput) -> Self {
        if output.success() {
            return Self::Success;
        }
        let text = output.combined();
        if OFFLINE_MARKERS.iter().any(|m| text.contains(m)) {
            Self::Offline
        } else if AUTH_MARKERS.iter().any(|m| text.contains(m)) {
            Self::AuthFailure { output: text }
        } else {
            Self::OtherFailure { output: text }
        }
    }

    /// Classify the result of running the tool, where running itself may
    /// have failed or timed out.
    pub fn from_run(result: Result<ProcessOutput, fleetkey_api::Error>) -> Self {
        match result {
            Ok(output) => Self::classify(&output),
            Err(e) => Self::OtherFailure {
                output: e.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailure { .. })
    }
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Offline => f.write_str("offline"),
            Self::AuthFailure { .. } => f.write_str("authentication failure"),
            Self::OtherFailure { .. } => f.write_str("failure"),
        }
    }
}

/// Compiles and uploads a configuration file.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// `config` is relative to the working directory.
    async fn deploy(&self, config: &Path) -> DeployOutcome;
}

/// [`Deployer`] backed by the external firmware tool.
#[derive(Debug, Clone)]
pub struct FirmwareDeployer {
    tool: FirmwareTool,
}

impl FirmwareDeployer {
    pub fn new(tool: FirmwareTool) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> &FirmwareTool {
        &self.tool
    }
}

#[async_trait]
impl Deployer for FirmwareDeployer {
    async fn deploy(&self, config: &Path) -> DeployOutcome {
        // Compilation never talks to the device; any failure is a plain failure.
        match self.tool.run(FirmwareAction::Compile, config).await {
            Ok(out) if out.success() => {}
            Ok(out) => {
                return DeployOutcome::OtherFailure {
                    output: out.combined(),
                };
            }
            Err(e) => {
                return DeployOutcome::OtherFailure {
                    output: e.to_string(),
                };
            }
        }
        let outcome = DeployOutcome::from_run(self.tool.run(FirmwareAction::Upload, config).await);
        debug!(config = %config.display(), %outcome, "upload finished");
        outcome
    }
}

/// Which configuration variant a result refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Variant {
    Minimal,
    Full,
}

/// Per-device result of a deployment pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceResult {
    Deployed,
    /// Unreachable; skipped without error.
    Offline { variant: Variant },
    Failed {
        variant: Variant,
        outcome: DeployOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub device: String,
    #[serde(flatten)]
    pub result: DeviceResult,
}

impl DeviceReport {
    pub fn is_auth_failure(&self) -> bool {
        matches!(&self.result, DeviceResult::Failed { outcome, .. } if outcome.is_auth_failure())
    }
}

/// Results of deploying to every device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentSummary {
    pub reports: Vec<DeviceReport>,
}

impl DeploymentSummary {
    pub fn deployed(&self) -> impl Iterator<Item = &str> {
        self.names(|r| matches!(r, DeviceResult::Deployed))
    }

    pub fn offline(&self) -> impl Iterator<Item = &str> {
        self.names(|r| matches!(r, DeviceResult::Offline { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.names(|r| matches!(r, DeviceResult::Failed { .. }))
    }

    pub fn auth_failures(&self) -> impl Iterator<Item = &str> {
        self.reports
            .iter()
            .filter(|r| r.is_auth_failure())
            .map(|r| r.device.as_str())
    }

    /// Replace the report for a device (after a retry).
    pub fn replace(&mut self, report: DeviceReport) {
        match self.reports.iter_mut().find(|r| r.device == report.device) {
            Some(slot) => *slot = report,
            None => self.reports.push(report),
        }
    }

    fn names<F>(&self, pred: F) -> impl Iterator<Item = &str>
    where
        F: Fn(&DeviceResult) -> bool,
    {
        self.reports
            .iter()
            .filter(move |r| pred(&r.result))
            .map(|r| r.device.as_str())
    }
}

/// Which variants a pass deploys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployPlan {
    /// `minimal` first when present, then the full profile.
    MinimalThenFull,
    FullOnly,
}

/// Deploy one device according to `plan`.
///
/// A minimal profile without a fallback hotspot is refused. If the minimal
/// upload finds the device offline, the full upload is not attempted.
pub async fn deploy_device(
    deployer: &dyn Deployer,
    root: &Path,
    device: &DeviceConfig,
    plan: DeployPlan,
    reporter: &dyn Reporter,
) -> DeviceReport {
    let name = &device.name;
    let report = |result| DeviceReport {
        device: name.clone(),
        result,
    };

    if plan == DeployPlan::MinimalThenFull {
        if let Some(minimal) = device.minimal_config() {
            if let Err(reason) = check_minimal(root, minimal) {
                reporter.error(&format!("{name}: {reason}"));
                return report(DeviceResult::Failed {
                    variant: Variant::Minimal,
                    outcome: DeployOutcome::OtherFailure { output: reason },
                });
            }
            reporter.info(&format!("{name}: uploading minimal firmware ({})", minimal.display()));
            match deployer.deploy(minimal).await {
                DeployOutcome::Success => reporter.success(&format!("{name}: minimal firmware uploaded")),
                DeployOutcome::Offline => {
                    reporter.warning(&format!("{name}: device offline, skipping"));
                    return report(DeviceResult::Offline {
                        variant: Variant::Minimal,
                    });
                }
                outcome => {
                    reporter.error(&format!("{name}: minimal upload failed ({outcome})"));
                    return report(DeviceResult::Failed {
                        variant: Variant::Minimal,
                        outcome,
                    });
                }
            }
        }
    }

    let (variant, config) = match (device.full_config(), device.minimal_config()) {
        (Some(full), _) => (Variant::Full, full),
        // The minimal upload above was the whole job.
        (None, Some(_)) if plan == DeployPlan::MinimalThenFull => {
            return report(DeviceResult::Deployed);
        }
        // The minimal profile is the only firmware this device has.
        (None, Some(minimal)) => {
            if let Err(reason) = check_minimal(root, minimal) {
                reporter.error(&format!("{name}: {reason}"));
                return report(DeviceResult::Failed {
                    variant: Variant::Minimal,
                    outcome: DeployOutcome::OtherFailure { output: reason },
                });
            }
            (Variant::Minimal, minimal)
        }
        (None, None) => {
            reporter.error(&format!("{name}: no configuration to deploy"));
            return report(DeviceResult::Failed {
                variant: Variant::Full,
                outcome: DeployOutcome::OtherFailure {
                    output: "no configuration file".into(),
                },
            });
        }
    };
    reporter.info(&format!("{name}: uploading {variant} firmware ({})", config.display()));
    match deployer.deploy(config).await {
        DeployOutcome::Success => {
            reporter.success(&format!("{name}: {variant} firmware uploaded"));
            report(DeviceResult::Deployed)
        }
        DeployOutcome::Offline => {
            reporter.warning(&format!("{name}: device offline, skipping"));
            report(DeviceResult::Offline { variant })
        }
        outcome => {
            reporter.error(&format!("{name}: {variant} upload failed ({outcome})"));
            report(DeviceResult::Failed { variant, outcome })
        }
    }
}

fn check_minimal(root: &Path, minimal: &Path) -> Result<(), String> {
    match has_fallback_hotspot(&root.join(minimal)) {
        Ok(true) => Ok(()),
        Ok(false) => Err(format!(
            "{} has no wifi.ap fallback hotspot; refusing to flash it",
            minimal.display()
        )),
        Err(e) => Err(format!("cannot check {}: {e}", minimal.display())),
    }
}

/// Deploy every device in `registry`, one after another.
pub async fn deploy_fleet(
    deployer: &dyn Deployer,
    root: &Path,
    registry: &DeviceRegistry,
    plan: DeployPlan,
    reporter: &dyn Reporter,
) -> DeploymentSummary {
    let mut summary = DeploymentSummary::default();
    for device in registry.iter() {
        let report = deploy_device(deployer, root, device, plan, reporter).await;
        summary.reports.push(report);
    }
    info!(
        deployed = summary.deployed().count(),
        offline = summary.offline().count(),
        failed = summary.failed().count(),
        "deployment pass finished"
    );
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::reporter::{RecordingReporter, ReportLevel};

    /// Returns scripted outcomes per config file name; records every call.
    #[derive(Default)]
    pub(crate) struct ScriptedDeployer {
        outcomes: Mutex<BTreeMap<String, Vec<DeployOutcome>>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl ScriptedDeployer {
        pub(crate) fn on(self, config: &str, outcome: DeployOutcome) -> Self {
            self.outcomes
                .lock()
                .unwrap()
                .entry(config.to_owned())
                .or_default()
                .push(outcome);
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Deployer for ScriptedDeployer {
        async fn deploy(&self, config: &Path) -> DeployOutcome {
            let key = config.to_string_lossy().into_owned();
            self.calls.lock().unwrap().push(key.clone());
            let mut outcomes = self.outcomes.lock().unwrap();
            match outcomes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.remove(0),
                Some(queue) => queue.first().cloned().unwrap_or(DeployOutcome::Success),
                None => DeployOutcome::Success,
            }
        }
    }

    fn output(status: i32, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub(crate) const MINIMAL_WITH_AP: &str =
        "wifi:\n  ssid: !secret wifi_ssid\n  ap:\n    password: !secret fallback_password\n";

    fn fleet(dir: &Path, names: &[&str]) -> DeviceRegistry {
        for name in names {
            fs::write(dir.join(format!("{name}-minimal.yaml")), MINIMAL_WITH_AP).unwrap();
            fs::write(dir.join(format!("{name}.yaml")), "esphome:\n").unwrap();
        }
        DeviceRegistry::discover(dir, &crate::devices::DeviceFilter::default()).unwrap()
    }

    #[test]
    fn classification() {
        assert_eq!(DeployOutcome::classify(&output(0, "")), DeployOutcome::Success);
        assert_eq!(
            DeployOutcome::classify(&output(1, "ERROR Error resolving IP address of porch.local")),
            DeployOutcome::Offline
        );
        assert_eq!(
            DeployOutcome::classify(&output(1, "connect: Network is unreachable")),
            DeployOutcome::Offline
        );
        assert!(DeployOutcome::classify(&output(1, "ERROR Authentication failed")).is_auth_failure());
        assert!(matches!(
            DeployOutcome::classify(&output(2, "compile error")),
            DeployOutcome::OtherFailure { .. }
        ));
    }

    #[test]
    fn timeout_is_other_failure_not_offline() {
        let outcome = DeployOutcome::from_run(Err(fleetkey_api::Error::Timeout {
            program: "esphome".into(),
            timeout_secs: 300,
        }));
        assert!(matches!(outcome, DeployOutcome::OtherFailure { ref output } if output.contains("timed out")));
    }

    #[tokio::test]
    async fn minimal_goes_before_full() {
        let dir = TempDir::new().unwrap();
        let registry = fleet(dir.path(), &["porch"]);
        let deployer = ScriptedDeployer::default();

        let summary = deploy_fleet(
            &deployer,
            dir.path(),
            &registry,
            DeployPlan::MinimalThenFull,
            &RecordingReporter::new(),
        )
        .await;

        assert_eq!(deployer.calls(), vec!["porch-minimal.yaml", "porch.yaml"]);
        assert_eq!(summary.deployed().collect::<Vec<_>>(), vec!["porch"]);
    }

    #[tokio::test]
    async fn offline_device_is_skipped_and_loop_continues() {
        let dir = TempDir::new().unwrap();
        let registry = fleet(dir.path(), &["attic", "porch"]);
        let deployer = ScriptedDeployer::default().on("attic-minimal.yaml", DeployOutcome::Offline);
        let reporter = RecordingReporter::new();

        let summary = deploy_fleet(
            &deployer,
            dir.path(),
            &registry,
            DeployPlan::MinimalThenFull,
            &reporter,
        )
        .await;

        assert_eq!(summary.offline().collect::<Vec<_>>(), vec!["attic"]);
        assert_eq!(summary.deployed().collect::<Vec<_>>(), vec!["porch"]);
        assert_eq!(summary.failed().count(), 0);
        assert_eq!(
            deployer.calls(),
            vec!["attic-minimal.yaml", "porch-minimal.yaml", "porch.yaml"]
        );
        assert!(reporter.contains(ReportLevel::Warning, "attic: device offline"));
    }

    #[tokio::test]
    async fn failure_on_one_device_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let registry = fleet(dir.path(), &["attic", "porch"]);
        let deployer = ScriptedDeployer::default().on(
            "attic.yaml",
            DeployOutcome::AuthFailure {
                output: "Invalid password".into(),
            },
        );

        let summary = deploy_fleet(
            &deployer,
            dir.path(),
            &registry,
            DeployPlan::MinimalThenFull,
            &RecordingReporter::new(),
        )
        .await;

        assert_eq!(summary.auth_failures().collect::<Vec<_>>(), vec!["attic"]);
        assert_eq!(summary.deployed().collect::<Vec<_>>(), vec!["porch"]);
    }

    #[tokio::test]
    async fn minimal_without_hotspot_is_never_flashed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("porch-minimal.yaml"), "wifi:\n  ssid: x\n").unwrap();
        fs::write(dir.path().join("porch.yaml"), "esphome:\n").unwrap();
        let registry =
            DeviceRegistry::discover(dir.path(), &crate::devices::DeviceFilter::default()).unwrap();
        let deployer = ScriptedDeployer::default();

        let summary = deploy_fleet(
            &deployer,
            dir.path(),
            &registry,
            DeployPlan::MinimalThenFull,
            &RecordingReporter::new(),
        )
        .await;

        assert!(deployer.calls().is_empty());
        assert_eq!(summary.failed().collect::<Vec<_>>(), vec!["porch"]);
    }

    #[tokio::test]
    async fn full_only_plan_skips_minimal() {
        let dir = TempDir::new().unwrap();
        let registry = fleet(dir.path(), &["porch"]);
        let deployer = ScriptedDeployer::default();

        deploy_fleet(
            &deployer,
            dir.path(),
            &registry,
            DeployPlan::FullOnly,
            &RecordingReporter::new(),
        )
        .await;

        assert_eq!(deployer.calls(), vec!["porch.yaml"]);
    }

    #[tokio::test]
    async fn full_only_plan_flashes_minimal_only_device() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cellar-minimal.yaml"), MINIMAL_WITH_AP).unwrap();
        let registry =
            DeviceRegistry::discover(dir.path(), &crate::devices::DeviceFilter::default()).unwrap();
        let deployer = ScriptedDeployer::default().on(
            "cellar-minimal.yaml",
            DeployOutcome::OtherFailure {
                output: "upload error".into(),
            },
        );

        let summary = deploy_fleet(
            &deployer,
            dir.path(),
            &registry,
            DeployPlan::FullOnly,
            &RecordingReporter::new(),
        )
        .await;

        assert_eq!(deployer.calls(), vec!["cellar-minimal.yaml"]);
        assert_eq!(summary.failed().collect::<Vec<_>>(), vec!["cellar"]);
        assert_eq!(summary.deployed().count(), 0);
    }

    #[test]
    fn summary_replace_updates_existing_entry() {
        let mut summary = DeploymentSummary {
            reports: vec![DeviceReport {
                device: "porch".into(),
                result: DeviceResult::Failed {
                    variant: Variant::Full,
                    outcome: DeployOutcome::AuthFailure { output: String::new() },
                },
            }],
        };
        summary.replace(DeviceReport {
            device: "porch".into(),
            result: DeviceResult::Deployed,
        });
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.deployed().count(), 1);
    }
}
