use std::fs;
use std::sync::Arc;

use fleetkey_api::{CredentialHook, LivenessProbe, SecretVault, tool_available};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{
    PRE_ROTATION_LABEL, RotationFailure, RotationRequest, RotationState, RotationSummary,
};
use crate::backup::BackupStore;
use crate::config::{RotationSettings, VaultLayout, Workspace};
use crate::credential::{CredentialKind, CredentialSet, Severity, ValidationPolicy};
use crate::deploy::{DeployPlan, Deployer, DeploymentSummary, deploy_device, deploy_fleet};
use crate::devices::DeviceRegistry;
use crate::error::CoreError;
use crate::history::{RotationEvent, RotationHistory, ValidationStatus};
use crate::hook_check::self_test_hook;
use crate::reporter::Reporter;
use crate::scan::ExposureScanner;
use crate::secrets::{ActiveSecretsFile, OLD_OTA_PASSWORD, SecretsBundle};
use crate::vault::VaultCredentials;

/// External systems a rotation drives.
pub struct Collaborators {
    pub vault: Arc<dyn SecretVault>,
    pub deployer: Arc<dyn Deployer>,
    pub probe: Arc<dyn LivenessProbe>,
    pub hook: Arc<dyn CredentialHook>,
    pub reporter: Arc<dyn Reporter>,
}

// ── Rotator ──────────────────────────────────────────────────────

/// Drives a rotation through its states.
///
/// Cheaply cloneable; clones share the published state, so a caller that
/// abandons a running rotation (Ctrl-C) can still tell where it stopped.
/// Only one rotation may run against a working tree at a time.
#[derive(Clone)]
pub struct Rotator {
    inner: Arc<RotatorInner>,
}

struct RotatorInner {
    workspace: Workspace,
    layout: VaultLayout,
    settings: RotationSettings,
    scanner: ExposureScanner,
    deps: Collaborators,
    state: watch::Sender<RotationState>,
}

impl Rotator {
    /// `scanner` carries the blocklist used for every validation. The
    /// hook, secrets file, auth bundle and backup directory are excluded
    /// from tree scans.
    pub fn new(
        workspace: Workspace,
        layout: VaultLayout,
        settings: RotationSettings,
        scanner: ExposureScanner,
        deps: Collaborators,
    ) -> Self {
        let scanner = scanner
            .skip_file(workspace.hook.clone())
            .skip_file(workspace.secrets_file.clone())
            .skip_file(workspace.auth_bundle_file.clone())
            .skip_dir(workspace.backup_dir.clone());
        let (state, _) = watch::channel(RotationState::Idle);
        Self {
            inner: Arc::new(RotatorInner {
                workspace,
                layout,
                settings,
                scanner,
                deps,
                state,
            }),
        }
    }

    pub fn state(&self) -> RotationState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<RotationState> {
        self.inner.state.subscribe()
    }

    /// Failure describing a run that was abandoned mid-step.
    pub fn interrupted(&self) -> RotationFailure {
        let last_completed = self.state();
        RotationFailure {
            last_completed,
            failed_step: last_completed.next(),
            error: CoreError::Interrupted,
        }
    }

    /// Run a complete rotation.
    pub async fn run(&self, request: &RotationRequest) -> Result<RotationSummary, RotationFailure> {
        self.inner.state.send_replace(RotationState::Idle);
        info!(rotation_type = %request.rotation_type, reason = %request.reason, "rotation started");

        self.begin(RotationState::PrerequisitesChecked);
        self.check_prerequisites()
            .await
            .map_err(|e| self.fail(RotationState::PrerequisitesChecked, e))?;
        self.complete(RotationState::PrerequisitesChecked);

        self.begin(RotationState::CredentialsGenerated);
        let credentials = self
            .generate_credentials()
            .map_err(|e| self.fail(RotationState::CredentialsGenerated, e))?;
        self.complete(RotationState::CredentialsGenerated);

        self.begin(RotationState::VaultUpdated);
        let previous_ota = self
            .update_vault(&credentials)
            .await
            .map_err(|e| self.fail(RotationState::VaultUpdated, e))?;
        self.complete(RotationState::VaultUpdated);

        self.begin(RotationState::Stage1Deployed);
        let (backup_id, stage1) = self
            .stage1(&previous_ota)
            .await
            .map_err(|e| self.fail(RotationState::Stage1Deployed, e))?;
        self.complete(RotationState::Stage1Deployed);

        let mut summary = self.finish(request, Some(&previous_ota)).await?;
        summary.backup_id = Some(backup_id);
        summary.stage1 = Some(stage1);
        Ok(summary)
    }

    /// Re-run stage 2, verification and recording after an interrupted
    /// rotation. The vault already holds the new credentials.
    ///
    /// The previous OTA password, needed for devices that missed stage 1,
    /// comes from the newest pre-rotation backup.
    pub async fn resume(&self, request: &RotationRequest) -> Result<RotationSummary, RotationFailure> {
        self.inner.state.send_replace(RotationState::Idle);
        info!("resuming rotation at stage 2");

        self.begin(RotationState::PrerequisitesChecked);
        let previous_ota = async {
            self.check_prerequisites().await?;
            self.previous_ota_from_backup()
        }
        .await
        .map_err(|e| self.fail(RotationState::PrerequisitesChecked, e))?;
        if previous_ota.is_none() {
            self.reporter()
                .warning("No pre-rotation backup found; devices rejecting the new OTA password will not be retried");
        }
        // The earlier run got past stage 1.
        self.complete(RotationState::Stage1Deployed);

        self.finish(request, previous_ota.as_deref()).await
    }

    async fn finish(
        &self,
        request: &RotationRequest,
        previous_ota: Option<&str>,
    ) -> Result<RotationSummary, RotationFailure> {
        let registry = self
            .registry()
            .map_err(|e| self.fail(RotationState::Stage2Deployed, e))?;

        self.begin(RotationState::Stage2Deployed);
        let stage2 = self
            .stage2(&registry, previous_ota)
            .await
            .map_err(|e| self.fail(RotationState::Stage2Deployed, e))?;
        self.complete(RotationState::Stage2Deployed);

        self.begin(RotationState::Verified);
        let (alive, unreachable) = self
            .verify(&registry)
            .await
            .map_err(|e| self.fail(RotationState::Verified, e))?;
        self.complete(RotationState::Verified);

        let mut summary = RotationSummary {
            stage2,
            alive,
            unreachable,
            ..RotationSummary::default()
        };

        self.begin(RotationState::Documented);
        summary.final_scan_findings = self
            .document(request, &summary)
            .map_err(|e| self.fail(RotationState::Documented, e))?;
        self.complete(RotationState::Documented);

        Ok(summary)
    }

    // ── State bookkeeping ────────────────────────────────────────

    fn reporter(&self) -> &dyn Reporter {
        &*self.inner.deps.reporter
    }

    fn begin(&self, step: RotationState) {
        debug!(step = %step, "rotation step started");
        self.reporter().step(step.title());
    }

    fn complete(&self, step: RotationState) {
        self.inner.state.send_replace(step);
        info!(state = %step, "rotation step completed");
    }

    fn fail(&self, step: RotationState, error: CoreError) -> RotationFailure {
        let last_completed = self.state();
        self.inner.state.send_replace(RotationState::Failed);
        warn!(step = %step, last_completed = %last_completed, error = %error, "rotation failed");
        self.reporter()
            .error(&format!("{} failed: {error}", step.title()));
        RotationFailure {
            last_completed,
            failed_step: step,
            error,
        }
    }

    fn vault(&self) -> VaultCredentials<'_> {
        VaultCredentials::new(&*self.inner.deps.vault, &self.inner.layout)
    }

    fn backups(&self) -> BackupStore {
        let ws = &self.inner.workspace;
        BackupStore::new(&ws.root, &ws.backup_dir, &ws.secrets_file)
    }

    fn registry(&self) -> Result<DeviceRegistry, CoreError> {
        DeviceRegistry::discover(&self.inner.workspace.root, &self.inner.settings.device_filter)
    }

    // ── Steps ────────────────────────────────────────────────────

    /// Everything that can be missing is collected before failing, and
    /// nothing is modified.
    async fn check_prerequisites(&self) -> Result<(), CoreError> {
        let ws = &self.inner.workspace;
        let mut missing: Vec<String> = self
            .inner
            .settings
            .required_tools
            .iter()
            .filter(|tool| !tool_available(tool))
            .map(|tool| format!("tool `{tool}`"))
            .collect();

        let vault = self.vault();
        if vault.check_available().await {
            self.reporter()
                .success(&format!("Secret vault reachable ({})", vault.backend_name()));
            // Stage 1 rebuilds the secrets file from the WiFi item.
            if let Err(e) = vault.wifi().await {
                missing.push(format!("WiFi credentials in the vault ({e})"));
            }
        } else {
            missing.push(format!("secret vault ({})", vault.backend_name()));
        }
        if !self.inner.deps.hook.exists() {
            missing.push(format!(
                "credential hook ({})",
                ws.relative(&ws.hook).display()
            ));
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Prerequisites { missing })
        }
    }

    fn generate_credentials(&self) -> Result<CredentialSet, CoreError> {
        let set = CredentialSet::generate();
        if let Some(verdict) = set
            .failures(self.inner.scanner.blocklist())
            .into_iter()
            .next()
        {
            return Err(CoreError::InvalidCredential {
                kind: verdict.credential,
                verdict: verdict.kind,
                detail: verdict.detail,
            });
        }
        for kind in CredentialKind::ALL {
            self.reporter()
                .success(&format!("New {} generated and validated", kind.label()));
        }
        Ok(set)
    }

    /// Store the new credentials; returns the OTA password devices accept
    /// today, captured before anything is overwritten.
    async fn update_vault(&self, credentials: &CredentialSet) -> Result<String, CoreError> {
        let ws = &self.inner.workspace;
        let vault = self.vault();

        let from_file = ActiveSecretsFile::new(&ws.secrets_file)
            .read()
            .ok()
            .and_then(|bundle| bundle.credential(CredentialKind::OtaPassword).map(str::to_owned))
            .filter(|v| !v.is_empty());
        let previous = match from_file {
            Some(v) => v,
            None => vault
                .credential(CredentialKind::OtaPassword)
                .await?
                .ok_or_else(|| CoreError::SecretsFieldMissing {
                    path: ws.secrets_file.clone(),
                    field: CredentialKind::OtaPassword.field_name().to_owned(),
                })?,
        };

        vault.store(credentials).await?;
        self.reporter()
            .success("New credentials stored in the vault and verified");
        Ok(previous)
    }

    async fn stage1(&self, previous_ota: &str) -> Result<(String, DeploymentSummary), CoreError> {
        let ws = &self.inner.workspace;
        let reporter = self.reporter();

        let backup = self.backups().create(Some(PRE_ROTATION_LABEL))?;
        reporter.info(&format!("Backup created: {}", backup.backup_id));

        let registry = self.registry()?;
        let target = self.vault().bundle().await?;
        let auth = target.with_ota_password(previous_ota);
        auth.save(&ws.auth_bundle_file)?;

        let mut active = ActiveSecretsFile::new(&ws.secrets_file);
        let guard = active.install(&auth)?;
        self.check_transition(&auth)?;

        let summary = deploy_fleet(
            &*self.inner.deps.deployer,
            &ws.root,
            &registry,
            DeployPlan::MinimalThenFull,
            reporter,
        )
        .await;

        guard.restore()?;
        reporter.info("Original secrets file restored");

        for device in summary.failed() {
            reporter.warning(&format!("{device}: not updated in stage 1"));
        }
        Ok((backup.backup_id, summary))
    }

    /// Relaxed validation of the auth bundle and the files holding it.
    fn check_transition(&self, auth: &SecretsBundle) -> Result<(), CoreError> {
        let ws = &self.inner.workspace;
        let policy = ValidationPolicy::TransitionAllowingOldCredentials;
        let mut errors = 0;
        for verdict in auth.verdicts(self.inner.scanner.blocklist()) {
            match policy.severity(&verdict) {
                Severity::Ok => {}
                Severity::Warning => self
                    .reporter()
                    .warning(&format!("{verdict} (expected during transition)")),
                Severity::Error => {
                    self.reporter().error(&verdict.detail);
                    errors += 1;
                }
            }
        }
        if errors > 0 {
            return Err(CoreError::ValidationFailed { count: errors });
        }

        let files = [ws.secrets_file.clone(), ws.auth_bundle_file.clone()];
        let report = ExposureScanner::new(self.inner.scanner.blocklist().clone())
            .with_transient(ws.secrets_file.clone())
            .with_transient(ws.auth_bundle_file.clone())
            .scan_files(&files, policy);
        for finding in report.warnings() {
            debug!(%finding, "tolerated during transition");
        }
        report.into_result().map(|_| ())
    }

    async fn stage2(
        &self,
        registry: &DeviceRegistry,
        previous_ota: Option<&str>,
    ) -> Result<DeploymentSummary, CoreError> {
        let ws = &self.inner.workspace;
        let reporter = self.reporter();
        let deployer = &*self.inner.deps.deployer;

        let bundle = self.vault().bundle().await?;
        let errors: Vec<_> = bundle
            .verdicts(self.inner.scanner.blocklist())
            .into_iter()
            .filter(|v| ValidationPolicy::Strict.severity(v) == Severity::Error)
            .collect();
        if !errors.is_empty() {
            for verdict in &errors {
                reporter.error(&verdict.detail);
            }
            return Err(CoreError::ValidationFailed {
                count: errors.len(),
            });
        }

        let mut active = ActiveSecretsFile::new(&ws.secrets_file);
        active.write(&bundle)?;
        reporter.success("Secrets file regenerated from the vault");

        let mut summary =
            deploy_fleet(deployer, &ws.root, registry, DeployPlan::FullOnly, reporter).await;

        let retry: Vec<String> = summary.auth_failures().map(str::to_owned).collect();
        if !retry.is_empty() {
            match previous_ota {
                Some(previous) => {
                    reporter.warning(&format!(
                        "Retrying {} device(s) with the previous OTA password",
                        retry.len()
                    ));
                    let auth = bundle.with_ota_password(previous);
                    let guard = active.install(&auth)?;
                    for name in &retry {
                        if let Some(device) = registry.get(name) {
                            let report =
                                deploy_device(deployer, &ws.root, device, DeployPlan::FullOnly, reporter)
                                    .await;
                            summary.replace(report);
                        }
                    }
                    guard.restore()?;
                }
                None => reporter.warning("Previous OTA password unknown; not retrying"),
            }
        }

        for device in summary.failed() {
            reporter.error(&format!("{device}: stage 2 deployment failed"));
        }
        Ok(summary)
    }

    async fn verify(&self, registry: &DeviceRegistry) -> Result<(Vec<String>, Vec<String>), CoreError> {
        let ws = &self.inner.workspace;
        let reporter = self.reporter();

        let mut alive = Vec::new();
        let mut unreachable = Vec::new();
        for name in registry.names() {
            if self.inner.deps.probe.is_alive(name).await {
                alive.push(name.to_owned());
            } else {
                reporter.warning(&format!("{name}: not responding"));
                unreachable.push(name.to_owned());
            }
        }
        reporter.info(&format!(
            "{} of {} device(s) responding",
            alive.len(),
            registry.len()
        ));

        let report = self
            .inner
            .scanner
            .scan_tree(&ws.root, ValidationPolicy::Strict)?;
        for finding in report.warnings() {
            reporter.warning(&finding.to_string());
        }
        report.into_result()?;
        reporter.success("No exposed credentials found in the working tree");

        self_test_hook(&*self.inner.deps.hook, &ws.root, self.inner.scanner.blocklist()).await?;
        reporter.success("Credential hook detects every exposed credential");

        Ok((alive, unreachable))
    }

    /// Record the event; returns the number of final-scan findings.
    fn document(&self, request: &RotationRequest, summary: &RotationSummary) -> Result<usize, CoreError> {
        let ws = &self.inner.workspace;
        let reporter = self.reporter();

        let mut event = RotationEvent::new(
            request.rotation_type,
            request.reason.clone(),
            CredentialKind::ALL.to_vec(),
            request.method,
        );
        if let Some(notes) = &request.notes {
            event = event.with_notes(notes.clone());
        }

        let mut history = RotationHistory::load(&ws.history_file)?;
        history.append(event)?;
        let failed = summary.failed_devices();
        if failed.is_empty() {
            history.update_validation_status(ValidationStatus::Passed, None)?;
        } else {
            history.update_validation_status(
                ValidationStatus::Failed,
                Some(format!("deployment failed for: {}", failed.join(", "))),
            )?;
        }
        history.write_report(&ws.report_file, chrono::Utc::now())?;
        reporter.success("Rotation recorded");

        match fs::remove_file(&ws.auth_bundle_file) {
            Ok(()) => debug!("auth bundle removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::io(&ws.auth_bundle_file)(e)),
        }

        // The rotation is complete at this point; findings are only reported.
        let findings = match self.inner.scanner.scan_tree(&ws.root, ValidationPolicy::Strict) {
            Ok(report) => {
                for finding in report.errors() {
                    reporter.warning(&finding.to_string());
                }
                report.errors().count()
            }
            Err(e) => {
                reporter.warning(&format!("Final scan failed: {e}"));
                0
            }
        };
        Ok(findings)
    }

    fn previous_ota_from_backup(&self) -> Result<Option<String>, CoreError> {
        let backups = self.backups();
        let Some(manifest) = backups.latest_with_label(PRE_ROTATION_LABEL)? else {
            return Ok(None);
        };
        let Some(text) = backups.read_secrets(&manifest)? else {
            return Ok(None);
        };
        let bundle = SecretsBundle::parse(&text);
        Ok(bundle
            .credential(CredentialKind::OtaPassword)
            .or_else(|| bundle.get(OLD_OTA_PASSWORD))
            .map(str::to_owned))
    }
}
