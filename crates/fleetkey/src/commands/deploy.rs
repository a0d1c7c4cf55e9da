//! `fleetkey deploy`: flash the active secrets to one device or all.
//!
//! A device rejecting the current OTA password is retried once with
//! `old_ota_password` from the secrets file, installed under a guard so
//! the file is restored afterwards.

use tabled::Tabled;

use fleetkey_core::secrets::OLD_OTA_PASSWORD;
use fleetkey_core::{
    ActiveSecretsFile, CoreError, DeployPlan, DeploymentSummary, DeviceConfig, DeviceReport,
    DeviceResult, Reporter, deploy_device,
};

use crate::cli::{DeployArgs, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Result")]
    result: String,
}

impl From<&DeviceReport> for ReportRow {
    fn from(r: &DeviceReport) -> Self {
        let result = match &r.result {
            DeviceResult::Deployed => "deployed".to_owned(),
            DeviceResult::Offline { variant } => format!("offline ({variant})"),
            DeviceResult::Failed { variant, outcome } => format!("{outcome} ({variant})"),
        };
        Self {
            device: r.device.clone(),
            result,
        }
    }
}

pub async fn handle(args: DeployArgs, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let reporter = &ctx.reporter;
    let registry = ctx.registry()?;
    let devices: Vec<&DeviceConfig> = match args.device {
        Some(ref name) if !args.all => vec![registry.get(name).ok_or_else(|| {
            CoreError::DeviceNotFound { name: name.clone() }
        })?],
        _ => registry.iter().collect(),
    };
    if devices.is_empty() {
        reporter.warning("No devices to deploy");
        return Ok(());
    }
    reporter.info(&format!("Deploying {} device(s)", devices.len()));

    let root = ctx.root();
    let deployer = ctx.deployer()?;
    let mut active = ActiveSecretsFile::new(&ctx.workspace.secrets_file);
    let bundle = active.read()?;

    let mut summary = DeploymentSummary::default();
    for device in &devices {
        let report = deploy_device(&deployer, root, device, DeployPlan::FullOnly, reporter).await;
        summary.reports.push(report);
    }

    let retry: Vec<String> = summary.auth_failures().map(str::to_owned).collect();
    if !retry.is_empty() {
        match bundle.get(OLD_OTA_PASSWORD).filter(|v| !v.is_empty()) {
            Some(previous) => {
                reporter.warning(&format!(
                    "Retrying {} device(s) with {OLD_OTA_PASSWORD}",
                    retry.len()
                ));
                let guard = active.install(&bundle.with_ota_password(previous))?;
                for name in &retry {
                    if let Some(device) = registry.get(name) {
                        let report =
                            deploy_device(&deployer, root, device, DeployPlan::FullOnly, reporter)
                                .await;
                        summary.replace(report);
                    }
                }
                guard.restore()?;
                reporter.info("Original secrets file restored");
            }
            None => reporter.error(&format!(
                "{OLD_OTA_PASSWORD} not found in the secrets file; cannot retry"
            )),
        }
    }

    let out = output::render_list(
        &global.output,
        &summary.reports,
        |r| ReportRow::from(r),
        |r| r.device.clone(),
    )?;
    output::print_output(&out, global.quiet);

    let unsuccessful: Vec<&str> = summary.failed().chain(summary.offline()).collect();
    reporter.info(&format!(
        "Deployment complete: {}/{} device(s) successful",
        summary.deployed().count(),
        summary.reports.len()
    ));
    if unsuccessful.is_empty() {
        Ok(())
    } else {
        Err(CliError::DeploymentFailed {
            devices: unsuccessful.join(", "),
        })
    }
}
