//! `fleetkey validate-secrets`: secrets file, WiFi, vault, and tree checks.
//!
//! Every check runs and reports; the command fails if any of them did.

use fleetkey_core::{
    ActiveSecretsFile, Blocklist, CoreError, FindingKind, Reporter, SecretsBundle, Severity,
    ValidationPolicy, VaultCredentials, validate_wifi,
};

use crate::cli::ValidateSecretsArgs;
use crate::config::Context;
use crate::error::CliError;

const SCANNED_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

pub async fn handle(args: &ValidateSecretsArgs, ctx: &Context) -> Result<(), CliError> {
    let reporter = &ctx.reporter;
    let policy = if args.transition {
        ValidationPolicy::TransitionAllowingOldCredentials
    } else {
        ValidationPolicy::Strict
    };
    reporter.step("Validating secrets");
    if policy.is_transition() {
        reporter.info("Transition mode: previous credentials are tolerated");
    }

    let ws = &ctx.workspace;
    let active = ActiveSecretsFile::new(&ws.secrets_file);
    if !active.exists() {
        return Err(CoreError::SecretsFileMissing {
            path: ws.secrets_file.clone(),
        }
        .into());
    }
    let bundle = active.read()?;
    reporter.success(&format!("Found {}", ws.relative(&ws.secrets_file).display()));

    let blocklist = ctx.config.blocklist();
    let mut failed = 0;
    failed += check_formats(ctx, &bundle, &blocklist, policy);
    failed += check_wifi(ctx, &bundle);
    failed += check_vault(ctx).await;
    failed += check_tree(ctx, policy)?;

    if failed == 0 {
        reporter.success("All validations passed");
        Ok(())
    } else {
        reporter.error(&format!("Validation failed with {failed} error(s)"));
        Err(CliError::ChecksFailed { count: failed })
    }
}

fn check_formats(
    ctx: &Context,
    bundle: &SecretsBundle,
    blocklist: &Blocklist,
    policy: ValidationPolicy,
) -> usize {
    let reporter = &ctx.reporter;
    reporter.info("Validating credential formats");
    let mut errors = 0;
    for verdict in bundle.verdicts(blocklist) {
        let label = verdict.credential.label();
        match policy.severity(&verdict) {
            Severity::Ok => reporter.success(&format!("{label}: valid")),
            Severity::Warning => {
                reporter.warning(&format!("{verdict} (allowed in transition mode)"));
            }
            Severity::Error => {
                errors += 1;
                reporter.error(&verdict.detail);
                reporter.info(&format!("Expected: {}", verdict.credential.expectation()));
                if let Some(fix) = verdict.remediation() {
                    reporter.info(&format!("Fix with: {fix}"));
                }
            }
        }
    }
    errors
}

fn check_wifi(ctx: &Context, bundle: &SecretsBundle) -> usize {
    let reporter = &ctx.reporter;
    reporter.info("Validating WiFi credentials");
    let wifi = bundle.wifi();
    let issues = validate_wifi(&wifi.ssid, &wifi.password, &wifi.domain);
    if issues.is_empty() {
        reporter.success("WiFi credentials present");
        return 0;
    }
    for issue in &issues {
        reporter.error(issue);
    }
    issues.len()
}

/// An unreachable vault is a warning, not an error.
async fn check_vault(ctx: &Context) -> usize {
    let reporter = &ctx.reporter;
    let vault = ctx.vault();
    let layout = ctx.config.vault_layout();
    let creds = VaultCredentials::new(&*vault, &layout);

    if !creds.check_available().await {
        reporter.warning(&format!(
            "Secret vault ({}) not available; skipping integration check",
            creds.backend_name()
        ));
        return 0;
    }
    reporter.info(&format!("Validating vault integration ({})", creds.backend_name()));

    let mut errors = 0;
    if let Err(e) = creds.credentials().await {
        reporter.error(&format!(
            "Cannot read {}/{}: {e}",
            layout.device_vault, layout.device_item
        ));
        errors += 1;
    }
    if let Err(e) = creds.wifi().await {
        reporter.error(&format!("Cannot read {}/{}: {e}", layout.wifi_vault, layout.wifi_item));
        errors += 1;
    }
    if errors == 0 {
        reporter.success("Vault integration is working");
    }
    errors
}

fn check_tree(ctx: &Context, policy: ValidationPolicy) -> Result<usize, CliError> {
    let reporter = &ctx.reporter;
    let ws = &ctx.workspace;
    reporter.info("Scanning YAML files for exposed credentials");

    let mut scanner = ctx
        .config
        .scanner()
        .with_extensions(SCANNED_EXTENSIONS.iter().map(ToString::to_string).collect())
        .skip_file(ws.secrets_file.clone())
        .skip_dir(ws.backup_dir.clone());
    if policy.is_transition() {
        scanner = scanner.with_transient(ws.auth_bundle_file.clone());
    }
    let report = scanner.scan_tree(ctx.root(), policy)?;

    for finding in report.warnings() {
        if finding.kind == FindingKind::Exposed {
            reporter.warning(&format!("{finding} (allowed in transition mode)"));
        } else {
            reporter.warning(&finding.to_string());
        }
    }
    let errors: Vec<_> = report.errors().collect();
    for finding in &errors {
        reporter.error(&finding.to_string());
    }
    if errors.is_empty() {
        reporter.success(&format!(
            "No exposed credentials in {} file(s)",
            report.files_scanned
        ));
    }
    Ok(errors.len())
}
