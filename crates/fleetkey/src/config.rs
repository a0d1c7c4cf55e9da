//! Per-invocation context: the working tree, its layered configuration,
//! and constructors for the adapters the commands drive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleetkey_api::{FirmwareTool, HookRunner, KeyringVault, OnePasswordCli, SecretVault, TcpProbe};
use fleetkey_config::{Config, PROJECT_FILE, VaultBackend, load_config, project_config_path, user_config_path};
use fleetkey_core::{
    BackupStore, CoreError, DeviceRegistry, FirmwareDeployer, RotationHistory, Workspace,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;
use crate::reporter::ConsoleReporter;

/// Service name under which keyring entries are stored.
const KEYRING_SERVICE: &str = "fleetkey";

pub struct Context {
    pub config: Config,
    pub workspace: Workspace,
    pub reporter: ConsoleReporter,
}

impl Context {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let root = working_tree(&global.dir)?;
        let config = load_config(&root, global.config.as_deref())?;
        tracing::debug!(root = %root.display(), "configuration loaded");
        Ok(Self {
            workspace: config.workspace(&root),
            reporter: ConsoleReporter::new(output::stderr_color(&global.color), global.quiet),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.workspace.root
    }

    pub fn vault(&self) -> Arc<dyn SecretVault> {
        let v = &self.config.vault;
        match v.backend {
            VaultBackend::Onepassword => Arc::new(
                OnePasswordCli::new(v.account.clone())
                    .with_program(v.program.clone())
                    .with_timeout(self.config.vault_timeout()),
            ),
            VaultBackend::Keyring => Arc::new(KeyringVault::new(KEYRING_SERVICE)),
        }
    }

    pub fn deployer(&self) -> Result<FirmwareDeployer, CliError> {
        let tool = FirmwareTool::new(self.config.firmware.command.clone(), self.root())
            .map_err(CoreError::from)?
            .with_timeout(self.config.firmware_timeout());
        Ok(FirmwareDeployer::new(tool))
    }

    pub fn probe(&self) -> TcpProbe {
        let f = &self.config.firmware;
        TcpProbe::new(f.host_suffix.clone(), f.probe_port, self.config.probe_timeout())
    }

    pub fn hook(&self) -> HookRunner {
        HookRunner::new(&self.workspace.hook, self.root())
    }

    pub fn registry(&self) -> Result<DeviceRegistry, CliError> {
        Ok(DeviceRegistry::discover(
            self.root(),
            &self.config.device_filter(),
        )?)
    }

    pub fn backups(&self) -> BackupStore {
        let ws = &self.workspace;
        BackupStore::new(&ws.root, &ws.backup_dir, &ws.secrets_file)
    }

    pub fn history(&self) -> Result<RotationHistory, CliError> {
        Ok(RotationHistory::load(&self.workspace.history_file)?)
    }
}

/// The working tree, made absolute.
pub fn working_tree(dir: &Path) -> Result<PathBuf, CliError> {
    dir.canonicalize().map_err(|e| CliError::Validation {
        field: "--dir".into(),
        reason: format!("{}: {e}", dir.display()),
    })
}

/// Config files in merge order, with whether each exists.
pub fn consulted_files(root: &Path, explicit: Option<&Path>) -> Vec<(String, PathBuf)> {
    let mut files = Vec::new();
    if let Some(user) = user_config_path() {
        files.push(("user".to_owned(), user));
    }
    let project = project_config_path(root, explicit);
    let label = if explicit.is_some() {
        "explicit".to_owned()
    } else {
        format!("project ({PROJECT_FILE})")
    };
    files.push((label, project));
    files
}
