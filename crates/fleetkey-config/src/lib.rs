//! Shared configuration for the fleetkey CLI.
//!
//! Serialized defaults, then the user config file, then the project file
//! (`fleetkey.toml` in the working tree, or an explicit `--config`), then
//! `FLEETKEY_*` environment variables, then `OP_ACCOUNT`. The result is
//! translated into the runtime types `fleetkey-core` consumes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetkey_core::{
    Blocklist, CredentialKind, DeviceFilter, ExposureScanner, RotationSettings, VaultLayout,
    Workspace,
    devices::{DEFAULT_EXCLUDE, DEFAULT_EXCLUDE_MARKERS},
    scan::{DEFAULT_EXTENSIONS, DEFAULT_SKIP_DIRS},
};

/// Project-level config file name, looked up in the working tree.
pub const PROJECT_FILE: &str = "fleetkey.toml";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{} already exists (use --force to overwrite)", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub vault: VaultConfig,
    pub firmware: FirmwareConfig,
    pub devices: DevicesConfig,
    pub security: SecurityConfig,
    pub backup: BackupConfig,
}

/// File locations, relative to the working tree unless absolute.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub secrets_file: PathBuf,
    pub auth_bundle_file: PathBuf,
    pub backup_dir: PathBuf,
    pub history_file: PathBuf,
    pub report_file: PathBuf,
    pub hook: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            secrets_file: "secrets.yaml".into(),
            auth_bundle_file: "secrets.yaml.auth".into(),
            backup_dir: "backups".into(),
            history_file: "CREDENTIAL_ROTATION_LOG.json".into(),
            report_file: "CREDENTIAL_ROTATION_LOG.md".into(),
            hook: ".githooks/esphome-credential-check.sh".into(),
        }
    }
}

/// Which secret store backs the credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultBackend {
    /// 1Password through the `op` CLI.
    #[default]
    Onepassword,
    /// The operating system keyring.
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    pub backend: VaultBackend,
    /// 1Password account shorthand or sign-in address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub program: String,
    pub device_vault: String,
    pub device_item: String,
    pub wifi_vault: String,
    pub wifi_item: String,
    pub wifi_ssid_field: String,
    pub wifi_password_field: String,
    pub wifi_domain_field: String,
    pub timeout_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        let layout = VaultLayout::default();
        Self {
            backend: VaultBackend::default(),
            account: None,
            program: "op".into(),
            device_vault: layout.device_vault,
            device_item: layout.device_item,
            wifi_vault: layout.wifi_vault,
            wifi_item: layout.wifi_item,
            wifi_ssid_field: layout.wifi_ssid_field,
            wifi_password_field: layout.wifi_password_field,
            wifi_domain_field: layout.wifi_domain_field,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Build/flash tool invocation prefix, e.g. `["esphome"]`.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub probe_port: u16,
    pub probe_timeout_secs: u64,
    pub host_suffix: String,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            command: vec!["esphome".into()],
            timeout_secs: 300,
            probe_port: 6053,
            probe_timeout_secs: 10,
            host_suffix: ".local".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// File stems that are never devices; a trailing `*` matches a prefix.
    pub exclude: Vec<String>,
    pub exclude_markers: Vec<String>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            exclude: owned(DEFAULT_EXCLUDE),
            exclude_markers: owned(DEFAULT_EXCLUDE_MARKERS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Additional known-exposed values, keyed by credential kind
    /// (`api_key`, `ota_password`, `fallback_password`).
    pub extra_exposed: BTreeMap<String, Vec<String>>,
    pub max_age_days: i64,
    pub scan_extensions: Vec<String>,
    pub scan_skip_dirs: Vec<String>,
    pub required_tools: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            extra_exposed: BTreeMap::new(),
            max_age_days: 90,
            scan_extensions: owned(DEFAULT_EXTENSIONS),
            scan_skip_dirs: owned(DEFAULT_SKIP_DIRS),
            required_tools: vec!["esphome".into(), "op".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Backups kept by `backup cleanup`.
    pub keep: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self { keep: 10 }
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_owned()).collect()
}

// ── Config file paths ───────────────────────────────────────────────

/// Per-user config file via XDG / platform conventions.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "fleetkey").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Project config file: `explicit` if given, else `fleetkey.toml` in `root`.
pub fn project_config_path(root: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| root.join(PROJECT_FILE), Path::to_path_buf)
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults layered with the given files only. Missing files are skipped.
pub fn file_figment(user: Option<&Path>, project: &Path) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
    if let Some(user) = user {
        figment = figment.merge(Toml::file(user));
    }
    figment.merge(Toml::file(project))
}

/// Load the effective configuration for the working tree at `root`.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::Validation {
                field: "--config".into(),
                reason: format!("{} does not exist", path.display()),
            });
        }
    }
    let figment = file_figment(
        user_config_path().as_deref(),
        &project_config_path(root, explicit),
    )
    .merge(Env::prefixed("FLEETKEY_").split("__"))
    .merge(Env::raw().only(&["OP_ACCOUNT"]).map(|_| "vault.account".into()));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Write the default configuration to `path`.
pub fn write_default(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_toml()?)?;
    Ok(())
}

// ── Translation to runtime types ────────────────────────────────────

impl Config {
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| {
            Err(ConfigError::Validation {
                field: field.into(),
                reason: reason.into(),
            })
        };
        if self.firmware.command.first().is_none_or(String::is_empty) {
            return invalid("firmware.command", "must name a program");
        }
        if self.firmware.timeout_secs == 0 || self.vault.timeout_secs == 0 {
            return invalid("timeout_secs", "must be greater than zero");
        }
        if self.security.max_age_days <= 0 {
            return invalid("security.max_age_days", "must be greater than zero");
        }
        for kind in self.security.extra_exposed.keys() {
            if CredentialKind::from_str(kind).is_err() {
                return invalid(
                    "security.extra_exposed",
                    &format!("unknown credential kind '{kind}'"),
                );
            }
        }
        Ok(())
    }

    /// Paths resolved against the working tree.
    pub fn workspace(&self, root: &Path) -> Workspace {
        let mut ws = Workspace::new(root);
        ws.secrets_file = ws.resolve(&self.paths.secrets_file);
        ws.auth_bundle_file = ws.resolve(&self.paths.auth_bundle_file);
        ws.backup_dir = ws.resolve(&self.paths.backup_dir);
        ws.history_file = ws.resolve(&self.paths.history_file);
        ws.report_file = ws.resolve(&self.paths.report_file);
        ws.hook = ws.resolve(&self.paths.hook);
        ws
    }

    pub fn vault_layout(&self) -> VaultLayout {
        let v = &self.vault;
        VaultLayout {
            device_vault: v.device_vault.clone(),
            device_item: v.device_item.clone(),
            wifi_vault: v.wifi_vault.clone(),
            wifi_item: v.wifi_item.clone(),
            wifi_ssid_field: v.wifi_ssid_field.clone(),
            wifi_password_field: v.wifi_password_field.clone(),
            wifi_domain_field: v.wifi_domain_field.clone(),
        }
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter {
            exclude: self.devices.exclude.clone(),
            exclude_markers: self.devices.exclude_markers.clone(),
        }
    }

    pub fn rotation_settings(&self) -> RotationSettings {
        RotationSettings {
            required_tools: self.security.required_tools.clone(),
            device_filter: self.device_filter(),
        }
    }

    /// Built-in exposures plus `security.extra_exposed`.
    pub fn blocklist(&self) -> Blocklist {
        let mut blocklist = Blocklist::default();
        blocklist.extend(self.security.extra_exposed.iter().filter_map(|(kind, values)| {
            CredentialKind::from_str(kind)
                .ok()
                .map(|kind| (kind, values.as_slice()))
        }));
        blocklist
    }

    pub fn scanner(&self) -> ExposureScanner {
        ExposureScanner::new(self.blocklist())
            .with_extensions(self.security.scan_extensions.clone())
            .with_skip_dirs(self.security.scan_skip_dirs.clone())
    }

    pub fn firmware_timeout(&self) -> Duration {
        Duration::from_secs(self.firmware.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.firmware.probe_timeout_secs)
    }

    pub fn vault_timeout(&self) -> Duration {
        Duration::from_secs(self.vault.timeout_secs)
    }
}
