// ── Runtime workspace configuration ──
//
// These types describe *where* things live and *which* vault items hold
// the credentials. They never touch disk; the CLI builds them from the
// layered config file and hands them in.

use std::path::{Path, PathBuf};

use crate::devices::DeviceFilter;

/// Resolved locations inside one device-configuration working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Directory holding the device configs and the active secrets file.
    pub root: PathBuf,
    pub secrets_file: PathBuf,
    /// Transient auth bundle written during stage 1.
    pub auth_bundle_file: PathBuf,
    pub backup_dir: PathBuf,
    pub history_file: PathBuf,
    pub report_file: PathBuf,
    /// Credential-detection hook.
    pub hook: PathBuf,
}

impl Workspace {
    /// Default layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            secrets_file: root.join("secrets.yaml"),
            auth_bundle_file: root.join("secrets.yaml.auth"),
            backup_dir: root.join("backups"),
            history_file: root.join("CREDENTIAL_ROTATION_LOG.json"),
            report_file: root.join("CREDENTIAL_ROTATION_LOG.md"),
            hook: root.join(".githooks/esphome-credential-check.sh"),
            root,
        }
    }

    /// Resolve `path` against the root unless it is already absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// `path` relative to the root, for display.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

/// Vault items and field labels holding the fleet's secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultLayout {
    pub device_vault: String,
    pub device_item: String,
    pub wifi_vault: String,
    pub wifi_item: String,
    pub wifi_ssid_field: String,
    pub wifi_password_field: String,
    pub wifi_domain_field: String,
}

impl Default for VaultLayout {
    fn default() -> Self {
        Self {
            device_vault: "Automation".into(),
            device_item: "ESPHome".into(),
            wifi_vault: "Shared".into(),
            wifi_item: "Home IoT".into(),
            wifi_ssid_field: "network name".into(),
            wifi_password_field: "wireless network password".into(),
            wifi_domain_field: "domain name".into(),
        }
    }
}

/// Policy knobs for a rotation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSettings {
    /// Executables that must be on `PATH` before anything changes.
    pub required_tools: Vec<String>,
    pub device_filter: DeviceFilter,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            required_tools: vec!["esphome".into(), "op".into()],
            device_filter: DeviceFilter::default(),
        }
    }
}
