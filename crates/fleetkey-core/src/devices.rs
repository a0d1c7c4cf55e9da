// ── Device registry ──
//
// Devices are whatever configuration files sit in the working directory:
// `<name>.yaml`, `<name>-minimal.yaml`, `<name>-full.yaml`. Shared configs,
// docs and packaging files are excluded by stem; editor and backup copies
// by marker.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;
use tracing::debug;

use crate::error::CoreError;

const MINIMAL_SUFFIX: &str = "-minimal";
const FULL_SUFFIX: &str = "-full";

/// File stems that are never devices. A trailing `*` matches a prefix.
pub const DEFAULT_EXCLUDE: &[&str] = &[
    "secrets",
    "common",
    "package",
    "packages",
    "requirements",
    "renovate",
    "Taskfile",
    "README",
    "SECURITY",
    "MIGRATION",
    "CREDENTIAL*",
    "deployment",
    ".pre-commit-config",
    "docker-compose",
    "mkdocs",
];

/// Substrings marking copies that must not be deployed.
pub const DEFAULT_EXCLUDE_MARKERS: &[&str] = &[".backup", ".old", ".example"];

/// Which files are considered during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    pub exclude: Vec<String>,
    pub exclude_markers: Vec<String>,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            exclude: DEFAULT_EXCLUDE.iter().map(|s| (*s).to_owned()).collect(),
            exclude_markers: DEFAULT_EXCLUDE_MARKERS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

impl DeviceFilter {
    fn excludes_stem(&self, stem: &str) -> bool {
        self.exclude.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => stem.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()),
            None => stem.eq_ignore_ascii_case(pattern),
        })
    }

    fn excludes_name(&self, file_name: &str) -> bool {
        file_name.starts_with('.')
            || self
                .exclude_markers
                .iter()
                .any(|marker| file_name.contains(marker.as_str()))
    }
}

/// Configuration variants belonging to one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceConfig {
    pub name: String,
    /// `<name>.yaml`
    pub base: Option<PathBuf>,
    /// `<name>-minimal.yaml`, the boot-survivable profile.
    pub minimal: Option<PathBuf>,
    /// `<name>-full.yaml`
    pub full: Option<PathBuf>,
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Final operating profile: the `-full` variant, else the plain one.
    pub fn full_config(&self) -> Option<&Path> {
        self.full.as_deref().or(self.base.as_deref())
    }

    pub fn minimal_config(&self) -> Option<&Path> {
        self.minimal.as_deref()
    }

    /// Short variant summary, e.g. `minimal+full`.
    pub fn variants(&self) -> String {
        let mut parts = Vec::new();
        if self.minimal.is_some() {
            parts.push("minimal");
        }
        if self.full.is_some() {
            parts.push("full");
        }
        if self.base.is_some() {
            parts.push("base");
        }
        parts.join("+")
    }
}

/// Devices discovered in a directory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceConfig>,
}

impl DeviceRegistry {
    /// Scan `dir` (not recursively) for device configuration files.
    pub fn discover(dir: &Path, filter: &DeviceFilter) -> Result<Self, CoreError> {
        let mut devices: BTreeMap<String, DeviceConfig> = BTreeMap::new();

        for entry in fs::read_dir(dir).map_err(CoreError::io(dir))? {
            let entry = entry.map_err(CoreError::io(dir))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(stem) = file_name
                .strip_suffix(".yaml")
                .or_else(|| file_name.strip_suffix(".yml"))
            else {
                continue;
            };
            if filter.excludes_name(file_name) || filter.excludes_stem(stem) {
                debug!(file = file_name, "skipping non-device file");
                continue;
            }

            let relative = PathBuf::from(file_name);
            let (name, slot) = if let Some(name) = stem.strip_suffix(MINIMAL_SUFFIX) {
                (name, Variant::Minimal)
            } else if let Some(name) = stem.strip_suffix(FULL_SUFFIX) {
                (name, Variant::Full)
            } else {
                (stem, Variant::Base)
            };
            if name.is_empty() || filter.excludes_stem(name) {
                continue;
            }

            let device = devices
                .entry(name.to_owned())
                .or_insert_with(|| DeviceConfig::new(name));
            match slot {
                Variant::Base => device.base = Some(relative),
                Variant::Minimal => device.minimal = Some(relative),
                Variant::Full => device.full = Some(relative),
            }
        }

        debug!(count = devices.len(), dir = %dir.display(), "devices discovered");
        Ok(Self { devices })
    }

    pub fn from_devices(devices: impl IntoIterator<Item = DeviceConfig>) -> Self {
        Self {
            devices: devices.into_iter().map(|d| (d.name.clone(), d)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceConfig> {
        self.devices.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

enum Variant {
    Base,
    Minimal,
    Full,
}

/// Whether a minimal profile keeps a fallback hotspot (`wifi.ap`).
///
/// A bare `ap:` counts: it enables the hotspot with default settings.
pub fn has_fallback_hotspot(path: &Path) -> Result<bool, CoreError> {
    let text = fs::read_to_string(path).map_err(CoreError::io(path))?;
    let doc: Value = serde_yaml::from_str(&text).map_err(|e| CoreError::data(path, e))?;
    Ok(doc
        .get("wifi")
        .and_then(|wifi| wifi.get("ap"))
        .is_some())
}
