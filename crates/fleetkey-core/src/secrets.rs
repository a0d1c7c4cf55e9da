// ── Secrets bundle and the active secrets file ──
//
// The active secrets file (`secrets.yaml`) is read by the firmware tool at
// build time, so whatever it holds is what gets compiled into a device.
// It is a single-writer resource: `ActiveSecretsFile::install` hands out a
// `SecretsGuard` borrowing the file mutably, and the previous content comes
// back when the guard is restored or dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::credential::{Blocklist, CredentialKind, Verdict, validate};
use crate::error::CoreError;

pub const WIFI_SSID: &str = "wifi_ssid";
pub const WIFI_PASSWORD: &str = "wifi_password";
pub const WIFI_DOMAIN: &str = "wifi_domain";
/// Previous OTA password kept alongside the current one for fallback uploads.
pub const OLD_OTA_PASSWORD: &str = "old_ota_password";

const HEADER: &str = "\
# ESPHome secrets
# Managed by fleetkey. Values are synced from the secret vault; do not commit.
";

// Known keys in file order, grouped into commented sections.
const SECTIONS: &[(&str, &[&str])] = &[
    ("WiFi", &[WIFI_SSID, WIFI_PASSWORD, WIFI_DOMAIN]),
    ("Native API encryption key", &["api_key"]),
    ("Fallback hotspot password", &["fallback_password"]),
    ("OTA update password", &["ota_password"]),
];

/// WiFi network credentials shared by every device.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
    pub domain: String,
}

impl fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Every value a device build needs, keyed as in the secrets file.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretsBundle {
    values: BTreeMap<String, String>,
}

impl fmt::Debug for SecretsBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

impl SecretsBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `key: "value"` line format. Comments, blank lines and
    /// lines without a `:` are ignored.
    pub fn parse(text: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            values.insert(key.to_owned(), parse_value(raw.trim()));
        }
        Self { values }
    }

    /// Render in the canonical layout: header, known keys by section,
    /// then any other keys under "Other".
    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        let mut known = Vec::new();

        for (title, keys) in SECTIONS {
            let present: Vec<_> = keys
                .iter()
                .filter_map(|k| self.values.get(*k).map(|v| (*k, v)))
                .collect();
            if present.is_empty() {
                continue;
            }
            out.push_str(&format!("\n# {title}\n"));
            for (key, value) in present {
                out.push_str(&render_line(key, value));
                known.push(key);
            }
        }

        let extra: Vec<_> = self
            .values
            .iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .collect();
        if !extra.is_empty() {
            out.push_str("\n# Other\n");
            for (key, value) in extra {
                out.push_str(&render_line(key, value));
            }
        }
        out
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::SecretsFileMissing {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => Err(CoreError::io(path)(e)),
        }
    }

    /// Write atomically (temp file in the same directory, then rename).
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        write_atomic(path, self.render().as_bytes())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn credential(&self, kind: CredentialKind) -> Option<&str> {
        self.get(kind.field_name())
    }

    pub fn set_credential(&mut self, kind: CredentialKind, value: impl Into<String>) {
        self.set(kind.field_name(), value);
    }

    /// Like [`credential`](Self::credential) but absence is an error.
    pub fn require(&self, kind: CredentialKind, path: &Path) -> Result<&str, CoreError> {
        self.credential(kind).ok_or_else(|| CoreError::SecretsFieldMissing {
            path: path.to_path_buf(),
            field: kind.field_name().to_owned(),
        })
    }

    pub fn wifi(&self) -> WifiCredentials {
        WifiCredentials {
            ssid: self.get(WIFI_SSID).unwrap_or_default().to_owned(),
            password: self.get(WIFI_PASSWORD).unwrap_or_default().to_owned(),
            domain: self.get(WIFI_DOMAIN).unwrap_or_default().to_owned(),
        }
    }

    pub fn set_wifi(&mut self, wifi: &WifiCredentials) {
        self.set(WIFI_SSID, wifi.ssid.clone());
        self.set(WIFI_PASSWORD, wifi.password.clone());
        if !wifi.domain.is_empty() {
            self.set(WIFI_DOMAIN, wifi.domain.clone());
        }
    }

    /// Copy of this bundle authenticating with `ota_password` instead of
    /// the current OTA password. Everything else is unchanged.
    pub fn with_ota_password(&self, ota_password: &str) -> Self {
        let mut auth = self.clone();
        auth.set_credential(CredentialKind::OtaPassword, ota_password);
        auth
    }

    /// Verdict for every credential kind; a missing value is judged as empty.
    pub fn verdicts(&self, blocklist: &Blocklist) -> Vec<Verdict> {
        CredentialKind::ALL
            .into_iter()
            .map(|kind| validate(kind, self.credential(kind).unwrap_or_default(), blocklist))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse_value(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix('"') {
        let mut value = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => value.push(other),
                    None => break,
                },
                '"' => return value,
                _ => value.push(c),
            }
        }
        return value;
    }
    if let Some(rest) = raw.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    return value;
                }
            } else {
                value.push(c);
            }
        }
        return value;
    }
    // Unquoted: drop a trailing comment.
    raw.split_once(" #")
        .map_or(raw, |(v, _)| v)
        .trim()
        .to_owned()
}

fn render_line(key: &str, value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    format!("{key}: \"{escaped}\"\n")
}

pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(CoreError::io(dir))?;
    tmp.write_all(contents).map_err(CoreError::io(tmp.path()))?;
    tmp.persist(path).map_err(|e| CoreError::io(path)(e.error))?;
    Ok(())
}

// ── Active secrets file ──────────────────────────────────────────────

/// The secrets file the firmware tool reads.
#[derive(Debug)]
pub struct ActiveSecretsFile {
    path: PathBuf,
}

impl ActiveSecretsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn read(&self) -> Result<SecretsBundle, CoreError> {
        SecretsBundle::load(&self.path)
    }

    /// Replace the file permanently.
    pub fn write(&mut self, bundle: &SecretsBundle) -> Result<(), CoreError> {
        bundle.save(&self.path)
    }

    /// Install `bundle` until the returned guard is restored or dropped.
    pub fn install(&mut self, bundle: &SecretsBundle) -> Result<SecretsGuard<'_>, CoreError> {
        let original = match fs::read(&self.path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(CoreError::io(&self.path)(e)),
        };
        bundle.save(&self.path)?;
        debug!(path = %self.path.display(), "temporary secrets installed");
        Ok(SecretsGuard {
            file: self,
            original,
            restored: false,
        })
    }
}

/// Scoped replacement of the active secrets file.
///
/// Holds the previous bytes (or their absence) and puts them back on
/// [`restore`](Self::restore) or, best effort, on drop.
#[must_use = "dropping the guard immediately restores the previous secrets"]
pub struct SecretsGuard<'a> {
    file: &'a mut ActiveSecretsFile,
    original: Option<Vec<u8>>,
    restored: bool,
}

impl fmt::Debug for SecretsGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsGuard")
            .field("path", &self.file.path)
            .field("had_original", &self.original.is_some())
            .field("restored", &self.restored)
            .finish()
    }
}

impl SecretsGuard<'_> {
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Bundle currently installed.
    pub fn current(&self) -> Result<SecretsBundle, CoreError> {
        self.file.read()
    }

    /// Put the previous content back, reporting failure.
    pub fn restore(mut self) -> Result<(), CoreError> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> Result<(), CoreError> {
        if self.restored {
            return Ok(());
        }
        let path = &self.file.path;
        match &self.original {
            Some(bytes) => write_atomic(path, bytes)?,
            None => match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CoreError::io(path)(e)),
            },
        }
        self.restored = true;
        debug!(path = %path.display(), "secrets file restored");
        Ok(())
    }
}

impl Drop for SecretsGuard<'_> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        warn!(path = %self.file.path.display(), "restoring secrets file on early exit");
        if let Err(e) = self.restore_inner() {
            error!(error = %e, "failed to restore secrets file");
        }
    }
}
