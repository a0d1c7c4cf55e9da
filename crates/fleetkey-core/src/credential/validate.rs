use std::fmt;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::Serialize;

use super::{Blocklist, CredentialKind};

const API_KEY_LEN: usize = 44;
const API_KEY_BYTES: usize = 32;
const OTA_PASSWORD_LEN: usize = 32;
const FALLBACK_PASSWORD_MIN_LEN: usize = 12;

static API_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9+/]{43}=$").expect("valid regex")
});

/// Closed set of validation outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerdictKind {
    Valid,
    /// Equal to a known-leaked value. Dominates every other check.
    Exposed,
    WrongLength,
    WrongFormat,
}

/// Result of validating one credential value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub credential: CredentialKind,
    pub kind: VerdictKind,
    pub detail: String,
}

impl Verdict {
    fn new(credential: CredentialKind, kind: VerdictKind, detail: impl Into<String>) -> Self {
        Self {
            credential,
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind == VerdictKind::Valid
    }

    /// Command that fixes the problem, if any.
    pub fn remediation(&self) -> Option<String> {
        match self.kind {
            VerdictKind::Valid => None,
            VerdictKind::Exposed => Some("fleetkey rotate --type emergency".into()),
            VerdictKind::WrongLength | VerdictKind::WrongFormat => Some(format!(
                "fleetkey generate {}  (or: {})",
                self.credential.command_name(),
                self.credential.openssl_equivalent()
            )),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// How hard a verdict should be enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    #[default]
    Strict,
    /// Active while old and new credentials coexist during a rotation.
    /// Exposed values and short legacy OTA passwords are tolerated.
    TransitionAllowingOldCredentials,
}

/// What a caller should do with a verdict under a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

impl ValidationPolicy {
    pub fn is_transition(self) -> bool {
        self == Self::TransitionAllowingOldCredentials
    }

    pub fn severity(self, verdict: &Verdict) -> Severity {
        match (self, verdict.kind, verdict.credential) {
            (_, VerdictKind::Valid, _) => Severity::Ok,
            (Self::TransitionAllowingOldCredentials, VerdictKind::Exposed, _)
            | (
                Self::TransitionAllowingOldCredentials,
                VerdictKind::WrongLength,
                CredentialKind::OtaPassword,
            ) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Validate `value` as a credential of `kind`.
///
/// Checks run in a fixed order and stop at the first failure: exposure,
/// then length, then alphabet/encoding.
pub fn validate(kind: CredentialKind, value: &str, blocklist: &Blocklist) -> Verdict {
    if blocklist.contains(kind, value) {
        return Verdict::new(
            kind,
            VerdictKind::Exposed,
            format!("{} is a known exposed credential - must be rotated!", kind.label()),
        );
    }

    match kind {
        CredentialKind::ApiKey => validate_api_key(value),
        CredentialKind::OtaPassword => validate_ota_password(value),
        CredentialKind::FallbackPassword => validate_fallback_password(value),
    }
}

fn validate_api_key(value: &str) -> Verdict {
    let kind = CredentialKind::ApiKey;
    if value.chars().count() != API_KEY_LEN {
        return Verdict::new(
            kind,
            VerdictKind::WrongLength,
            format!("API key must be exactly {API_KEY_LEN} characters"),
        );
    }
    if !API_KEY_PATTERN.is_match(value) {
        return Verdict::new(kind, VerdictKind::WrongFormat, "API key must be valid base64 with padding");
    }
    match STANDARD.decode(value) {
        Ok(bytes) if bytes.len() == API_KEY_BYTES => {
            Verdict::new(kind, VerdictKind::Valid, "API key format is valid")
        }
        _ => Verdict::new(
            kind,
            VerdictKind::WrongFormat,
            format!("API key must be valid base64 encoding {API_KEY_BYTES} bytes"),
        ),
    }
}

fn validate_ota_password(value: &str) -> Verdict {
    let kind = CredentialKind::OtaPassword;
    let all_hex = value.chars().all(|c| c.is_ascii_hexdigit());
    if value.chars().count() != OTA_PASSWORD_LEN {
        let detail = if all_hex {
            format!("OTA password must be exactly {OTA_PASSWORD_LEN} characters")
        } else {
            format!("OTA password must be exactly {OTA_PASSWORD_LEN} hexadecimal characters")
        };
        return Verdict::new(kind, VerdictKind::WrongLength, detail);
    }
    if !all_hex {
        return Verdict::new(kind, VerdictKind::WrongFormat, "OTA password must be hexadecimal only");
    }
    Verdict::new(kind, VerdictKind::Valid, "OTA password format is valid")
}

fn validate_fallback_password(value: &str) -> Verdict {
    let kind = CredentialKind::FallbackPassword;
    if value.chars().count() < FALLBACK_PASSWORD_MIN_LEN {
        return Verdict::new(
            kind,
            VerdictKind::WrongLength,
            format!("Fallback password must be at least {FALLBACK_PASSWORD_MIN_LEN} characters"),
        );
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Verdict::new(
            kind,
            VerdictKind::WrongFormat,
            "Fallback password must be alphanumeric only",
        );
    }
    Verdict::new(kind, VerdictKind::Valid, "Fallback password format is valid")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::credential::{generate_api_key, generate_fallback_password, generate_ota_password};

    fn check(kind: CredentialKind, value: &str) -> Verdict {
        validate(kind, value, &Blocklist::default())
    }

    #[test]
    fn exposed_ota_password_is_rejected() {
        let v = check(CredentialKind::OtaPassword, "5929ccc1f08289c79aca50ebe0a9b7eb");
        assert_eq!(v.kind, VerdictKind::Exposed);
        assert!(v.detail.contains("exposed"));
    }

    #[test]
    fn exposure_dominates_format() {
        // Well-formed in every other respect.
        let v = check(CredentialKind::ApiKey, "rgXTHsxFpWpqZ8keD/h0cPLN6CN2ZznLLyXwh9JgTAk=");
        assert_eq!(v.kind, VerdictKind::Exposed);
        // Malformed as a fallback password (contains '.'), still reported as exposed.
        let v = check(CredentialKind::FallbackPassword, "E4GPbKApzm6Qe.3k");
        assert_eq!(v.kind, VerdictKind::Exposed);
    }

    #[test]
    fn plain_hex_ota_password_is_valid() {
        let v = check(CredentialKind::OtaPassword, "1234567890abcdef1234567890abcdef");
        assert!(v.is_valid(), "{v}");
        assert_eq!(v.remediation(), None);
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let v = check(CredentialKind::OtaPassword, "1234567890ABCDEF1234567890ABCDEF");
        assert!(v.is_valid());
    }

    #[test]
    fn ota_length_messages() {
        let short_hex = check(CredentialKind::OtaPassword, "abcdef");
        assert_eq!(short_hex.kind, VerdictKind::WrongLength);
        assert_eq!(short_hex.detail, "OTA password must be exactly 32 characters");

        let short_text = check(CredentialKind::OtaPassword, "hunter2");
        assert_eq!(short_text.kind, VerdictKind::WrongLength);
        assert!(short_text.detail.contains("32 hexadecimal characters"));

        let right_len_not_hex = check(CredentialKind::OtaPassword, &"z".repeat(32));
        assert_eq!(right_len_not_hex.kind, VerdictKind::WrongFormat);
    }

    #[test]
    fn api_key_checks() {
        assert_eq!(check(CredentialKind::ApiKey, "short=").kind, VerdictKind::WrongLength);
        let no_pad = "A".repeat(44);
        assert_eq!(check(CredentialKind::ApiKey, &no_pad).kind, VerdictKind::WrongFormat);
        let bad_chars = format!("{}=", "!".repeat(43));
        assert_eq!(check(CredentialKind::ApiKey, &bad_chars).kind, VerdictKind::WrongFormat);
    }

    #[test]
    fn fallback_checks() {
        assert_eq!(
            check(CredentialKind::FallbackPassword, "abc").kind,
            VerdictKind::WrongLength
        );
        assert_eq!(
            check(CredentialKind::FallbackPassword, "abcdefghijk+").kind,
            VerdictKind::WrongFormat
        );
        assert!(check(CredentialKind::FallbackPassword, "abcdefghijklmnop").is_valid());
    }

    #[test]
    fn generated_values_validate() {
        let blocklist = Blocklist::default();
        for _ in 0..50 {
            assert!(validate(CredentialKind::ApiKey, &generate_api_key(), &blocklist).is_valid());
            assert!(
                validate(CredentialKind::OtaPassword, &generate_ota_password(), &blocklist)
                    .is_valid()
            );
            let fallback = validate(
                CredentialKind::FallbackPassword,
                &generate_fallback_password(),
                &blocklist,
            );
            assert!(fallback.is_valid());
            assert!(!fallback.detail.contains("exposed"));
        }
    }

    #[test]
    fn validation_is_idempotent() {
        let value = generate_api_key();
        assert_eq!(check(CredentialKind::ApiKey, &value), check(CredentialKind::ApiKey, &value));
    }

    #[test]
    fn injected_blocklist_entry_is_exposed() {
        let value = generate_ota_password();
        let list = Blocklist::default().with(CredentialKind::OtaPassword, value.clone());
        assert_eq!(
            validate(CredentialKind::OtaPassword, &value, &list).kind,
            VerdictKind::Exposed
        );
    }

    #[test]
    fn transition_policy_demotes_exposure_and_short_ota() {
        let transition = ValidationPolicy::TransitionAllowingOldCredentials;
        let strict = ValidationPolicy::Strict;

        let exposed = check(CredentialKind::OtaPassword, "5929ccc1f08289c79aca50ebe0a9b7eb");
        assert_eq!(strict.severity(&exposed), Severity::Error);
        assert_eq!(transition.severity(&exposed), Severity::Warning);

        let short_ota = check(CredentialKind::OtaPassword, "abcdef");
        assert_eq!(strict.severity(&short_ota), Severity::Error);
        assert_eq!(transition.severity(&short_ota), Severity::Warning);

        let short_fallback = check(CredentialKind::FallbackPassword, "abc");
        assert_eq!(transition.severity(&short_fallback), Severity::Error);

        let bad_api = check(CredentialKind::ApiKey, "x");
        assert_eq!(transition.severity(&bad_api), Severity::Error);
    }

    #[test]
    fn remediation_names_generate_command() {
        let v = check(CredentialKind::OtaPassword, "abcdef");
        let hint = v.remediation().unwrap_or_default();
        assert!(hint.contains("fleetkey generate ota-password"), "{hint}");
        assert!(hint.contains("openssl rand -hex 16"), "{hint}");
    }
}
