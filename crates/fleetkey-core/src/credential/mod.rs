//! Device credentials: the three rotated kinds, their generators, the
//! known-exposed blocklist, and format validation.

mod blocklist;
mod generate;
mod set;
mod validate;
mod wifi;

use serde::{Deserialize, Serialize};

pub use blocklist::Blocklist;
pub use generate::{generate_api_key, generate_fallback_password, generate_ota_password};
pub use set::CredentialSet;
pub use validate::{Severity, ValidationPolicy, Verdict, VerdictKind, validate};
pub use wifi::validate_wifi;

/// One of the credential kinds embedded in device firmware and rotated
/// together.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CredentialKind {
    /// Native API encryption key: 32 random bytes, padded base64.
    ApiKey,
    /// OTA update password: 16 random bytes, hex.
    OtaPassword,
    /// Fallback hotspot password: 12 alphanumeric characters.
    FallbackPassword,
}

impl CredentialKind {
    pub const ALL: [Self; 3] = [Self::ApiKey, Self::OtaPassword, Self::FallbackPassword];

    /// Key used in the secrets file and the vault item.
    pub fn field_name(self) -> &'static str {
        self.into()
    }

    /// Human label for messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::ApiKey => "API key",
            Self::OtaPassword => "OTA password",
            Self::FallbackPassword => "Fallback password",
        }
    }

    /// Argument accepted by `fleetkey generate`.
    pub fn command_name(self) -> &'static str {
        match self {
            Self::ApiKey => "api-key",
            Self::OtaPassword => "ota-password",
            Self::FallbackPassword => "fallback-password",
        }
    }

    /// Produce a fresh value of this kind.
    pub fn generate(self) -> String {
        match self {
            Self::ApiKey => generate_api_key(),
            Self::OtaPassword => generate_ota_password(),
            Self::FallbackPassword => generate_fallback_password(),
        }
    }

    /// Expected shape, shown alongside format errors.
    pub fn expectation(self) -> &'static str {
        match self {
            Self::ApiKey => "44 characters, base64 encoded, ending with =",
            Self::OtaPassword => "32 characters, hexadecimal only",
            Self::FallbackPassword => "at least 12 characters, alphanumeric only",
        }
    }

    /// Equivalent shell command for operators without fleetkey at hand.
    pub fn openssl_equivalent(self) -> &'static str {
        match self {
            Self::ApiKey => "openssl rand -base64 32",
            Self::OtaPassword => "openssl rand -hex 16",
            Self::FallbackPassword => "openssl rand -base64 12 | tr -d '=+/' | cut -c1-12",
        }
    }
}
