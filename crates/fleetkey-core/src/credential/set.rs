use secrecy::{ExposeSecret, SecretString};

use super::{Blocklist, CredentialKind, Verdict, validate};

/// One value per rotated credential kind.
///
/// Values are held as [`SecretString`] so they never end up in `Debug`
/// output or logs.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    api_key: SecretString,
    ota_password: SecretString,
    fallback_password: SecretString,
}

impl CredentialSet {
    pub fn new(api_key: String, ota_password: String, fallback_password: String) -> Self {
        Self {
            api_key: SecretString::from(api_key),
            ota_password: SecretString::from(ota_password),
            fallback_password: SecretString::from(fallback_password),
        }
    }

    /// Fresh random values for every kind.
    pub fn generate() -> Self {
        Self::new(
            CredentialKind::ApiKey.generate(),
            CredentialKind::OtaPassword.generate(),
            CredentialKind::FallbackPassword.generate(),
        )
    }

    pub fn get(&self, kind: CredentialKind) -> &SecretString {
        match kind {
            CredentialKind::ApiKey => &self.api_key,
            CredentialKind::OtaPassword => &self.ota_password,
            CredentialKind::FallbackPassword => &self.fallback_password,
        }
    }

    /// Exposed value for `kind`.
    pub fn expose(&self, kind: CredentialKind) -> &str {
        self.get(kind).expose_secret()
    }

    /// `(kind, value)` pairs in rotation order.
    pub fn iter(&self) -> impl Iterator<Item = (CredentialKind, &str)> {
        CredentialKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.expose(kind)))
    }

    /// Validate every value; only failing verdicts are returned.
    pub fn failures(&self, blocklist: &Blocklist) -> Vec<Verdict> {
        self.iter()
            .map(|(kind, value)| validate(kind, value, blocklist))
            .filter(|verdict| !verdict.is_valid())
            .collect()
    }
}
