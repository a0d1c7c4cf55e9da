// System keyring backend
//
// Stores each field as its own keyring entry under one service name, with
// the account string `<vault>/<item>/<field>`. Useful on workstations
// without a 1Password subscription; the keyring calls are synchronous but
// short, so they run inline.

use async_trait::async_trait;
use tracing::debug;

use super::SecretVault;
use crate::error::Error;

const DEFAULT_SERVICE: &str = "fleetkey";

/// Vault backed by the platform keyring (Keychain, Credential Manager,
/// Secret Service).
#[derive(Debug, Clone)]
pub struct KeyringVault {
    service: String,
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl KeyringVault {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, vault: &str, item: &str, field: &str) -> Result<keyring::Entry, Error> {
        Ok(keyring::Entry::new(
            &self.service,
            &format!("{vault}/{item}/{field}"),
        )?)
    }
}

#[async_trait]
impl SecretVault for KeyringVault {
    fn backend_name(&self) -> &'static str {
        "keyring"
    }

    async fn check_available(&self) -> bool {
        let probe = match self.entry("fleetkey", "probe", "availability") {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "keyring entry could not be created");
                return false;
            }
        };
        match probe.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => true,
            Err(e) => {
                debug!(error = %e, "keyring not accessible");
                false
            }
        }
    }

    async fn get_field(
        &self,
        vault: &str,
        item: &str,
        field: &str,
    ) -> Result<Option<String>, Error> {
        match self.entry(vault, item, field)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_field(
        &self,
        vault: &str,
        item: &str,
        field: &str,
        value: &str,
    ) -> Result<(), Error> {
        self.entry(vault, item, field)?.set_password(value)?;
        Ok(())
    }
}
