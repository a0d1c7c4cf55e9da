// Credential access on top of the raw vault adapter.
//
// `SecretVault` only knows fields; this maps credential kinds and WiFi
// settings onto the items named by a `VaultLayout`.

use fleetkey_api::SecretVault;
use tracing::debug;

use crate::config::VaultLayout;
use crate::credential::{CredentialKind, CredentialSet};
use crate::error::CoreError;
use crate::secrets::{SecretsBundle, WifiCredentials};

/// Typed view of the fleet's vault items.
pub struct VaultCredentials<'a> {
    vault: &'a dyn SecretVault,
    layout: &'a VaultLayout,
}

impl<'a> VaultCredentials<'a> {
    pub fn new(vault: &'a dyn SecretVault, layout: &'a VaultLayout) -> Self {
        Self { vault, layout }
    }

    pub fn backend_name(&self) -> &'static str {
        self.vault.backend_name()
    }

    pub async fn check_available(&self) -> bool {
        self.vault.check_available().await
    }

    /// Current value of one credential, if stored.
    pub async fn credential(&self, kind: CredentialKind) -> Result<Option<String>, CoreError> {
        Ok(self
            .vault
            .get_field(
                &self.layout.device_vault,
                &self.layout.device_item,
                kind.field_name(),
            )
            .await?)
    }

    /// Current values of every credential; all must be present.
    pub async fn credentials(&self) -> Result<CredentialSet, CoreError> {
        let api_key = self.require(CredentialKind::ApiKey).await?;
        let ota_password = self.require(CredentialKind::OtaPassword).await?;
        let fallback_password = self.require(CredentialKind::FallbackPassword).await?;
        Ok(CredentialSet::new(api_key, ota_password, fallback_password))
    }

    /// Write every credential, then read each back and compare.
    pub async fn store(&self, set: &CredentialSet) -> Result<(), CoreError> {
        for (kind, value) in set.iter() {
            self.vault
                .set_field(
                    &self.layout.device_vault,
                    &self.layout.device_item,
                    kind.field_name(),
                    value,
                )
                .await?;
            debug!(field = kind.field_name(), "vault field written");
        }
        for (kind, value) in set.iter() {
            match self.credential(kind).await? {
                Some(stored) if stored == value => {}
                _ => {
                    return Err(CoreError::VaultMismatch {
                        field: kind.field_name().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// SSID and password are required; the domain is optional.
    pub async fn wifi(&self) -> Result<WifiCredentials, CoreError> {
        let layout = self.layout;
        let domain = self
            .vault
            .get_field(&layout.wifi_vault, &layout.wifi_item, &layout.wifi_domain_field)
            .await?
            .unwrap_or_default();
        Ok(WifiCredentials {
            ssid: self.wifi_field(&layout.wifi_ssid_field).await?,
            password: self.wifi_field(&layout.wifi_password_field).await?,
            domain,
        })
    }

    /// The secrets bundle the vault currently describes.
    pub async fn bundle(&self) -> Result<SecretsBundle, CoreError> {
        let wifi = self.wifi().await?;
        let set = self.credentials().await?;
        let mut bundle = SecretsBundle::new();
        bundle.set_wifi(&wifi);
        for (kind, value) in set.iter() {
            bundle.set_credential(kind, value);
        }
        Ok(bundle)
    }

    async fn require(&self, kind: CredentialKind) -> Result<String, CoreError> {
        self.credential(kind)
            .await?
            .ok_or_else(|| CoreError::VaultFieldMissing {
                vault: self.layout.device_vault.clone(),
                item: self.layout.device_item.clone(),
                field: kind.field_name().to_owned(),
            })
    }

    async fn wifi_field(&self, field: &str) -> Result<String, CoreError> {
        self.vault
            .get_field(&self.layout.wifi_vault, &self.layout.wifi_item, field)
            .await?
            .ok_or_else(|| CoreError::VaultFieldMissing {
                vault: self.layout.wifi_vault.clone(),
                item: self.layout.wifi_item.clone(),
                field: field.to_owned(),
            })
    }
}
