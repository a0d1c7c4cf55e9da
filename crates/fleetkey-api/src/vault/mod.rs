//! Secret vault adapter interface.
//!
//! The vault is an opaque key-value store addressed by `(vault, item, field)`.
//! Rotation only ever needs three things from it: "can I talk to you",
//! "what is this field", and "set this field".

mod keyring;
mod memory;
mod onepassword;

use async_trait::async_trait;

use crate::error::Error;

pub use self::keyring::KeyringVault;
pub use self::memory::MemoryVault;
pub use self::onepassword::OnePasswordCli;

/// Narrow interface to an external secret store.
#[async_trait]
pub trait SecretVault: Send + Sync {
    /// Short backend name for logs and diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Whether the vault is installed, reachable and authenticated.
    async fn check_available(&self) -> bool;

    /// Read a field. `Ok(None)` means the field (or item) does not exist.
    async fn get_field(&self, vault: &str, item: &str, field: &str)
    -> Result<Option<String>, Error>;

    /// Write a field, creating it if needed.
    async fn set_field(&self, vault: &str, item: &str, field: &str, value: &str)
    -> Result<(), Error>;
}
