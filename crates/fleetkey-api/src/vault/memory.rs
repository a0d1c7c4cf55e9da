// In-process vault
//
// Backs dry runs and tests. Values live in a `BTreeMap` keyed by
// `(vault, item, field)`; availability and write failures can be toggled
// to exercise the unhappy paths of a rotation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::SecretVault;
use crate::error::Error;

type FieldKey = (String, String, String);

/// Vault whose contents live in memory for the lifetime of the value.
#[derive(Debug, Default)]
pub struct MemoryVault {
    fields: Mutex<BTreeMap<FieldKey, String>>,
    unavailable: AtomicBool,
    reject_writes: AtomicBool,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a field, builder style.
    pub fn with_field(self, vault: &str, item: &str, field: &str, value: &str) -> Self {
        self.insert(vault, item, field, value);
        self
    }

    pub fn insert(&self, vault: &str, item: &str, field: &str, value: &str) {
        self.lock()
            .insert(key(vault, item, field), value.to_owned());
    }

    pub fn remove(&self, vault: &str, item: &str, field: &str) -> Option<String> {
        self.lock().remove(&key(vault, item, field))
    }

    /// Current value of a field, bypassing the async interface.
    pub fn peek(&self, vault: &str, item: &str, field: &str) -> Option<String> {
        self.lock().get(&key(vault, item, field)).cloned()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make every subsequent `set_field` fail.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<FieldKey, String>> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(vault: &str, item: &str, field: &str) -> FieldKey {
    (vault.to_owned(), item.to_owned(), field.to_owned())
}

#[async_trait]
impl SecretVault for MemoryVault {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn check_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn get_field(
        &self,
        vault: &str,
        item: &str,
        field: &str,
    ) -> Result<Option<String>, Error> {
        Ok(self.peek(vault, item, field))
    }

    async fn set_field(
        &self,
        vault: &str,
        item: &str,
        field: &str,
        value: &str,
    ) -> Result<(), Error> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(Error::Vault {
                message: format!("write to {vault}/{item}/{field} rejected"),
            });
        }
        self.insert(vault, item, field, value);
        Ok(())
    }
}
