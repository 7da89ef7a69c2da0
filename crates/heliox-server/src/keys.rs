//! Key administration that keeps the credential cache coherent

use std::sync::Arc;

use heliox_auth::CredentialResolver;
use heliox_core::{ApiKey, IssuedKey, KeyStatus, MemoryCatalog, StoreError};
use uuid::Uuid;

/// Mutates keys in the catalog and drops their cached resolutions
///
/// Changes made through this handle apply to the next request instead of
/// waiting out the credential cache TTL.
#[derive(Debug, Clone)]
pub struct KeyAdmin {
    catalog: Arc<MemoryCatalog>,
    resolver: Arc<CredentialResolver>,
}

impl KeyAdmin {
    pub(crate) const fn new(catalog: Arc<MemoryCatalog>, resolver: Arc<CredentialResolver>) -> Self {
        Self { catalog, resolver }
    }

    /// Enable or disable a key
    pub fn set_status(&self, key_id: Uuid, status: KeyStatus) -> Result<ApiKey, StoreError> {
        let key = self.catalog.set_key_status(key_id, status)?;
        self.resolver.invalidate_key(key_id);
        tracing::info!(%key_id, ?status, "api key status changed");
        Ok(key)
    }

    /// Replace a key's secret; the old secret stops working immediately
    pub fn rotate(&self, key_id: Uuid) -> Result<IssuedKey, StoreError> {
        let issued = self.catalog.rotate_key(key_id)?;
        self.resolver.invalidate_key(key_id);
        tracing::info!(%key_id, prefix = %issued.key.key_prefix, "api key rotated");
        Ok(issued)
    }

    pub fn delete(&self, key_id: Uuid) -> Result<ApiKey, StoreError> {
        let key = self.catalog.delete_key(key_id)?;
        self.resolver.invalidate_key(key_id);
        tracing::info!(%key_id, "api key deleted");
        Ok(key)
    }
}
