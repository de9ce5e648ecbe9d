//! # Key/Parameter Cache
//!
//! Durable cache of per-authority public key and public parameter blobs.
//!
//! The cache degrades gracefully: with no durable store in the current
//! environment every lookup is a miss, and a corrupted stored record is
//! treated as a miss rather than an error. Only an explicit `put` of a
//! malformed value fails. One entry per authority, last write wins.

use crate::domain::{Address, CachedKeyMaterial, CachedParams, LedgerError};
use crate::ports::{MaterialStore, RecordGroup};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the cache holds for one authority.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachedMaterial {
    /// Public key material, if cached.
    pub key_material: Option<CachedKeyMaterial>,
    /// Public parameters, if cached.
    pub params: Option<CachedParams>,
}

/// Durable cache of cryptographic material keyed by authority address.
pub struct MaterialCache {
    store: Option<Arc<dyn MaterialStore>>,
}

impl MaterialCache {
    /// Cache backed by the given store.
    pub fn new(store: Arc<dyn MaterialStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Cache for an environment with no durable store (e.g. headless):
    /// every `get` misses and every `put` is a validated no-op.
    pub fn unavailable() -> Self {
        Self { store: None }
    }

    /// Cached material for an authority. Absence of the store, a missing
    /// record, and a corrupted record all read as a miss.
    pub async fn get(&self, authority: Address) -> CachedMaterial {
        let Some(store) = &self.store else {
            debug!(%authority, "no durable store, key material cache miss");
            return CachedMaterial::default();
        };

        let key_material = load_record::<CachedKeyMaterial>(
            store.as_ref(),
            RecordGroup::PublicKey,
            authority,
        )
        .await
        .filter(|k| validate_key_material(k).is_ok());

        let params = load_record::<CachedParams>(
            store.as_ref(),
            RecordGroup::PublicParams,
            authority,
        )
        .await
        .filter(|p| validate_params(p).is_ok());

        CachedMaterial {
            key_material,
            params,
        }
    }

    /// Store material for an authority. Each present value is validated
    /// and written as a whole record; key and id are never split.
    pub async fn put(
        &self,
        authority: Address,
        key_material: Option<CachedKeyMaterial>,
        params: Option<CachedParams>,
    ) -> Result<(), LedgerError> {
        if let Some(k) = &key_material {
            validate_key_material(k)?;
        }
        if let Some(p) = &params {
            validate_params(p)?;
        }

        let Some(store) = &self.store else {
            return Ok(());
        };

        if let Some(k) = key_material {
            store_record(store.as_ref(), RecordGroup::PublicKey, authority, &k).await?;
        }
        if let Some(p) = params {
            store_record(store.as_ref(), RecordGroup::PublicParams, authority, &p).await?;
        }
        Ok(())
    }
}

fn validate_key_material(k: &CachedKeyMaterial) -> Result<(), LedgerError> {
    if k.key_id.is_empty() {
        return Err(LedgerError::Validation("empty key id".to_string()));
    }
    if k.bytes.is_empty() {
        return Err(LedgerError::Validation("empty key bytes".to_string()));
    }
    Ok(())
}

fn validate_params(p: &CachedParams) -> Result<(), LedgerError> {
    if p.params_id.is_empty() {
        return Err(LedgerError::Validation("empty params id".to_string()));
    }
    if p.bytes.is_empty() {
        return Err(LedgerError::Validation("empty params bytes".to_string()));
    }
    Ok(())
}

async fn load_record<T: DeserializeOwned>(
    store: &dyn MaterialStore,
    group: RecordGroup,
    authority: Address,
) -> Option<T> {
    let raw = match store.load(group, authority).await {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(%authority, ?group, "store read failed, treating as miss: {e}");
            return None;
        }
    };
    match bincode::deserialize(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%authority, ?group, "corrupted record, treating as miss: {e}");
            None
        }
    }
}

async fn store_record<T: Serialize>(
    store: &dyn MaterialStore,
    group: RecordGroup,
    authority: Address,
    value: &T,
) -> Result<(), LedgerError> {
    let encoded =
        bincode::serialize(value).map_err(|e| LedgerError::Store(e.to_string()))?;
    store.store(group, authority, encoded).await
}
