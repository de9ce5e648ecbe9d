//! In-Memory Material Store Adapter
//!
//! Implements the `MaterialStore` port with two in-process maps. The
//! process-wide instance is created lazily on first access and lives
//! until process exit; callers reach it only through the cache component.

use crate::domain::{Address, LedgerError};
use crate::ports::{MaterialStore, RecordGroup};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

static SHARED: OnceLock<Arc<MemoryMaterialStore>> = OnceLock::new();

/// In-memory keyed store with one map per record group.
#[derive(Debug, Default)]
pub struct MemoryMaterialStore {
    keys: Mutex<HashMap<Address, Vec<u8>>>,
    params: Mutex<HashMap<Address, Vec<u8>>>,
}

impl MemoryMaterialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store, opened on first access.
    pub fn shared() -> Arc<MemoryMaterialStore> {
        SHARED
            .get_or_init(|| Arc::new(MemoryMaterialStore::new()))
            .clone()
    }

    fn group(&self, group: RecordGroup) -> &Mutex<HashMap<Address, Vec<u8>>> {
        match group {
            RecordGroup::PublicKey => &self.keys,
            RecordGroup::PublicParams => &self.params,
        }
    }
}

#[async_trait]
impl MaterialStore for MemoryMaterialStore {
    async fn load(
        &self,
        group: RecordGroup,
        authority: Address,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self
            .group(group)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&authority)
            .cloned())
    }

    async fn store(
        &self,
        group: RecordGroup,
        authority: Address,
        record: Vec<u8>,
    ) -> Result<(), LedgerError> {
        self.group(group)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(authority, record);
        Ok(())
    }
}
