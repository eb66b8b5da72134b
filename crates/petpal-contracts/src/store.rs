//! Contract record persistence
//!
//! `ContractStore` is the store of record. `CachedContractStore` is a
//! projection over it: it never accepts a write of its own and never answers
//! a load without asking the store of record.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::contract::GeneratedContract;

#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Insert or replace the whole record in one write.
    async fn save(&self, contract: &GeneratedContract) -> Result<()>;

    async fn load(&self, id: Uuid) -> Result<Option<GeneratedContract>>;

    /// Every record, most recently created first.
    async fn list(&self) -> Result<Vec<GeneratedContract>>;
}

pub(crate) fn sort_newest_first(contracts: &mut [GeneratedContract]) {
    contracts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// In-memory ContractStore.
pub struct MemoryContractStore {
    inner: RwLock<HashMap<Uuid, GeneratedContract>>,
}

impl MemoryContractStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryContractStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContractStore for MemoryContractStore {
    async fn save(&self, contract: &GeneratedContract) -> Result<()> {
        let mut store = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        store.insert(contract.id, contract.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<GeneratedContract>> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(store.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<GeneratedContract>> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let mut all: Vec<_> = store.values().cloned().collect();
        sort_newest_first(&mut all);
        Ok(all)
    }
}

/// Projection kept in step with a store of record.
///
/// Reads and writes both go to the store of record; the projection only
/// remembers what it returned, so a row changed behind this process is seen
/// on the next load. A failed write leaves the projection untouched and the
/// error is returned as-is.
pub struct CachedContractStore {
    store: Arc<dyn ContractStore>,
    cache: RwLock<HashMap<Uuid, GeneratedContract>>,
}

impl CachedContractStore {
    pub fn new(store: Arc<dyn ContractStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn invalidate(&self, id: Uuid) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&id);
        }
    }

    fn remember(&self, contract: &GeneratedContract) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(contract.id, contract.clone());
        }
    }
}

#[async_trait]
impl ContractStore for CachedContractStore {
    async fn save(&self, contract: &GeneratedContract) -> Result<()> {
        self.store.save(contract).await?;

        match self.store.load(contract.id).await {
            Ok(Some(stored)) => self.remember(&stored),
            Ok(None) => self.invalidate(contract.id),
            Err(e) => {
                tracing::warn!(contract = %contract.id, "cache refresh after save failed: {e:#}");
                self.invalidate(contract.id);
            }
        }
        Ok(())
    }

    /// Always served by the store of record; the projection follows it.
    async fn load(&self, id: Uuid) -> Result<Option<GeneratedContract>> {
        let loaded = self.store.load(id).await?;
        match &loaded {
            Some(contract) => self.remember(contract),
            None => self.invalidate(id),
        }
        Ok(loaded)
    }

    async fn list(&self) -> Result<Vec<GeneratedContract>> {
        let all = self.store.list().await?;
        let mut cache = self.cache.write().map_err(|e| anyhow!("Lock: {}", e))?;
        cache.clear();
        cache.extend(all.iter().map(|c| (c.id, c.clone())));
        Ok(all)
    }
}
