//! In-process store backend

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CachedEntry, PartitionName, RequestKey, Store, StoreResult};

type Partition = HashMap<RequestKey, CachedEntry>;

/// Store kept entirely in memory; contents vanish with the process
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    partitions: Arc<RwLock<HashMap<String, Partition>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a partition, `None` if it does not exist
    pub async fn len(&self, partition: &PartitionName) -> Option<usize> {
        self.partitions
            .read()
            .await
            .get(&partition.to_string())
            .map(HashMap::len)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn open(&self, partition: &PartitionName) -> StoreResult<()> {
        self.partitions
            .write()
            .await
            .entry(partition.to_string())
            .or_default();
        Ok(())
    }

    async fn get(
        &self,
        partition: &PartitionName,
        key: &RequestKey,
    ) -> StoreResult<Option<CachedEntry>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&partition.to_string())
            .and_then(|p| p.get(key))
            .cloned())
    }

    async fn put(
        &self,
        partition: &PartitionName,
        key: &RequestKey,
        entry: CachedEntry,
    ) -> StoreResult<()> {
        self.partitions
            .write()
            .await
            .entry(partition.to_string())
            .or_default()
            .insert(key.clone(), entry);
        Ok(())
    }

    async fn list_partitions(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.partitions.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> StoreResult<bool> {
        Ok(self.partitions.write().await.remove(name).is_some())
    }
}
