//! In-memory storage backend
//!
//! A map from topic name to an ordered record log, protected by a
//! reader-writer lock. Offsets are the log indices, so density and
//! monotonicity fall out of `Vec` semantics. Suitable for development,
//! tests, and single-process deployments without durability needs.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::backend::Storage;
use super::error::StorageError;

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Vec<Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create(&self, topic: &str) -> Result<(), StorageError> {
        let mut data = self.data.write();
        data.entry(topic.to_string()).or_default();
        Ok(())
    }

    async fn append(&self, topic: &str, records: &[Vec<u8>]) -> Result<(), StorageError> {
        // The write lock covers tail-measure and insert, keeping offsets dense.
        let mut data = self.data.write();
        let log = data
            .get_mut(topic)
            .ok_or_else(|| StorageError::TopicNotFound(topic.to_string()))?;
        log.extend(records.iter().cloned());
        Ok(())
    }

    async fn read(
        &self,
        topic: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        let data = self.data.read();
        let log = data
            .get(topic)
            .ok_or_else(|| StorageError::TopicNotFound(topic.to_string()))?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start >= log.len() {
            return Ok(Vec::new());
        }
        let end = start.saturating_add(usize::try_from(limit).unwrap_or(usize::MAX));
        let end = end.min(log.len());
        Ok(log[start..end].to_vec())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
