//! Subscriber read-offset persistence
//!
//! The broker does not track consumer positions; each subscriber persists
//! the offset it has consumed up to and resumes from it on reconnect.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ClientError;

/// Pluggable store for per-topic read offsets
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Last persisted offset for `topic`. Topics never seen read as 0.
    async fn get(&self, topic: &str) -> Result<u64, ClientError>;

    /// Persist the offset to resume `topic` from
    async fn set(&self, topic: &str, offset: u64) -> Result<(), ClientError>;
}

/// In-memory offset store. Positions are lost on restart, so a subscriber
/// using it re-reads the topic from 0.
#[derive(Default)]
pub struct MemoryOffsetStore {
    data: RwLock<HashMap<String, u64>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn get(&self, topic: &str) -> Result<u64, ClientError> {
        Ok(self.data.read().get(topic).copied().unwrap_or(0))
    }

    async fn set(&self, topic: &str, offset: u64) -> Result<(), ClientError> {
        let _ = self.data.write().insert(topic.to_string(), offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_topic_reads_zero() {
        let store = MemoryOffsetStore::new();
        assert_eq!(store.get("never-seen").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryOffsetStore::new();
        store.set("t", 42).await.unwrap();
        assert_eq!(store.get("t").await.unwrap(), 42);

        store.set("t", 43).await.unwrap();
        assert_eq!(store.get("t").await.unwrap(), 43);
    }

    #[tokio::test]
    async fn test_topics_are_independent() {
        let store = MemoryOffsetStore::new();
        store.set("a", 7).await.unwrap();
        assert_eq!(store.get("b").await.unwrap(), 0);
    }
}
