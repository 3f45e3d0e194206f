//! Storage backend trait definition
//!
//! A storage backend is an append-only record log per topic. Offsets are
//! dense, 0-based, and assigned at append time; they never change once
//! assigned. Both the in-memory and SQLite backends implement this trait.

use async_trait::async_trait;

use super::error::StorageError;

/// Longest accepted topic name
pub const MAX_TOPIC_NAME_LEN: usize = 128;

/// Append-only record log keyed by topic name
///
/// Contract:
/// - `create` is idempotent; it only fails on infrastructure faults.
/// - `append` assigns consecutive offsets following the current tail and is
///   all-or-nothing: on any error, nothing was committed.
/// - `read` returns records with offsets >= `offset` in ascending order, up
///   to `limit`, and an empty vec (not an error) past the tail.
/// - Both `append` and `read` fail with [`StorageError::TopicNotFound`] when
///   the topic was never created.
///
/// Backends must be internally thread-safe and serialize appends per topic
/// so offsets stay dense under concurrent producers.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Make the topic exist. Succeeds if it already does.
    async fn create(&self, topic: &str) -> Result<(), StorageError>;

    /// Append records in order, assigning consecutive offsets after the tail.
    async fn append(&self, topic: &str, records: &[Vec<u8>]) -> Result<(), StorageError>;

    /// Read up to `limit` records whose offsets are >= `offset`, ascending.
    async fn read(
        &self,
        topic: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Vec<u8>>, StorageError>;

    /// Health check (validates the backing store is reachable)
    async fn health_check(&self) -> Result<(), StorageError>;

    /// Release backend resources (connection pools). Default: nothing to do.
    async fn close(&self) {}

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}

/// Validate a topic name against the naming constraints shared by all
/// backends: non-empty, bounded, ASCII alphanumeric plus `_` and `-`.
///
/// The SQLite backend splices topic names into table identifiers, so the
/// registry rejects anything outside this alphabet before storage sees it.
pub fn valid_topic_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOPIC_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
