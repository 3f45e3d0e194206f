//! Topic broker engine
//!
//! Append-only, offset-addressed topics with push-style subscriptions,
//! backed by a pluggable storage backend:
//! - In-memory (default) - local-only, for development and tests
//! - SQLite - durable, for single-process deployments
//!
//! ## Model
//!
//! Every topic has exactly one live [`Topic`] object for the process
//! lifetime, handed out by the [`TopicService`] registry. Producers append
//! through it; each append fans a coalescing wakeup out to all attached
//! subscribers. A subscriber is a long-lived call that drains the log from
//! its own offset through a bounded read-ahead pipeline and then parks on
//! its wakeup signal until the next append (no polling).
//!
//! Subscribers track their own offsets; the broker delivers each record at
//! most once per subscription and never removes a subscriber for being slow
//! (redundant wakeups coalesce in the one-slot signal).

mod backend;
mod error;
mod memory;
mod pump;
mod sqlite;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use backend::{MAX_TOPIC_NAME_LEN, Storage, valid_topic_name};
pub use error::{BrokerError, DeliverError, StorageError};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use crate::core::config::{StorageBackend, StorageConfig};

// ============================================================================
// TOPIC SERVICE
// ============================================================================

/// Central topic service - the process-wide registry plus the surface the
/// ingress layer calls ([`push`](Self::push), [`subscribe`](Self::subscribe),
/// [`unsubscribe`](Self::unsubscribe)).
///
/// Holds the only name-to-topic mapping; two concurrent lookups of the same
/// name always land on the same [`Topic`] instance.
pub struct TopicService {
    storage: Arc<dyn Storage>,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl TopicService {
    /// Create a topic service over an already-built storage backend
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Create from storage configuration, choosing the backend
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let storage: Arc<dyn Storage> = match config.backend {
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::Sqlite => Arc::new(SqliteStorage::init(&config.db_path).await?),
        };
        Ok(Self::new(storage))
    }

    /// Get the backend name
    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }

    /// Get or create the unique live topic object for `name`
    pub fn topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        if !valid_topic_name(name) {
            return Err(BrokerError::InvalidParams(format!(
                "invalid topic name '{name}'"
            )));
        }

        {
            let topics = self.topics.read();
            if let Some(topic) = topics.get(name) {
                return Ok(Arc::clone(topic));
            }
        }

        let mut topics = self.topics.write();
        // Double-check after acquiring write lock
        if let Some(topic) = topics.get(name) {
            return Ok(Arc::clone(topic));
        }
        let topic = Arc::new(Topic::new(name.to_string(), Arc::clone(&self.storage)));
        let _ = topics.insert(name.to_string(), Arc::clone(&topic));
        tracing::debug!(topic = %name, "topic registered");
        Ok(topic)
    }

    /// Append records to a topic and wake its subscribers
    pub async fn push(
        &self,
        topic: &str,
        auto_create: bool,
        records: Vec<Vec<u8>>,
    ) -> Result<(), BrokerError> {
        self.topic(topic)?.publish(&records, auto_create).await
    }

    /// Attach a subscriber and drive its deliver callback until the
    /// subscription ends. See [`Topic::subscribe`].
    pub async fn subscribe<F, Fut>(
        &self,
        token: CancellationToken,
        topic: &str,
        subscriber: &str,
        start_offset: u64,
        batch_size: usize,
        auto_create: bool,
        deliver: F,
    ) -> Result<(), BrokerError>
    where
        F: FnMut(Vec<Vec<u8>>, u64) -> Fut + Send,
        Fut: Future<Output = Result<(), DeliverError>> + Send,
    {
        self.topic(topic)?
            .subscribe(
                token,
                subscriber,
                start_offset,
                batch_size,
                auto_create,
                deliver,
            )
            .await
    }

    /// Detach a subscriber. A no-op for unknown topics or ids.
    pub fn unsubscribe(&self, topic: &str, subscriber: &str) {
        let topics = self.topics.read();
        if let Some(t) = topics.get(topic) {
            t.unsubscribe(subscriber);
        }
    }

    /// Health check (validates the storage backend)
    pub async fn health_check(&self) -> Result<(), StorageError> {
        self.storage.health_check().await
    }

    /// Release storage resources
    pub async fn close(&self) {
        self.storage.close().await;
    }
}

// ============================================================================
// TOPIC
// ============================================================================

/// Per-topic coordinator: serializes appends through storage, tracks the
/// attached subscribers, and fans wakeups out on every append.
pub struct Topic {
    name: String,
    storage: Arc<dyn Storage>,
    /// Subscriber id to its one-slot wakeup signal. Removing an entry drops
    /// the sender, which is how a subscription learns it was detached.
    subscribers: RwLock<HashMap<String, mpsc::Sender<()>>>,
}

impl Topic {
    fn new(name: String, storage: Arc<dyn Storage>) -> Self {
        Self {
            name,
            storage,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of currently attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Append records, creating the topic first (and retrying the append
    /// once) when it is missing and `auto_create` is set. On success every
    /// attached subscriber gets a non-blocking wakeup; a full slot means a
    /// wakeup is already pending and the signal is dropped.
    pub async fn publish(
        &self,
        records: &[Vec<u8>],
        auto_create: bool,
    ) -> Result<(), BrokerError> {
        match self.storage.append(&self.name, records).await {
            Ok(()) => {}
            Err(StorageError::TopicNotFound(_)) if auto_create => {
                self.storage.create(&self.name).await?;
                self.storage.append(&self.name, records).await?;
            }
            Err(e) => return Err(e.into()),
        }
        self.notify_subscribers();
        Ok(())
    }

    fn notify_subscribers(&self) {
        let subscribers = self.subscribers.read();
        for wakeup in subscribers.values() {
            let _ = wakeup.try_send(());
        }
    }

    /// Attach `subscriber` and run its subscription until it ends.
    ///
    /// The call drains everything at or past `start_offset`, then parks on
    /// the wakeup signal and re-drains after each append. It returns:
    /// - `Ok(())` when [`unsubscribe`](Self::unsubscribe) detaches it,
    /// - `Err(Cancelled)` when `token` is cancelled,
    /// - the error when storage or `deliver` fails (the subscriber is
    ///   removed in every error case).
    pub async fn subscribe<F, Fut>(
        &self,
        token: CancellationToken,
        subscriber: &str,
        start_offset: u64,
        batch_size: usize,
        auto_create: bool,
        mut deliver: F,
    ) -> Result<(), BrokerError>
    where
        F: FnMut(Vec<Vec<u8>>, u64) -> Fut + Send,
        Fut: Future<Output = Result<(), DeliverError>> + Send,
    {
        if subscriber.is_empty() {
            return Err(BrokerError::InvalidParams(
                "subscriber id is empty".to_string(),
            ));
        }
        if batch_size < 1 {
            return Err(BrokerError::InvalidParams(
                "batch_size must be >= 1".to_string(),
            ));
        }

        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        // Weak handle for identifying our own registration on the error
        // path; the map must hold the only strong sender so that removal
        // closes the channel.
        let wake_ref = wake_tx.downgrade();
        {
            let mut subscribers = self.subscribers.write();
            if subscribers.contains_key(subscriber) {
                return Err(BrokerError::SubscriberExists(subscriber.to_string()));
            }
            let _ = subscribers.insert(subscriber.to_string(), wake_tx);
        }
        tracing::debug!(topic = %self.name, subscriber = %subscriber, offset = start_offset, "subscriber attached");

        let mut offset = start_offset;
        let result = self
            .run_subscription(
                &token,
                &mut wake_rx,
                &mut offset,
                batch_size,
                auto_create,
                &mut deliver,
            )
            .await;

        match &result {
            // Clean detach: unsubscribe already removed the entry.
            Ok(()) => {
                tracing::debug!(topic = %self.name, subscriber = %subscriber, "subscriber detached")
            }
            Err(e) => {
                self.remove_if_current(subscriber, &wake_ref);
                tracing::debug!(topic = %self.name, subscriber = %subscriber, error = %e, "subscription ended");
            }
        }
        result
    }

    async fn run_subscription<F, Fut>(
        &self,
        token: &CancellationToken,
        wake_rx: &mut mpsc::Receiver<()>,
        offset: &mut u64,
        batch_size: usize,
        auto_create: bool,
        deliver: &mut F,
    ) -> Result<(), BrokerError>
    where
        F: FnMut(Vec<Vec<u8>>, u64) -> Fut + Send,
        Fut: Future<Output = Result<(), DeliverError>> + Send,
    {
        // Initial drain of everything already in the log
        pump::drain(
            &self.storage,
            &self.name,
            token,
            offset,
            batch_size,
            auto_create,
            deliver,
        )
        .await?;

        loop {
            let signal = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(BrokerError::Cancelled),
                signal = wake_rx.recv() => signal,
            };
            match signal {
                // Wakeup signal closed: unsubscribed
                None => return Ok(()),
                Some(()) => {
                    pump::drain(
                        &self.storage,
                        &self.name,
                        token,
                        offset,
                        batch_size,
                        auto_create,
                        deliver,
                    )
                    .await?;
                }
            }
        }
    }

    /// Detach a subscriber by dropping its wakeup sender under the write
    /// lock, so no append can signal it afterwards. Idempotent.
    pub fn unsubscribe(&self, subscriber: &str) {
        let mut subscribers = self.subscribers.write();
        if subscribers.remove(subscriber).is_some() {
            tracing::debug!(topic = %self.name, subscriber = %subscriber, "unsubscribe");
        }
    }

    /// Remove our own registration on an error exit, but only if the map
    /// still holds our channel (the id may have been re-registered after an
    /// unsubscribe raced the failure). The upgrade fails once unsubscribe
    /// has dropped the map's sender, which is exactly the stale case.
    fn remove_if_current(&self, subscriber: &str, ours: &mpsc::WeakSender<()>) {
        let Some(ours) = ours.upgrade() else { return };
        let mut subscribers = self.subscribers.write();
        let is_ours = subscribers
            .get(subscriber)
            .is_some_and(|current| current.same_channel(&ours));
        if is_ours {
            let _ = subscribers.remove(subscriber);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
