//! Broker and storage error types

use thiserror::Error;

/// Boxed error returned by a subscriber's deliver callback
pub type DeliverError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    /// Topic has no backing log yet
    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    /// Any other backend fault (I/O, schema, connection)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Error type for broker operations
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    /// Subscribe with an id already registered on the same topic
    #[error("subscriber '{0}' already registered")]
    SubscriberExists(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("storage: {0}")]
    Storage(StorageError),

    /// Non-nil return from the consumer callback
    #[error("deliver: {0}")]
    Deliver(#[source] DeliverError),

    /// Subscription context was cancelled
    #[error("cancelled")]
    Cancelled,

    #[error("internal: {0}")]
    Internal(String),
}

impl From<StorageError> for BrokerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TopicNotFound(name) => BrokerError::TopicNotFound(name),
            other => BrokerError::Storage(other),
        }
    }
}
