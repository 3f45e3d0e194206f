//! Data layer
//!
//! The topic broker engine and its storage backends:
//! - `topics` - topic registry, per-topic coordination, subscriptions, and
//!   the pluggable record-log backends (memory, SQLite)

pub mod topics;

pub use topics::{BrokerError, StorageError, TopicService};
