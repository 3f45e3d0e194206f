//! # RelayMQ client
//!
//! Client for the relaymq broker: push records to named topics and follow
//! topics as server-sent event streams from any offset, with pluggable
//! read-offset persistence so a subscriber resumes where it left off.
//!
//! ## Quick start
//!
//! ```no_run
//! use relaymq::Client;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new("http://127.0.0.1:7070");
//! client.push("orders", &["hello".to_string()]).await?;
//!
//! client
//!     .subscribe("orders", "worker-1", |msg| {
//!         for (i, record) in msg.data.iter().enumerate() {
//!             println!("offset {}: {}", msg.start_offset + i as u64, record);
//!         }
//!         Ok(msg.start_offset + msg.data.len() as u64)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod offset;

pub use client::{Client, SubMessage};
pub use error::ClientError;
pub use offset::{MemoryOffsetStore, OffsetStore};
