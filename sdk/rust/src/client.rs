//! HTTP client for the relaymq broker

use std::sync::Arc;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::offset::{MemoryOffsetStore, OffsetStore};

/// One batch as framed on the subscribe stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubMessage {
    pub start_offset: u64,
    pub data: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PushBody<'a> {
    body: &'a [String],
    auto_create: bool,
}

#[derive(Debug, Deserialize)]
struct EnvelopeBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Broker client
///
/// Cheap to construct; holds a connection-pooling `reqwest::Client` inside.
pub struct Client {
    endpoint: String,
    http: reqwest::Client,
    offsets: Arc<dyn OffsetStore>,
}

impl Client {
    /// Client with in-memory offset persistence
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_offset_store(endpoint, Arc::new(MemoryOffsetStore::new()))
    }

    /// Client with a custom offset store
    pub fn with_offset_store(endpoint: impl Into<String>, offsets: Arc<dyn OffsetStore>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            endpoint,
            http: reqwest::Client::new(),
            offsets,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Append records to `topic`, creating the topic on first use
    pub async fn push(&self, topic: &str, records: &[String]) -> Result<(), ClientError> {
        let url = format!("{}/{}/push", self.endpoint, topic);
        let resp = self
            .http
            .post(&url)
            .json(&PushBody {
                body: records,
                auto_create: true,
            })
            .send()
            .await?;
        let envelope: EnvelopeBody = resp.json().await?;
        if envelope.code != "ok" {
            return Err(ClientError::Broker {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(())
    }

    /// Follow `topic` from the persisted offset, invoking `handler` once per
    /// delivered batch.
    ///
    /// The handler returns the offset to persist, normally
    /// `start_offset + data.len() as u64`; returning a smaller value means
    /// those records are seen again on the next subscribe. A handler error
    /// stops the stream and is returned.
    ///
    /// Returns `Ok(())` when the broker closes the stream (unsubscribe or
    /// shutdown); callers that want an endless subscription re-invoke this
    /// in a loop.
    pub async fn subscribe<H>(
        &self,
        topic: &str,
        subscriber: &str,
        mut handler: H,
    ) -> Result<(), ClientError>
    where
        H: FnMut(SubMessage) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>,
    {
        let offset = self.offsets.get(topic).await?;
        tracing::debug!(topic, subscriber, offset, "subscribing");

        let url = format!("{}/{}/subscribe", self.endpoint, topic);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("subscriber", subscriber),
                ("offset", &offset.to_string()),
                ("auto_create", "true"),
            ])
            .send()
            .await?;

        let mut stream = resp.bytes_stream().eventsource();
        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| ClientError::Decode(e.to_string()))?;
            match event.event.as_str() {
                "message" => {
                    let msg: SubMessage = serde_json::from_str(&event.data)
                        .map_err(|e| ClientError::Decode(e.to_string()))?;
                    let next = handler(msg).map_err(ClientError::Handler)?;
                    self.offsets.set(topic, next).await?;
                }
                "error" => {
                    return Err(ClientError::Broker {
                        code: "error".to_string(),
                        message: event.data,
                    });
                }
                // Broker is going away; the caller decides when to reconnect
                "terminate" => return Ok(()),
                other => {
                    tracing::trace!(event = other, "ignoring event");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        let client = Client::new("http://localhost:7070/");
        assert_eq!(client.endpoint(), "http://localhost:7070");
    }

    #[test]
    fn test_sub_message_wire_shape() {
        let msg: SubMessage =
            serde_json::from_str(r#"{"start_offset": 3, "data": ["a", "b"]}"#).unwrap();
        assert_eq!(msg.start_offset, 3);
        assert_eq!(msg.data, vec!["a", "b"]);

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["start_offset"], 3);
    }

    #[test]
    fn test_push_body_wire_shape() {
        let records = vec!["x".to_string()];
        let body = PushBody {
            body: &records,
            auto_create: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["body"][0], "x");
        assert_eq!(json["auto_create"], true);
    }
}
