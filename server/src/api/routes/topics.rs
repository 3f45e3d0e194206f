//! Topic push, subscribe, and unsubscribe endpoints
//!
//! `subscribe` answers with a server-sent event stream: one event per
//! delivered batch, payload `{"start_offset": <u64>, "data": [string, ...]}`.
//! The stream stays open until the client disconnects, the subscriber is
//! unsubscribed, or the server shuts down.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::api::types::{ApiError, Envelope};
use crate::core::constants::{DEFAULT_BATCH_SIZE, SSE_BRIDGE_CAPACITY, SSE_KEEP_ALIVE_SECS};
use crate::data::topics::{DeliverError, TopicService};

/// Shared state for topic endpoints
#[derive(Clone)]
pub struct TopicsApiState {
    pub topics: Arc<TopicService>,
    pub shutdown_rx: watch::Receiver<bool>,
}

// ============================================================================
// PUSH
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub body: Vec<String>,
    #[serde(default)]
    pub auto_create: bool,
}

/// `POST /{topic}/push` - append records to a topic
pub async fn push(
    State(state): State<TopicsApiState>,
    Path(topic): Path<String>,
    Json(req): Json<PushRequest>,
) -> Result<Json<Envelope>, ApiError> {
    let records: Vec<Vec<u8>> = req.body.into_iter().map(String::into_bytes).collect();
    state.topics.push(&topic, req.auto_create, records).await?;
    Ok(Json(Envelope::ok()))
}

// ============================================================================
// UNSUBSCRIBE
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub subscriber: String,
}

/// `POST /{topic}/unsubscribe` - detach a subscriber. Idempotent.
pub async fn unsubscribe(
    State(state): State<TopicsApiState>,
    Path(topic): Path<String>,
    Json(req): Json<UnsubscribeRequest>,
) -> Json<Envelope> {
    state.topics.unsubscribe(&topic, &req.subscriber);
    Json(Envelope::ok())
}

// ============================================================================
// SUBSCRIBE (SSE)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    pub subscriber: String,
    #[serde(default)]
    pub offset: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub auto_create: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Serialize)]
struct SubscribeEvent {
    start_offset: u64,
    data: Vec<String>,
}

/// `GET|POST /{topic}/subscribe` - follow a topic as an SSE stream
///
/// The subscription runs in its own task; batches cross a one-slot channel
/// into the event stream, so SSE flush latency paces the read-pump. Dropping
/// the response (client gone) cancels the task, which detaches the
/// subscriber.
pub async fn subscribe(
    State(state): State<TopicsApiState>,
    Path(topic): Path<String>,
    Query(query): Query<SubscribeQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::channel::<SubscribeEvent>(SSE_BRIDGE_CAPACITY);
    let token = CancellationToken::new();
    let mut shutdown_rx = state.shutdown_rx.clone();

    let task_token = token.clone();
    let topics = Arc::clone(&state.topics);
    let handle = tokio::spawn(async move {
        topics
            .subscribe(
                task_token,
                &topic,
                &query.subscriber,
                query.offset,
                query.batch_size,
                query.auto_create,
                move |records, start_offset| {
                    let tx = tx.clone();
                    async move {
                        let event = SubscribeEvent {
                            start_offset,
                            data: records
                                .iter()
                                .map(|r| String::from_utf8_lossy(r).into_owned())
                                .collect(),
                        };
                        tx.send(event)
                            .await
                            .map_err(|_| DeliverError::from("subscriber stream closed"))
                    }
                },
            )
            .await
    });

    let stream = async_stream::stream! {
        // Cancels the subscription task when the response is dropped
        let _cancel_on_drop = token.drop_guard();
        let mut handle = Some(handle);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        // Notify client before closing so it can reconnect
                        yield Ok(Event::default().event("terminate").data("shutdown"));
                        break;
                    }
                }
                batch = rx.recv() => {
                    match batch {
                        Some(event) => {
                            match serde_json::to_string(&event) {
                                Ok(data) => yield Ok(Event::default().data(data)),
                                Err(e) => {
                                    tracing::error!(error = %e, "Failed to serialize subscribe event");
                                }
                            }
                        }
                        None => {
                            // Subscription ended; surface the reason if it failed
                            if let Some(handle) = handle.take() {
                                match handle.await {
                                    Ok(Ok(())) => {}
                                    Ok(Err(e)) => {
                                        yield Ok(Event::default().event("error").data(e.to_string()));
                                    }
                                    Err(e) => {
                                        tracing::error!(error = %e, "subscription task failed");
                                    }
                                }
                            }
                            break;
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_request_auto_create_defaults_off() {
        let req: PushRequest = serde_json::from_str(r#"{"body": ["a", "b"]}"#).unwrap();
        assert_eq!(req.body, vec!["a", "b"]);
        assert!(!req.auto_create);
    }

    #[test]
    fn test_subscribe_query_defaults() {
        let query: SubscribeQuery = serde_json::from_str(r#"{"subscriber": "s1"}"#).unwrap();
        assert_eq!(query.subscriber, "s1");
        assert_eq!(query.offset, 0);
        assert_eq!(query.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!query.auto_create);
    }

    #[test]
    fn test_subscribe_event_wire_shape() {
        let event = SubscribeEvent {
            start_offset: 7,
            data: vec!["a".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["start_offset"], 7);
        assert_eq!(json["data"][0], "a");
    }
}
