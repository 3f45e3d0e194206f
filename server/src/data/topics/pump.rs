//! Subscription read-pump
//!
//! Drains everything currently readable for one subscriber as a two-stage
//! pipeline: a spawned fetch task reads fixed-size windows from storage and
//! feeds `(record, offset)` pairs into a bounded channel; the consumer side
//! groups them into batches of at most `batch_size` and invokes the deliver
//! callback once per batch. The channel bound keeps storage reads paced by
//! delivery latency.

use std::future::Future;
use std::mem;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::backend::Storage;
use super::error::{BrokerError, DeliverError, StorageError};
use crate::core::constants::PUMP_FETCH_SIZE;

/// Run one drain cycle from `*offset` until storage reports an empty window.
///
/// On clean completion `*offset` points past the last record handed to the
/// fetch stage. A deliver error, a storage error, or a cancelled token abort
/// the cycle and surface as the returned error.
pub(super) async fn drain<F, Fut>(
    storage: &Arc<dyn Storage>,
    topic: &str,
    token: &CancellationToken,
    offset: &mut u64,
    batch_size: usize,
    auto_create: bool,
    deliver: &mut F,
) -> Result<(), BrokerError>
where
    F: FnMut(Vec<Vec<u8>>, u64) -> Fut + Send,
    Fut: Future<Output = Result<(), DeliverError>> + Send,
{
    let (tx, mut rx) = mpsc::channel::<(Vec<u8>, u64)>(batch_size.max(1));
    let fetcher = spawn_fetcher(
        Arc::clone(storage),
        topic.to_string(),
        tx,
        *offset,
        auto_create,
    );

    let mut batch: Vec<Vec<u8>> = Vec::with_capacity(batch_size);
    let mut batch_start = 0u64;

    loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => {
                fetcher.abort();
                return Err(BrokerError::Cancelled);
            }
            item = rx.recv() => item,
        };
        let Some((record, record_offset)) = item else {
            break;
        };
        if batch.is_empty() {
            batch_start = record_offset;
        }
        batch.push(record);
        if batch.len() == batch_size {
            if let Err(e) = deliver(mem::take(&mut batch), batch_start).await {
                fetcher.abort();
                return Err(BrokerError::Deliver(e));
            }
        }
    }

    // Last (possibly short) batch still goes out before the cycle ends.
    if !batch.is_empty() {
        deliver(mem::take(&mut batch), batch_start)
            .await
            .map_err(BrokerError::Deliver)?;
    }

    match fetcher.await {
        Ok(Ok(end)) => {
            *offset = end;
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(BrokerError::Internal(format!("fetch task failed: {e}"))),
    }
}

/// Stage one: read windows of [`PUMP_FETCH_SIZE`] records and publish each
/// record with its offset. Returns the cursor past the last record sent.
fn spawn_fetcher(
    storage: Arc<dyn Storage>,
    topic: String,
    tx: mpsc::Sender<(Vec<u8>, u64)>,
    start: u64,
    auto_create: bool,
) -> JoinHandle<Result<u64, StorageError>> {
    tokio::spawn(async move {
        let mut cursor = start;
        loop {
            match storage.read(&topic, cursor, PUMP_FETCH_SIZE).await {
                Ok(records) if records.is_empty() => return Ok(cursor),
                Ok(records) => {
                    for record in records {
                        if tx.send((record, cursor)).await.is_err() {
                            // Consumer stage went away; the cycle is over.
                            return Ok(cursor);
                        }
                        cursor += 1;
                    }
                }
                Err(StorageError::TopicNotFound(_)) if auto_create => {
                    // Make the topic exist so the next wakeup finds it.
                    storage.create(&topic).await?;
                    return Ok(cursor);
                }
                Err(e) => return Err(e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::topics::MemoryStorage;
    use parking_lot::Mutex;
    use std::time::Duration;

    type Sink = Arc<Mutex<Vec<(u64, Vec<Vec<u8>>)>>>;

    fn collector(sink: &Sink) -> impl FnMut(Vec<Vec<u8>>, u64) -> futures::future::Ready<Result<(), DeliverError>> {
        let sink = Arc::clone(sink);
        move |records, start| {
            sink.lock().push((start, records));
            futures::future::ready(Ok(()))
        }
    }

    async fn seeded_storage(count: usize) -> Arc<dyn Storage> {
        let storage = MemoryStorage::new();
        storage.create("t").await.unwrap();
        let records: Vec<Vec<u8>> = (0..count).map(|i| i.to_string().into_bytes()).collect();
        storage.append("t", &records).await.unwrap();
        Arc::new(storage)
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size_and_order() {
        let storage = seeded_storage(10).await;
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));
        let mut deliver = collector(&sink);
        let token = CancellationToken::new();
        let mut offset = 0u64;

        drain(&storage, "t", &token, &mut offset, 3, false, &mut deliver)
            .await
            .unwrap();

        assert_eq!(offset, 10);
        let batches = sink.lock();
        let sizes: Vec<usize> = batches.iter().map(|(_, r)| r.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        let starts: Vec<u64> = batches.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![0, 3, 6, 9]);

        let flat: Vec<String> = batches
            .iter()
            .flat_map(|(_, r)| r.iter())
            .map(|r| String::from_utf8(r.clone()).unwrap())
            .collect();
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(flat, expected);
    }

    #[tokio::test]
    async fn test_starts_mid_log() {
        let storage = seeded_storage(5).await;
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));
        let mut deliver = collector(&sink);
        let token = CancellationToken::new();
        let mut offset = 3u64;

        drain(&storage, "t", &token, &mut offset, 10, false, &mut deliver)
            .await
            .unwrap();

        assert_eq!(offset, 5);
        let batches = sink.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, 3);
        assert_eq!(batches[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_log_is_a_clean_cycle() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        storage.create("t").await.unwrap();
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));
        let mut deliver = collector(&sink);
        let token = CancellationToken::new();
        let mut offset = 0u64;

        drain(&storage, "t", &token, &mut offset, 10, false, &mut deliver)
            .await
            .unwrap();

        assert_eq!(offset, 0);
        assert!(sink.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_topic_without_autocreate_is_fatal() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));
        let mut deliver = collector(&sink);
        let token = CancellationToken::new();
        let mut offset = 0u64;

        let err = drain(&storage, "t", &token, &mut offset, 10, false, &mut deliver)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::TopicNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_topic_with_autocreate_creates_and_ends() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));
        let mut deliver = collector(&sink);
        let token = CancellationToken::new();
        let mut offset = 0u64;

        drain(&storage, "t", &token, &mut offset, 10, true, &mut deliver)
            .await
            .unwrap();

        // The topic now exists, so an append no longer fails
        storage.append("t", &[b"x".to_vec()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_error_aborts() {
        let storage = seeded_storage(10).await;
        let token = CancellationToken::new();
        let mut offset = 0u64;
        let mut calls = 0u32;
        let mut deliver = move |_records: Vec<Vec<u8>>, _start: u64| {
            calls += 1;
            let failed = calls > 1;
            async move {
                if failed {
                    Err::<(), DeliverError>("consumer gone".into())
                } else {
                    Ok(())
                }
            }
        };

        let err = drain(&storage, "t", &token, &mut offset, 3, false, &mut deliver)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Deliver(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_the_pump() {
        let storage = seeded_storage(10).await;
        let sink: Sink = Arc::new(Mutex::new(Vec::new()));
        let mut deliver = collector(&sink);
        let token = CancellationToken::new();
        token.cancel();
        let mut offset = 0u64;

        let err = drain(&storage, "t", &token, &mut offset, 3, false, &mut deliver)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Cancelled));
        // Give the aborted fetch task a moment to unwind
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
