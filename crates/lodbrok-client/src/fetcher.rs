//! Per-partition fetch loop.
//!
//! Each fetcher is an independent task with its own dedicated broker
//! connection. A fetch cycle streams the response through a bounded channel
//! (the network reader blocks when the decoder falls behind, which is the
//! backpressure mechanism) and pushes complete messages to the shared
//! output channel as they decode.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use lodbrok_common::{Error, Result};
use lodbrok_protocol::error_codes::check_error_code;
use lodbrok_protocol::fetch_stream::{FetchEvent, FetchStreamDecoder};
use lodbrok_protocol::fetch_types::FetchRequest;
use lodbrok_protocol::offsets_types::EARLIEST_TIMESTAMP;
use lodbrok_protocol::records::Message;

use crate::broker::Broker;
use crate::group::OffsetCommitter;

/// Capacity of the chunk channel between the network reader and the
/// decoder within one fetch cycle.
const FETCH_CHUNK_CHANNEL_CAPACITY: usize = 16;

/// Pause after a failed cycle before trying again.
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A decoded message tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// The message itself, offset included
    pub message: Message,
}

pub(crate) struct PartitionFetcher {
    broker: Arc<Broker>,
    topic: String,
    partition: i32,
    /// Next offset to fetch; -2 means "resolve earliest first",
    /// -1 "resolve latest first".
    offset: i64,
    max_wait_time_ms: i32,
    min_bytes: i32,
    max_bytes: i32,
    auto_commit: Option<AutoCommit>,
}

pub(crate) struct AutoCommit {
    pub committer: OffsetCommitter,
    pub interval: Duration,
}

/// Handle to a running fetcher task.
pub(crate) struct FetcherHandle {
    topic: String,
    partition: i32,
    shutdown: watch::Sender<bool>,
    broker: Arc<Broker>,
    task: JoinHandle<()>,
}

impl FetcherHandle {
    /// Signal shutdown, close the connection to unblock any pending read,
    /// and wait for the task to finish.
    pub(crate) async fn stop(self) {
        debug!(topic = %self.topic, partition = self.partition, "stopping partition fetcher");
        let _ = self.shutdown.send(true);
        self.broker.close();
        let _ = self.task.await;
    }
}

impl PartitionFetcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        broker: Broker,
        topic: String,
        partition: i32,
        from_beginning: bool,
        max_wait_time_ms: i32,
        min_bytes: i32,
        max_bytes: i32,
        auto_commit: Option<AutoCommit>,
    ) -> Self {
        PartitionFetcher {
            broker: Arc::new(broker),
            topic,
            partition,
            offset: if from_beginning { -2 } else { -1 },
            max_wait_time_ms,
            min_bytes,
            max_bytes,
            auto_commit,
        }
    }

    /// Start the fetch loop as its own task.
    pub(crate) fn spawn(self, out: mpsc::Sender<FetchedMessage>) -> FetcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let topic = self.topic.clone();
        let partition = self.partition;
        let broker = self.broker.clone();
        let task = tokio::spawn(self.run(out, shutdown_rx));
        FetcherHandle {
            topic,
            partition,
            shutdown: shutdown_tx,
            broker,
            task,
        }
    }

    async fn run(mut self, out: mpsc::Sender<FetchedMessage>, mut shutdown: watch::Receiver<bool>) {
        info!(
            topic = %self.topic,
            partition = self.partition,
            broker = self.broker.address(),
            "partition fetcher started"
        );

        let committed = Arc::new(AtomicI64::new(-1));
        let commit_task = self.auto_commit.take().map(|auto_commit| {
            tokio::spawn(auto_commit_loop(
                auto_commit,
                self.topic.clone(),
                self.partition,
                committed.clone(),
                shutdown.clone(),
            ))
        });

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.offset < 0 {
                if let Err(error) = self.resolve_start_offset().await {
                    warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        %error,
                        "could not resolve start offset"
                    );
                    if pause(&mut shutdown, FETCH_RETRY_DELAY).await {
                        break;
                    }
                    continue;
                }
            }

            let result = {
                let cycle = self.fetch_cycle(&out, &committed);
                tokio::pin!(cycle);
                tokio::select! {
                    _ = shutdown.changed() => break,
                    result = &mut cycle => result,
                }
            };

            match result {
                Ok(()) => {}
                Err(Error::Broker(broker_error)) if broker_error.code == 1 => {
                    // The cursor fell off the retained log; rewind.
                    warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        offset = self.offset,
                        "offset out of range, rewinding to earliest"
                    );
                    self.offset = EARLIEST_TIMESTAMP;
                }
                Err(_) if out.is_closed() => {
                    debug!(topic = %self.topic, partition = self.partition, "output channel gone");
                    break;
                }
                Err(error) => {
                    warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        %error,
                        "fetch cycle failed"
                    );
                    if pause(&mut shutdown, FETCH_RETRY_DELAY).await {
                        break;
                    }
                }
            }
        }

        if let Some(task) = commit_task {
            let _ = task.await;
        }
        info!(
            topic = %self.topic,
            partition = self.partition,
            "partition fetcher stopped"
        );
    }

    /// Turn a -1/-2 cursor into a concrete offset with an Offsets request.
    async fn resolve_start_offset(&mut self) -> Result<()> {
        let time = self.offset;
        let response = self
            .broker
            .offsets(&self.topic, &[self.partition], time, 1)
            .await?;

        let partition = response
            .topics
            .iter()
            .find(|t| t.topic == self.topic)
            .and_then(|t| t.partitions.iter().find(|p| p.partition == self.partition))
            .ok_or_else(|| {
                Error::Protocol("offsets response missing the requested partition".into())
            })?;
        check_error_code(partition.error_code)?;

        let offset = partition
            .offsets
            .first()
            .copied()
            .ok_or_else(|| Error::Protocol("offsets response carried no offsets".into()))?;
        debug!(
            topic = %self.topic,
            partition = self.partition,
            time,
            offset,
            "start offset resolved"
        );
        self.offset = offset;
        Ok(())
    }

    /// One streamed fetch: issue the request, decode chunks as they arrive,
    /// forward messages, and advance the cursor.
    async fn fetch_cycle(
        &mut self,
        out: &mpsc::Sender<FetchedMessage>,
        committed: &AtomicI64,
    ) -> Result<()> {
        let request = FetchRequest::single(
            &self.topic,
            self.partition,
            self.offset,
            self.max_wait_time_ms,
            self.min_bytes,
            self.max_bytes,
        );
        let (correlation_id, payload) = self.broker.prepare_fetch(&request)?;

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Bytes>(FETCH_CHUNK_CHANNEL_CAPACITY);
        let broker = self.broker.clone();
        let reader =
            tokio::spawn(async move { broker.request_streaming(&payload, chunk_tx).await });

        let mut decoder = FetchStreamDecoder::new();
        let mut decode_result: Result<()> = Ok(());
        'chunks: while let Some(chunk) = chunk_rx.recv().await {
            decoder.feed(&chunk);
            loop {
                match decoder.next_event() {
                    Ok(Some(FetchEvent::Partition { error_code, high_watermark, .. })) => {
                        trace!(
                            topic = %self.topic,
                            partition = self.partition,
                            high_watermark,
                            "partition header decoded"
                        );
                        if let Err(error) = check_error_code(error_code) {
                            decode_result = Err(error);
                            break 'chunks;
                        }
                    }
                    Ok(Some(FetchEvent::Message {
                        topic,
                        partition,
                        message,
                    })) => {
                        let next = message.offset + 1;
                        if out
                            .send(FetchedMessage {
                                topic,
                                partition,
                                message,
                            })
                            .await
                            .is_err()
                        {
                            decode_result =
                                Err(Error::Network("message consumer dropped".into()));
                            break 'chunks;
                        }
                        self.offset = next;
                        committed.store(next, Ordering::Relaxed);
                    }
                    Ok(None) => break,
                    Err(error) => {
                        decode_result = Err(error);
                        break 'chunks;
                    }
                }
            }
        }
        drop(chunk_rx);

        let read_result = reader
            .await
            .map_err(|e| Error::Network(format!("fetch reader task failed: {}", e)))?;
        decode_result?;
        read_result?;

        if !decoder.is_complete() {
            return Err(Error::Protocol(
                "fetch response ended before its declared length".into(),
            ));
        }
        if decoder.correlation_id() != Some(correlation_id) {
            return Err(Error::Protocol(format!(
                "correlation id mismatch: expected {}, got {:?}",
                correlation_id,
                decoder.correlation_id()
            )));
        }
        Ok(())
    }
}

/// Commit the latest consumed offset on a fixed interval until shutdown.
async fn auto_commit_loop(
    auto_commit: AutoCommit,
    topic: String,
    partition: i32,
    committed: Arc<AtomicI64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(auto_commit.interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The immediate first tick would commit before anything was consumed.
    tick.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let offset = committed.load(Ordering::Relaxed);
                if offset >= 0 {
                    auto_commit
                        .committer
                        .commit(&topic, partition, offset)
                        .await;
                }
            }
        }
    }
}

/// Sleep for `delay` unless shutdown arrives first; true means shut down.
async fn pause(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
