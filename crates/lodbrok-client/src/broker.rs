//! One TCP link to one broker.
//!
//! A [`Broker`] owns two independent connections: one for short
//! request/response exchanges and one dedicated to streaming fetch, so a
//! long-running fetch never blocks coordination traffic. Requests on each
//! connection are serialized; the response to the single in-flight request
//! is matched against it by correlation id.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, trace};

use lodbrok_common::{Error, Result};
use lodbrok_protocol::api_versions_types::{ApiVersionsRequest, ApiVersionsResponse};
use lodbrok_protocol::error_codes::check_error_code;
use lodbrok_protocol::fetch_types::{FetchRequest, FetchResponse};
use lodbrok_protocol::find_coordinator_types::{FindCoordinatorRequest, FindCoordinatorResponse};
use lodbrok_protocol::frame::{decode_response, encode_request};
use lodbrok_protocol::heartbeat_types::{HeartbeatRequest, HeartbeatResponse};
use lodbrok_protocol::join_group_types::{JoinGroupRequest, JoinGroupResponse};
use lodbrok_protocol::leave_group_types::{LeaveGroupRequest, LeaveGroupResponse};
use lodbrok_protocol::list_groups_types::{ListGroupsRequest, ListGroupsResponse};
use lodbrok_protocol::metadata_types::{MetadataRequest, MetadataResponse};
use lodbrok_protocol::offset_commit_types::{OffsetCommitRequest, OffsetCommitResponse};
use lodbrok_protocol::offsets_types::{
    OffsetsRequest, OffsetsRequestPartition, OffsetsRequestTopic, OffsetsResponse,
};
use lodbrok_protocol::parser::{ApiKey, KafkaDecodable, KafkaEncodable, RequestHeader};
use lodbrok_protocol::sync_group_types::{SyncGroupRequest, SyncGroupResponse};

/// Streamed fetch bodies are forwarded in chunks of at most this size.
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// One TCP link to one broker node.
pub struct Broker {
    node_id: i32,
    address: String,
    client_id: String,
    /// Per-read timeout; zero disables it.
    timeout: Duration,
    /// Connection for short request/response exchanges.
    exchange_stream: Mutex<TcpStream>,
    /// Connection dedicated to streaming fetch.
    fetch_stream: Mutex<TcpStream>,
    correlation: AtomicI32,
    closed: watch::Sender<bool>,
}

impl Broker {
    /// Open both connections to `address`.
    pub async fn connect(
        address: &str,
        client_id: &str,
        node_id: i32,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Broker> {
        let exchange_stream = dial(address, connect_timeout).await?;
        let fetch_stream = dial(address, connect_timeout).await?;
        debug!(address, node_id, "broker connections established");

        let (closed, _) = watch::channel(false);
        Ok(Broker {
            node_id,
            address: address.to_string(),
            client_id: client_id.to_string(),
            timeout,
            exchange_stream: Mutex::new(exchange_stream),
            fetch_stream: Mutex::new(fetch_stream),
            correlation: AtomicI32::new(0),
            closed,
        })
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Mark the broker closed. Any read blocked on either connection fails
    /// and unblocks its task; the sockets close when the broker is dropped.
    pub fn close(&self) {
        let _ = self.closed.send(true);
    }

    fn next_correlation_id(&self) -> i32 {
        self.correlation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// One read attempt, bounded by the configured timeout when
    /// `apply_timeout` is set and interruptible by [`close`](Self::close).
    async fn read_some(
        &self,
        stream: &mut TcpStream,
        buf: &mut [u8],
        apply_timeout: bool,
    ) -> Result<usize> {
        if *self.closed.borrow() {
            return Err(Error::Network(format!(
                "connection to {} closed",
                self.address
            )));
        }
        let mut closed = self.closed.subscribe();

        let read = async {
            if apply_timeout && !self.timeout.is_zero() {
                match tokio::time::timeout(self.timeout, stream.read(buf)).await {
                    Ok(result) => result.map_err(Error::from),
                    Err(_) => Err(Error::Network(format!(
                        "read from {} timed out",
                        self.address
                    ))),
                }
            } else {
                stream.read(buf).await.map_err(Error::from)
            }
        };

        tokio::select! {
            _ = closed.changed() => Err(Error::Network(format!(
                "connection to {} closed",
                self.address
            ))),
            result = read => {
                let n = result?;
                if n == 0 {
                    return Err(Error::Network(format!(
                        "connection to {} closed by broker mid-read",
                        self.address
                    )));
                }
                Ok(n)
            }
        }
    }

    /// Write a full request payload, then read back the complete response
    /// frame, looping on short reads. The returned buffer includes the
    /// 4-byte length prefix for downstream decoders.
    pub async fn request(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = self.exchange_stream.lock().await;
        stream.write_all(payload).await?;

        let mut length_buf = [0u8; 4];
        let mut have = 0usize;
        while have < 4 {
            have += self.read_some(&mut stream, &mut length_buf[have..], true).await?;
        }

        let body_len = i32::from_be_bytes(length_buf);
        if body_len < 0 {
            return Err(Error::Protocol(format!(
                "negative response length: {}",
                body_len
            )));
        }
        let body_len = body_len as usize;
        trace!(body_len, "response length received");

        let mut frame = vec![0u8; 4 + body_len];
        frame[..4].copy_from_slice(&length_buf);
        let mut read_len = 0usize;
        while read_len < body_len {
            let n = self.read_some(&mut stream, &mut frame[4 + read_len..], true).await?;
            read_len += n;
            if read_len > body_len {
                return Err(Error::Protocol(
                    "read more data than the declared response length".into(),
                ));
            }
        }

        Ok(frame)
    }

    /// Like [`request`](Self::request), but forwards every chunk on
    /// `chunks` as it is read, including the still-incomplete length
    /// prefix, instead of buffering the frame. The body is forwarded in
    /// chunks of at most 64 KiB. Dropping the sender on return (success or
    /// error) is the consumer's sole completion signal.
    pub async fn request_streaming(
        &self,
        payload: &[u8],
        chunks: mpsc::Sender<Bytes>,
    ) -> Result<()> {
        let mut stream = self.fetch_stream.lock().await;
        stream.write_all(payload).await?;

        let mut length_buf = [0u8; 4];
        let mut have = 0usize;
        while have < 4 {
            let n = self.read_some(&mut stream, &mut length_buf[have..], true).await?;
            if chunks
                .send(Bytes::copy_from_slice(&length_buf[have..have + n]))
                .await
                .is_err()
            {
                return Err(Error::Network("streaming consumer dropped".into()));
            }
            have += n;
        }

        let body_len = i32::from_be_bytes(length_buf);
        if body_len < 0 {
            return Err(Error::Protocol(format!(
                "negative response length: {}",
                body_len
            )));
        }
        let body_len = body_len as usize;
        trace!(body_len, "streaming response length received");

        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let mut read_len = 0usize;
        while read_len < body_len {
            let n = self.read_some(&mut stream, &mut buf, false).await?;
            if chunks
                .send(Bytes::copy_from_slice(&buf[..n]))
                .await
                .is_err()
            {
                return Err(Error::Network("streaming consumer dropped".into()));
            }
            read_len += n;
            if read_len > body_len {
                return Err(Error::Protocol(
                    "read more data than the declared response length".into(),
                ));
            }
        }
        trace!(bytes = read_len + 4, "streaming response fully forwarded");

        Ok(())
    }

    /// Encode, exchange and decode one typed request, verifying that the
    /// response answers this request and not some other frame.
    async fn call<B, R>(&self, api_key: ApiKey, version: i16, body: &B) -> Result<R>
    where
        B: KafkaEncodable,
        R: KafkaDecodable,
    {
        let correlation_id = self.next_correlation_id();
        let header = RequestHeader::new(api_key, version, correlation_id, &self.client_id);
        let payload = encode_request(&header, body)?;

        let frame = self.request(&payload).await?;
        let (response_correlation, response) = decode_response::<R>(&frame, version)?;
        if response_correlation != correlation_id {
            return Err(Error::Protocol(format!(
                "correlation id mismatch: expected {}, got {}",
                correlation_id, response_correlation
            )));
        }
        Ok(response)
    }

    pub async fn api_versions(&self) -> Result<ApiVersionsResponse> {
        let response: ApiVersionsResponse =
            self.call(ApiKey::ApiVersions, 0, &ApiVersionsRequest).await?;
        check_error_code(response.error_code)?;
        Ok(response)
    }

    pub async fn list_groups(&self) -> Result<ListGroupsResponse> {
        let response: ListGroupsResponse =
            self.call(ApiKey::ListGroups, 0, &ListGroupsRequest).await?;
        check_error_code(response.error_code)?;
        Ok(response)
    }

    /// Topic metadata; an empty topic list asks for all topics.
    pub async fn metadata(&self, topics: &[String]) -> Result<MetadataResponse> {
        let request = MetadataRequest {
            topics: topics.to_vec(),
        };
        self.call(ApiKey::Metadata, 0, &request).await
    }

    /// Resolve `time` (-1 latest, -2 earliest, or a wall-clock ms value) to
    /// offsets for the given partitions of one topic. Every partition must
    /// be led by this broker.
    pub async fn offsets(
        &self,
        topic: &str,
        partitions: &[i32],
        time: i64,
        max_number_of_offsets: i32,
    ) -> Result<OffsetsResponse> {
        let request = OffsetsRequest {
            replica_id: -1,
            topics: vec![OffsetsRequestTopic {
                topic: topic.to_string(),
                partitions: partitions
                    .iter()
                    .map(|&partition| OffsetsRequestPartition {
                        partition,
                        time,
                        max_number_of_offsets,
                    })
                    .collect(),
            }],
        };
        self.call(ApiKey::Offsets, 0, &request).await
    }

    pub async fn find_coordinator(&self, group_id: &str) -> Result<FindCoordinatorResponse> {
        let request = FindCoordinatorRequest {
            group_id: group_id.to_string(),
        };
        let response: FindCoordinatorResponse =
            self.call(ApiKey::FindCoordinator, 0, &request).await?;
        check_error_code(response.error_code)?;
        Ok(response)
    }

    pub async fn join_group(&self, request: &JoinGroupRequest) -> Result<JoinGroupResponse> {
        let response: JoinGroupResponse = self.call(ApiKey::JoinGroup, 0, request).await?;
        check_error_code(response.error_code)?;
        Ok(response)
    }

    pub async fn sync_group(&self, request: &SyncGroupRequest) -> Result<SyncGroupResponse> {
        let response: SyncGroupResponse = self.call(ApiKey::SyncGroup, 0, request).await?;
        check_error_code(response.error_code)?;
        Ok(response)
    }

    pub async fn heartbeat(
        &self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
    ) -> Result<()> {
        let request = HeartbeatRequest {
            group_id: group_id.to_string(),
            generation_id,
            member_id: member_id.to_string(),
        };
        let response: HeartbeatResponse = self.call(ApiKey::Heartbeat, 0, &request).await?;
        check_error_code(response.error_code)
    }

    pub async fn leave_group(&self, group_id: &str, member_id: &str) -> Result<()> {
        let request = LeaveGroupRequest {
            group_id: group_id.to_string(),
            member_id: member_id.to_string(),
        };
        let response: LeaveGroupResponse = self.call(ApiKey::LeaveGroup, 0, &request).await?;
        check_error_code(response.error_code)
    }

    /// Commit offsets. `version` selects the storage backend's wire format
    /// (0 or 2); per-partition error codes stay in the response for the
    /// caller to inspect.
    pub async fn offset_commit(
        &self,
        version: i16,
        request: &OffsetCommitRequest,
    ) -> Result<OffsetCommitResponse> {
        self.call(ApiKey::OffsetCommit, version, request).await
    }

    /// Buffered fetch over the exchange connection. Suited to small
    /// results; large fetches should stream instead.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.call(ApiKey::Fetch, 0, request).await
    }

    /// Encode a fetch request for the streaming path, returning the
    /// correlation id the response must answer with alongside the payload.
    pub fn prepare_fetch(&self, request: &FetchRequest) -> Result<(i32, Bytes)> {
        let correlation_id = self.next_correlation_id();
        let header = RequestHeader::new(ApiKey::Fetch, 0, correlation_id, &self.client_id);
        let payload = encode_request(&header, request)?;
        Ok((correlation_id, payload))
    }
}

async fn dial(address: &str, connect_timeout: Duration) -> Result<TcpStream> {
    let connect = TcpStream::connect(address);
    let stream = if connect_timeout.is_zero() {
        connect.await
    } else {
        tokio::time::timeout(connect_timeout, connect)
            .await
            .map_err(|_| Error::Network(format!("timed out connecting to {}", address)))?
    };
    stream.map_err(|e| Error::Network(format!("failed to establish connection to {}: {}", address, e)))
}
