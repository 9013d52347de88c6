//! Transport tests against an in-process TCP peer serving canned frames.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use lodbrok_client::Broker;
use lodbrok_protocol::api_versions_types::{ApiVersion, ApiVersionsResponse};
use lodbrok_protocol::fetch_types::{
    FetchRequest, FetchResponse, FetchResponsePartition, FetchResponseTopic,
};
use lodbrok_protocol::frame::encode_response;
use lodbrok_protocol::heartbeat_types::HeartbeatResponse;
use lodbrok_protocol::list_groups_types::{ListGroupsResponse, ListedGroup};
use lodbrok_protocol::records::Message;

const NO_TIMEOUT: Duration = Duration::from_secs(0);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept connections and, for every incoming request frame, write
/// `response` back in `pieces` separate writes with small pauses between
/// them, exercising the short-read loops on the client side.
async fn start_canned_broker(response: Vec<u8>, pieces: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let response = response.clone();
            tokio::spawn(async move {
                loop {
                    let mut length_buf = [0u8; 4];
                    if stream.read_exact(&mut length_buf).await.is_err() {
                        return;
                    }
                    let length = i32::from_be_bytes(length_buf) as usize;
                    let mut body = vec![0u8; length];
                    if stream.read_exact(&mut body).await.is_err() {
                        return;
                    }

                    let piece_len = response.len().div_ceil(pieces);
                    for piece in response.chunks(piece_len.max(1)) {
                        if stream.write_all(piece).await.is_err() {
                            return;
                        }
                        stream.flush().await.ok();
                        tokio::time::sleep(Duration::from_millis(2)).await;
                    }
                }
            });
        }
    });

    address
}

fn heartbeat_frame(correlation_id: i32) -> Vec<u8> {
    encode_response(correlation_id, &HeartbeatResponse { error_code: 0 }, 0)
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_request_reassembles_short_reads() {
    // First correlation id a fresh connection issues is 1.
    let response = heartbeat_frame(1);
    let address = start_canned_broker(response.clone(), 5).await;

    let broker = Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, NO_TIMEOUT)
        .await
        .unwrap();
    let frame = broker.request(b"\x00\x00\x00\x02ok").await.unwrap();
    assert_eq!(frame, response);
}

#[tokio::test]
async fn test_streaming_output_equals_buffered_frame() {
    let response = heartbeat_frame(42);
    let address = start_canned_broker(response.clone(), 7).await;

    let broker = Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, NO_TIMEOUT)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel::<Bytes>(4);
    let streamed = tokio::spawn(async move {
        let mut collected = Vec::new();
        while let Some(chunk) = rx.recv().await {
            collected.extend_from_slice(&chunk);
        }
        collected
    });

    broker
        .request_streaming(b"\x00\x00\x00\x02ok", tx)
        .await
        .unwrap();
    let collected = streamed.await.unwrap();

    // Concatenated chunks equal the buffered frame byte-for-byte.
    assert_eq!(collected, response);
}

#[tokio::test]
async fn test_api_versions_call() {
    let response = ApiVersionsResponse {
        error_code: 0,
        api_versions: vec![ApiVersion {
            api_key: 18,
            min_version: 0,
            max_version: 0,
        }],
    };
    let frame = encode_response(1, &response, 0).unwrap().to_vec();
    let address = start_canned_broker(frame, 1).await;

    let broker = Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, NO_TIMEOUT)
        .await
        .unwrap();
    let decoded = broker.api_versions().await.unwrap();
    assert_eq!(decoded, response);
}

#[tokio::test]
async fn test_list_groups_call() {
    let response = ListGroupsResponse {
        error_code: 0,
        groups: vec![ListedGroup {
            group_id: "g".into(),
            protocol_type: "consumer".into(),
        }],
    };
    let frame = encode_response(1, &response, 0).unwrap().to_vec();
    let address = start_canned_broker(frame, 1).await;

    let broker = Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, NO_TIMEOUT)
        .await
        .unwrap();
    let decoded = broker.list_groups().await.unwrap();
    assert_eq!(decoded, response);
}

#[tokio::test]
async fn test_buffered_fetch_call() {
    let response = FetchResponse {
        topics: vec![FetchResponseTopic {
            topic: "t".into(),
            partitions: vec![FetchResponsePartition {
                partition: 0,
                error_code: 0,
                high_watermark: 1,
                messages: vec![Message {
                    offset: 0,
                    crc: 0,
                    magic: 0,
                    attributes: 0,
                    key: None,
                    value: Some(Bytes::from_static(b"payload")),
                }],
            }],
        }],
    };
    let frame = encode_response(1, &response, 0).unwrap().to_vec();
    let address = start_canned_broker(frame, 3).await;

    let broker = Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, NO_TIMEOUT)
        .await
        .unwrap();
    let request = FetchRequest::single("t", 0, 0, 100, 1, 1 << 20);
    let decoded = broker.fetch(&request).await.unwrap();
    assert_eq!(decoded, response);
}

#[tokio::test]
async fn test_over_read_is_a_protocol_error() {
    // Frame declares a 2-byte body but 6 bytes follow in one burst.
    let response = vec![0x00, 0x00, 0x00, 0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
    let address = start_canned_broker(response, 1).await;

    let broker = Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, NO_TIMEOUT)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel::<Bytes>(4);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let result = broker.request_streaming(b"\x00\x00\x00\x02ok", tx).await;
    drain.await.unwrap();

    assert!(result.is_err(), "over-read past the declared length must fail");
}

#[tokio::test]
async fn test_correlation_id_mismatch_rejected() {
    // Respond with a correlation id no request will ever carry.
    let response = heartbeat_frame(999_999);
    let address = start_canned_broker(response, 1).await;

    let broker = Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, NO_TIMEOUT)
        .await
        .unwrap();
    let error = broker.heartbeat("g", 0, "m").await.unwrap_err();
    assert!(error.to_string().contains("correlation id mismatch"));
}

#[tokio::test]
async fn test_read_timeout_fails_the_request() {
    // A listener that accepts and then never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        let _socket = listener.accept().await;
        let _other = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let broker = Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, Duration::from_millis(50))
        .await
        .unwrap();
    let error = broker.request(b"\x00\x00\x00\x02ok").await.unwrap_err();
    assert!(error.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_close_unblocks_a_pending_read() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    tokio::spawn(async move {
        let _socket = listener.accept().await;
        let _other = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let broker = std::sync::Arc::new(
        Broker::connect(&address, "test", 0, CONNECT_TIMEOUT, NO_TIMEOUT)
            .await
            .unwrap(),
    );

    let requester = broker.clone();
    let pending = tokio::spawn(async move { requester.request(b"\x00\x00\x00\x02ok").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    broker.close();
    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("close must unblock the read")
        .unwrap();
    assert!(result.is_err());
}
