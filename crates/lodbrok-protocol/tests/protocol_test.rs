//! Round-trip and decode-scenario tests for every message type.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;

use lodbrok_protocol::api_versions_types::{ApiVersion, ApiVersionsRequest, ApiVersionsResponse};
use lodbrok_protocol::fetch_stream;
use lodbrok_protocol::fetch_types::{
    FetchRequest, FetchResponse, FetchResponsePartition, FetchResponseTopic,
};
use lodbrok_protocol::find_coordinator_types::{
    Coordinator, FindCoordinatorRequest, FindCoordinatorResponse,
};
use lodbrok_protocol::frame::{decode_response, encode_response};
use lodbrok_protocol::heartbeat_types::{HeartbeatRequest, HeartbeatResponse};
use lodbrok_protocol::join_group_types::{
    GroupProtocol, JoinGroupRequest, JoinGroupResponse, JoinGroupResponseMember, ProtocolMetadata,
};
use lodbrok_protocol::leave_group_types::{LeaveGroupRequest, LeaveGroupResponse};
use lodbrok_protocol::list_groups_types::{ListGroupsRequest, ListGroupsResponse, ListedGroup};
use lodbrok_protocol::metadata_types::{
    BrokerMetadata, MetadataRequest, MetadataResponse, PartitionMetadata, TopicMetadata,
};
use lodbrok_protocol::offset_commit_types::{
    OffsetCommitRequest, OffsetCommitResponse, OffsetCommitResponsePartition,
    OffsetCommitResponseTopic,
};
use lodbrok_protocol::offsets_types::{
    OffsetsRequest, OffsetsResponse, OffsetsResponseTopic, PartitionOffsets,
};
use lodbrok_protocol::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};
use lodbrok_protocol::records::Message;
use lodbrok_protocol::sync_group_types::{
    MemberAssignment, PartitionAssignment, SyncGroupRequest, SyncGroupRequestAssignment,
    SyncGroupResponse,
};

/// Encode a body, decode it back, and require equality.
fn roundtrip<T>(value: &T, version: i16) -> T
where
    T: KafkaEncodable + KafkaDecodable + PartialEq + std::fmt::Debug,
{
    let mut buf = BytesMut::new();
    let mut encoder = Encoder::new(&mut buf);
    value.encode(&mut encoder, version).unwrap();

    let mut bytes = buf.freeze();
    let mut decoder = Decoder::new(&mut bytes);
    let decoded = T::decode(&mut decoder, version).unwrap();
    assert_eq!(decoder.remaining(), 0, "undecoded trailing bytes");
    decoded
}

fn assert_roundtrip<T>(value: T, version: i16)
where
    T: KafkaEncodable + KafkaDecodable + PartialEq + std::fmt::Debug,
{
    assert_eq!(roundtrip(&value, version), value);
}

#[test]
fn test_api_versions_roundtrip() {
    // Empty bodies survive.
    let mut buf = BytesMut::new();
    let mut encoder = Encoder::new(&mut buf);
    ApiVersionsRequest.encode(&mut encoder, 0).unwrap();
    assert!(buf.is_empty());

    assert_roundtrip(
        ApiVersionsResponse {
            error_code: 0,
            api_versions: vec![],
        },
        0,
    );
    assert_roundtrip(
        ApiVersionsResponse {
            error_code: 0,
            api_versions: vec![
                ApiVersion {
                    api_key: 1,
                    min_version: 0,
                    max_version: 3,
                },
                ApiVersion {
                    api_key: 18,
                    min_version: 0,
                    max_version: 0,
                },
            ],
        },
        0,
    );
}

#[test]
fn test_metadata_roundtrip() {
    assert_roundtrip(MetadataRequest { topics: vec![] }, 0);
    assert_roundtrip(
        MetadataRequest {
            topics: vec!["a".into(), "b".into()],
        },
        0,
    );

    assert_roundtrip(
        MetadataResponse {
            brokers: vec![],
            topics: vec![],
        },
        0,
    );
    assert_roundtrip(
        MetadataResponse {
            brokers: vec![BrokerMetadata {
                node_id: 1,
                host: "broker-1".into(),
                port: 9092,
            }],
            topics: vec![TopicMetadata {
                error_code: 0,
                topic: "t".into(),
                partitions: vec![PartitionMetadata {
                    error_code: 0,
                    partition: 0,
                    leader: 1,
                    replicas: vec![1, 2],
                    isr: vec![1],
                }],
            }],
        },
        0,
    );
}

#[test]
fn test_offsets_roundtrip() {
    assert_roundtrip(OffsetsRequest::single("t", 0, -2), 0);
    assert_roundtrip(
        OffsetsResponse {
            topics: vec![OffsetsResponseTopic {
                topic: "t".into(),
                partitions: vec![PartitionOffsets {
                    partition: 0,
                    error_code: 0,
                    offsets: vec![42, 0],
                }],
            }],
        },
        0,
    );
}

#[test]
fn test_find_coordinator_roundtrip() {
    assert_roundtrip(
        FindCoordinatorRequest {
            group_id: "g".into(),
        },
        0,
    );
    assert_roundtrip(
        FindCoordinatorResponse {
            error_code: 0,
            coordinator: Coordinator {
                node_id: 3,
                host: "broker-3".into(),
                port: 9092,
            },
        },
        0,
    );
}

#[test]
fn test_join_group_roundtrip() {
    assert_roundtrip(
        JoinGroupRequest {
            group_id: "g".into(),
            session_timeout_ms: 30000,
            member_id: String::new(),
            protocol_type: "consumer".into(),
            protocols: vec![GroupProtocol {
                name: "range".into(),
                metadata: ProtocolMetadata::for_topic("t").to_bytes(),
            }],
        },
        0,
    );
    assert_roundtrip(
        JoinGroupResponse {
            error_code: 0,
            generation_id: 7,
            group_protocol: "range".into(),
            leader_id: "m1".into(),
            member_id: "m1".into(),
            members: vec![JoinGroupResponseMember {
                member_id: "m1".into(),
                metadata: Bytes::from_static(b"\x00\x00"),
            }],
        },
        0,
    );

    let metadata = ProtocolMetadata {
        version: 0,
        subscription: vec!["t1".into(), "t2".into()],
        user_data: None,
    };
    assert_eq!(
        ProtocolMetadata::from_bytes(&metadata.to_bytes()).unwrap(),
        metadata
    );
}

#[test]
fn test_sync_group_roundtrip() {
    assert_roundtrip(
        SyncGroupRequest {
            group_id: "g".into(),
            generation_id: 1,
            member_id: "m".into(),
            assignments: vec![],
        },
        0,
    );
    assert_roundtrip(
        SyncGroupRequest {
            group_id: "g".into(),
            generation_id: 1,
            member_id: "m".into(),
            assignments: vec![SyncGroupRequestAssignment {
                member_id: "m".into(),
                assignment: MemberAssignment::new(vec![PartitionAssignment {
                    topic: "t".into(),
                    partitions: vec![0, 1],
                }])
                .to_bytes(),
            }],
        },
        0,
    );
    assert_roundtrip(
        SyncGroupResponse {
            error_code: 0,
            member_assignment: Bytes::from_static(b"xyz"),
        },
        0,
    );

    let assignment = MemberAssignment::new(vec![PartitionAssignment {
        topic: "t".into(),
        partitions: vec![3, 4, 5],
    }]);
    assert_eq!(
        MemberAssignment::from_bytes(&assignment.to_bytes()).unwrap(),
        assignment
    );
}

#[test]
fn test_heartbeat_and_leave_roundtrip() {
    assert_roundtrip(
        HeartbeatRequest {
            group_id: "g".into(),
            generation_id: 2,
            member_id: "m".into(),
        },
        0,
    );
    assert_roundtrip(HeartbeatResponse { error_code: 27 }, 0);
    assert_roundtrip(
        LeaveGroupRequest {
            group_id: "g".into(),
            member_id: "m".into(),
        },
        0,
    );
    assert_roundtrip(LeaveGroupResponse { error_code: 0 }, 0);
}

#[test]
fn test_list_groups_roundtrip() {
    let mut buf = BytesMut::new();
    let mut encoder = Encoder::new(&mut buf);
    ListGroupsRequest.encode(&mut encoder, 0).unwrap();
    assert!(buf.is_empty());

    assert_roundtrip(
        ListGroupsResponse {
            error_code: 0,
            groups: vec![ListedGroup {
                group_id: "g".into(),
                protocol_type: "consumer".into(),
            }],
        },
        0,
    );
}

#[test]
fn test_offset_commit_roundtrip() {
    for version in [0, 2] {
        let decoded = roundtrip(&OffsetCommitRequest::single("g", 5, "m", "t", 0, 99), version);
        assert_eq!(decoded.group_id, "g");
        assert_eq!(decoded.topics.len(), 1);
        assert_eq!(decoded.topics[0].partitions[0].offset, 99);
        if version == 2 {
            assert_eq!(decoded.generation_id, 5);
            assert_eq!(decoded.member_id, "m");
            assert_eq!(decoded.retention_time_ms, -1);
        }
    }

    assert_roundtrip(
        OffsetCommitResponse {
            topics: vec![OffsetCommitResponseTopic {
                topic: "t".into(),
                partitions: vec![OffsetCommitResponsePartition {
                    partition: 0,
                    error_code: 0,
                }],
            }],
        },
        0,
    );
}

#[test]
fn test_fetch_roundtrip() {
    assert_roundtrip(FetchRequest::single("t", 0, 123, 10000, 1, 1 << 20), 0);

    assert_roundtrip(
        FetchResponse {
            topics: vec![FetchResponseTopic {
                topic: "t".into(),
                partitions: vec![FetchResponsePartition {
                    partition: 0,
                    error_code: 0,
                    high_watermark: 10,
                    messages: vec![Message {
                        offset: 9,
                        crc: 0xdeadbeef,
                        magic: 0,
                        attributes: 0,
                        key: None,
                        value: Some(Bytes::from_static(b"v")),
                    }],
                }],
            }],
        },
        0,
    );
}

fn message(offset: i64, value: &'static [u8]) -> Message {
    Message {
        offset,
        crc: 7,
        magic: 0,
        attributes: 0,
        key: None,
        value: Some(Bytes::from_static(value)),
    }
}

/// One topic, one partition, error code 0, high watermark 100, two full
/// messages and a 3-byte trailing fragment: exactly 2 messages decode and
/// the fragment is not an error.
#[test]
fn test_fetch_response_with_trailing_fragment() {
    let response = FetchResponse {
        topics: vec![FetchResponseTopic {
            topic: "t".into(),
            partitions: vec![FetchResponsePartition {
                partition: 0,
                error_code: 0,
                high_watermark: 100,
                messages: vec![message(1, b"one"), message(2, b"two")],
            }],
        }],
    };

    let mut frame = encode_response(1, &response, 0).unwrap().to_vec();

    // Splice a 3-byte fragment into the message set and patch both the
    // set size and the frame length.
    frame.extend_from_slice(&[0x00, 0x00, 0x00]);
    let len = frame.len();
    let frame_len = (len - 4) as i32;
    frame[..4].copy_from_slice(&frame_len.to_be_bytes());
    // Message set size field sits right before the set itself; the set of
    // two 29-byte messages starts 3 + set_size + fragment bytes from the end.
    let set_size_at = len - 3 - 58 - 4;
    let set_size = i32::from_be_bytes(frame[set_size_at..set_size_at + 4].try_into().unwrap());
    let patched = set_size + 3;
    frame[set_size_at..set_size_at + 4].copy_from_slice(&patched.to_be_bytes());

    let (_, decoded): (i32, FetchResponse) = decode_response(&frame, 0).unwrap();
    let partition = &decoded.topics[0].partitions[0];
    assert_eq!(partition.error_code, 0);
    assert_eq!(partition.high_watermark, 100);
    assert_eq!(partition.messages.len(), 2);
    assert_eq!(partition.messages[1].value, Some(Bytes::from_static(b"two")));

    // The streaming decoder agrees with the buffered one.
    let events = fetch_stream::decode_all(&frame).unwrap();
    let messages: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            fetch_stream::FetchEvent::Message { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(messages, partition.messages);
}

/// One topic with two partitions, each carrying one offset: one entry per
/// topic, offsets preserved in order.
#[test]
fn test_offsets_response_scenario() {
    let response = OffsetsResponse {
        topics: vec![OffsetsResponseTopic {
            topic: "t".into(),
            partitions: vec![
                PartitionOffsets {
                    partition: 0,
                    error_code: 0,
                    offsets: vec![11],
                },
                PartitionOffsets {
                    partition: 1,
                    error_code: 0,
                    offsets: vec![22],
                },
            ],
        }],
    };

    let frame = encode_response(5, &response, 0).unwrap();
    let (correlation_id, decoded): (i32, OffsetsResponse) = decode_response(&frame, 0).unwrap();

    assert_eq!(correlation_id, 5);
    assert_eq!(decoded.topics.len(), 1);
    let partitions = &decoded.topics[0].partitions;
    assert_eq!(partitions[0].offsets, vec![11]);
    assert_eq!(partitions[1].offsets, vec![22]);
}

/// The streamed decoder and the buffered decoder must agree byte-for-byte
/// no matter how the response is chunked.
#[test]
fn test_streaming_matches_buffered_for_any_chunking() {
    let response = FetchResponse {
        topics: vec![FetchResponseTopic {
            topic: "events".into(),
            partitions: vec![
                FetchResponsePartition {
                    partition: 0,
                    error_code: 0,
                    high_watermark: 50,
                    messages: vec![message(48, b"a"), message(49, b"bb")],
                },
                FetchResponsePartition {
                    partition: 1,
                    error_code: 0,
                    high_watermark: 9,
                    messages: vec![message(8, b"ccc")],
                },
            ],
        }],
    };
    let frame = encode_response(3, &response, 0).unwrap();
    let (_, buffered): (i32, FetchResponse) = decode_response(&frame, 0).unwrap();
    let expected: Vec<Message> = buffered
        .topics
        .iter()
        .flat_map(|t| t.partitions.iter())
        .flat_map(|p| p.messages.iter().cloned())
        .collect();

    for chunk_size in [1, 3, 7, 64, frame.len()] {
        let mut decoder = fetch_stream::FetchStreamDecoder::new();
        let mut messages = Vec::new();
        for chunk in frame.chunks(chunk_size) {
            decoder.feed(chunk);
            while let Some(event) = decoder.next_event().unwrap() {
                if let fetch_stream::FetchEvent::Message { message, .. } = event {
                    messages.push(message);
                }
            }
        }
        assert!(decoder.is_complete(), "chunk size {}", chunk_size);
        assert_eq!(decoder.correlation_id(), Some(3));
        assert_eq!(messages, expected, "chunk size {}", chunk_size);
    }
}

proptest! {
    /// Arbitrary message sets survive a fetch response round-trip.
    #[test]
    fn prop_fetch_message_roundtrip(
        values in proptest::collection::vec(
            proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
            0..8,
        )
    ) {
        let messages: Vec<Message> = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Message {
                offset: i as i64,
                crc: i as u32,
                magic: 0,
                attributes: 0,
                key: None,
                value: value.map(Bytes::from),
            })
            .collect();

        let response = FetchResponse {
            topics: vec![FetchResponseTopic {
                topic: "t".into(),
                partitions: vec![FetchResponsePartition {
                    partition: 0,
                    error_code: 0,
                    high_watermark: messages.len() as i64,
                    messages: messages.clone(),
                }],
            }],
        };

        let frame = encode_response(1, &response, 0).unwrap();
        let (_, decoded): (i32, FetchResponse) = decode_response(&frame, 0).unwrap();
        prop_assert_eq!(&decoded.topics[0].partitions[0].messages, &messages);
    }
}
