//! Wire format verification tests.
//!
//! These tests verify that the codec produces byte-for-byte compatible
//! frames, with every fixed-width field at its documented offset.

use bytes::Bytes;
use lodbrok_protocol::frame::{encode_request, encode_response};
use lodbrok_protocol::heartbeat_types::HeartbeatRequest;
use lodbrok_protocol::join_group_types::{GroupProtocol, JoinGroupRequest, ProtocolMetadata};
use lodbrok_protocol::leave_group_types::LeaveGroupRequest;
use lodbrok_protocol::parser::{ApiKey, RequestHeader};
use lodbrok_protocol::sync_group_types::SyncGroupResponse;

fn be_i16(buf: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// JoinGroup for group "g1", session timeout 30000, empty member id,
/// protocol type "consumer", a single "range" protocol.
#[test]
fn test_join_group_request_layout() {
    let metadata = ProtocolMetadata::for_topic("t").to_bytes();
    let request = JoinGroupRequest {
        group_id: "g1".to_string(),
        session_timeout_ms: 30000,
        member_id: String::new(),
        protocol_type: "consumer".to_string(),
        protocols: vec![GroupProtocol {
            name: "range".to_string(),
            metadata: metadata.clone(),
        }],
    };

    let header = RequestHeader::new(ApiKey::JoinGroup, 0, 99, "cid");
    let frame = encode_request(&header, &request).unwrap();

    // The length prefix counts every byte that follows it.
    assert_eq!(be_i32(&frame, 0) as usize, frame.len() - 4);

    // Header: api key 11, version 0, correlation id, client id "cid".
    assert_eq!(be_i16(&frame, 4), 11);
    assert_eq!(be_i16(&frame, 6), 0);
    assert_eq!(be_i32(&frame, 8), 99);
    assert_eq!(be_i16(&frame, 12), 3);
    assert_eq!(&frame[14..17], b"cid");

    // Body: group id "g1".
    assert_eq!(be_i16(&frame, 17), 2);
    assert_eq!(&frame[19..21], b"g1");

    // session_timeout at its fixed offset after the group id.
    assert_eq!(be_i32(&frame, 21), 30000);

    // Empty member id.
    assert_eq!(be_i16(&frame, 25), 0);

    // Protocol type "consumer".
    assert_eq!(be_i16(&frame, 27), 8);
    assert_eq!(&frame[29..37], b"consumer");

    // One protocol named "range", then its metadata blob.
    assert_eq!(be_i32(&frame, 37), 1);
    assert_eq!(be_i16(&frame, 41), 5);
    assert_eq!(&frame[43..48], b"range");
    assert_eq!(be_i32(&frame, 48) as usize, metadata.len());
    assert_eq!(&frame[52..], &metadata[..]);
}

#[test]
fn test_heartbeat_request_bytes() {
    let request = HeartbeatRequest {
        group_id: "g".to_string(),
        generation_id: 3,
        member_id: "m".to_string(),
    };
    let header = RequestHeader::new(ApiKey::Heartbeat, 0, 1, "c");
    let frame = encode_request(&header, &request).unwrap();

    assert_eq!(
        frame.as_ref(),
        &[
            0x00, 0x00, 0x00, 0x15, // length: 21
            0x00, 0x0c, // api key 12
            0x00, 0x00, // api version 0
            0x00, 0x00, 0x00, 0x01, // correlation id 1
            0x00, 0x01, b'c', // client id
            0x00, 0x01, b'g', // group id
            0x00, 0x00, 0x00, 0x03, // generation id 3
            0x00, 0x01, b'm', // member id
        ]
    );
}

#[test]
fn test_leave_group_request_bytes() {
    let request = LeaveGroupRequest {
        group_id: "g".to_string(),
        member_id: "m".to_string(),
    };
    let header = RequestHeader::new(ApiKey::LeaveGroup, 0, 2, "c");
    let frame = encode_request(&header, &request).unwrap();

    assert_eq!(
        frame.as_ref(),
        &[
            0x00, 0x00, 0x00, 0x11, // length: 17
            0x00, 0x0d, // api key 13
            0x00, 0x00, // api version 0
            0x00, 0x00, 0x00, 0x02, // correlation id 2
            0x00, 0x01, b'c', // client id
            0x00, 0x01, b'g', // group id
            0x00, 0x01, b'm', // member id
        ]
    );
}

#[test]
fn test_sync_group_response_bytes() {
    let response = SyncGroupResponse {
        error_code: 27,
        member_assignment: Bytes::new(),
    };
    let frame = encode_response(7, &response, 0).unwrap();

    assert_eq!(
        frame.as_ref(),
        &[
            0x00, 0x00, 0x00, 0x0a, // length: 10
            0x00, 0x00, 0x00, 0x07, // correlation id 7
            0x00, 0x1b, // error code 27
            0x00, 0x00, 0x00, 0x00, // assignment: 0 bytes
        ]
    );
}
