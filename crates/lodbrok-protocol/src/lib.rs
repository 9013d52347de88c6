//! Kafka wire protocol codec for Lodbrok.
//!
//! This crate implements the client side of the broker wire protocol:
//! - Length-prefixed request/response framing
//! - Big-endian primitive encode/decode over [`bytes`] buffers
//! - All request/response message layouts this client speaks (v0-era APIs)
//! - The error-code registry mapping numeric codes to descriptors
//! - Message sets, including an incremental decoder for streamed fetches

pub mod api_versions_types;
pub mod error_codes;
pub mod fetch_stream;
pub mod fetch_types;
pub mod find_coordinator_types;
pub mod frame;
pub mod heartbeat_types;
pub mod join_group_types;
pub mod leave_group_types;
pub mod list_groups_types;
pub mod metadata_types;
pub mod offset_commit_types;
pub mod offsets_types;
pub mod parser;
pub mod records;
pub mod sync_group_types;

// Re-export main types
pub use error_codes::{broker_error, check_error_code, ALL_ERRORS};
pub use fetch_stream::{FetchEvent, FetchStreamDecoder};
pub use frame::{decode_response, encode_request, encode_response, split_response_frame};
pub use parser::{
    ApiKey, Decoder, Encoder, KafkaDecodable, KafkaEncodable, RequestHeader, ResponseHeader,
};
pub use records::{Message, MessageSet};
