//! Heartbeat API types

use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// Heartbeat request (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// The unique group identifier
    pub group_id: String,
    /// Current generation id
    pub generation_id: i32,
    /// This member's id
    pub member_id: String,
}

impl KafkaEncodable for HeartbeatRequest {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_string(Some(&self.group_id));
        encoder.write_i32(self.generation_id);
        encoder.write_string(Some(&self.member_id));
        Ok(())
    }
}

impl KafkaDecodable for HeartbeatRequest {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(HeartbeatRequest {
            group_id: decoder.read_required_string("group id")?,
            generation_id: decoder.read_i32()?,
            member_id: decoder.read_required_string("member id")?,
        })
    }
}

/// Heartbeat response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// Error code
    pub error_code: i16,
}

impl KafkaEncodable for HeartbeatResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i16(self.error_code);
        Ok(())
    }
}

impl KafkaDecodable for HeartbeatResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(HeartbeatResponse {
            error_code: decoder.read_i16()?,
        })
    }
}
