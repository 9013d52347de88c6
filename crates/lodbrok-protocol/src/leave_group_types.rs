//! LeaveGroup API types

use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// LeaveGroup request (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveGroupRequest {
    /// The unique group identifier
    pub group_id: String,
    /// The member leaving the group
    pub member_id: String,
}

impl KafkaEncodable for LeaveGroupRequest {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_string(Some(&self.group_id));
        encoder.write_string(Some(&self.member_id));
        Ok(())
    }
}

impl KafkaDecodable for LeaveGroupRequest {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(LeaveGroupRequest {
            group_id: decoder.read_required_string("group id")?,
            member_id: decoder.read_required_string("member id")?,
        })
    }
}

/// LeaveGroup response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveGroupResponse {
    /// Error code
    pub error_code: i16,
}

impl KafkaEncodable for LeaveGroupResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i16(self.error_code);
        Ok(())
    }
}

impl KafkaDecodable for LeaveGroupResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(LeaveGroupResponse {
            error_code: decoder.read_i16()?,
        })
    }
}
