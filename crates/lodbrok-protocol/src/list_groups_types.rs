//! ListGroups API types

use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// ListGroups request (v0): header only, no body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListGroupsRequest;

impl KafkaEncodable for ListGroupsRequest {
    fn encode(&self, _encoder: &mut Encoder, _version: i16) -> Result<()> {
        Ok(())
    }
}

impl KafkaDecodable for ListGroupsRequest {
    fn decode(_decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(ListGroupsRequest)
    }
}

/// One group known to a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedGroup {
    /// Group id
    pub group_id: String,
    /// Protocol type, e.g. "consumer"
    pub protocol_type: String,
}

/// ListGroups response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListGroupsResponse {
    /// Error code
    pub error_code: i16,
    /// Groups coordinated by the answering broker
    pub groups: Vec<ListedGroup>,
}

impl KafkaEncodable for ListGroupsResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i16(self.error_code);
        encoder.write_array_len(self.groups.len());
        for group in &self.groups {
            encoder.write_string(Some(&group.group_id));
            encoder.write_string(Some(&group.protocol_type));
        }
        Ok(())
    }
}

impl KafkaDecodable for ListGroupsResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let error_code = decoder.read_i16()?;
        let count = decoder.read_array_len()?;
        let mut groups = Vec::with_capacity(count);
        for _ in 0..count {
            groups.push(ListedGroup {
                group_id: decoder.read_required_string("group id")?,
                protocol_type: decoder.read_required_string("protocol type")?,
            });
        }
        Ok(ListGroupsResponse { error_code, groups })
    }
}
