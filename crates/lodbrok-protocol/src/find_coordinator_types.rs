//! FindCoordinator API types

use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// FindCoordinator request (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindCoordinatorRequest {
    /// The group to find the coordinator for
    pub group_id: String,
}

impl KafkaEncodable for FindCoordinatorRequest {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_string(Some(&self.group_id));
        Ok(())
    }
}

impl KafkaDecodable for FindCoordinatorRequest {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(FindCoordinatorRequest {
            group_id: decoder.read_required_string("group id")?,
        })
    }
}

/// The coordinator broker for a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinator {
    /// Coordinator node id
    pub node_id: i32,
    /// Coordinator hostname
    pub host: String,
    /// Coordinator port
    pub port: i32,
}

/// FindCoordinator response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindCoordinatorResponse {
    /// Error code
    pub error_code: i16,
    /// The coordinator broker
    pub coordinator: Coordinator,
}

impl KafkaEncodable for FindCoordinatorResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i16(self.error_code);
        encoder.write_i32(self.coordinator.node_id);
        encoder.write_string(Some(&self.coordinator.host));
        encoder.write_i32(self.coordinator.port);
        Ok(())
    }
}

impl KafkaDecodable for FindCoordinatorResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(FindCoordinatorResponse {
            error_code: decoder.read_i16()?,
            coordinator: Coordinator {
                node_id: decoder.read_i32()?,
                host: decoder.read_required_string("coordinator host")?,
                port: decoder.read_i32()?,
            },
        })
    }
}
