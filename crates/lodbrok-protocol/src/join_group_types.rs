//! JoinGroup API types
//!
//! JoinGroup Request (Version: 0) => group_id session_timeout member_id protocol_type [group_protocols]
//!   group_id => STRING
//!   session_timeout => INT32
//!   member_id => STRING
//!   protocol_type => STRING
//!   group_protocols => protocol_name protocol_metadata
//!     protocol_name => STRING
//!     protocol_metadata => BYTES

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// Protocol in a JoinGroup request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProtocol {
    /// Protocol name (the assignment strategy, e.g. "range")
    pub name: String,
    /// Opaque protocol metadata (a serialized [`ProtocolMetadata`] for
    /// the consumer protocol type)
    pub metadata: Bytes,
}

/// JoinGroup request (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGroupRequest {
    /// The unique group identifier
    pub group_id: String,
    /// The coordinator considers the member dead if it receives no
    /// heartbeat within this window, in ms
    pub session_timeout_ms: i32,
    /// Member id assigned by the coordinator, empty on first join
    pub member_id: String,
    /// Unique name for the class of protocols implemented by the group
    pub protocol_type: String,
    /// Protocols the member supports
    pub protocols: Vec<GroupProtocol>,
}

impl KafkaEncodable for JoinGroupRequest {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_string(Some(&self.group_id));
        encoder.write_i32(self.session_timeout_ms);
        encoder.write_string(Some(&self.member_id));
        encoder.write_string(Some(&self.protocol_type));
        encoder.write_array_len(self.protocols.len());
        for protocol in &self.protocols {
            encoder.write_string(Some(&protocol.name));
            encoder.write_bytes(Some(&protocol.metadata));
        }
        Ok(())
    }
}

impl KafkaDecodable for JoinGroupRequest {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let group_id = decoder.read_required_string("group id")?;
        let session_timeout_ms = decoder.read_i32()?;
        let member_id = decoder.read_required_string("member id")?;
        let protocol_type = decoder.read_required_string("protocol type")?;
        let count = decoder.read_array_len()?;
        let mut protocols = Vec::with_capacity(count);
        for _ in 0..count {
            let name = decoder.read_required_string("protocol name")?;
            let metadata = decoder.read_bytes()?.unwrap_or_default();
            protocols.push(GroupProtocol { name, metadata });
        }
        Ok(JoinGroupRequest {
            group_id,
            session_timeout_ms,
            member_id,
            protocol_type,
            protocols,
        })
    }
}

/// Member entry of a JoinGroup response; the full list is only handed to
/// the member elected leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGroupResponseMember {
    /// Member id
    pub member_id: String,
    /// The protocol metadata this member advertised
    pub metadata: Bytes,
}

/// JoinGroup response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinGroupResponse {
    /// Error code
    pub error_code: i16,
    /// Generation id of the group after this join round
    pub generation_id: i32,
    /// The protocol selected by the coordinator
    pub group_protocol: String,
    /// Member id of the elected leader
    pub leader_id: String,
    /// Member id assigned to this member
    pub member_id: String,
    /// All group members (empty unless this member is the leader)
    pub members: Vec<JoinGroupResponseMember>,
}

impl KafkaEncodable for JoinGroupResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i16(self.error_code);
        encoder.write_i32(self.generation_id);
        encoder.write_string(Some(&self.group_protocol));
        encoder.write_string(Some(&self.leader_id));
        encoder.write_string(Some(&self.member_id));
        encoder.write_array_len(self.members.len());
        for member in &self.members {
            encoder.write_string(Some(&member.member_id));
            encoder.write_bytes(Some(&member.metadata));
        }
        Ok(())
    }
}

impl KafkaDecodable for JoinGroupResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let error_code = decoder.read_i16()?;
        let generation_id = decoder.read_i32()?;
        let group_protocol = decoder.read_required_string("group protocol")?;
        let leader_id = decoder.read_required_string("leader id")?;
        let member_id = decoder.read_required_string("member id")?;
        let count = decoder.read_array_len()?;
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            let member_id = decoder.read_required_string("member id")?;
            let metadata = decoder.read_bytes()?.unwrap_or_default();
            members.push(JoinGroupResponseMember { member_id, metadata });
        }
        Ok(JoinGroupResponse {
            error_code,
            generation_id,
            group_protocol,
            leader_id,
            member_id,
            members,
        })
    }
}

/// Consumer protocol metadata, carried opaquely inside a [`GroupProtocol`].
///
/// ProtocolMetadata => Version Subscription UserData
///   Version => int16
///   Subscription => [Topic]
///   UserData => bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMetadata {
    /// Metadata version
    pub version: i16,
    /// Subscribed topics
    pub subscription: Vec<String>,
    /// Opaque user data for custom assignment strategies
    pub user_data: Option<Bytes>,
}

impl ProtocolMetadata {
    /// Subscribe to a single topic with no user data.
    pub fn for_topic(topic: &str) -> Self {
        ProtocolMetadata {
            version: 0,
            subscription: vec![topic.to_string()],
            user_data: None,
        }
    }

    /// Serialize into the opaque blob form.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        let mut encoder = Encoder::new(&mut buf);
        encoder.write_i16(self.version);
        encoder.write_array_len(self.subscription.len());
        for topic in &self.subscription {
            encoder.write_string(Some(topic));
        }
        encoder.write_bytes(self.user_data.as_deref());
        buf.freeze()
    }

    /// Parse from the opaque blob form.
    pub fn from_bytes(blob: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(blob);
        let mut decoder = Decoder::new(&mut buf);
        let version = decoder.read_i16()?;
        let count = decoder.read_array_len()?;
        let mut subscription = Vec::with_capacity(count);
        for _ in 0..count {
            subscription.push(decoder.read_required_string("subscription topic")?);
        }
        // Some implementations omit the trailing user data entirely.
        let user_data = if decoder.remaining() == 0 {
            None
        } else {
            decoder.read_bytes()?
        };
        Ok(ProtocolMetadata {
            version,
            subscription,
            user_data,
        })
    }
}
