//! SyncGroup API types
//!
//! The leader attaches the full group assignment; followers send an empty
//! assignment list. Every member gets its own slice back as an opaque
//! [`MemberAssignment`] blob.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// Per-member assignment entry of a SyncGroup request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncGroupRequestAssignment {
    /// Member the assignment is for
    pub member_id: String,
    /// Serialized [`MemberAssignment`]
    pub assignment: Bytes,
}

/// SyncGroup request (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncGroupRequest {
    /// The unique group identifier
    pub group_id: String,
    /// Generation id returned by the preceding join
    pub generation_id: i32,
    /// This member's id
    pub member_id: String,
    /// Group assignment, leader only
    pub assignments: Vec<SyncGroupRequestAssignment>,
}

impl KafkaEncodable for SyncGroupRequest {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_string(Some(&self.group_id));
        encoder.write_i32(self.generation_id);
        encoder.write_string(Some(&self.member_id));
        encoder.write_array_len(self.assignments.len());
        for assignment in &self.assignments {
            encoder.write_string(Some(&assignment.member_id));
            encoder.write_bytes(Some(&assignment.assignment));
        }
        Ok(())
    }
}

impl KafkaDecodable for SyncGroupRequest {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let group_id = decoder.read_required_string("group id")?;
        let generation_id = decoder.read_i32()?;
        let member_id = decoder.read_required_string("member id")?;
        let count = decoder.read_array_len()?;
        let mut assignments = Vec::with_capacity(count);
        for _ in 0..count {
            let member_id = decoder.read_required_string("member id")?;
            let assignment = decoder.read_bytes()?.unwrap_or_default();
            assignments.push(SyncGroupRequestAssignment {
                member_id,
                assignment,
            });
        }
        Ok(SyncGroupRequest {
            group_id,
            generation_id,
            member_id,
            assignments,
        })
    }
}

/// SyncGroup response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncGroupResponse {
    /// Error code
    pub error_code: i16,
    /// This member's assignment, a serialized [`MemberAssignment`]
    /// (may be empty when the response carries an error)
    pub member_assignment: Bytes,
}

impl KafkaEncodable for SyncGroupResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i16(self.error_code);
        encoder.write_bytes(Some(&self.member_assignment));
        Ok(())
    }
}

impl KafkaDecodable for SyncGroupResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(SyncGroupResponse {
            error_code: decoder.read_i16()?,
            member_assignment: decoder.read_bytes()?.unwrap_or_default(),
        })
    }
}

/// Partitions of one topic assigned to one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionAssignment {
    /// Topic name
    pub topic: String,
    /// Assigned partition ids, in range order
    pub partitions: Vec<i32>,
}

/// The opaque assignment blob carried in SyncGroup.
///
/// MemberAssignment => Version [PartitionAssignment] UserData
///   Version => int16
///   PartitionAssignment => Topic [Partition]
///   UserData => bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAssignment {
    /// Assignment version
    pub version: i16,
    /// Per-topic partition assignments
    pub assignments: Vec<PartitionAssignment>,
    /// Opaque user data
    pub user_data: Option<Bytes>,
}

impl MemberAssignment {
    pub fn new(assignments: Vec<PartitionAssignment>) -> Self {
        MemberAssignment {
            version: 0,
            assignments,
            user_data: None,
        }
    }

    /// Serialize into the opaque blob form.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        let mut encoder = Encoder::new(&mut buf);
        encoder.write_i16(self.version);
        encoder.write_array_len(self.assignments.len());
        for assignment in &self.assignments {
            encoder.write_string(Some(&assignment.topic));
            encoder.write_array_len(assignment.partitions.len());
            for partition in &assignment.partitions {
                encoder.write_i32(*partition);
            }
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
        let mut assignments = Vec::with_capacity(count);
        for _ in 0..count {
            let topic = decoder.read_required_string("assignment topic")?;
            let partition_count = decoder.read_array_len()?;
            let mut partitions = Vec::with_capacity(partition_count);
            for _ in 0..partition_count {
                partitions.push(decoder.read_i32()?);
            }
            assignments.push(PartitionAssignment { topic, partitions });
        }
        // Some implementations omit the trailing user data entirely.
        let user_data = if decoder.remaining() == 0 {
            None
        } else {
            decoder.read_bytes()?
        };
        Ok(MemberAssignment {
            version,
            assignments,
            user_data,
        })
    }
}
