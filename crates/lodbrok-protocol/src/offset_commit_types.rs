//! OffsetCommit API types
//!
//! Two request versions are spoken: v0 stores offsets in the coordination
//! service backing the old consumers, v2 stores them in the broker's own
//! offsets topic and additionally carries the group generation, member id
//! and a retention time.

use serde::{Deserialize, Serialize};

use lodbrok_common::{Error, Result};

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// Partition entry of an OffsetCommit request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitRequestPartition {
    /// Partition id
    pub partition: i32,
    /// Offset to commit
    pub offset: i64,
    /// Opaque metadata stored with the offset
    pub metadata: Option<String>,
}

/// Topic entry of an OffsetCommit request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitRequestTopic {
    /// Topic name
    pub topic: String,
    /// Partition offsets to commit
    pub partitions: Vec<OffsetCommitRequestPartition>,
}

/// OffsetCommit request (v0 or v2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitRequest {
    /// The unique group identifier
    pub group_id: String,
    /// Current generation id (v2 only)
    pub generation_id: i32,
    /// This member's id (v2 only)
    pub member_id: String,
    /// Offset retention time in ms, -1 for the broker default (v2 only)
    pub retention_time_ms: i64,
    /// Offsets to commit
    pub topics: Vec<OffsetCommitRequestTopic>,
}

impl OffsetCommitRequest {
    /// Commit a single (topic, partition, offset) triple.
    pub fn single(
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Self {
        OffsetCommitRequest {
            group_id: group_id.to_string(),
            generation_id,
            member_id: member_id.to_string(),
            retention_time_ms: -1,
            topics: vec![OffsetCommitRequestTopic {
                topic: topic.to_string(),
                partitions: vec![OffsetCommitRequestPartition {
                    partition,
                    offset,
                    metadata: Some(String::new()),
                }],
            }],
        }
    }

    fn encode_topics(&self, encoder: &mut Encoder) {
        encoder.write_array_len(self.topics.len());
        for topic in &self.topics {
            encoder.write_string(Some(&topic.topic));
            encoder.write_array_len(topic.partitions.len());
            for p in &topic.partitions {
                encoder.write_i32(p.partition);
                encoder.write_i64(p.offset);
                encoder.write_string(p.metadata.as_deref());
            }
        }
    }

    fn decode_topics(decoder: &mut Decoder) -> Result<Vec<OffsetCommitRequestTopic>> {
        let topic_count = decoder.read_array_len()?;
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            let topic = decoder.read_required_string("topic name")?;
            let partition_count = decoder.read_array_len()?;
            let mut partitions = Vec::with_capacity(partition_count);
            for _ in 0..partition_count {
                partitions.push(OffsetCommitRequestPartition {
                    partition: decoder.read_i32()?,
                    offset: decoder.read_i64()?,
                    metadata: decoder.read_string()?,
                });
            }
            topics.push(OffsetCommitRequestTopic { topic, partitions });
        }
        Ok(topics)
    }
}

impl KafkaEncodable for OffsetCommitRequest {
    fn encode(&self, encoder: &mut Encoder, version: i16) -> Result<()> {
        match version {
            0 => {
                encoder.write_string(Some(&self.group_id));
                self.encode_topics(encoder);
            }
            2 => {
                encoder.write_string(Some(&self.group_id));
                encoder.write_i32(self.generation_id);
                encoder.write_string(Some(&self.member_id));
                encoder.write_i64(self.retention_time_ms);
                self.encode_topics(encoder);
            }
            v => {
                return Err(Error::Protocol(format!(
                    "Unsupported OffsetCommit version: {}",
                    v
                )))
            }
        }
        Ok(())
    }
}

impl KafkaDecodable for OffsetCommitRequest {
    fn decode(decoder: &mut Decoder, version: i16) -> Result<Self> {
        match version {
            0 => {
                let group_id = decoder.read_required_string("group id")?;
                let topics = Self::decode_topics(decoder)?;
                Ok(OffsetCommitRequest {
                    group_id,
                    generation_id: -1,
                    member_id: String::new(),
                    retention_time_ms: -1,
                    topics,
                })
            }
            2 => {
                let group_id = decoder.read_required_string("group id")?;
                let generation_id = decoder.read_i32()?;
                let member_id = decoder.read_required_string("member id")?;
                let retention_time_ms = decoder.read_i64()?;
                let topics = Self::decode_topics(decoder)?;
                Ok(OffsetCommitRequest {
                    group_id,
                    generation_id,
                    member_id,
                    retention_time_ms,
                    topics,
                })
            }
            v => Err(Error::Protocol(format!(
                "Unsupported OffsetCommit version: {}",
                v
            ))),
        }
    }
}

/// Partition entry of an OffsetCommit response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitResponsePartition {
    /// Partition id
    pub partition: i32,
    /// Error code for this partition
    pub error_code: i16,
}

/// Topic entry of an OffsetCommit response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitResponseTopic {
    /// Topic name
    pub topic: String,
    /// Per-partition results
    pub partitions: Vec<OffsetCommitResponsePartition>,
}

/// OffsetCommit response (v0/v2, identical layout)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitResponse {
    /// Per-topic results
    pub topics: Vec<OffsetCommitResponseTopic>,
}

impl OffsetCommitResponse {
    /// The first non-zero partition error code, if any.
    pub fn first_error(&self) -> Option<i16> {
        self.topics
            .iter()
            .flat_map(|t| t.partitions.iter())
            .map(|p| p.error_code)
            .find(|&code| code != 0)
    }
}

impl KafkaEncodable for OffsetCommitResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_array_len(self.topics.len());
        for topic in &self.topics {
            encoder.write_string(Some(&topic.topic));
            encoder.write_array_len(topic.partitions.len());
            for p in &topic.partitions {
                encoder.write_i32(p.partition);
                encoder.write_i16(p.error_code);
            }
        }
        Ok(())
    }
}

impl KafkaDecodable for OffsetCommitResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let topic_count = decoder.read_array_len()?;
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            let topic = decoder.read_required_string("topic name")?;
            let partition_count = decoder.read_array_len()?;
            let mut partitions = Vec::with_capacity(partition_count);
            for _ in 0..partition_count {
                partitions.push(OffsetCommitResponsePartition {
                    partition: decoder.read_i32()?,
                    error_code: decoder.read_i16()?,
                });
            }
            topics.push(OffsetCommitResponseTopic { topic, partitions });
        }
        Ok(OffsetCommitResponse { topics })
    }
}
