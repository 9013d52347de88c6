//! Offsets API types
//!
//! Offsets (a.k.a. ListOffsets) resolves a timestamp to the offsets of the
//! log segments in effect at that time; -1 asks for the latest offset and
//! -2 for the earliest.

use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// Timestamp asking for the latest offset
pub const LATEST_TIMESTAMP: i64 = -1;
/// Timestamp asking for the earliest offset
pub const EARLIEST_TIMESTAMP: i64 = -2;

/// Partition entry of an Offsets request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetsRequestPartition {
    /// Partition id
    pub partition: i32,
    /// Timestamp to search for (-1 = latest, -2 = earliest)
    pub time: i64,
    /// Maximum number of offsets to return
    pub max_number_of_offsets: i32,
}

/// Topic entry of an Offsets request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetsRequestTopic {
    /// Topic name
    pub topic: String,
    /// Partitions to resolve
    pub partitions: Vec<OffsetsRequestPartition>,
}

/// Offsets request (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetsRequest {
    /// Replica id of the requester (-1 for ordinary consumers)
    pub replica_id: i32,
    /// Topics to resolve offsets for
    pub topics: Vec<OffsetsRequestTopic>,
}

impl OffsetsRequest {
    /// Request one offset for a single (topic, partition) at `time`.
    pub fn single(topic: &str, partition: i32, time: i64) -> Self {
        OffsetsRequest {
            replica_id: -1,
            topics: vec![OffsetsRequestTopic {
                topic: topic.to_string(),
                partitions: vec![OffsetsRequestPartition {
                    partition,
                    time,
                    max_number_of_offsets: 1,
                }],
            }],
        }
    }
}

impl KafkaEncodable for OffsetsRequest {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i32(self.replica_id);
        encoder.write_array_len(self.topics.len());
        for topic in &self.topics {
            encoder.write_string(Some(&topic.topic));
            encoder.write_array_len(topic.partitions.len());
            for p in &topic.partitions {
                encoder.write_i32(p.partition);
                encoder.write_i64(p.time);
                encoder.write_i32(p.max_number_of_offsets);
            }
        }
        Ok(())
    }
}

impl KafkaDecodable for OffsetsRequest {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let replica_id = decoder.read_i32()?;
        let topic_count = decoder.read_array_len()?;
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            let topic = decoder.read_required_string("topic name")?;
            let partition_count = decoder.read_array_len()?;
            let mut partitions = Vec::with_capacity(partition_count);
            for _ in 0..partition_count {
                partitions.push(OffsetsRequestPartition {
                    partition: decoder.read_i32()?,
                    time: decoder.read_i64()?,
                    max_number_of_offsets: decoder.read_i32()?,
                });
            }
            topics.push(OffsetsRequestTopic { topic, partitions });
        }
        Ok(OffsetsRequest { replica_id, topics })
    }
}

/// Offsets of one partition, newest first as returned by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOffsets {
    /// Partition id
    pub partition: i32,
    /// Error code for this partition
    pub error_code: i16,
    /// Timestamp-bucketed offsets, order preserved from the wire
    pub offsets: Vec<i64>,
}

/// Topic entry of an Offsets response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetsResponseTopic {
    /// Topic name
    pub topic: String,
    /// Per-partition offsets
    pub partitions: Vec<PartitionOffsets>,
}

/// Offsets response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetsResponse {
    /// Per-topic results
    pub topics: Vec<OffsetsResponseTopic>,
}

impl KafkaEncodable for OffsetsResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_array_len(self.topics.len());
        for topic in &self.topics {
            encoder.write_string(Some(&topic.topic));
            encoder.write_array_len(topic.partitions.len());
            for p in &topic.partitions {
                encoder.write_i32(p.partition);
                encoder.write_i16(p.error_code);
                encoder.write_array_len(p.offsets.len());
                for offset in &p.offsets {
                    encoder.write_i64(*offset);
                }
            }
        }
        Ok(())
    }
}

impl KafkaDecodable for OffsetsResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let topic_count = decoder.read_array_len()?;
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            let topic = decoder.read_required_string("topic name")?;
            let partition_count = decoder.read_array_len()?;
            let mut partitions = Vec::with_capacity(partition_count);
            for _ in 0..partition_count {
                let partition = decoder.read_i32()?;
                let error_code = decoder.read_i16()?;
                let offset_count = decoder.read_array_len()?;
                let mut offsets = Vec::with_capacity(offset_count);
                for _ in 0..offset_count {
                    offsets.push(decoder.read_i64()?);
                }
                partitions.push(PartitionOffsets {
                    partition,
                    error_code,
                    offsets,
                });
            }
            topics.push(OffsetsResponseTopic { topic, partitions });
        }
        Ok(OffsetsResponse { topics })
    }
}
