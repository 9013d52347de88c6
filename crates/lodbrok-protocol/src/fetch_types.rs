//! Fetch API types
//!
//! FetchResponse => [TopicName [Partition ErrorCode HighwaterMarkOffset MessageSetSize MessageSet]]
//!   TopicName => string
//!   Partition => int32
//!   ErrorCode => int16
//!   HighwaterMarkOffset => int64
//!   MessageSetSize => int32

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};
use crate::records::{decode_message_set, encode_message_set, MessageSet};

/// Partition entry of a Fetch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequestPartition {
    /// Partition id
    pub partition: i32,
    /// Offset to begin the fetch from
    pub fetch_offset: i64,
    /// Maximum bytes to return for this partition
    pub max_bytes: i32,
}

/// Topic entry of a Fetch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequestTopic {
    /// Topic name
    pub topic: String,
    /// Partitions to fetch
    pub partitions: Vec<FetchRequestPartition>,
}

/// Fetch request (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Replica id of the requester (-1 for ordinary consumers)
    pub replica_id: i32,
    /// Maximum time in ms the broker may block waiting for min_bytes
    pub max_wait_time_ms: i32,
    /// Minimum bytes to accumulate before answering
    pub min_bytes: i32,
    /// Topics to fetch
    pub topics: Vec<FetchRequestTopic>,
}

impl FetchRequest {
    /// Fetch a single (topic, partition) starting at `fetch_offset`.
    pub fn single(
        topic: &str,
        partition: i32,
        fetch_offset: i64,
        max_wait_time_ms: i32,
        min_bytes: i32,
        max_bytes: i32,
    ) -> Self {
        FetchRequest {
            replica_id: -1,
            max_wait_time_ms,
            min_bytes,
            topics: vec![FetchRequestTopic {
                topic: topic.to_string(),
                partitions: vec![FetchRequestPartition {
                    partition,
                    fetch_offset,
                    max_bytes,
                }],
            }],
        }
    }
}

impl KafkaEncodable for FetchRequest {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i32(self.replica_id);
        encoder.write_i32(self.max_wait_time_ms);
        encoder.write_i32(self.min_bytes);
        encoder.write_array_len(self.topics.len());
        for topic in &self.topics {
            encoder.write_string(Some(&topic.topic));
            encoder.write_array_len(topic.partitions.len());
            for p in &topic.partitions {
                encoder.write_i32(p.partition);
                encoder.write_i64(p.fetch_offset);
                encoder.write_i32(p.max_bytes);
            }
        }
        Ok(())
    }
}

impl KafkaDecodable for FetchRequest {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let replica_id = decoder.read_i32()?;
        let max_wait_time_ms = decoder.read_i32()?;
        let min_bytes = decoder.read_i32()?;
        let topic_count = decoder.read_array_len()?;
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            let topic = decoder.read_required_string("topic name")?;
            let partition_count = decoder.read_array_len()?;
            let mut partitions = Vec::with_capacity(partition_count);
            for _ in 0..partition_count {
                partitions.push(FetchRequestPartition {
                    partition: decoder.read_i32()?,
                    fetch_offset: decoder.read_i64()?,
                    max_bytes: decoder.read_i32()?,
                });
            }
            topics.push(FetchRequestTopic { topic, partitions });
        }
        Ok(FetchRequest {
            replica_id,
            max_wait_time_ms,
            min_bytes,
            topics,
        })
    }
}

/// Partition entry of a Fetch response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponsePartition {
    /// Partition id
    pub partition: i32,
    /// Error code for this partition
    pub error_code: i16,
    /// The offset at the end of the log for this partition
    pub high_watermark: i64,
    /// The fetched messages
    pub messages: MessageSet,
}

/// Topic entry of a Fetch response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponseTopic {
    /// Topic name
    pub topic: String,
    /// Per-partition data
    pub partitions: Vec<FetchResponsePartition>,
}

/// Fetch response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// Per-topic results
    pub topics: Vec<FetchResponseTopic>,
}

impl KafkaEncodable for FetchResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_array_len(self.topics.len());
        for topic in &self.topics {
            encoder.write_string(Some(&topic.topic));
            encoder.write_array_len(topic.partitions.len());
            for p in &topic.partitions {
                encoder.write_i32(p.partition);
                encoder.write_i16(p.error_code);
                encoder.write_i64(p.high_watermark);

                let mut set_buf = BytesMut::new();
                let set_size = encode_message_set(&p.messages, &mut set_buf);
                encoder.write_i32(set_size as i32);
                encoder.write_raw(&set_buf);
            }
        }
        Ok(())
    }
}

impl KafkaDecodable for FetchResponse {
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
                let high_watermark = decoder.read_i64()?;
                let set_size = decoder.read_i32()?;
                let set_size = if set_size < 0 { 0 } else { set_size as usize };
                let mut set_bytes = decoder.read_raw(set_size.min(decoder.remaining()))?;
                let messages = decode_message_set(&mut set_bytes, set_size)?;
                partitions.push(FetchResponsePartition {
                    partition,
                    error_code,
                    high_watermark,
                    messages,
                });
            }
            topics.push(FetchResponseTopic { topic, partitions });
        }
        Ok(FetchResponse { topics })
    }
}
