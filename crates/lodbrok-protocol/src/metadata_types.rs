//! Metadata API types

use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// Metadata request (v0).
///
/// An empty topic list asks for metadata of all topics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRequest {
    /// Topics to fetch metadata for
    pub topics: Vec<String>,
}

impl KafkaEncodable for MetadataRequest {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_array_len(self.topics.len());
        for topic in &self.topics {
            encoder.write_string(Some(topic));
        }
        Ok(())
    }
}

impl KafkaDecodable for MetadataRequest {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let count = decoder.read_array_len()?;
        let mut topics = Vec::with_capacity(count);
        for _ in 0..count {
            topics.push(decoder.read_required_string("topic name")?);
        }
        Ok(MetadataRequest { topics })
    }
}

/// One broker node of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerMetadata {
    /// Broker node id
    pub node_id: i32,
    /// The broker hostname
    pub host: String,
    /// The broker port
    pub port: i32,
}

/// Per-partition metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMetadata {
    /// Error code for this partition
    pub error_code: i16,
    /// Partition id
    pub partition: i32,
    /// Node id of the partition leader
    pub leader: i32,
    /// Node ids of all replicas
    pub replicas: Vec<i32>,
    /// Node ids of the in-sync replicas
    pub isr: Vec<i32>,
}

/// Per-topic metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    /// Error code for this topic
    pub error_code: i16,
    /// Topic name
    pub topic: String,
    /// Partition metadata
    pub partitions: Vec<PartitionMetadata>,
}

impl TopicMetadata {
    /// Node id of the leader for `partition`, if known.
    pub fn leader_of(&self, partition: i32) -> Option<i32> {
        self.partitions
            .iter()
            .find(|p| p.partition == partition)
            .map(|p| p.leader)
    }
}

/// Metadata response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataResponse {
    /// Cluster brokers
    pub brokers: Vec<BrokerMetadata>,
    /// Topic metadata
    pub topics: Vec<TopicMetadata>,
}

impl KafkaEncodable for MetadataResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_array_len(self.brokers.len());
        for broker in &self.brokers {
            encoder.write_i32(broker.node_id);
            encoder.write_string(Some(&broker.host));
            encoder.write_i32(broker.port);
        }

        encoder.write_array_len(self.topics.len());
        for topic in &self.topics {
            encoder.write_i16(topic.error_code);
            encoder.write_string(Some(&topic.topic));
            encoder.write_array_len(topic.partitions.len());
            for p in &topic.partitions {
                encoder.write_i16(p.error_code);
                encoder.write_i32(p.partition);
                encoder.write_i32(p.leader);
                encoder.write_array_len(p.replicas.len());
                for r in &p.replicas {
                    encoder.write_i32(*r);
                }
                encoder.write_array_len(p.isr.len());
                for r in &p.isr {
                    encoder.write_i32(*r);
                }
            }
        }
        Ok(())
    }
}

impl KafkaDecodable for MetadataResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let broker_count = decoder.read_array_len()?;
        let mut brokers = Vec::with_capacity(broker_count);
        for _ in 0..broker_count {
            brokers.push(BrokerMetadata {
                node_id: decoder.read_i32()?,
                host: decoder.read_required_string("broker host")?,
                port: decoder.read_i32()?,
            });
        }

        let topic_count = decoder.read_array_len()?;
        let mut topics = Vec::with_capacity(topic_count);
        for _ in 0..topic_count {
            let error_code = decoder.read_i16()?;
            let topic = decoder.read_required_string("topic name")?;
            let partition_count = decoder.read_array_len()?;
            let mut partitions = Vec::with_capacity(partition_count);
            for _ in 0..partition_count {
                let error_code = decoder.read_i16()?;
                let partition = decoder.read_i32()?;
                let leader = decoder.read_i32()?;

                let replica_count = decoder.read_array_len()?;
                let mut replicas = Vec::with_capacity(replica_count);
                for _ in 0..replica_count {
                    replicas.push(decoder.read_i32()?);
                }

                let isr_count = decoder.read_array_len()?;
                let mut isr = Vec::with_capacity(isr_count);
                for _ in 0..isr_count {
                    isr.push(decoder.read_i32()?);
                }

                partitions.push(PartitionMetadata {
                    error_code,
                    partition,
                    leader,
                    replicas,
                    isr,
                });
            }
            topics.push(TopicMetadata {
                error_code,
                topic,
                partitions,
            });
        }

        Ok(MetadataResponse { brokers, topics })
    }
}
