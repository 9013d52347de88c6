//! ApiVersions API types

use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable};

/// ApiVersions request (v0): header only, no body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiVersionsRequest;

impl KafkaEncodable for ApiVersionsRequest {
    fn encode(&self, _encoder: &mut Encoder, _version: i16) -> Result<()> {
        Ok(())
    }
}

impl KafkaDecodable for ApiVersionsRequest {
    fn decode(_decoder: &mut Decoder, _version: i16) -> Result<Self> {
        Ok(ApiVersionsRequest)
    }
}

/// Version range supported by the broker for one API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersion {
    /// API key
    pub api_key: i16,
    /// Minimum supported version
    pub min_version: i16,
    /// Maximum supported version
    pub max_version: i16,
}

/// ApiVersions response (v0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersionsResponse {
    /// Error code
    pub error_code: i16,
    /// Supported version ranges, one per API
    pub api_versions: Vec<ApiVersion>,
}

impl KafkaEncodable for ApiVersionsResponse {
    fn encode(&self, encoder: &mut Encoder, _version: i16) -> Result<()> {
        encoder.write_i16(self.error_code);
        encoder.write_array_len(self.api_versions.len());
        for v in &self.api_versions {
            encoder.write_i16(v.api_key);
            encoder.write_i16(v.min_version);
            encoder.write_i16(v.max_version);
        }
        Ok(())
    }
}

impl KafkaDecodable for ApiVersionsResponse {
    fn decode(decoder: &mut Decoder, _version: i16) -> Result<Self> {
        let error_code = decoder.read_i16()?;
        let count = decoder.read_array_len()?;
        let mut api_versions = Vec::with_capacity(count);
        for _ in 0..count {
            api_versions.push(ApiVersion {
                api_key: decoder.read_i16()?,
                min_version: decoder.read_i16()?,
                max_version: decoder.read_i16()?,
            });
        }
        Ok(ApiVersionsResponse {
            error_code,
            api_versions,
        })
    }
}
