//! Kafka wire protocol parser.

use bytes::{Buf, BufMut, BytesMut};
use lodbrok_common::{Error, Result};

/// Kafka API keys used by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKey {
    Fetch = 1,
    Offsets = 2,
    Metadata = 3,
    OffsetCommit = 8,
    FindCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
    ListGroups = 16,
    ApiVersions = 18,
}

impl ApiKey {
    /// Try to create an ApiKey from an i16
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(ApiKey::Fetch),
            2 => Some(ApiKey::Offsets),
            3 => Some(ApiKey::Metadata),
            8 => Some(ApiKey::OffsetCommit),
            10 => Some(ApiKey::FindCoordinator),
            11 => Some(ApiKey::JoinGroup),
            12 => Some(ApiKey::Heartbeat),
            13 => Some(ApiKey::LeaveGroup),
            14 => Some(ApiKey::SyncGroup),
            16 => Some(ApiKey::ListGroups),
            18 => Some(ApiKey::ApiVersions),
            _ => None,
        }
    }
}

/// Request header preceding every request body.
///
/// Wire layout: api_key (int16), api_version (int16), correlation_id (int32),
/// client_id (length-prefixed string, 2-byte length).
#[derive(Debug, Clone)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn new(api_key: ApiKey, api_version: i16, correlation_id: i32, client_id: &str) -> Self {
        RequestHeader {
            api_key,
            api_version,
            correlation_id,
            client_id: Some(client_id.to_string()),
        }
    }

    pub fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i16(self.api_key as i16);
        encoder.write_i16(self.api_version);
        encoder.write_i32(self.correlation_id);
        encoder.write_string(self.client_id.as_deref());
    }
}

/// Response header: a bare correlation id.
#[derive(Debug, Clone)]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

/// A type that can be written as a request or response body.
pub trait KafkaEncodable {
    fn encode(&self, encoder: &mut Encoder, version: i16) -> Result<()>;
}

/// A type that can be read from a request or response body.
pub trait KafkaDecodable: Sized {
    fn decode(decoder: &mut Decoder, version: i16) -> Result<Self>;
}

/// Protocol decoder for reading Kafka protocol primitives
pub struct Decoder<'a> {
    buf: &'a mut dyn Buf,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder
    pub fn new(buf: &'a mut dyn Buf) -> Self {
        Self { buf }
    }

    /// Bytes left in the underlying buffer
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Read an i8
    pub fn read_i8(&mut self) -> Result<i8> {
        if self.buf.remaining() < 1 {
            return Err(Error::Protocol("Not enough bytes for i8".into()));
        }
        Ok(self.buf.get_i8())
    }

    /// Read an i16
    pub fn read_i16(&mut self) -> Result<i16> {
        if self.buf.remaining() < 2 {
            return Err(Error::Protocol("Not enough bytes for i16".into()));
        }
        Ok(self.buf.get_i16())
    }

    /// Read an i32
    pub fn read_i32(&mut self) -> Result<i32> {
        if self.buf.remaining() < 4 {
            return Err(Error::Protocol("Not enough bytes for i32".into()));
        }
        Ok(self.buf.get_i32())
    }

    /// Read a u32 (used for CRC fields)
    pub fn read_u32(&mut self) -> Result<u32> {
        if self.buf.remaining() < 4 {
            return Err(Error::Protocol("Not enough bytes for u32".into()));
        }
        Ok(self.buf.get_u32())
    }

    /// Read an i64
    pub fn read_i64(&mut self) -> Result<i64> {
        if self.buf.remaining() < 8 {
            return Err(Error::Protocol("Not enough bytes for i64".into()));
        }
        Ok(self.buf.get_i64())
    }

    /// Read a string (null = -1 length)
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let len = self.read_i16()?;
        if len < 0 {
            return Ok(None);
        }

        let len = len as usize;
        if self.buf.remaining() < len {
            return Err(Error::Protocol(format!(
                "Not enough bytes for string of length {}",
                len
            )));
        }

        let mut bytes = vec![0u8; len];
        self.buf.copy_to_slice(&mut bytes);

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| Error::Protocol(format!("Invalid UTF-8 in string: {}", e)))
    }

    /// Read a non-null string, rejecting the null marker
    pub fn read_required_string(&mut self, what: &str) -> Result<String> {
        self.read_string()?
            .ok_or_else(|| Error::Protocol(format!("{} cannot be null", what)))
    }

    /// Read a byte array (null = -1 length)
    pub fn read_bytes(&mut self) -> Result<Option<bytes::Bytes>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }

        let len = len as usize;
        if self.buf.remaining() < len {
            return Err(Error::Protocol(format!(
                "Not enough bytes for byte array of length {}",
                len
            )));
        }

        Ok(Some(self.buf.copy_to_bytes(len)))
    }

    /// Consume `len` raw bytes with no length prefix
    pub fn read_raw(&mut self, len: usize) -> Result<bytes::Bytes> {
        if self.buf.remaining() < len {
            return Err(Error::Protocol(format!(
                "Not enough bytes: wanted {} raw bytes, have {}",
                len,
                self.buf.remaining()
            )));
        }
        Ok(self.buf.copy_to_bytes(len))
    }

    /// Read an array element count (4-byte prefix)
    pub fn read_array_len(&mut self) -> Result<usize> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(Error::Protocol(format!("Negative array length: {}", len)));
        }
        Ok(len as usize)
    }
}

/// Protocol encoder for writing Kafka protocol primitives
pub struct Encoder<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> Encoder<'a> {
    /// Create a new encoder
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    /// Write an i8
    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    /// Write an i16
    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    /// Write an i32
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    /// Write a u32 (used for CRC fields)
    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Write an i64
    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    /// Write a string (null = None)
    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                self.write_i16(s.len() as i16);
                self.buf.put_slice(s.as_bytes());
            }
            None => {
                self.write_i16(-1);
            }
        }
    }

    /// Write a byte array (null = None)
    pub fn write_bytes(&mut self, value: Option<&[u8]>) {
        match value {
            Some(bytes) => {
                self.write_i32(bytes.len() as i32);
                self.buf.put_slice(bytes);
            }
            None => {
                self.write_i32(-1);
            }
        }
    }

    /// Append raw pre-encoded bytes with no length prefix
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Write an array element count (4-byte prefix)
    pub fn write_array_len(&mut self, len: usize) {
        self.write_i32(len as i32);
    }
}
