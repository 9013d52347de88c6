//! Message set format (v0).
//!
//! MessageSet => [Offset MessageSize Message]
//!   Offset => int64
//!   MessageSize => int32
//!   Message => Crc MagicByte Attributes Key Value
//!     Crc => uint32 (over everything after itself)
//!     MagicByte => int8
//!     Attributes => int8
//!     Key => bytes (nullable)
//!     Value => bytes (nullable)
//!
//! A message set has no element-count prefix; it is delimited purely by the
//! enclosing size field, and the broker may cut the final message short.

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use lodbrok_common::Result;

use crate::parser::{Decoder, Encoder};

/// One decoded message. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Log offset of this message within its partition
    pub offset: i64,
    /// CRC as carried on the wire (not re-verified by the decoder)
    pub crc: u32,
    /// Message format magic byte
    pub magic: i8,
    /// Attributes bit field (compression codec in the low bits)
    pub attributes: i8,
    /// Message key; None when encoded with length -1
    pub key: Option<Bytes>,
    /// Message value; None when encoded with length -1
    pub value: Option<Bytes>,
}

impl Message {
    /// Bytes this message occupies on the wire, including the offset and
    /// size fields.
    pub fn wire_size(&self) -> usize {
        let key_len = self.key.as_ref().map(|k| k.len()).unwrap_or(0);
        let value_len = self.value.as_ref().map(|v| v.len()).unwrap_or(0);
        8 + 4 + 4 + 1 + 1 + 4 + key_len + 4 + value_len
    }

    pub fn encode(&self, encoder: &mut Encoder) {
        let body_size = (self.wire_size() - 12) as i32;
        encoder.write_i64(self.offset);
        encoder.write_i32(body_size);
        encoder.write_u32(self.crc);
        encoder.write_i8(self.magic);
        encoder.write_i8(self.attributes);
        encoder.write_bytes(self.key.as_deref());
        encoder.write_bytes(self.value.as_deref());
    }
}

/// Ordered sequence of messages; wire order equals offset order.
pub type MessageSet = Vec<Message>;

/// Encode a message set into `buf`, returning the encoded size in bytes.
pub fn encode_message_set(messages: &MessageSet, buf: &mut BytesMut) -> usize {
    let before = buf.len();
    let mut encoder = Encoder::new(buf);
    for message in messages {
        message.encode(&mut encoder);
    }
    buf.len() - before
}

/// Decode a message set from exactly `size` bytes of `buf`.
///
/// A trailing message cut short by the declared size is dropped silently;
/// that is the broker's way of saying "end of frame", not an error.
pub fn decode_message_set(buf: &mut Bytes, size: usize) -> Result<MessageSet> {
    let mut set_bytes = buf.split_to(size.min(buf.len()));
    let mut messages = Vec::new();

    loop {
        if set_bytes.remaining() < 12 {
            // Not even room for offset + size: trailing fragment.
            set_bytes.advance(set_bytes.remaining());
            break;
        }

        let declared = i32::from_be_bytes([set_bytes[8], set_bytes[9], set_bytes[10], set_bytes[11]]);
        if declared < 0 || set_bytes.remaining() - 12 < declared as usize {
            set_bytes.advance(set_bytes.remaining());
            break;
        }

        let mut decoder = Decoder::new(&mut set_bytes);
        let offset = decoder.read_i64()?;
        let _size = decoder.read_i32()?;
        let crc = decoder.read_u32()?;
        let magic = decoder.read_i8()?;
        let attributes = decoder.read_i8()?;
        let key = decoder.read_bytes()?;
        let value = decoder.read_bytes()?;

        messages.push(Message {
            offset,
            crc,
            magic,
            attributes,
            key,
            value,
        });

        if !set_bytes.has_remaining() {
            break;
        }
    }

    Ok(messages)
}
