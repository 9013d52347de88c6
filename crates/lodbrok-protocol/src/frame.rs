//! Request/response framing.
//!
//! Every request and response is length-prefixed:
//! - Request: [Length: i32][RequestHeader][Body]
//! - Response: [Length: i32][CorrelationId: i32][Body]
//!
//! The length prefix counts everything after itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use lodbrok_common::{Error, Result};

use crate::parser::{Decoder, Encoder, KafkaDecodable, KafkaEncodable, RequestHeader, ResponseHeader};

/// Encode a full request frame: length prefix, header, body.
pub fn encode_request(header: &RequestHeader, body: &impl KafkaEncodable) -> Result<Bytes> {
    let mut payload = BytesMut::new();
    {
        let mut encoder = Encoder::new(&mut payload);
        header.encode(&mut encoder);
        body.encode(&mut encoder, header.api_version)?;
    }

    let mut framed = BytesMut::with_capacity(payload.len() + 4);
    framed.put_i32(payload.len() as i32);
    framed.extend_from_slice(&payload);
    Ok(framed.freeze())
}

/// Split a full response frame into its header and body.
///
/// The declared length must equal the number of bytes actually supplied
/// after the prefix; anything else is a protocol error. This check is
/// mandatory for every response type.
pub fn split_response_frame(frame: &[u8]) -> Result<(ResponseHeader, Bytes)> {
    if frame.len() < 8 {
        return Err(Error::Protocol(format!(
            "Response frame too short: {} bytes",
            frame.len()
        )));
    }

    let mut buf = Bytes::copy_from_slice(frame);
    let declared = buf.get_i32();
    if declared < 0 || declared as usize + 4 != frame.len() {
        return Err(Error::Protocol(format!(
            "Response length mismatch: declared {} but frame carries {} bytes",
            declared,
            frame.len() - 4
        )));
    }

    let correlation_id = buf.get_i32();
    Ok((ResponseHeader { correlation_id }, buf))
}

/// Decode a typed response from a full frame, returning the correlation id
/// alongside the body. Trailing bytes that the body decoder did not consume
/// are a protocol error.
pub fn decode_response<T: KafkaDecodable>(frame: &[u8], version: i16) -> Result<(i32, T)> {
    let (header, mut body) = split_response_frame(frame)?;
    let mut decoder = Decoder::new(&mut body);
    let value = T::decode(&mut decoder, version)?;
    if decoder.remaining() != 0 {
        return Err(Error::Protocol(format!(
            "{} undecoded bytes after response body",
            decoder.remaining()
        )));
    }
    Ok((header.correlation_id, value))
}

/// Build a full response frame from a body encoder. Used by tests and by
/// anything that needs to fabricate broker responses.
pub fn encode_response(correlation_id: i32, body: &impl KafkaEncodable, version: i16) -> Result<Bytes> {
    let mut payload = BytesMut::new();
    {
        let mut encoder = Encoder::new(&mut payload);
        encoder.write_i32(correlation_id);
        body.encode(&mut encoder, version)?;
    }

    let mut framed = BytesMut::with_capacity(payload.len() + 4);
    framed.put_i32(payload.len() as i32);
    framed.extend_from_slice(&payload);
    Ok(framed.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat_types::HeartbeatResponse;

    #[test]
    fn test_length_mismatch_rejected() {
        // Declared length of 100, but only 6 bytes follow.
        let mut frame = vec![0x00, 0x00, 0x00, 0x64];
        frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x00, 0x00]);
        assert!(split_response_frame(&frame).is_err());
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let mut frame = encode_response(1, &HeartbeatResponse { error_code: 0 }, 0)
            .unwrap()
            .to_vec();
        // Append one byte and fix up the length prefix so the frame itself
        // is well-formed but the body has leftovers.
        frame.push(0xff);
        let body_len = (frame.len() - 4) as i32;
        frame[..4].copy_from_slice(&body_len.to_be_bytes());

        let res: Result<(i32, HeartbeatResponse)> = decode_response(&frame, 0);
        assert!(res.is_err());
    }
}
