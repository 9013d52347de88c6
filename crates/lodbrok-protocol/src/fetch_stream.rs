//! Incremental decoder for streamed fetch responses.
//!
//! Fetch responses can be arbitrarily large (many partitions, large message
//! sets), so the transport forwards raw chunks as they arrive instead of
//! buffering the whole frame. This decoder consumes those chunks and yields
//! partition headers and complete messages as soon as they are fully
//! buffered; at no point does it need the entire response in memory.

use bytes::{Buf, BytesMut};
use tracing::trace;

use lodbrok_common::{Error, Result};

use crate::parser::Decoder;
use crate::records::Message;

/// One decoded item of a streamed fetch response, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// Start of a partition's data within the response.
    Partition {
        topic: String,
        partition: i32,
        error_code: i16,
        high_watermark: i64,
    },
    /// One complete message of the current partition.
    Message {
        topic: String,
        partition: i32,
        message: Message,
    },
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    /// Waiting for the 4-byte length prefix and the correlation id.
    FrameHeader,
    /// Waiting for the topic count.
    TopicCount,
    /// Waiting for a topic name and its partition count.
    TopicHeader,
    /// Waiting for a partition header.
    PartitionHeader,
    /// Inside a partition's message set with this many bytes left.
    MessageSet { remaining: usize },
    /// All declared bytes consumed.
    Finished,
}

/// Streaming fetch-response decoder.
///
/// Feed raw chunks with [`feed`](Self::feed), then drain events with
/// [`next_event`](Self::next_event) until it returns `None` (more bytes
/// needed, or the response is complete per [`is_complete`](Self::is_complete)).
pub struct FetchStreamDecoder {
    buf: BytesMut,
    state: DecodeState,
    correlation_id: Option<i32>,
    topics_left: usize,
    partitions_left: usize,
    current_topic: String,
    current_partition: i32,
}

impl FetchStreamDecoder {
    pub fn new() -> Self {
        FetchStreamDecoder {
            buf: BytesMut::new(),
            state: DecodeState::FrameHeader,
            correlation_id: None,
            topics_left: 0,
            partitions_left: 0,
            current_topic: String::new(),
            current_partition: -1,
        }
    }

    /// Append a raw chunk as read off the wire.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Correlation id of the response, once the frame header has arrived.
    pub fn correlation_id(&self) -> Option<i32> {
        self.correlation_id
    }

    /// True once every declared byte of the response has been decoded.
    pub fn is_complete(&self) -> bool {
        matches!(self.state, DecodeState::Finished)
    }

    /// Decode the next event out of the buffered bytes.
    ///
    /// Returns `Ok(None)` when more bytes are needed (or the response is
    /// complete); call [`feed`](Self::feed) and try again.
    pub fn next_event(&mut self) -> Result<Option<FetchEvent>> {
        loop {
            match self.state {
                DecodeState::FrameHeader => {
                    if self.buf.len() < 8 {
                        return Ok(None);
                    }
                    let declared = self.buf.get_i32();
                    if declared < 4 {
                        return Err(Error::Protocol(format!(
                            "Invalid fetch response length: {}",
                            declared
                        )));
                    }
                    self.correlation_id = Some(self.buf.get_i32());
                    trace!(declared, "fetch response frame header decoded");
                    self.state = DecodeState::TopicCount;
                }
                DecodeState::TopicCount => {
                    if self.buf.len() < 4 {
                        return Ok(None);
                    }
                    self.topics_left = self.buf.get_i32().max(0) as usize;
                    if self.topics_left == 0 {
                        self.state = DecodeState::Finished;
                        continue;
                    }
                    self.state = DecodeState::TopicHeader;
                }
                DecodeState::TopicHeader => {
                    if self.buf.len() < 2 {
                        return Ok(None);
                    }
                    let name_len = i16::from_be_bytes([self.buf[0], self.buf[1]]);
                    if name_len < 0 {
                        return Err(Error::Protocol("Null topic name in fetch response".into()));
                    }
                    let needed = 2 + name_len as usize + 4;
                    if self.buf.len() < needed {
                        return Ok(None);
                    }
                    let mut bytes = self.buf.split_to(needed).freeze();
                    let mut decoder = Decoder::new(&mut bytes);
                    self.current_topic = decoder.read_required_string("topic name")?;
                    self.partitions_left = decoder.read_i32()?.max(0) as usize;
                    if self.partitions_left == 0 {
                        self.finish_topic();
                    } else {
                        self.state = DecodeState::PartitionHeader;
                    }
                }
                DecodeState::PartitionHeader => {
                    // partition + error code + high watermark + set size
                    if self.buf.len() < 4 + 2 + 8 + 4 {
                        return Ok(None);
                    }
                    let mut bytes = self.buf.split_to(18).freeze();
                    let mut decoder = Decoder::new(&mut bytes);
                    let partition = decoder.read_i32()?;
                    let error_code = decoder.read_i16()?;
                    let high_watermark = decoder.read_i64()?;
                    let set_size = decoder.read_i32()?.max(0) as usize;

                    self.current_partition = partition;
                    self.state = DecodeState::MessageSet {
                        remaining: set_size,
                    };
                    return Ok(Some(FetchEvent::Partition {
                        topic: self.current_topic.clone(),
                        partition,
                        error_code,
                        high_watermark,
                    }));
                }
                DecodeState::MessageSet { remaining } => {
                    if remaining == 0 {
                        self.finish_partition();
                        continue;
                    }
                    if remaining < 12 {
                        // Trailing fragment smaller than a message header.
                        if self.buf.len() < remaining {
                            return Ok(None);
                        }
                        self.buf.advance(remaining);
                        self.state = DecodeState::MessageSet { remaining: 0 };
                        continue;
                    }
                    if self.buf.len() < 12 {
                        return Ok(None);
                    }
                    let declared = i32::from_be_bytes([
                        self.buf[8],
                        self.buf[9],
                        self.buf[10],
                        self.buf[11],
                    ]);
                    if declared < 0 {
                        return Err(Error::Protocol(format!(
                            "Invalid message size: {}",
                            declared
                        )));
                    }
                    let full = 12 + declared as usize;
                    if full > remaining {
                        // The final message of the set was cut short by the
                        // declared set size; swallow the fragment.
                        if self.buf.len() < remaining {
                            return Ok(None);
                        }
                        self.buf.advance(remaining);
                        self.state = DecodeState::MessageSet { remaining: 0 };
                        continue;
                    }
                    if self.buf.len() < full {
                        return Ok(None);
                    }

                    let mut bytes = self.buf.split_to(full).freeze();
                    let mut decoder = Decoder::new(&mut bytes);
                    let offset = decoder.read_i64()?;
                    let _size = decoder.read_i32()?;
                    let message = Message {
                        offset,
                        crc: decoder.read_u32()?,
                        magic: decoder.read_i8()?,
                        attributes: decoder.read_i8()?,
                        key: decoder.read_bytes()?,
                        value: decoder.read_bytes()?,
                    };
                    self.state = DecodeState::MessageSet {
                        remaining: remaining - full,
                    };
                    return Ok(Some(FetchEvent::Message {
                        topic: self.current_topic.clone(),
                        partition: self.current_partition,
                        message,
                    }));
                }
                DecodeState::Finished => {
                    if !self.buf.is_empty() {
                        return Err(Error::Protocol(format!(
                            "{} undecoded bytes after fetch response",
                            self.buf.len()
                        )));
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn finish_partition(&mut self) {
        self.partitions_left -= 1;
        if self.partitions_left == 0 {
            self.finish_topic();
        } else {
            self.state = DecodeState::PartitionHeader;
        }
    }

    fn finish_topic(&mut self) {
        self.topics_left -= 1;
        if self.topics_left == 0 {
            self.state = DecodeState::Finished;
        } else {
            self.state = DecodeState::TopicHeader;
        }
    }
}

impl Default for FetchStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a complete buffered fetch response frame through the streaming
/// decoder, collecting every event. Used by tests to show the streamed and
/// buffered paths agree.
pub fn decode_all(frame: &[u8]) -> Result<Vec<FetchEvent>> {
    let mut decoder = FetchStreamDecoder::new();
    decoder.feed(frame);
    let mut events = Vec::new();
    while let Some(event) = decoder.next_event()? {
        events.push(event);
    }
    Ok(events)
}
