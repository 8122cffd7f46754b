//! OP_MSG framing.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::bson::Document;
use crate::error::{Error, Result};

/// Opcode for OP_MSG.
pub const OP_MSG: i32 = 2013;

/// Message header size (length, request id, response to, opcode).
pub const HEADER_SIZE: usize = 16;

/// Largest message the server will accept or send.
pub const MAX_MESSAGE_SIZE: usize = 48_000_000;

/// Trailing CRC-32C is present.
pub const FLAG_CHECKSUM_PRESENT: u32 = 1;

/// Sender will not wait for a reply.
pub const FLAG_MORE_TO_COME: u32 = 1 << 1;

const SECTION_BODY: u8 = 0;
const SECTION_DOCUMENT_SEQUENCE: u8 = 1;

/// A single OP_MSG with one body section.
#[derive(Clone, Debug, PartialEq)]
pub struct OpMsg {
    /// Flag bits.
    pub flags: u32,
    /// Identifier of this message.
    pub request_id: i32,
    /// Request this message answers, or 0.
    pub response_to: i32,
    /// Kind-0 body section.
    pub body: Document,
}

impl OpMsg {
    /// Creates a request carrying `body`.
    #[must_use]
    pub const fn request(request_id: i32, body: Document) -> Self {
        Self {
            flags: 0,
            request_id,
            response_to: 0,
            body,
        }
    }

    /// Marks the message as not expecting a reply.
    #[must_use]
    pub const fn more_to_come(mut self) -> Self {
        self.flags |= FLAG_MORE_TO_COME;
        self
    }
}

/// Codec for OP_MSG frames.
#[derive(Clone, Copy, Debug)]
pub struct OpMsgCodec {
    max_message_size: usize,
}

impl OpMsgCodec {
    /// Creates a codec accepting messages up to [`MAX_MESSAGE_SIZE`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Creates a codec with a custom maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

impl Default for OpMsgCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<OpMsg> for OpMsgCodec {
    type Error = Error;

    fn encode(&mut self, item: OpMsg, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();

        dst.put_i32_le(0);
        dst.put_i32_le(item.request_id);
        dst.put_i32_le(item.response_to);
        dst.put_i32_le(OP_MSG);
        // checksums are never generated
        dst.put_u32_le(item.flags & !FLAG_CHECKSUM_PRESENT);
        dst.put_u8(SECTION_BODY);
        item.body.encode(dst);

        let len = dst.len() - start;
        if len > self.max_message_size {
            dst.truncate(start);
            return Err(Error::MessageTooLarge {
                size: len,
                max: self.max_message_size,
            });
        }

        let len = i32::try_from(len).unwrap_or(i32::MAX);
        dst[start..start + 4].copy_from_slice(&len.to_le_bytes());

        Ok(())
    }
}

impl Decoder for OpMsgCodec {
    type Item = OpMsg;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<OpMsg>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = &src[..HEADER_SIZE];
        let message_len = usize::try_from(header.get_i32_le())
            .map_err(|_| Error::MalformedMessage("negative message length".to_string()))?;
        let request_id = header.get_i32_le();
        let response_to = header.get_i32_le();
        let op_code = header.get_i32_le();

        if message_len > self.max_message_size {
            return Err(Error::MessageTooLarge {
                size: message_len,
                max: self.max_message_size,
            });
        }

        // header + flags + section kind + smallest document
        if message_len < HEADER_SIZE + 4 + 1 + 5 {
            return Err(Error::MalformedMessage(format!(
                "message length {message_len} is too short"
            )));
        }

        if src.len() < message_len {
            src.reserve(message_len - src.len());
            return Ok(None);
        }

        if op_code != OP_MSG {
            return Err(Error::UnsupportedOpCode(op_code));
        }

        let frame = src.split_to(message_len).freeze();
        let mut payload = &frame[HEADER_SIZE..];
        let flags = payload.get_u32_le();

        if flags & FLAG_CHECKSUM_PRESENT != 0 {
            if payload.len() < 4 {
                return Err(Error::MalformedMessage("missing checksum".to_string()));
            }
            payload = &payload[..payload.len() - 4];
        }

        let mut body = None;
        while payload.has_remaining() {
            match payload.get_u8() {
                SECTION_BODY => {
                    let (document, used) = Document::decode_prefix(payload)?;
                    payload.advance(used);
                    body = Some(document);
                }
                SECTION_DOCUMENT_SEQUENCE => {
                    if payload.len() < 4 {
                        return Err(Error::MalformedMessage(
                            "truncated document sequence".to_string(),
                        ));
                    }
                    let size = usize::try_from((&payload[..4]).get_i32_le()).map_err(|_| {
                        Error::MalformedMessage("negative document sequence size".to_string())
                    })?;
                    if size > payload.len() {
                        return Err(Error::MalformedMessage(
                            "document sequence overruns message".to_string(),
                        ));
                    }
                    payload.advance(size);
                }
                kind => {
                    return Err(Error::MalformedMessage(format!(
                        "unknown section kind {kind}"
                    )));
                }
            }
        }

        let body = body.ok_or_else(|| Error::MalformedMessage("missing body section".to_string()))?;

        Ok(Some(OpMsg {
            flags,
            request_id,
            response_to,
            body,
        }))
    }
}
