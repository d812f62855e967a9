/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Tokio codec for FIX message framing.
//!
//! Decoding turns `8=..|9=..|35=..|...|10=ccc|` frames into [`Message`]
//! values, validating BeginString, BodyLength and CheckSum. Encoding does the
//! reverse, computing BodyLength and CheckSum from the body it writes.

use bytes::{BufMut, BytesMut};
use fixlink_core::error::TransportError;
use fixlink_core::message::{Message, MsgType, tags};
use memchr::{memchr, memchr_iter};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// SOH delimiter.
pub const SOH: u8 = 0x01;

/// Length of the `10=ccc|` trailer.
const TRAILER_LEN: usize = 7;

/// Errors that can occur during codec operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The frame does not start with `8=`.
    #[error("invalid begin string: message must start with 8=")]
    InvalidBeginString,

    /// BodyLength (tag 9) does not follow BeginString.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// BodyLength is not a number.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// The first body field is not MsgType (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// The frame does not end with a well-formed `10=ccc|` trailer.
    #[error("invalid checksum trailer")]
    InvalidTrailer,

    /// A body field is not `tag=value`.
    #[error("malformed field at offset {offset}")]
    MalformedField {
        /// Byte offset of the field within the frame.
        offset: usize,
    },

    /// Declared and computed checksums differ.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Computed checksum.
        calculated: u8,
        /// Checksum carried in the trailer.
        declared: u8,
    },

    /// The frame exceeds the configured maximum size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Frame size.
        size: usize,
        /// Configured maximum.
        max_size: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(reason) => Self::Io(reason),
            other => Self::Codec(other.to_string()),
        }
    }
}

/// Computes the FIX checksum: the byte sum modulo 256.
#[inline]
#[must_use]
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Codec framing FIX tag=value messages.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximum frame size in bytes.
    max_message_size: usize,
    /// Whether to verify the trailer checksum.
    validate_checksum: bool,
}

impl FrameCodec {
    /// Creates a codec with a 1 MiB frame limit and checksum validation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            validate_checksum: true,
        }
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets whether to verify checksums.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Waits for more header bytes unless the buffer is already over the limit.
    fn incomplete_header(&self, src: &BytesMut) -> Result<Option<Message>, CodecError> {
        if src.len() > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: src.len(),
                max_size: self.max_message_size,
            });
        }
        Ok(None)
    }

    /// Parses the `tag=value` fields of a complete body.
    fn parse_body(body: &[u8], base: usize) -> Result<(MsgType, Vec<(u32, String)>), CodecError> {
        let mut fields = Vec::new();
        let mut start = 0;
        for end in memchr_iter(SOH, body) {
            let raw = &body[start..end];
            let eq = memchr(b'=', raw).ok_or(CodecError::MalformedField {
                offset: base + start,
            })?;
            let tag = std::str::from_utf8(&raw[..eq])
                .ok()
                .and_then(|t| t.parse::<u32>().ok())
                .ok_or(CodecError::MalformedField {
                    offset: base + start,
                })?;
            let value = String::from_utf8_lossy(&raw[eq + 1..]).into_owned();
            fields.push((tag, value));
            start = end + 1;
        }

        match fields.first() {
            Some((tags::MSG_TYPE, _)) => {
                let (_, msg_type) = fields.remove(0);
                Ok((MsgType::from(msg_type.as_str()), fields))
            }
            _ => Err(CodecError::MissingMsgType),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }
        if &src[..2] != b"8=" {
            return Err(CodecError::InvalidBeginString);
        }

        let Some(begin_end) = memchr(SOH, src) else {
            return self.incomplete_header(src);
        };
        let len_start = begin_end + 1;
        if src.len() < len_start + 2 {
            return self.incomplete_header(src);
        }
        if &src[len_start..len_start + 2] != b"9=" {
            return Err(CodecError::MissingBodyLength);
        }
        let Some(len_end) = memchr(SOH, &src[len_start..]).map(|p| len_start + p) else {
            return self.incomplete_header(src);
        };

        let body_len: usize = std::str::from_utf8(&src[len_start + 2..len_end])
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or(CodecError::InvalidBodyLength)?;
        if body_len > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: body_len,
                max_size: self.max_message_size,
            });
        }

        let body_start = len_end + 1;
        let body_end = body_start
            .checked_add(body_len)
            .ok_or(CodecError::InvalidBodyLength)?;
        let total = body_end
            .checked_add(TRAILER_LEN)
            .ok_or(CodecError::InvalidBodyLength)?;
        if total > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: total,
                max_size: self.max_message_size,
            });
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let trailer = &src[body_end..total];
        if &trailer[..3] != b"10=" || trailer[6] != SOH {
            return Err(CodecError::InvalidTrailer);
        }
        let declared = std::str::from_utf8(&trailer[3..6])
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .ok_or(CodecError::InvalidTrailer)?;
        if self.validate_checksum {
            let calculated = checksum(&src[..body_end]);
            if calculated != declared {
                return Err(CodecError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        let frame = src.split_to(total);
        let begin_string = String::from_utf8_lossy(&frame[2..begin_end]).into_owned();
        let (msg_type, fields) = Self::parse_body(&frame[body_start..body_end], body_start)?;

        let mut message = Message::new(begin_string, msg_type);
        for (tag, value) in fields {
            message.push(tag, value);
        }
        Ok(Some(message))
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::with_capacity(128);
        put_field(&mut body, tags::MSG_TYPE, item.msg_type().as_str().as_bytes());
        for (tag, value) in item.fields() {
            put_field(&mut body, tag, value.as_bytes());
        }

        let mut len_buf = itoa::Buffer::new();
        let body_len = len_buf.format(body.len());

        let start = dst.len();
        dst.reserve(body.len() + item.begin_string().len() + body_len.len() + 16);
        put_field(dst, tags::BEGIN_STRING, item.begin_string().as_bytes());
        put_field(dst, tags::BODY_LENGTH, body_len.as_bytes());
        dst.put_slice(&body);

        let sum = checksum(&dst[start..]);
        dst.put_slice(b"10=");
        dst.put_u8(b'0' + sum / 100);
        dst.put_u8(b'0' + (sum / 10) % 10);
        dst.put_u8(b'0' + sum % 10);
        dst.put_u8(SOH);

        let size = dst.len() - start;
        if size > self.max_message_size {
            dst.truncate(start);
            return Err(CodecError::MessageTooLarge {
                size,
                max_size: self.max_message_size,
            });
        }
        Ok(())
    }
}

fn put_field(dst: &mut BytesMut, tag: u32, value: &[u8]) {
    let mut tag_buf = itoa::Buffer::new();
    dst.put_slice(tag_buf.format(tag).as_bytes());
    dst.put_u8(b'=');
    dst.put_slice(value);
    dst.put_u8(SOH);
}
