//! Transport frames.
//!
//! A frame is the TCP envelope around one multipart message body. The
//! header names what the body *is* — a client request or a service
//! reply — and how many parts the body must decode into, so a frame is
//! rejected before any of its content is interpreted if the envelope
//! and body disagree.
//!
//! # Frame Format
//!
//! ```text
//! [magic:u32][version:u8][kind:u8][parts:u16][body_len:u32][crc32:u32][body]
//!     4B         1B        1B       2B          4B            4B       var
//! ```
//!
//! The magic is the ASCII bytes "SCRW" read big-endian; all other
//! integers are little-endian. The CRC covers the encoded body. The body
//! is a [`Multipart`] in its `[len][bytes]` part encoding, zero-size
//! separator parts included.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};
use crate::multipart::Multipart;

/// Protocol magic bytes: "SCRW" in big-endian.
pub const MAGIC: u32 = 0x5343_5257;

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frame header size: magic + version + kind + parts + body_len + crc32.
pub const FRAME_HEADER_SIZE: usize = 16;

/// Maximum body size (64 MiB: select replies can carry many paths).
pub const MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

/// What a frame's body is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Client-to-service: a command line.
    Request,
    /// Service-to-client: a response.
    Reply,
}

impl FrameKind {
    pub fn as_byte(self) -> u8 {
        match self {
            FrameKind::Request => 0,
            FrameKind::Reply => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FrameKind::Request),
            1 => Some(FrameKind::Reply),
            _ => None,
        }
    }
}

/// One framed message: its kind and its decoded multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub body: Multipart,
}

impl Frame {
    /// Wraps a body as a client request.
    pub fn request(body: Multipart) -> Self {
        Self {
            kind: FrameKind::Request,
            body,
        }
    }

    /// Wraps a body as a service reply.
    pub fn reply(body: Multipart) -> Self {
        Self {
            kind: FrameKind::Reply,
            body,
        }
    }

    /// Encodes the frame: header, then the body's part encoding.
    pub fn encode_to_bytes(&self) -> Bytes {
        let body = self.body.encode_to_bytes();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
        buf.put_u32(MAGIC);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.kind.as_byte());
        buf.put_u16_le(self.body.len() as u16);
        buf.put_u32_le(body.len() as u32);
        buf.put_u32_le(crc32fast::hash(&body));
        buf.put_slice(&body);
        buf.freeze()
    }

    /// Attempts to decode one frame from a byte buffer.
    ///
    /// Returns `Ok(Some(frame))` when a complete, valid frame was
    /// consumed from the buffer, `Ok(None)` when more bytes are needed,
    /// and `Err` when the envelope is invalid or the body does not match
    /// it. The envelope is validated as soon as the header is available,
    /// before waiting for the body.
    pub fn decode(buf: &mut BytesMut) -> WireResult<Option<Self>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let magic = u32::from_be_bytes(
            buf[0..4]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        );
        if magic != MAGIC {
            return Err(WireError::InvalidMagic(magic));
        }

        let version = buf[4];
        if version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let kind = FrameKind::from_byte(buf[5]).ok_or(WireError::UnknownFrameKind(buf[5]))?;

        let declared_parts = u16::from_le_bytes(
            buf[6..8]
                .try_into()
                .expect("slice is exactly 2 bytes after bounds check"),
        ) as usize;
        let body_len = u32::from_le_bytes(
            buf[8..12]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        );
        if body_len > MAX_BODY_SIZE {
            return Err(WireError::BodyTooLarge {
                size: body_len,
                max: MAX_BODY_SIZE,
            });
        }
        let declared_crc = u32::from_le_bytes(
            buf[12..16]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        );

        let total = FRAME_HEADER_SIZE + body_len as usize;
        if buf.len() < total {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let body_bytes = buf.split_to(body_len as usize).freeze();

        let actual_crc = crc32fast::hash(&body_bytes);
        if actual_crc != declared_crc {
            return Err(WireError::ChecksumMismatch {
                expected: declared_crc,
                actual: actual_crc,
            });
        }

        let body = Multipart::decode(body_bytes)?;
        if body.len() != declared_parts {
            return Err(WireError::PartCountMismatch {
                declared: declared_parts,
                actual: body.len(),
            });
        }

        Ok(Some(Self { kind, body }))
    }
}
