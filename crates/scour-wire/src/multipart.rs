//! Multipart message bodies.
//!
//! A multipart body is a sequence of parts, each encoded as a 4-byte
//! little-endian length followed by the part's bytes. Zero-length parts
//! are meaningful: they separate logical fields and terminate lists, the
//! same role the zero-size frames play in the original socket protocol.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};

/// An ordered sequence of message parts, separators included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Multipart {
    parts: Vec<Bytes>,
}

impl Multipart {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Appends a data part.
    pub fn push(&mut self, part: impl Into<Bytes>) -> &mut Self {
        self.parts.push(part.into());
        self
    }

    /// Appends a zero-size separator part.
    pub fn push_separator(&mut self) -> &mut Self {
        self.parts.push(Bytes::new());
        self
    }

    /// Number of parts, separators included.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// Encodes the body: `[len u32][bytes]` per part.
    pub fn encode_to_bytes(&self) -> Bytes {
        let total: usize = self.parts.iter().map(|p| 4 + p.len()).sum();
        let mut buf = BytesMut::with_capacity(total);
        for part in &self.parts {
            buf.put_u32_le(part.len() as u32);
            buf.put_slice(part);
        }
        buf.freeze()
    }

    /// Decodes a complete body. The buffer must contain exactly the parts
    /// and nothing else.
    pub fn decode(mut body: Bytes) -> WireResult<Self> {
        let mut parts = Vec::new();
        while body.has_remaining() {
            if body.remaining() < 4 {
                return Err(WireError::TruncatedPart);
            }
            let len = body.get_u32_le() as usize;
            if body.remaining() < len {
                return Err(WireError::TruncatedPart);
            }
            parts.push(body.split_to(len));
        }
        Ok(Self { parts })
    }

    /// Cursor for reading parts in order.
    pub fn reader(&self) -> PartReader<'_> {
        PartReader {
            parts: &self.parts,
            pos: 0,
        }
    }
}

impl FromIterator<Bytes> for Multipart {
    fn from_iter<T: IntoIterator<Item = Bytes>>(iter: T) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

/// Sequential reader over the parts of a [`Multipart`].
#[derive(Debug)]
pub struct PartReader<'a> {
    parts: &'a [Bytes],
    pos: usize,
}

impl<'a> PartReader<'a> {
    /// Takes the next part, whatever its size.
    pub fn next(&mut self) -> WireResult<&'a Bytes> {
        let part = self
            .parts
            .get(self.pos)
            .ok_or(WireError::Malformed("missing part"))?;
        self.pos += 1;
        Ok(part)
    }

    /// Takes the next part and checks it is a zero-size separator.
    pub fn expect_separator(&mut self) -> WireResult<()> {
        let part = self.next()?;
        if part.is_empty() {
            Ok(())
        } else {
            Err(WireError::MissingSeparator)
        }
    }

    /// Takes the next part as UTF-8 text.
    pub fn next_str(&mut self, field: &'static str) -> WireResult<&'a str> {
        let part = self.next()?;
        std::str::from_utf8(part).map_err(|_| WireError::InvalidUtf8(field))
    }

    /// True if every part has been consumed.
    pub fn finished(&self) -> bool {
        self.pos == self.parts.len()
    }
}
