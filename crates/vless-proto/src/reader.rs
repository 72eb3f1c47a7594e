//! Bounds-checked cursor over a byte slice.

use crate::ProtoError;
use crate::varint::decode_uvarint;

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    #[inline]
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ProtoError> {
        let byte = *self.buf.get(self.pos).ok_or(ProtoError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, ProtoError> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], ProtoError> {
        let end = self.pos.checked_add(len).ok_or(ProtoError::Truncated)?;
        let bytes = self.buf.get(self.pos..end).ok_or(ProtoError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn uvarint(&mut self) -> Result<u64, ProtoError> {
        let (value, len) = decode_uvarint(self.rest())?;
        self.pos += len;
        Ok(value)
    }

    /// Reads a varint length followed by that many bytes.
    pub(crate) fn length_prefixed(&mut self) -> Result<&'a [u8], ProtoError> {
        let len = usize::try_from(self.uvarint()?).map_err(|_| ProtoError::Truncated)?;
        self.bytes(len)
    }

    #[inline]
    pub(crate) fn advance(&mut self, len: usize) {
        self.pos += len;
    }
}
