//! xudp frames: per-datagram destinations over a mux-command stream.
//!
//! ```text
//! +----------+------------------------------------------------+----------+------+
//! | META_LEN | META                                           | DATA_LEN | DATA |
//! +----------+------------------------------------------------+----------+------+
//! |    2     | SESSION(2) STATUS(1) OPTION(1) [NETWORK(1) ADDR]|    2     | Var. |
//! +----------+------------------------------------------------+----------+------+
//! ```
//!
//! DATA_LEN and DATA are present only when OPTION has [`OPTION_DATA`] set.
//! ADDR uses the request address layout. Trailing meta bytes (such as a
//! global ID on `new` frames) are skipped.

use bytes::{BufMut, BytesMut};

use crate::address::{Address, address_len, read_address_from, write_address};
use crate::reader::Reader;
use crate::{ParseResult, ProtoError, WriteError};

pub const STATUS_NEW: u8 = 0x01;
pub const STATUS_KEEP: u8 = 0x02;
pub const STATUS_END: u8 = 0x03;
pub const STATUS_KEEP_ALIVE: u8 = 0x04;

pub const OPTION_DATA: u8 = 0x01;

pub const NETWORK_TCP: u8 = 0x01;
pub const NETWORK_UDP: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    New,
    Keep,
    End,
    KeepAlive,
}

impl FrameStatus {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::New => STATUS_NEW,
            Self::Keep => STATUS_KEEP,
            Self::End => STATUS_END,
            Self::KeepAlive => STATUS_KEEP_ALIVE,
        }
    }
}

impl TryFrom<u8> for FrameStatus {
    type Error = ProtoError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            STATUS_NEW => Ok(Self::New),
            STATUS_KEEP => Ok(Self::Keep),
            STATUS_END => Ok(Self::End),
            STATUS_KEEP_ALIVE => Ok(Self::KeepAlive),
            other => Err(ProtoError::InvalidFrameStatus(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub session_id: u16,
    pub status: FrameStatus,
    /// Datagram source/destination, when the frame carries one.
    pub destination: Option<Address>,
    pub payload: Option<&'a [u8]>,
    /// Total bytes occupied by the frame.
    pub frame_len: usize,
}

fn meta_len(destination: Option<&Address>) -> usize {
    4 + destination.map_or(0, |address| 1 + address_len(address))
}

/// Encoded length of a UDP frame.
pub fn frame_len(destination: Option<&Address>, payload: Option<&[u8]>) -> usize {
    2 + meta_len(destination) + payload.map_or(0, |p| 2 + p.len())
}

/// Writes one UDP frame.
///
/// # Errors
/// - `PayloadTooLarge` if the payload exceeds 65535 bytes.
/// - `DomainTooLong` if the destination domain exceeds 255 bytes.
#[allow(clippy::cast_possible_truncation)]
pub fn write_frame(
    buf: &mut BytesMut,
    session_id: u16,
    status: FrameStatus,
    destination: Option<&Address>,
    payload: Option<&[u8]>,
) -> Result<(), WriteError> {
    if payload.is_some_and(|p| p.len() > u16::MAX as usize) {
        return Err(WriteError::PayloadTooLarge);
    }
    let meta = meta_len(destination);
    if meta > u16::MAX as usize {
        return Err(WriteError::DomainTooLong);
    }
    let start = buf.len();
    buf.reserve(frame_len(destination, payload));
    buf.put_u16(meta as u16);
    buf.put_u16(session_id);
    buf.put_u8(status.as_u8());
    buf.put_u8(if payload.is_some() { OPTION_DATA } else { 0 });
    if let Some(address) = destination {
        buf.put_u8(NETWORK_UDP);
        if let Err(e) = write_address(buf, address) {
            buf.truncate(start);
            return Err(e);
        }
    }
    if let Some(payload) = payload {
        buf.put_u16(payload.len() as u16);
        buf.put_slice(payload);
    }
    Ok(())
}

pub fn parse_frame(buf: &[u8]) -> ParseResult<Frame<'_>> {
    if buf.len() < 2 {
        return ParseResult::Incomplete(2);
    }
    let meta_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    let mut offset = 2 + meta_len;
    if buf.len() < offset {
        return ParseResult::Incomplete(offset);
    }
    let (session_id, status, option, destination) = match parse_meta(&buf[2..offset]) {
        Ok(meta) => meta,
        Err(e) => return ParseResult::Invalid(e),
    };

    let payload = if option & OPTION_DATA != 0 {
        if buf.len() < offset + 2 {
            return ParseResult::Incomplete(offset + 2);
        }
        let data_len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
        offset += 2;
        if buf.len() < offset + data_len {
            return ParseResult::Incomplete(offset + data_len);
        }
        let data = &buf[offset..offset + data_len];
        offset += data_len;
        Some(data)
    } else {
        None
    };

    ParseResult::Complete(Frame {
        session_id,
        status,
        destination,
        payload,
        frame_len: offset,
    })
}

fn parse_meta(meta: &[u8]) -> Result<(u16, FrameStatus, u8, Option<Address>), ProtoError> {
    let mut reader = Reader::new(meta);
    let session_id = reader.u16()?;
    let status = FrameStatus::try_from(reader.u8()?)?;
    let option = reader.u8()?;
    let destination = match status {
        FrameStatus::New | FrameStatus::Keep if !reader.is_empty() => {
            match reader.u8()? {
                NETWORK_TCP | NETWORK_UDP => {}
                other => return Err(ProtoError::InvalidNetwork(other)),
            }
            Some(read_address_from(&mut reader)?)
        }
        _ => None,
    };
    Ok((session_id, status, option, destination))
}
