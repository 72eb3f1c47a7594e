//! Request header encoding and decoding.
//!
//! ```text
//! +---------+----------+-----------+--------------+---------+-------------+
//! | VERSION | IDENTITY | ADDONS_LEN| ADDONS       | COMMAND | DESTINATION |
//! +---------+----------+-----------+--------------+---------+-------------+
//! |    1    |    16    |  varint   | ADDONS_LEN   |    1    |  Variable   |
//! +---------+----------+-----------+--------------+---------+-------------+
//! ```
//!
//! The addons block is a closed set of two protobuf-style fields, always in
//! this order: tag 10 (flow) and tag 18 (obfuscated destination), each a
//! varint length followed by bytes. Once the block is present both tags are
//! written; a missing obfuscated destination is written as length zero.
//! DESTINATION is absent for [`Command::Mux`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::address::{
    Address, Host, MAX_DOMAIN_LEN, address_len, read_address_from, write_address,
};
use crate::reader::Reader;
use crate::varint::{put_uvarint, uvarint_len};
use crate::{IDENTITY_LEN, ProtoError, VERSION, WriteError};

/// Request command. Unknown values are carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Tcp,
    Udp,
    /// The payload is a nested multiplexing protocol; no destination follows.
    Mux,
    Other(u8),
}

impl Command {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Tcp => 0x01,
            Self::Udp => 0x02,
            Self::Mux => 0x03,
            Self::Other(v) => v,
        }
    }

    #[inline]
    fn has_destination(self) -> bool {
        self != Self::Mux
    }
}

impl From<u8> for Command {
    fn from(v: u8) -> Self {
        match v {
            0x01 => Self::Tcp,
            0x02 => Self::Udp,
            0x03 => Self::Mux,
            other => Self::Other(other),
        }
    }
}

/// Field tags of the addons block.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonField {
    Flow = 10,
    ObfuscatedDestination = 18,
}

impl AddonField {
    /// Checks that `tag` is exactly the field expected at this position.
    fn check(self, tag: u8) -> Result<(), ProtoError> {
        if tag == self as u8 {
            Ok(())
        } else {
            Err(ProtoError::UnknownFieldTag(tag))
        }
    }
}

/// One handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub identity: [u8; IDENTITY_LEN],
    pub command: Command,
    /// Required unless `command` is [`Command::Mux`].
    pub destination: Option<Address>,
    /// Flow tag; empty means none.
    pub flow: String,
    /// Opaque destination blob for the anchor extension.
    pub obfuscated_destination: Option<Bytes>,
}

impl Request {
    fn obfuscated(&self) -> &[u8] {
        self.obfuscated_destination.as_deref().unwrap_or_default()
    }

    fn has_addons(&self) -> bool {
        !self.flow.is_empty() || !self.obfuscated().is_empty()
    }
}

/// Length of the addons block (0 when neither field is set).
pub fn addons_len(request: &Request) -> usize {
    if !request.has_addons() {
        return 0;
    }
    let flow = request.flow.len();
    let obfuscated = request.obfuscated().len();
    2 + uvarint_len(flow as u64) + flow + uvarint_len(obfuscated as u64) + obfuscated
}

/// Exact encoded header length, payload excluded.
pub fn request_len(request: &Request) -> usize {
    let addons = addons_len(request);
    let destination = match (&request.destination, request.command.has_destination()) {
        (Some(address), true) => address_len(address),
        _ => 0,
    };
    1 + IDENTITY_LEN + uvarint_len(addons as u64) + addons + 1 + destination
}

/// Encodes `request` followed by `payload` into one buffer of exactly
/// `request_len(request) + payload.len()` bytes.
///
/// # Errors
/// - `MissingDestination` if a non-mux request has no destination.
/// - `DomainTooLong` if the destination domain exceeds 255 bytes.
pub fn encode_request(request: &Request, payload: &[u8]) -> Result<BytesMut, WriteError> {
    let total = request_len(request) + payload.len();
    let mut buf = BytesMut::with_capacity(total);
    write_request_header(&mut buf, request)?;
    buf.put_slice(payload);
    debug_assert_eq!(buf.len(), total);
    Ok(buf)
}

/// Writes the request header to the buffer. Nothing is written on error.
pub fn write_request_header(buf: &mut BytesMut, request: &Request) -> Result<(), WriteError> {
    let destination = if request.command.has_destination() {
        let address = request
            .destination
            .as_ref()
            .ok_or(WriteError::MissingDestination)?;
        if let Host::Domain(name) = &address.host
            && name.len() > MAX_DOMAIN_LEN
        {
            return Err(WriteError::DomainTooLong);
        }
        Some(address)
    } else {
        None
    };

    let addons = addons_len(request);
    buf.reserve(request_len(request));
    buf.put_u8(VERSION);
    buf.put_slice(&request.identity);
    put_uvarint(buf, addons as u64);
    if addons > 0 {
        let obfuscated = request.obfuscated();
        buf.put_u8(AddonField::Flow as u8);
        put_uvarint(buf, request.flow.len() as u64);
        buf.put_slice(request.flow.as_bytes());
        buf.put_u8(AddonField::ObfuscatedDestination as u8);
        put_uvarint(buf, obfuscated.len() as u64);
        buf.put_slice(obfuscated);
    }
    buf.put_u8(request.command.as_u8());
    if let Some(address) = destination {
        write_address(buf, address)?;
    }
    Ok(())
}

/// A decoded request plus the position of the payload that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest<'a> {
    pub request: Request,
    pub header_len: usize,
    pub payload: &'a [u8],
}

pub fn decode_request(buf: &[u8]) -> Result<DecodedRequest<'_>, ProtoError> {
    let mut reader = Reader::new(buf);

    let version = reader.u8()?;
    if version != VERSION {
        return Err(ProtoError::UnsupportedVersion(version));
    }

    let mut identity = [0u8; IDENTITY_LEN];
    identity.copy_from_slice(reader.bytes(IDENTITY_LEN)?);

    let addons = usize::try_from(reader.uvarint()?).map_err(|_| ProtoError::Truncated)?;
    let (flow, obfuscated_destination) = if addons > 0 {
        decode_addons(reader.bytes(addons)?)?
    } else {
        (String::new(), None)
    };

    let command = Command::from(reader.u8()?);
    let destination = if command.has_destination() {
        Some(read_address_from(&mut reader)?)
    } else {
        None
    };

    let header_len = reader.position();
    Ok(DecodedRequest {
        request: Request {
            identity,
            command,
            destination,
            flow,
            obfuscated_destination,
        },
        header_len,
        payload: &buf[header_len..],
    })
}

/// Parses the addons block. The block may end right after the flow tag or
/// after the flow value; a zero-length obfuscated destination is absent.
fn decode_addons(block: &[u8]) -> Result<(String, Option<Bytes>), ProtoError> {
    let mut reader = Reader::new(block);
    AddonField::Flow.check(reader.u8()?)?;
    if reader.is_empty() {
        return Ok((String::new(), None));
    }
    let flow = std::str::from_utf8(reader.length_prefixed()?)
        .map_err(|_| ProtoError::InvalidUtf8)?
        .to_string();
    if reader.is_empty() {
        return Ok((flow, None));
    }
    AddonField::ObfuscatedDestination.check(reader.u8()?)?;
    let obfuscated = reader.length_prefixed()?;
    let obfuscated = (!obfuscated.is_empty()).then(|| Bytes::copy_from_slice(obfuscated));
    Ok((flow, obfuscated))
}
