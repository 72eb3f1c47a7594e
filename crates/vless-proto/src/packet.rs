//! Length-prefixed UDP packets and the packet-addr payload prefix.
//!
//! Plain packets are `LEN(2, BE) | PAYLOAD`. With packet-addr the stream is
//! declared to [`PACKET_ADDR_HOST`] and every payload is prefixed with the
//! datagram's address as `PORT(2) | FAMILY(1) | IP(4 or 16)`. Names are
//! not representable in that prefix.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, BytesMut};

use crate::address::{Address, Host};
use crate::reader::Reader;
use crate::{ParseResult, ProtoError, WriteError};

/// Sentinel host announcing packet-addr framing to the server.
pub const PACKET_ADDR_HOST: &str = "sp.packet-addr.v2fly.arpa";

pub const FAMILY_IPV4: u8 = 0x01;
pub const FAMILY_IPV6: u8 = 0x02;

/// The sentinel destination for packet-addr streams.
pub fn packet_addr_destination() -> Address {
    Address::domain(PACKET_ADDR_HOST, 0)
}

/// Writes `LEN | PAYLOAD`.
///
/// # Errors
/// - `PayloadTooLarge` if the payload exceeds 65535 bytes.
#[allow(clippy::cast_possible_truncation)]
pub fn write_length_packet(buf: &mut BytesMut, payload: &[u8]) -> Result<(), WriteError> {
    if payload.len() > u16::MAX as usize {
        return Err(WriteError::PayloadTooLarge);
    }
    buf.reserve(2 + payload.len());
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    Ok(())
}

/// Parses one length-prefixed packet, returning the payload and the total
/// number of bytes consumed.
#[inline]
pub fn parse_length_packet(buf: &[u8]) -> ParseResult<(&[u8], usize)> {
    if buf.len() < 2 {
        return ParseResult::Incomplete(2);
    }
    let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if buf.len() < 2 + len {
        return ParseResult::Incomplete(2 + len);
    }
    ParseResult::Complete((&buf[2..2 + len], 2 + len))
}

/// Length of the packet-addr prefix for `address`.
pub fn packet_addr_len(address: &Address) -> Result<usize, WriteError> {
    match address.host {
        Host::Ipv4(_) => Ok(2 + 1 + 4),
        Host::Ipv6(_) => Ok(2 + 1 + 16),
        Host::Domain(_) => Err(WriteError::UnsupportedAddressFamily),
    }
}

/// Writes the packet-addr prefix.
///
/// # Errors
/// - `UnsupportedAddressFamily` if the address is a domain name.
pub fn write_packet_addr(buf: &mut BytesMut, address: &Address) -> Result<(), WriteError> {
    match &address.host {
        Host::Ipv4(ip) => {
            buf.put_u16(address.port);
            buf.put_u8(FAMILY_IPV4);
            buf.put_slice(&ip.octets());
        }
        Host::Ipv6(ip) => {
            buf.put_u16(address.port);
            buf.put_u8(FAMILY_IPV6);
            buf.put_slice(&ip.octets());
        }
        Host::Domain(_) => return Err(WriteError::UnsupportedAddressFamily),
    }
    Ok(())
}

/// Reads a packet-addr prefix, returning the address and the prefix length.
pub fn read_packet_addr(buf: &[u8]) -> Result<(Address, usize), ProtoError> {
    let mut reader = Reader::new(buf);
    let port = reader.u16()?;
    let host = match reader.u8()? {
        FAMILY_IPV4 => {
            let b = reader.bytes(4)?;
            Host::Ipv4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
        }
        FAMILY_IPV6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(reader.bytes(16)?);
            Host::Ipv6(Ipv6Addr::from(octets))
        }
        other => return Err(ProtoError::InvalidAddressType(other)),
    };
    Ok((Address::new(host, port), reader.position()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_packet() {
        let mut buf = BytesMut::new();
        write_length_packet(&mut buf, b"ping").unwrap();
        write_length_packet(&mut buf, b"").unwrap();
        assert_eq!(parse_length_packet(&buf), ParseResult::Complete((&b"ping"[..], 6)));
        assert_eq!(parse_length_packet(&buf[6..]), ParseResult::Complete((&b""[..], 2)));
        assert_eq!(parse_length_packet(&buf[..4]), ParseResult::Incomplete(6));
    }

    #[test]
    fn length_packet_too_large() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; u16::MAX as usize + 1];
        assert_eq!(
            write_length_packet(&mut buf, &payload),
            Err(WriteError::PayloadTooLarge)
        );
    }

    #[test]
    fn packet_addr_prefix() {
        let address: Address = "[2001:db8::5]:5353".parse().unwrap();
        let mut buf = BytesMut::new();
        write_packet_addr(&mut buf, &address).unwrap();
        assert_eq!(buf.len(), packet_addr_len(&address).unwrap());
        assert_eq!(&buf[..3], &[0x14, 0xe9, FAMILY_IPV6]);
        let (parsed, len) = read_packet_addr(&buf).unwrap();
        assert_eq!(parsed, address);
        assert_eq!(len, 19);
    }

    #[test]
    fn packet_addr_rejects_domain() {
        let mut buf = BytesMut::new();
        let address = Address::domain("example.com", 53);
        assert_eq!(
            write_packet_addr(&mut buf, &address),
            Err(WriteError::UnsupportedAddressFamily)
        );
        assert!(buf.is_empty());
    }
}
