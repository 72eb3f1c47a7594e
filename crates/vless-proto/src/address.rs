//! Destination addresses and their wire form.
//!
//! Wire layout (port first, as in the VMess family):
//!
//! ```text
//! +----------+------+----------------------------+
//! | PORT(BE) | ATYP | ADDR                       |
//! +----------+------+----------------------------+
//! |    2     |  1   | 4 / 1 + len / 16           |
//! +----------+------+----------------------------+
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use bytes::{BufMut, BytesMut};

use crate::reader::Reader;
use crate::{ProtoError, WriteError};

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x02;
pub const ATYP_IPV6: u8 = 0x03;

/// Maximum domain name length.
pub const MAX_DOMAIN_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

/// A destination: host (IP or name) plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: Host,
    pub port: u16,
}

impl Address {
    pub fn new(host: Host, port: u16) -> Self {
        Self { host, port }
    }

    pub fn domain(name: impl Into<String>, port: u16) -> Self {
        Self {
            host: Host::Domain(name.into()),
            port,
        }
    }

    /// Whether the host is a name that still needs resolution.
    pub fn is_domain(&self) -> bool {
        matches!(self.host, Host::Domain(_))
    }

    /// The socket address, if the host is a literal IP.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match &self.host {
            Host::Ipv4(ip) => Some(SocketAddr::new(IpAddr::V4(*ip), self.port)),
            Host::Ipv6(ip) => Some(SocketAddr::new(IpAddr::V6(*ip), self.port)),
            Host::Domain(_) => None,
        }
    }

    fn atyp(&self) -> u8 {
        match self.host {
            Host::Ipv4(_) => ATYP_IPV4,
            Host::Domain(_) => ATYP_DOMAIN,
            Host::Ipv6(_) => ATYP_IPV6,
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        let host = match addr.ip() {
            IpAddr::V4(ip) => Host::Ipv4(ip),
            IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
                Some(v4) => Host::Ipv4(v4),
                None => Host::Ipv6(ip),
            },
        };
        Self {
            host,
            port: addr.port(),
        }
    }
}

/// Canonical `host:port` form, with IPv6 hosts in brackets.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{ip}:{}", self.port),
            Host::Ipv6(ip) => write!(f, "[{ip}]:{}", self.port),
            Host::Domain(name) => write!(f, "{name}:{}", self.port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address: {0}")]
pub struct AddressParseError(pub String);

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(addr.into());
        }
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressParseError(s.to_string()))?;
        if host.is_empty() || host.contains(':') || host.len() > MAX_DOMAIN_LEN {
            return Err(AddressParseError(s.to_string()));
        }
        Ok(Self::domain(host, port))
    }
}

/// Encoded length of `address`.
#[inline]
pub fn address_len(address: &Address) -> usize {
    2 + 1
        + match &address.host {
            Host::Ipv4(_) => 4,
            Host::Ipv6(_) => 16,
            Host::Domain(name) => 1 + name.len(),
        }
}

/// Writes `address` in wire form.
///
/// # Errors
/// - `DomainTooLong` if the domain exceeds 255 bytes.
#[allow(clippy::cast_possible_truncation)]
pub fn write_address(buf: &mut BytesMut, address: &Address) -> Result<(), WriteError> {
    if let Host::Domain(name) = &address.host
        && name.len() > MAX_DOMAIN_LEN
    {
        return Err(WriteError::DomainTooLong);
    }
    buf.put_u16(address.port);
    buf.put_u8(address.atyp());
    match &address.host {
        Host::Ipv4(ip) => buf.put_slice(&ip.octets()),
        Host::Ipv6(ip) => buf.put_slice(&ip.octets()),
        Host::Domain(name) => {
            buf.put_u8(name.len() as u8);
            buf.put_slice(name.as_bytes());
        }
    }
    Ok(())
}

/// Reads an address from the front of `buf`, returning it with its encoded length.
pub fn read_address(buf: &[u8]) -> Result<(Address, usize), ProtoError> {
    let mut reader = Reader::new(buf);
    let address = read_address_from(&mut reader)?;
    Ok((address, reader.position()))
}

pub(crate) fn read_address_from(reader: &mut Reader<'_>) -> Result<Address, ProtoError> {
    let port = reader.u16()?;
    let host = match reader.u8()? {
        ATYP_IPV4 => {
            let b = reader.bytes(4)?;
            Host::Ipv4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
        }
        ATYP_DOMAIN => {
            let len = reader.u8()? as usize;
            if len == 0 {
                return Err(ProtoError::InvalidDomainLen);
            }
            let name = std::str::from_utf8(reader.bytes(len)?)
                .map_err(|_| ProtoError::InvalidUtf8)?;
            Host::Domain(name.to_string())
        }
        ATYP_IPV6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(reader.bytes(16)?);
            Host::Ipv6(Ipv6Addr::from(octets))
        }
        other => return Err(ProtoError::InvalidAddressType(other)),
    };
    Ok(Address { host, port })
}
