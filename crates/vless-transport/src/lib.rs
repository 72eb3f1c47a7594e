//! Stream transports for the VLESS outbound.
//!
//! A [`TransportConnector`] turns a `host:port` string into a ready byte
//! stream. The outbound holds one as a trait object, so callers may swap
//! in their own transport without touching the protocol layer.
//!
//! # Transports
//!
//! - [`plain`]: Plain TCP with socket options applied.
//! - [`tls`]: TLS over TCP (rustls), with SNI, ALPN and optional custom CA.

pub mod error;
pub mod plain;
pub mod tls;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

pub use error::TransportError;
pub use plain::PlainConnector;
pub use tls::{ClientTlsConfig, TlsConnector};

/// Marker trait for streams produced by a transport.
pub trait TransportStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> TransportStream for T {}

/// Type-erased transport stream.
pub type BoxStream = Box<dyn TransportStream>;

/// Future returned by [`TransportConnector::connect`].
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BoxStream, TransportError>> + Send + 'a>>;

/// Connects outbound to a target address, producing a transport stream.
pub trait TransportConnector: Send + Sync + 'static {
    /// Connect to the given `host:port` address.
    fn connect<'a>(&'a self, addr: &'a str) -> ConnectFuture<'a>;
}

/// Splits `host:port`, accepting bracketed IPv6 literals.
pub fn split_host_port(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']')?,
        None if host.contains(':') => return None,
        None => host,
    };
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::split_host_port;

    #[test]
    fn split_host_port_forms() {
        assert_eq!(split_host_port("example.com:443"), Some(("example.com", 443)));
        assert_eq!(split_host_port("[::1]:8443"), Some(("::1", 8443)));
        assert_eq!(split_host_port("10.0.0.1:0"), Some(("10.0.0.1", 0)));
        assert_eq!(split_host_port("::1:443"), None);
        assert_eq!(split_host_port("example.com"), None);
        assert_eq!(split_host_port(":443"), None);
        assert_eq!(split_host_port("example.com:http"), None);
    }
}
