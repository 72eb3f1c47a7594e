//! Plain TCP transport (no encryption).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;
use vless_config::TcpConfig;

use crate::error::TransportError;
use crate::{BoxStream, ConnectFuture, TransportConnector};

/// Plain TCP connector using system DNS resolution.
#[derive(Debug, Clone, Default)]
pub struct PlainConnector {
    tcp: TcpConfig,
}

impl PlainConnector {
    pub fn new(tcp: TcpConfig) -> Self {
        Self { tcp }
    }

    /// Resolves `addr`, connects and applies the configured socket options.
    pub async fn connect_tcp(&self, addr: &str) -> Result<TcpStream, TransportError> {
        let resolved: Vec<SocketAddr> = tokio::net::lookup_host(addr).await?.collect();
        if resolved.is_empty() {
            return Err(TransportError::Resolve(addr.to_string()));
        }

        let mut last_err = None;
        for target in resolved {
            debug!(remote = %target, "connecting");
            match self.connect_one(target).await {
                Ok(tcp) => {
                    apply_tcp_options(&tcp, &self.tcp)?;
                    return Ok(tcp);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .map(TransportError::Io)
            .unwrap_or_else(|| TransportError::Resolve(addr.to_string())))
    }

    async fn connect_one(&self, target: SocketAddr) -> std::io::Result<TcpStream> {
        if self.tcp.connect_timeout_secs == 0 {
            return TcpStream::connect(target).await;
        }
        tokio::time::timeout(
            Duration::from_secs(self.tcp.connect_timeout_secs),
            TcpStream::connect(target),
        )
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))?
    }
}

impl TransportConnector for PlainConnector {
    fn connect<'a>(&'a self, addr: &'a str) -> ConnectFuture<'a> {
        Box::pin(async move {
            let tcp = self.connect_tcp(addr).await?;
            Ok(Box::new(tcp) as BoxStream)
        })
    }
}

/// Apply TCP socket options.
fn apply_tcp_options(stream: &TcpStream, config: &TcpConfig) -> Result<(), TransportError> {
    stream.set_nodelay(config.no_delay)?;

    if config.keepalive_secs > 0 {
        let sock = socket2::SockRef::from(stream);
        let keepalive =
            socket2::TcpKeepalive::new().with_time(Duration::from_secs(config.keepalive_secs));
        sock.set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}
