//! VLESS outbound client.
//!
//! Dials TCP streams and UDP packet connections through a VLESS server,
//! optionally hiding the destination with the anchor extension and
//! optionally sharing one physical connection through a multiplexed
//! session.

pub mod anchor;
pub mod cli;
pub mod config;
pub mod dialer;
mod error;
pub mod mux;
pub mod negotiate;
pub mod packet;
pub mod stream;

pub use anchor::{AnchorMode, DestinationObfuscator, DialContext, ResolvedTarget};
pub use cli::ConnectArgs;
pub use config::{AnchorOptions, ClientConfig, OutboundConfig, load_client_config};
pub use dialer::{Connection, DialStage, Network, Outbound, OutboundBuilder};
pub use error::{AnchorError, ClientError};
pub use mux::{MuxClient, MuxProtocol, MuxSession};
pub use negotiate::{ConnectionNegotiator, PacketEncoding};
pub use packet::{Packet, PacketConn, VlessPacketConn};
pub use stream::VlessStream;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vless_core::defaults::DEFAULT_UDP_TIMEOUT_SECS;
use vless_proto::Address;

/// Dial `destination` and relay it against stdin/stdout until either side
/// finishes or `shutdown` fires.
///
/// Streams are copied both ways. For packets each stdin line is sent as
/// one datagram and every reply is printed on its own line.
pub async fn run(
    outbound: &Outbound,
    destination: Address,
    network: Network,
    shutdown: CancellationToken,
) -> Result<(), ClientError> {
    let ctx = DialContext::new();
    let conn = outbound.dial(network, &destination, &ctx).await?;
    info!(
        destination = %destination,
        network = ?network,
        server = %outbound.server(),
        "connected"
    );

    let relay = async {
        match conn {
            Connection::Stream(stream) => relay_stream(stream).await,
            Connection::Packet(packets) => relay_packets(Arc::from(packets), &destination).await,
        }
    };

    tokio::select! {
        result = relay => result?,
        _ = shutdown.cancelled() => info!("shutting down client"),
    }
    outbound.close().await;
    Ok(())
}

async fn relay_stream(stream: vless_transport::BoxStream) -> Result<(), ClientError> {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let upload = async {
        let n = tokio::io::copy(&mut tokio::io::stdin(), &mut writer).await?;
        writer.shutdown().await?;
        debug!(bytes = n, "upload finished");
        Ok::<_, std::io::Error>(())
    };
    let download = async {
        let mut stdout = tokio::io::stdout();
        let n = tokio::io::copy(&mut reader, &mut stdout).await?;
        stdout.flush().await?;
        debug!(bytes = n, "download finished");
        Ok::<_, std::io::Error>(())
    };
    tokio::try_join!(upload, download)?;
    Ok(())
}

async fn relay_packets(
    conn: Arc<dyn PacketConn>,
    destination: &Address,
) -> Result<(), ClientError> {
    let idle_timeout = Duration::from_secs(DEFAULT_UDP_TIMEOUT_SECS);

    let reader = conn.clone();
    let download = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            let packet = match tokio::time::timeout(idle_timeout, reader.read_packet()).await {
                Ok(Ok(Some(packet))) => packet,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!("packet connection idle, closing");
                    break;
                }
            };
            debug!(source = %packet.source, len = packet.payload.len(), "datagram received");
            stdout.write_all(&packet.payload).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        conn.write_packet(line.as_bytes(), destination).await?;
    }

    let result = download
        .await
        .map_err(|e| ClientError::Io(std::io::Error::other(e)))?;
    conn.close().await?;
    Ok(result?)
}
