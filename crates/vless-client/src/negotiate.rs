//! Turns a raw stream plus a resolved target into a typed connection.

use tokio::io::{AsyncRead, AsyncWrite};
use vless_proto::packet::packet_addr_destination;
use vless_proto::{Address, Command, Request};

use crate::anchor::ResolvedTarget;
use crate::error::ClientError;
use crate::packet::VlessPacketConn;
use crate::stream::VlessStream;

/// UDP encoding used on top of a VLESS stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketEncoding {
    /// Per-datagram destinations in mux.cool frames.
    #[default]
    Xudp,
    /// Length-prefixed datagrams to one fixed destination.
    Plain,
    /// Length-prefixed datagrams with an address prefix, declared to a
    /// sentinel host.
    PacketAddr,
}

impl PacketEncoding {
    /// Maps the configured option. Absent selects xudp, an empty string
    /// selects plain packets.
    pub fn from_option(value: Option<&str>) -> Result<Self, ClientError> {
        match value {
            None | Some("xudp") => Ok(Self::Xudp),
            Some("") => Ok(Self::Plain),
            Some("packetaddr") => Ok(Self::PacketAddr),
            Some(other) => Err(ClientError::Config(format!(
                "unknown packet encoding: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionNegotiator {
    identity: [u8; 16],
    flow: String,
    encoding: PacketEncoding,
}

impl ConnectionNegotiator {
    pub fn new(identity: [u8; 16], flow: impl Into<String>, encoding: PacketEncoding) -> Self {
        Self {
            identity,
            flow: flow.into(),
            encoding,
        }
    }

    /// Fails for destinations the packet encoding cannot carry. Runs before
    /// any stream is opened.
    pub fn check_packet_destination(&self, destination: &Address) -> Result<(), ClientError> {
        if self.encoding == PacketEncoding::PacketAddr && destination.is_domain() {
            return Err(ClientError::UnsupportedDestination(destination.clone()));
        }
        Ok(())
    }

    fn request(
        &self,
        command: Command,
        destination: Option<Address>,
        flow: &str,
        target: &ResolvedTarget,
    ) -> Request {
        Request {
            identity: self.identity,
            command,
            destination,
            flow: flow.to_string(),
            obfuscated_destination: target.obfuscated.clone(),
        }
    }

    pub fn stream_request(&self, target: &ResolvedTarget) -> Request {
        self.request(Command::Tcp, Some(target.declared.clone()), &self.flow, target)
    }

    pub fn packet_request(&self, target: &ResolvedTarget) -> Result<Request, ClientError> {
        self.check_packet_destination(&target.declared)?;
        Ok(match self.encoding {
            PacketEncoding::Xudp => self.request(Command::Mux, None, &self.flow, target),
            PacketEncoding::Plain => {
                self.request(Command::Udp, Some(target.declared.clone()), "", target)
            }
            PacketEncoding::PacketAddr => {
                self.request(Command::Udp, Some(packet_addr_destination()), "", target)
            }
        })
    }

    /// Request opening the physical connection of a multiplexed session.
    pub fn mux_request(&self, target: &ResolvedTarget, sentinel: Address) -> Request {
        self.request(Command::Tcp, Some(sentinel), &self.flow, target)
    }

    /// Wraps `stream` as a VLESS stream; the header goes out with the first
    /// write.
    pub fn stream<S>(
        &self,
        stream: S,
        target: &ResolvedTarget,
    ) -> Result<VlessStream<S>, ClientError> {
        Ok(VlessStream::new(stream, &self.stream_request(target))?)
    }

    /// Wraps `stream` as a packet connection bound to the declared
    /// destination. When the target hides its true destination every
    /// datagram is addressed to the declared one instead of the caller's.
    pub fn packet<S>(
        &self,
        stream: S,
        target: &ResolvedTarget,
    ) -> Result<VlessPacketConn<S>, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = self.packet_request(target)?;
        let stream = VlessStream::new(stream, &request)?;
        let conn = VlessPacketConn::new(stream, self.encoding, target.declared.clone());
        Ok(if target.hides_destination() {
            conn.pinned()
        } else {
            conn
        })
    }
}
