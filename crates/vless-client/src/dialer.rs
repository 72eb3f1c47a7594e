//! Dial orchestration.
//!
//! Each attempt walks `Idle → ObfuscationResolved → StreamAcquired →
//! HandshakeSent → Established`. The request header is queued on the
//! stream at `HandshakeSent` and leaves with the first write; the server's
//! response is validated on the first read. A stream acquired by a failing
//! attempt is dropped, and with it closed, before the error is returned.

use std::sync::Arc;

use tracing::{debug, trace};
use vless_config::TcpConfig;
use vless_proto::Address;
use vless_transport::{
    BoxStream, ClientTlsConfig, PlainConnector, TlsConnector, TransportConnector,
};

use crate::anchor::{AnchorMode, DestinationObfuscator, DialContext, ResolvedTarget};
use crate::config::OutboundConfig;
use crate::error::ClientError;
use crate::mux::{MuxClient, MuxProtocol, MuxSession, mux_destination};
use crate::negotiate::{ConnectionNegotiator, PacketEncoding};
use crate::packet::PacketConn;
use crate::stream::VlessStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialStage {
    Idle,
    ObfuscationResolved,
    StreamAcquired,
    HandshakeSent,
    Established,
}

/// Connection returned by [`Outbound::dial`].
pub enum Connection {
    Stream(BoxStream),
    Packet(Box<dyn PacketConn>),
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Connection::Stream"),
            Self::Packet(_) => f.write_str("Connection::Packet"),
        }
    }
}

/// VLESS outbound. Immutable after construction and shared by all dials.
pub struct Outbound {
    server: Address,
    transport: Arc<dyn TransportConnector>,
    negotiator: ConnectionNegotiator,
    obfuscator: Option<DestinationObfuscator>,
    mux: Option<MuxClient>,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("server", &self.server)
            .field("negotiator", &self.negotiator)
            .field("anchor", &self.obfuscator.is_some())
            .field("mux", &self.mux.is_some())
            .finish_non_exhaustive()
    }
}

pub struct OutboundBuilder {
    server: Address,
    identity: [u8; 16],
    flow: String,
    encoding: PacketEncoding,
    tls: Option<ClientTlsConfig>,
    tcp: TcpConfig,
    anchor: Option<DestinationObfuscator>,
    transport: Option<Arc<dyn TransportConnector>>,
    mux: Option<Arc<dyn MuxProtocol>>,
}

impl OutboundBuilder {
    pub fn flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = flow.into();
        self
    }

    pub fn packet_encoding(mut self, encoding: PacketEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn tls(mut self, tls: ClientTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn tcp(mut self, tcp: TcpConfig) -> Self {
        self.tcp = tcp;
        self
    }

    pub fn anchor(mut self, obfuscator: DestinationObfuscator) -> Self {
        self.anchor = Some(obfuscator);
        self
    }

    /// Replaces the TCP/TLS transport. Not allowed together with anchoring.
    pub fn transport(mut self, transport: Arc<dyn TransportConnector>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Routes dials through multiplexed sessions of `protocol`.
    pub fn multiplex(mut self, protocol: Arc<dyn MuxProtocol>) -> Self {
        self.mux = Some(protocol);
        self
    }

    /// Peer whose host names the TLS SNI when `sni` is unset: the relay in
    /// client-encrypt mode, otherwise the server.
    fn tls_peer(&self) -> &Address {
        match self.anchor.as_ref().map(DestinationObfuscator::mode) {
            Some(AnchorMode::ClientEncrypt { relay, .. }) => relay,
            _ => &self.server,
        }
    }

    pub fn build(self) -> Result<Outbound, ClientError> {
        if self.transport.is_some() && self.anchor.is_some() {
            return Err(ClientError::Config(
                "a custom transport cannot be combined with anchor".into(),
            ));
        }

        let tls_peer = self.tls_peer().to_string();
        let transport: Arc<dyn TransportConnector> = match (self.transport, &self.tls) {
            (Some(transport), _) => transport,
            (None, Some(tls)) => Arc::new(TlsConnector::new(tls, self.tcp.clone(), &tls_peer)?),
            (None, None) => Arc::new(PlainConnector::new(self.tcp.clone())),
        };

        Ok(Outbound {
            server: self.server,
            transport,
            negotiator: ConnectionNegotiator::new(self.identity, self.flow, self.encoding),
            obfuscator: self.anchor,
            mux: self.mux.map(MuxClient::new),
        })
    }
}

fn advance(stage: &mut DialStage, next: DialStage, destination: &Address) {
    trace!(from = ?*stage, to = ?next, destination = %destination, "dial stage");
    *stage = next;
}

impl Outbound {
    pub fn builder(server: Address, identity: [u8; 16]) -> OutboundBuilder {
        OutboundBuilder {
            server,
            identity,
            flow: String::new(),
            encoding: PacketEncoding::default(),
            tls: None,
            tcp: TcpConfig::default(),
            anchor: None,
            transport: None,
            mux: None,
        }
    }

    /// Builds an outbound from configuration, validating every option.
    pub fn from_config(config: &OutboundConfig) -> Result<Self, ClientError> {
        let mut builder = Self::builder(config.server_address()?, config.identity()?)
            .flow(config.flow.clone())
            .packet_encoding(config.packet_encoding()?)
            .tcp(config.tcp.clone());
        if let Some(tls) = &config.tls {
            builder = builder.tls(tls.clone());
        }
        if let Some(obfuscator) = config.anchor.build()? {
            builder = builder.anchor(obfuscator);
        }
        builder.build()
    }

    pub fn server(&self) -> &Address {
        &self.server
    }

    pub async fn dial(
        &self,
        network: Network,
        destination: &Address,
        ctx: &DialContext,
    ) -> Result<Connection, ClientError> {
        match network {
            Network::Tcp => self.dial_stream(destination, ctx).await.map(Connection::Stream),
            Network::Udp => self
                .listen_packet(destination, ctx)
                .await
                .map(Connection::Packet),
        }
    }

    /// Opens a TCP connection to `destination` through the server.
    pub async fn dial_stream(
        &self,
        destination: &Address,
        ctx: &DialContext,
    ) -> Result<BoxStream, ClientError> {
        let mut stage = DialStage::Idle;
        let result = match &self.mux {
            Some(mux) => match self.mux_session(mux, destination, ctx, &mut stage).await {
                Ok(session) => session.open_stream(destination).await,
                Err(e) => Err(e),
            },
            None => self.dial_stream_direct(destination, ctx, &mut stage).await,
        };
        if result.is_ok() {
            advance(&mut stage, DialStage::Established, destination);
        }
        self.finish(result, stage, destination, Network::Tcp)
    }

    /// Opens a packet connection; `destination` is where datagrams go by
    /// default and what the server is told for fixed-destination encodings.
    pub async fn listen_packet(
        &self,
        destination: &Address,
        ctx: &DialContext,
    ) -> Result<Box<dyn PacketConn>, ClientError> {
        let mut stage = DialStage::Idle;
        let result = match &self.mux {
            Some(mux) => match self.negotiator.check_packet_destination(destination) {
                Ok(()) => match self.mux_session(mux, destination, ctx, &mut stage).await {
                    Ok(session) => session.open_packet(destination).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
            None => self.listen_packet_direct(destination, ctx, &mut stage).await,
        };
        if result.is_ok() {
            advance(&mut stage, DialStage::Established, destination);
        }
        self.finish(result, stage, destination, Network::Udp)
    }

    /// Drops the multiplexed session, if any.
    pub async fn reset(&self) {
        if let Some(mux) = &self.mux {
            mux.reset().await;
        }
    }

    pub async fn close(&self) {
        if let Some(mux) = &self.mux {
            mux.close().await;
        }
    }

    fn finish<T>(
        &self,
        result: Result<T, ClientError>,
        stage: DialStage,
        destination: &Address,
        network: Network,
    ) -> Result<T, ClientError> {
        if let Err(e) = &result {
            debug!(
                destination = %destination,
                network = ?network,
                stage = ?stage,
                error = %e,
                error_type = e.error_type(),
                "dial failed"
            );
        }
        result
    }

    async fn dial_stream_direct(
        &self,
        destination: &Address,
        ctx: &DialContext,
        stage: &mut DialStage,
    ) -> Result<BoxStream, ClientError> {
        let target = self.resolve(destination, ctx)?;
        advance(stage, DialStage::ObfuscationResolved, destination);

        let stream = self.acquire(&target).await?;
        advance(stage, DialStage::StreamAcquired, destination);

        let conn = self.negotiator.stream(stream, &target)?;
        advance(stage, DialStage::HandshakeSent, destination);
        Ok(Box::new(conn))
    }

    async fn listen_packet_direct(
        &self,
        destination: &Address,
        ctx: &DialContext,
        stage: &mut DialStage,
    ) -> Result<Box<dyn PacketConn>, ClientError> {
        let target = self.resolve(destination, ctx)?;
        // the declared address is what datagrams name on the wire
        self.negotiator.check_packet_destination(&target.declared)?;
        advance(stage, DialStage::ObfuscationResolved, destination);

        let stream = self.acquire(&target).await?;
        advance(stage, DialStage::StreamAcquired, destination);

        let conn = self.negotiator.packet(stream, &target)?;
        advance(stage, DialStage::HandshakeSent, destination);
        Ok(Box::new(conn))
    }

    fn resolve(
        &self,
        destination: &Address,
        ctx: &DialContext,
    ) -> Result<ResolvedTarget, ClientError> {
        match &self.obfuscator {
            Some(obfuscator) => Ok(obfuscator.resolve(destination, ctx)?),
            None => Ok(ResolvedTarget::direct(&self.server, destination)),
        }
    }

    async fn acquire(&self, target: &ResolvedTarget) -> Result<BoxStream, ClientError> {
        let addr = target.dial_target.to_string();
        debug!(dial_target = %addr, declared = %target.declared, "acquiring stream");
        Ok(self.transport.connect(&addr).await?)
    }

    /// Live session, establishing the physical connection on first use.
    /// The physical request carries the first caller's anchor payload.
    /// Callers that reuse a live session skip straight to `HandshakeSent`.
    async fn mux_session(
        &self,
        mux: &MuxClient,
        destination: &Address,
        ctx: &DialContext,
        stage: &mut DialStage,
    ) -> Result<Arc<dyn MuxSession>, ClientError> {
        let establishing = &mut *stage;
        let session = mux
            .session(move || async move {
                let target = self.resolve(destination, ctx)?;
                advance(establishing, DialStage::ObfuscationResolved, destination);
                let stream = self.acquire(&target).await?;
                advance(establishing, DialStage::StreamAcquired, destination);
                let request = self.negotiator.mux_request(&target, mux_destination());
                let stream = VlessStream::new(stream, &request)?;
                Ok::<BoxStream, ClientError>(Box::new(stream))
            })
            .await?;
        advance(stage, DialStage::HandshakeSent, destination);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnchorError;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio::sync::mpsc;
    use vless_proto::{Command, decode_request};
    use vless_transport::ConnectFuture;

    struct FakeTransport {
        dialed: std::sync::Mutex<Vec<String>>,
        peers: mpsc::UnboundedSender<DuplexStream>,
    }

    impl TransportConnector for FakeTransport {
        fn connect<'a>(&'a self, addr: &'a str) -> ConnectFuture<'a> {
            Box::pin(async move {
                self.dialed.lock().unwrap().push(addr.to_string());
                let (client, server) = duplex(64 * 1024);
                let _ = self.peers.send(server);
                Ok(Box::new(client) as BoxStream)
            })
        }
    }

    fn fake() -> (Arc<FakeTransport>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(FakeTransport {
            dialed: std::sync::Mutex::new(Vec::new()),
            peers: tx,
        });
        (transport, rx)
    }

    fn server() -> Address {
        "vless.example.com:443".parse().unwrap()
    }

    async fn read_request(peer: &mut DuplexStream) -> (vless_proto::Request, Vec<u8>) {
        let mut buf = vec![0u8; 64 * 1024];
        let n = peer.read(&mut buf).await.unwrap();
        let decoded = decode_request(&buf[..n]).unwrap();
        (decoded.request, decoded.payload.to_vec())
    }

    #[tokio::test]
    async fn tcp_dial_coalesces_first_write() {
        let (transport, mut peers) = fake();
        let outbound = Outbound::builder(server(), [9; 16])
            .transport(transport.clone())
            .build()
            .unwrap();

        let dest: Address = "example.com:80".parse().unwrap();
        let mut conn = outbound.dial_stream(&dest, &DialContext::new()).await.unwrap();
        conn.write_all(b"GET /").await.unwrap();
        conn.flush().await.unwrap();

        let mut peer = peers.recv().await.unwrap();
        let (request, payload) = read_request(&mut peer).await;
        assert_eq!(request.command, Command::Tcp);
        assert_eq!(request.destination, Some(dest));
        assert_eq!(request.identity, [9; 16]);
        assert_eq!(payload, b"GET /");
        assert_eq!(
            *transport.dialed.lock().unwrap(),
            vec!["vless.example.com:443".to_string()]
        );

        peer.write_all(&[0, 0, b'o', b'k']).await.unwrap();
        let mut out = [0u8; 2];
        conn.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"ok");
    }

    #[tokio::test]
    async fn packet_addr_domain_fails_before_dialing() {
        let (transport, _peers) = fake();
        let outbound = Outbound::builder(server(), [9; 16])
            .packet_encoding(PacketEncoding::PacketAddr)
            .transport(transport.clone())
            .build()
            .unwrap();

        let err = outbound
            .dial(Network::Udp, &Address::domain("dns.google", 53), &DialContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedDestination(_)));
        assert!(transport.dialed.lock().unwrap().is_empty());
    }

    /// The builder refuses a transport override together with anchoring,
    /// so anchored outbounds over the fake transport are assembled directly.
    fn anchored(
        transport: Arc<FakeTransport>,
        obfuscator: DestinationObfuscator,
        encoding: PacketEncoding,
    ) -> Outbound {
        Outbound {
            server: server(),
            transport,
            negotiator: ConnectionNegotiator::new([9; 16], "", encoding),
            obfuscator: Some(obfuscator),
            mux: None,
        }
    }

    #[tokio::test]
    async fn passthrough_without_payload_fails_before_dialing() {
        let (transport, _peers) = fake();
        let outbound = anchored(
            transport.clone(),
            DestinationObfuscator::relay_passthrough(),
            PacketEncoding::Xudp,
        );

        let dest: Address = "example.com:80".parse().unwrap();
        let result = outbound.dial_stream(&dest, &DialContext::new()).await;
        assert!(matches!(
            result,
            Err(ClientError::Anchor(AnchorError::MissingPayload))
        ));
        assert!(transport.dialed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn passthrough_dials_destination_not_server() {
        let (transport, mut peers) = fake();
        let outbound = anchored(
            transport.clone(),
            DestinationObfuscator::relay_passthrough(),
            PacketEncoding::Xudp,
        );

        let dest: Address = "10.9.8.7:443".parse().unwrap();
        let ctx = DialContext::new().with_anchor_payload(&b"blob"[..]);
        let mut conn = outbound.dial_stream(&dest, &ctx).await.unwrap();
        conn.write_all(b"x").await.unwrap();

        let mut peer = peers.recv().await.unwrap();
        let (request, _) = read_request(&mut peer).await;
        assert_eq!(request.destination, Some(dest));
        assert_eq!(request.obfuscated_destination.as_deref(), Some(&b"blob"[..]));
        assert_eq!(
            *transport.dialed.lock().unwrap(),
            vec!["10.9.8.7:443".to_string()]
        );
    }

    fn client_encrypt(relay: &Address) -> (rsa::RsaPrivateKey, DestinationObfuscator) {
        let private = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public = rsa::RsaPublicKey::from(&private);
        (
            private,
            DestinationObfuscator::client_encrypt(public, relay.clone()),
        )
    }

    #[tokio::test]
    async fn client_encrypt_packets_never_name_destination() {
        let relay: Address = "203.0.113.7:8443".parse().unwrap();
        for encoding in [
            PacketEncoding::Xudp,
            PacketEncoding::Plain,
            PacketEncoding::PacketAddr,
        ] {
            let (transport, mut peers) = fake();
            let (private, obfuscator) = client_encrypt(&relay);
            let outbound = anchored(transport.clone(), obfuscator, encoding);

            let dest = Address::domain("secret.example.com", 53);
            let conn = outbound
                .listen_packet(&dest, &DialContext::new())
                .await
                .unwrap();
            conn.write_packet(b"q1", &dest).await.unwrap();
            conn.write_packet(b"q2", &dest).await.unwrap();
            conn.close().await.unwrap();

            let mut peer = peers.recv().await.unwrap();
            let mut wire = Vec::new();
            peer.read_to_end(&mut wire).await.unwrap();
            assert!(
                !wire.windows(6).any(|w| w == b"secret"),
                "{encoding:?} leaked the destination"
            );

            let decoded = decode_request(&wire).unwrap();
            let blob = decoded.request.obfuscated_destination.unwrap();
            let plain = private.decrypt(rsa::Pkcs1v15Encrypt, &blob).unwrap();
            assert_eq!(plain, b"secret.example.com:53");
            assert_eq!(
                *transport.dialed.lock().unwrap(),
                vec!["203.0.113.7:8443".to_string()]
            );
            if encoding == PacketEncoding::Xudp {
                match vless_proto::xudp::parse_frame(decoded.payload) {
                    vless_proto::ParseResult::Complete(frame) => {
                        assert_eq!(frame.destination, Some(relay.clone()));
                    }
                    other => panic!("unexpected parse result: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn tls_sni_follows_relay_in_client_encrypt_mode() {
        let relay = Address::domain("relay.example.com", 8443);
        let (_, obfuscator) = client_encrypt(&relay);
        let builder = Outbound::builder(server(), [9; 16]).anchor(obfuscator);
        assert_eq!(builder.tls_peer(), &relay);

        let builder = Outbound::builder(server(), [9; 16])
            .anchor(DestinationObfuscator::relay_passthrough());
        assert_eq!(builder.tls_peer(), &server());
        assert_eq!(Outbound::builder(server(), [9; 16]).tls_peer(), &server());
    }

    #[test]
    fn transport_override_with_anchor_is_rejected() {
        let (transport, _peers) = fake();
        let err = Outbound::builder(server(), [9; 16])
            .anchor(DestinationObfuscator::relay_passthrough())
            .transport(transport)
            .build()
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[tokio::test]
    async fn udp_xudp_dial_declares_mux_command() {
        let (transport, mut peers) = fake();
        let outbound = Outbound::builder(server(), [9; 16])
            .transport(transport)
            .build()
            .unwrap();

        let dest: Address = "8.8.8.8:53".parse().unwrap();
        let conn = match outbound
            .dial(Network::Udp, &dest, &DialContext::new())
            .await
            .unwrap()
        {
            Connection::Packet(conn) => conn,
            other => panic!("unexpected connection: {other:?}"),
        };
        conn.write_packet(b"query", &dest).await.unwrap();

        let mut peer = peers.recv().await.unwrap();
        let (request, payload) = read_request(&mut peer).await;
        assert_eq!(request.command, Command::Mux);
        assert!(request.destination.is_none());
        assert!(!payload.is_empty());
    }

    struct CountingProtocol {
        sessions: std::sync::atomic::AtomicUsize,
    }

    struct PassSession {
        closed: std::sync::atomic::AtomicBool,
        // keeps the physical stream open for the session's lifetime
        _physical: tokio::sync::Mutex<BoxStream>,
    }

    #[async_trait]
    impl MuxSession for PassSession {
        async fn open_stream(&self, _destination: &Address) -> Result<BoxStream, ClientError> {
            let (client, _server) = duplex(64);
            Ok(Box::new(client))
        }

        async fn open_packet(
            &self,
            _destination: &Address,
        ) -> Result<Box<dyn PacketConn>, ClientError> {
            Err(ClientError::Mux("unsupported".into()))
        }

        fn is_closed(&self) -> bool {
            self.closed.load(std::sync::atomic::Ordering::SeqCst)
        }

        async fn close(&self) {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MuxProtocol for CountingProtocol {
        async fn open_session(
            &self,
            mut stream: BoxStream,
        ) -> Result<Arc<dyn MuxSession>, ClientError> {
            self.sessions
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            stream.flush().await?;
            Ok(Arc::new(PassSession {
                closed: Default::default(),
                _physical: tokio::sync::Mutex::new(stream),
            }))
        }
    }

    #[tokio::test]
    async fn mux_stages_advance_on_establish_and_reuse() {
        let (transport, _peers) = fake();
        let outbound = Outbound::builder(server(), [9; 16])
            .transport(transport)
            .multiplex(Arc::new(CountingProtocol {
                sessions: Default::default(),
            }))
            .build()
            .unwrap();
        let mux = outbound.mux.as_ref().unwrap();
        let dest: Address = "a.example.com:443".parse().unwrap();
        let ctx = DialContext::new();

        let mut first = DialStage::Idle;
        outbound
            .mux_session(mux, &dest, &ctx, &mut first)
            .await
            .unwrap();
        assert_eq!(first, DialStage::HandshakeSent);

        let mut reused = DialStage::Idle;
        outbound
            .mux_session(mux, &dest, &ctx, &mut reused)
            .await
            .unwrap();
        assert_eq!(reused, DialStage::HandshakeSent);
        outbound.close().await;
    }

    #[tokio::test]
    async fn mux_failure_reports_reached_stage() {
        let (transport, _peers) = fake();
        let outbound = Outbound {
            mux: Some(MuxClient::new(Arc::new(CountingProtocol {
                sessions: Default::default(),
            }))),
            ..anchored(
                transport.clone(),
                DestinationObfuscator::relay_passthrough(),
                PacketEncoding::Xudp,
            )
        };
        let mux = outbound.mux.as_ref().unwrap();
        let dest: Address = "a.example.com:443".parse().unwrap();

        let mut stage = DialStage::Idle;
        let result = outbound
            .mux_session(mux, &dest, &DialContext::new(), &mut stage)
            .await;
        assert!(matches!(
            result,
            Err(ClientError::Anchor(AnchorError::MissingPayload))
        ));
        assert_eq!(stage, DialStage::Idle);

        let ctx = DialContext::new().with_anchor_payload(&b"blob"[..]);
        outbound
            .mux_session(mux, &dest, &ctx, &mut stage)
            .await
            .unwrap();
        assert_eq!(stage, DialStage::HandshakeSent);
        assert_eq!(transport.dialed.lock().unwrap().len(), 1);
        outbound.close().await;
    }

    #[tokio::test]
    async fn mux_reuses_one_physical_connection() {
        let (transport, mut peers) = fake();
        let protocol = Arc::new(CountingProtocol {
            sessions: Default::default(),
        });
        let outbound = Outbound::builder(server(), [9; 16])
            .transport(transport.clone())
            .multiplex(protocol.clone())
            .build()
            .unwrap();

        let ctx = DialContext::new();
        let a: Address = "a.example.com:443".parse().unwrap();
        let b: Address = "b.example.com:443".parse().unwrap();
        outbound.dial_stream(&a, &ctx).await.unwrap();
        outbound.dial_stream(&b, &ctx).await.unwrap();

        assert_eq!(transport.dialed.lock().unwrap().len(), 1);
        assert_eq!(
            protocol.sessions.load(std::sync::atomic::Ordering::SeqCst),
            1
        );

        let mut peer = peers.recv().await.unwrap();
        let (request, _) = read_request(&mut peer).await;
        assert_eq!(request.command, Command::Tcp);
        assert_eq!(request.destination, Some(mux_destination()));

        outbound.close().await;
    }
}
