//! Multiplexed sessions over one VLESS connection.
//!
//! The multiplexing protocol itself is supplied by the caller through
//! [`MuxProtocol`]. [`MuxClient`] keeps at most one live session and
//! establishes it lazily; concurrent first callers wait on the same
//! establishment instead of opening a second physical connection.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use vless_proto::Address;
use vless_transport::BoxStream;

use crate::error::ClientError;
use crate::packet::PacketConn;

/// Destination declared by the physical connection of a session.
pub const MUX_DESTINATION_HOST: &str = "sp.mux.sing-box.arpa";
pub const MUX_DESTINATION_PORT: u16 = 444;

pub fn mux_destination() -> Address {
    Address::domain(MUX_DESTINATION_HOST, MUX_DESTINATION_PORT)
}

/// Turns one physical stream into a session of logical streams.
#[async_trait]
pub trait MuxProtocol: Send + Sync + 'static {
    async fn open_session(&self, stream: BoxStream) -> Result<Arc<dyn MuxSession>, ClientError>;
}

/// A live multiplexed session.
#[async_trait]
pub trait MuxSession: Send + Sync {
    async fn open_stream(&self, destination: &Address) -> Result<BoxStream, ClientError>;

    async fn open_packet(
        &self,
        destination: &Address,
    ) -> Result<Box<dyn PacketConn>, ClientError>;

    fn is_closed(&self) -> bool;

    async fn close(&self);
}

pub struct MuxClient {
    protocol: Arc<dyn MuxProtocol>,
    session: Mutex<Option<Arc<dyn MuxSession>>>,
}

impl std::fmt::Debug for MuxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxClient").finish_non_exhaustive()
    }
}

impl MuxClient {
    pub fn new(protocol: Arc<dyn MuxProtocol>) -> Self {
        Self {
            protocol,
            session: Mutex::new(None),
        }
    }

    /// Returns the live session, establishing one over `connect` if there
    /// is none or the previous one has closed.
    pub async fn session<F, Fut>(&self, connect: F) -> Result<Arc<dyn MuxSession>, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BoxStream, ClientError>>,
    {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref()
            && !session.is_closed()
        {
            return Ok(session.clone());
        }

        let stream = connect().await?;
        let session = self.protocol.open_session(stream).await?;
        debug!("multiplexed session established");
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Forgets the current session; the next caller establishes a new one.
    pub async fn reset(&self) {
        if self.session.lock().await.take().is_some() {
            debug!("multiplexed session reset");
        }
    }

    pub async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSession {
        closed: AtomicBool,
    }

    #[async_trait]
    impl MuxSession for FakeSession {
        async fn open_stream(&self, _destination: &Address) -> Result<BoxStream, ClientError> {
            let (client, _server) = tokio::io::duplex(64);
            Ok(Box::new(client))
        }

        async fn open_packet(
            &self,
            _destination: &Address,
        ) -> Result<Box<dyn PacketConn>, ClientError> {
            Err(ClientError::Mux("packets not supported".into()))
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeProtocol {
        sessions: AtomicUsize,
    }

    #[async_trait]
    impl MuxProtocol for FakeProtocol {
        async fn open_session(
            &self,
            _stream: BoxStream,
        ) -> Result<Arc<dyn MuxSession>, ClientError> {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeSession::default()))
        }
    }

    async fn slow_connect(dials: Arc<AtomicUsize>) -> Result<BoxStream, ClientError> {
        dials.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (client, _server) = tokio::io::duplex(64);
        Ok(Box::new(client))
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_establishment() {
        let protocol = Arc::new(FakeProtocol::default());
        let client = Arc::new(MuxClient::new(protocol.clone()));
        let dials = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let client = client.clone();
            let dials = dials.clone();
            tasks.push(tokio::spawn(async move {
                client.session(|| slow_connect(dials)).await.map(|_| ())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert_eq!(protocol.sessions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_session_is_replaced() {
        let protocol = Arc::new(FakeProtocol::default());
        let client = MuxClient::new(protocol.clone());
        let dials = Arc::new(AtomicUsize::new(0));

        let first = client.session(|| slow_connect(dials.clone())).await.unwrap();
        first.close().await;
        client.session(|| slow_connect(dials.clone())).await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 2);

        client.reset().await;
        client.session(|| slow_connect(dials.clone())).await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_establishment_leaves_no_session() {
        let client = MuxClient::new(Arc::new(FakeProtocol::default()));
        let err = client
            .session(|| async { Err(ClientError::Mux("refused".into())) })
            .await;
        assert!(err.is_err());

        let dials = Arc::new(AtomicUsize::new(0));
        client.session(|| slow_connect(dials.clone())).await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sentinel_destination() {
        assert_eq!(mux_destination().to_string(), "sp.mux.sing-box.arpa:444");
    }
}
