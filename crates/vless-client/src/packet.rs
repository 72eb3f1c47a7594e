//! Packet connections over a VLESS stream.
//!
//! One [`VlessPacketConn`] handles all three UDP encodings. Reads and
//! writes go through separate halves so a reader task and a writer task
//! can share one connection.

use std::io;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use vless_proto::packet::{
    packet_addr_len, parse_length_packet, read_packet_addr, write_length_packet,
    write_packet_addr,
};
use vless_proto::xudp::{FrameStatus, parse_frame, write_frame};
use vless_proto::{Address, ParseResult, ProtoError, WriteError};

use crate::negotiate::PacketEncoding;
use crate::stream::VlessStream;

/// A datagram and the address it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub payload: Bytes,
    pub source: Address,
}

/// Datagram-oriented connection.
#[async_trait]
pub trait PacketConn: Send + Sync {
    /// Reads the next datagram. `None` once the peer has closed.
    async fn read_packet(&self) -> io::Result<Option<Packet>>;

    /// Sends one datagram to `destination`.
    async fn write_packet(&self, payload: &[u8], destination: &Address) -> io::Result<()>;

    async fn close(&self) -> io::Result<()>;
}

struct PacketReader<R> {
    inner: R,
    buf: BytesMut,
    closed: bool,
}

struct PacketWriter<W> {
    inner: W,
    buf: BytesMut,
    started: bool,
}

enum Decoded {
    Packet(Packet),
    Skip,
    NeedMore,
    End,
}

pub struct VlessPacketConn<S> {
    encoding: PacketEncoding,
    /// Source reported for datagrams that carry no address.
    destination: Address,
    /// Write every datagram to `destination`, ignoring the caller's address.
    pinned: bool,
    reader: Mutex<PacketReader<ReadHalf<VlessStream<S>>>>,
    writer: Mutex<PacketWriter<WriteHalf<VlessStream<S>>>>,
}

impl<S> std::fmt::Debug for VlessPacketConn<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VlessPacketConn")
            .field("encoding", &self.encoding)
            .field("destination", &self.destination)
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> VlessPacketConn<S> {
    pub fn new(stream: VlessStream<S>, encoding: PacketEncoding, destination: Address) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            encoding,
            destination,
            pinned: false,
            reader: Mutex::new(PacketReader {
                inner: read_half,
                buf: BytesMut::with_capacity(2048),
                closed: false,
            }),
            writer: Mutex::new(PacketWriter {
                inner: write_half,
                buf: BytesMut::with_capacity(2048),
                started: false,
            }),
        }
    }

    /// Addresses every written datagram to the connection's destination.
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    fn decode(&self, buf: &mut BytesMut) -> Result<Decoded, ProtoError> {
        match self.encoding {
            PacketEncoding::Xudp => {
                let (status, source, data_len, frame_len) = match parse_frame(buf) {
                    ParseResult::Complete(frame) => (
                        frame.status,
                        frame.destination,
                        frame.payload.map(<[u8]>::len),
                        frame.frame_len,
                    ),
                    ParseResult::Incomplete(_) => return Ok(Decoded::NeedMore),
                    ParseResult::Invalid(e) => return Err(e),
                };
                let frame = buf.split_to(frame_len).freeze();
                match (status, data_len) {
                    (FrameStatus::End, _) => Ok(Decoded::End),
                    (FrameStatus::KeepAlive, _) | (_, None) => Ok(Decoded::Skip),
                    (_, Some(len)) => Ok(Decoded::Packet(Packet {
                        payload: frame.slice(frame_len - len..),
                        source: source.unwrap_or_else(|| self.destination.clone()),
                    })),
                }
            }
            PacketEncoding::Plain => match parse_length_packet(buf) {
                ParseResult::Complete((_, consumed)) => {
                    let mut frame = buf.split_to(consumed).freeze();
                    frame.advance(2);
                    Ok(Decoded::Packet(Packet {
                        payload: frame,
                        source: self.destination.clone(),
                    }))
                }
                ParseResult::Incomplete(_) => Ok(Decoded::NeedMore),
                ParseResult::Invalid(e) => Err(e),
            },
            PacketEncoding::PacketAddr => match parse_length_packet(buf) {
                ParseResult::Complete((payload, consumed)) => {
                    let (source, prefix_len) = read_packet_addr(payload)?;
                    let mut frame = buf.split_to(consumed).freeze();
                    frame.advance(2 + prefix_len);
                    Ok(Decoded::Packet(Packet {
                        payload: frame,
                        source,
                    }))
                }
                ParseResult::Incomplete(_) => Ok(Decoded::NeedMore),
                ParseResult::Invalid(e) => Err(e),
            },
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode(
        &self,
        buf: &mut BytesMut,
        started: bool,
        payload: &[u8],
        destination: &Address,
    ) -> Result<(), WriteError> {
        match self.encoding {
            PacketEncoding::Xudp => {
                let status = if started {
                    FrameStatus::Keep
                } else {
                    FrameStatus::New
                };
                write_frame(buf, 0, status, Some(destination), Some(payload))
            }
            PacketEncoding::Plain => write_length_packet(buf, payload),
            PacketEncoding::PacketAddr => {
                let total = packet_addr_len(destination)? + payload.len();
                if total > u16::MAX as usize {
                    return Err(WriteError::PayloadTooLarge);
                }
                buf.reserve(2 + total);
                buf.extend_from_slice(&(total as u16).to_be_bytes());
                write_packet_addr(buf, destination)?;
                buf.extend_from_slice(payload);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<S> PacketConn for VlessPacketConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_packet(&self) -> io::Result<Option<Packet>> {
        let mut reader = self.reader.lock().await;
        let reader = &mut *reader;
        loop {
            if reader.closed {
                return Ok(None);
            }
            match self
                .decode(&mut reader.buf)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            {
                Decoded::Packet(packet) => return Ok(Some(packet)),
                Decoded::Skip => continue,
                Decoded::End => {
                    reader.closed = true;
                    return Ok(None);
                }
                Decoded::NeedMore => {}
            }
            if reader.inner.read_buf(&mut reader.buf).await? == 0 {
                reader.closed = true;
                if reader.buf.is_empty() {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    ProtoError::Truncated,
                ));
            }
        }
    }

    async fn write_packet(&self, payload: &[u8], destination: &Address) -> io::Result<()> {
        let destination = if self.pinned {
            &self.destination
        } else {
            destination
        };
        let mut writer = self.writer.lock().await;
        let writer = &mut *writer;
        writer.buf.clear();
        self.encode(&mut writer.buf, writer.started, payload, destination)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        writer.inner.write_all(&writer.buf).await?;
        writer.inner.flush().await?;
        writer.started = true;
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        self.writer.lock().await.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use tokio::io::{DuplexStream, duplex};
    use vless_proto::packet::FAMILY_IPV4;
    use vless_proto::{Command, Request, decode_request};

    fn dns() -> Address {
        "8.8.8.8:53".parse().unwrap()
    }

    fn conn(
        encoding: PacketEncoding,
        command: Command,
        destination: Option<Address>,
    ) -> (VlessPacketConn<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(64 * 1024);
        let request = Request {
            identity: [1; 16],
            command,
            destination,
            flow: String::new(),
            obfuscated_destination: None,
        };
        let stream = VlessStream::new(client, &request).unwrap();
        (VlessPacketConn::new(stream, encoding, dns()), server)
    }

    async fn read_some(server: &mut DuplexStream) -> Vec<u8> {
        let mut buf = vec![0u8; 64 * 1024];
        let n = server.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn xudp_first_frame_is_new_then_keep() {
        let (conn, mut server) = conn(PacketEncoding::Xudp, Command::Mux, None);
        conn.write_packet(b"q1", &dns()).await.unwrap();

        let first = read_some(&mut server).await;
        let decoded = decode_request(&first).unwrap();
        assert_eq!(decoded.request.command, Command::Mux);
        match parse_frame(decoded.payload) {
            ParseResult::Complete(frame) => {
                assert_eq!(frame.status, FrameStatus::New);
                assert_eq!(frame.destination, Some(dns()));
                assert_eq!(frame.payload, Some(&b"q1"[..]));
            }
            other => panic!("unexpected parse result: {other:?}"),
        }

        let other: Address = "1.1.1.1:53".parse().unwrap();
        conn.write_packet(b"q2", &other).await.unwrap();
        let second = read_some(&mut server).await;
        match parse_frame(&second) {
            ParseResult::Complete(frame) => {
                assert_eq!(frame.status, FrameStatus::Keep);
                assert_eq!(frame.destination, Some(other));
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn xudp_reads_skip_keepalive_and_stop_at_end() {
        let (conn, mut server) = conn(PacketEncoding::Xudp, Command::Mux, None);
        let source: Address = "9.9.9.9:53".parse().unwrap();

        let mut buf = BytesMut::new();
        buf.put_slice(&[0, 0]); // response
        write_frame(&mut buf, 0, FrameStatus::KeepAlive, None, None).unwrap();
        write_frame(&mut buf, 0, FrameStatus::Keep, Some(&source), Some(b"a1")).unwrap();
        write_frame(&mut buf, 0, FrameStatus::Keep, None, Some(b"a2")).unwrap();
        write_frame(&mut buf, 0, FrameStatus::End, None, None).unwrap();
        server.write_all(&buf).await.unwrap();

        let p1 = conn.read_packet().await.unwrap().unwrap();
        assert_eq!(p1.payload, &b"a1"[..]);
        assert_eq!(p1.source, source);
        let p2 = conn.read_packet().await.unwrap().unwrap();
        assert_eq!(p2.payload, &b"a2"[..]);
        assert_eq!(p2.source, dns());
        assert!(conn.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn plain_packets_are_length_prefixed() {
        let (conn, mut server) = conn(PacketEncoding::Plain, Command::Udp, Some(dns()));
        conn.write_packet(b"hello", &dns()).await.unwrap();

        let first = read_some(&mut server).await;
        let decoded = decode_request(&first).unwrap();
        assert_eq!(decoded.request.command, Command::Udp);
        assert_eq!(decoded.payload, &[0, 5, b'h', b'e', b'l', b'l', b'o']);

        server.write_all(&[0, 0, 0, 3, b'a', b'b', b'c']).await.unwrap();
        let packet = conn.read_packet().await.unwrap().unwrap();
        assert_eq!(packet.payload, &b"abc"[..]);
        assert_eq!(packet.source, dns());

        drop(server);
        assert!(conn.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn packet_addr_prefixes_each_datagram() {
        let sentinel = vless_proto::packet::packet_addr_destination();
        let (conn, mut server) = conn(PacketEncoding::PacketAddr, Command::Udp, Some(sentinel));
        conn.write_packet(b"ping", &dns()).await.unwrap();

        let first = read_some(&mut server).await;
        let decoded = decode_request(&first).unwrap();
        assert_eq!(
            decoded.payload,
            &[0, 11, 0, 53, FAMILY_IPV4, 8, 8, 8, 8, b'p', b'i', b'n', b'g']
        );

        server
            .write_all(&[0, 0, 0, 10, 0, 53, FAMILY_IPV4, 1, 1, 1, 1, b'p', b'o', b'n'])
            .await
            .unwrap();
        let packet = conn.read_packet().await.unwrap().unwrap();
        assert_eq!(packet.payload, &b"pon"[..]);
        assert_eq!(packet.source, "1.1.1.1:53".parse::<Address>().unwrap());
    }

    #[tokio::test]
    async fn packet_addr_rejects_domain_datagram() {
        let sentinel = vless_proto::packet::packet_addr_destination();
        let (conn, _server) = conn(PacketEncoding::PacketAddr, Command::Udp, Some(sentinel));
        let err = conn
            .write_packet(b"x", &Address::domain("dns.google", 53))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn pinned_conn_ignores_caller_destination() {
        let (conn, mut server) = conn(PacketEncoding::Xudp, Command::Mux, None);
        let conn = conn.pinned();
        let hidden = Address::domain("hidden.example.com", 53);
        conn.write_packet(b"q", &hidden).await.unwrap();

        let first = read_some(&mut server).await;
        assert!(!first.windows(6).any(|w| w == b"hidden"));
        let decoded = decode_request(&first).unwrap();
        match parse_frame(decoded.payload) {
            ParseResult::Complete(frame) => {
                assert_eq!(frame.destination, Some(dns()));
                assert_eq!(frame.payload, Some(&b"q"[..]));
            }
            other => panic!("unexpected parse result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_tail_is_an_error() {
        let (conn, mut server) = conn(PacketEncoding::Plain, Command::Udp, Some(dns()));
        conn.write_packet(b"q", &dns()).await.unwrap();
        read_some(&mut server).await;
        server.write_all(&[0, 0, 0, 9, b'a']).await.unwrap();
        drop(server);
        let err = conn.read_packet().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
