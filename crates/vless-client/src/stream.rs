//! Stream connection with an early request and a lazy response.
//!
//! The request header is held back and sent together with the first write,
//! so the first payload bytes leave in the same segment as the handshake.
//! The response header is read on the first read; bytes that arrive with
//! it are kept and served before the inner stream is polled again.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::io::poll_read_buf;
use vless_proto::{ParseResult, ProtoError, Request, WriteError, encode_request, parse_response};

/// Largest first write coalesced with the header.
const MAX_COALESCE: usize = 16 * 1024;

enum WriteState {
    /// Header not yet sent.
    Pending(BytesMut),
    /// Header (plus `claimed` caller bytes) partially written.
    Flushing { buf: BytesMut, claimed: usize },
    /// Header out; the next write reports `claimed` bytes as written.
    Claimed(usize),
    Ready,
}

enum ReadState {
    /// Response header not yet complete.
    Response(BytesMut),
    /// Bytes received together with the response header.
    Leftover(Bytes),
    Ready,
}

/// A VLESS stream over `S`.
pub struct VlessStream<S> {
    inner: S,
    write: WriteState,
    read: ReadState,
}

impl<S> std::fmt::Debug for VlessStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VlessStream")
            .field("header_sent", &self.header_sent())
            .field("response_read", &matches!(self.read, ReadState::Ready))
            .finish_non_exhaustive()
    }
}

impl<S> VlessStream<S> {
    /// Encodes `request` and wraps `inner`. Nothing is written yet.
    pub fn new(inner: S, request: &Request) -> Result<Self, WriteError> {
        let header = encode_request(request, &[])?;
        Ok(Self {
            inner,
            write: WriteState::Pending(header),
            read: ReadState::Response(BytesMut::with_capacity(64)),
        })
    }

    fn header_sent(&self) -> bool {
        matches!(self.write, WriteState::Claimed(_) | WriteState::Ready)
    }
}

impl<S: AsyncWrite + Unpin> VlessStream<S> {
    /// Drives any pending header bytes out.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            match &mut self.write {
                WriteState::Pending(header) => {
                    let buf = std::mem::take(header);
                    self.write = WriteState::Flushing { buf, claimed: 0 };
                }
                WriteState::Flushing { buf, claimed } => {
                    while buf.has_remaining() {
                        let n = ready!(Pin::new(&mut self.inner).poll_write(cx, buf))?;
                        if n == 0 {
                            return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                        }
                        buf.advance(n);
                    }
                    self.write = match *claimed {
                        0 => WriteState::Ready,
                        n => WriteState::Claimed(n),
                    };
                }
                WriteState::Claimed(_) | WriteState::Ready => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for VlessStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // The server answers only once it has the request.
        if !this.header_sent() {
            ready!(this.poll_drain(cx))?;
            ready!(Pin::new(&mut this.inner).poll_flush(cx))?;
        }

        loop {
            match &mut this.read {
                ReadState::Response(buf) => match parse_response(buf) {
                    ParseResult::Complete(consumed) => {
                        buf.advance(consumed);
                        let rest = std::mem::take(buf).freeze();
                        this.read = if rest.is_empty() {
                            ReadState::Ready
                        } else {
                            ReadState::Leftover(rest)
                        };
                    }
                    ParseResult::Incomplete(needed) => {
                        buf.reserve(needed - buf.len());
                        let n = ready!(poll_read_buf(Pin::new(&mut this.inner), cx, buf))?;
                        if n == 0 {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                ProtoError::Truncated,
                            )));
                        }
                    }
                    ParseResult::Invalid(e) => {
                        return Poll::Ready(Err(io::Error::new(io::ErrorKind::InvalidData, e)));
                    }
                },
                ReadState::Leftover(rest) => {
                    let n = rest.len().min(out.remaining());
                    out.put_slice(&rest[..n]);
                    rest.advance(n);
                    if rest.is_empty() {
                        this.read = ReadState::Ready;
                    }
                    return Poll::Ready(Ok(()));
                }
                ReadState::Ready => return Pin::new(&mut this.inner).poll_read(cx, out),
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for VlessStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let WriteState::Pending(header) = &mut this.write {
            let claimed = data.len().min(MAX_COALESCE);
            let mut buf = std::mem::take(header);
            buf.extend_from_slice(&data[..claimed]);
            this.write = WriteState::Flushing { buf, claimed };
        }
        ready!(this.poll_drain(cx))?;
        if let WriteState::Claimed(n) = this.write {
            this.write = WriteState::Ready;
            return Poll::Ready(Ok(n));
        }
        Pin::new(&mut this.inner).poll_write(cx, data)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
