//! VLESS protocol parsing and serialization.
//!
//! Request headers are written with a single exact-size allocation: the
//! header length is computed by [`request_len`], the buffer is allocated
//! once, and the same field layout is then written into it. Decoding is
//! buffer based; short input is reported as [`ProtoError::Truncated`].
//!
//! Besides the request/response handshake this crate carries the three UDP
//! framings used on top of a VLESS stream: xudp frames ([`xudp`]), plain
//! length-prefixed packets and the packet-addr payload prefix ([`packet`]).

mod address;
mod reader;
mod request;
mod response;
mod varint;

pub mod packet;
pub mod xudp;

pub use address::{
    ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6, Address, AddressParseError, Host, MAX_DOMAIN_LEN,
    address_len, read_address, write_address,
};
pub use request::{
    AddonField, Command, DecodedRequest, Request, addons_len, decode_request, encode_request,
    request_len, write_request_header,
};
pub use response::{ReadError, parse_response, read_response};
pub use varint::{MAX_VARINT_LEN, decode_uvarint, put_uvarint, uvarint_len};

/// Protocol version carried in every request and response.
pub const VERSION: u8 = 0;
/// Length of the user identity (UUID bytes).
pub const IDENTITY_LEN: usize = 16;

/// Errors raised while decoding protocol data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),
    #[error("truncated message")]
    Truncated,
    #[error("unknown addon field tag: {0}")]
    UnknownFieldTag(u8),
    /// Reserved: command bytes are passed through as [`Command::Other`].
    #[error("invalid command: {0}")]
    InvalidCommand(u8),
    #[error("invalid address type: {0}")]
    InvalidAddressType(u8),
    #[error("invalid domain length")]
    InvalidDomainLen,
    #[error("invalid utf-8")]
    InvalidUtf8,
    #[error("varint overflows 64 bits")]
    VarintOverflow,
    #[error("invalid frame status: {0}")]
    InvalidFrameStatus(u8),
    #[error("invalid frame network: {0}")]
    InvalidNetwork(u8),
}

/// Errors that can occur when writing protocol data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// Domain name exceeds 255 bytes.
    #[error("domain name too long")]
    DomainTooLong,
    /// A TCP or UDP request carries no destination.
    #[error("request without destination")]
    MissingDestination,
    /// Payload does not fit a 16-bit length prefix.
    #[error("payload too large")]
    PayloadTooLarge,
    /// Address family cannot be represented by the target encoding.
    #[error("unsupported address family")]
    UnsupportedAddressFamily,
}

/// Parse result for incremental parsing.
///
/// - `Complete(T)` - parsing succeeded, contains the parsed value.
/// - `Incomplete(n)` - buffer too small; `n` is the **minimum total bytes** needed
///   (not the additional bytes needed). Caller should accumulate more data and retry.
/// - `Invalid(e)` - protocol violation, the connection must be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    Complete(T),
    Incomplete(usize),
    Invalid(ProtoError),
}
