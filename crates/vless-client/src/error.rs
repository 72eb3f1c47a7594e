//! Client error types.

use vless_core::errors::{
    ERROR_ANCHOR, ERROR_CONFIG, ERROR_DESTINATION, ERROR_IO, ERROR_MUX, ERROR_PROTOCOL,
    ERROR_TIMEOUT, ERROR_TLS_HANDSHAKE,
};
use vless_proto::{Address, ProtoError, WriteError};
use vless_transport::TransportError;

/// Errors that can occur in the VLESS outbound.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtoError),

    #[error("encode error: {0}")]
    Encode(#[from] WriteError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("config error: {0}")]
    Config(String),

    #[error("anchor error: {0}")]
    Anchor(#[from] AnchorError),

    /// Destination kind cannot be carried by the selected packet encoding.
    #[error("unsupported destination for packet-addr: {0}")]
    UnsupportedDestination(Address),

    #[error("mux error: {0}")]
    Mux(String),
}

/// Destination obfuscation failures, fatal to one dial attempt.
#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("encrypting destination: {0}")]
    Encrypt(#[from] rsa::Error),

    /// Relay passthrough mode without an upstream destination blob.
    #[error("missing anchor payload")]
    MissingPayload,
}

impl From<vless_config::ConfigError> for ClientError {
    fn from(e: vless_config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<vless_proto::ReadError> for ClientError {
    fn from(e: vless_proto::ReadError) -> Self {
        match e {
            vless_proto::ReadError::Io(e) => Self::Io(e),
            vless_proto::ReadError::Protocol(e) => Self::Protocol(e),
        }
    }
}

impl ClientError {
    /// Classification label attached to log events as `error_type`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => ERROR_TIMEOUT,
            Self::Io(_) => ERROR_IO,
            Self::Protocol(_) | Self::Encode(_) => ERROR_PROTOCOL,
            Self::Transport(TransportError::Tls(_)) => ERROR_TLS_HANDSHAKE,
            Self::Transport(TransportError::Io(e))
                if e.kind() == std::io::ErrorKind::TimedOut =>
            {
                ERROR_TIMEOUT
            }
            Self::Transport(TransportError::Config(_)) | Self::Config(_) => ERROR_CONFIG,
            Self::Transport(_) => ERROR_IO,
            Self::Anchor(_) => ERROR_ANCHOR,
            Self::UnsupportedDestination(_) => ERROR_DESTINATION,
            Self::Mux(_) => ERROR_MUX,
        }
    }
}
