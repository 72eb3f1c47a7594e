//! Error classification labels.
//!
//! Attached as the `error_type` field on log events so failures can be
//! grouped consistently across crates.

/// TLS handshake error.
pub const ERROR_TLS_HANDSHAKE: &str = "tls_handshake";
/// Wire protocol violation (bad version, unknown field tag, truncation).
pub const ERROR_PROTOCOL: &str = "protocol";
/// I/O error on the underlying stream.
pub const ERROR_IO: &str = "io";
/// Destination obfuscation failed.
pub const ERROR_ANCHOR: &str = "anchor";
/// Destination kind not supported by the selected encoding.
pub const ERROR_DESTINATION: &str = "destination";
/// Timeout error.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Configuration error.
pub const ERROR_CONFIG: &str = "config";
/// Multiplexed session error.
pub const ERROR_MUX: &str = "mux";
