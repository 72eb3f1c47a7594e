//! # vless-rs
//!
//! A Rust client for the VLESS tunneling protocol, with destination
//! anchoring and selectable UDP encodings.
//!
//! ## Crates
//!
//! - [`vless_core`] - Default values and error labels
//! - [`vless_proto`] - Request/response codec and UDP framings
//! - [`vless_config`] - Configuration types and loading
//! - [`vless_transport`] - Plain TCP and TLS transports
//! - [`vless_client`] - Outbound dialer and CLI

pub use vless_client as client;
pub use vless_config as config;
pub use vless_core as core;
pub use vless_proto as proto;
pub use vless_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use vless_client::{
        ClientError, Connection, DialContext, Network, Outbound, PacketConn, load_client_config,
    };
    pub use vless_proto::Address;
}
