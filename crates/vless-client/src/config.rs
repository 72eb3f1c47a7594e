//! Outbound configuration.

use std::path::Path;

use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use serde::Deserialize;
use vless_config::{LoggingConfig, TcpConfig, load_config};
use vless_proto::Address;
use vless_transport::{ClientTlsConfig, split_host_port};

use crate::anchor::DestinationObfuscator;
use crate::error::ClientError;
use crate::negotiate::PacketEncoding;

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// VLESS outbound settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboundConfig {
    /// VLESS server address, e.g. "vless.example.com:443".
    pub server: String,

    /// User UUID.
    pub uuid: String,

    /// Flow tag; empty means none.
    #[serde(default)]
    pub flow: String,

    /// UDP encoding. Absent selects xudp, an empty string plain packets.
    #[serde(default)]
    pub packet_encoding: Option<String>,

    /// TLS configuration. Absent means plain TCP.
    #[serde(default)]
    pub tls: Option<ClientTlsConfig>,

    /// TCP socket options.
    #[serde(default)]
    pub tcp: TcpConfig,

    #[serde(default)]
    pub anchor: AnchorOptions,
}

/// Destination anchoring options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnchorOptions {
    #[serde(default)]
    pub enabled: bool,
    /// Forward an upstream blob instead of encrypting locally.
    #[serde(default)]
    pub proxy: bool,
    /// Base64 body of an RSA public key (SubjectPublicKeyInfo).
    pub key: Option<String>,
    /// PEM file holding the RSA public key. Used when `key` is unset.
    pub path_to_key: Option<String>,
    /// Relay host dialed in client-encrypt mode.
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl OutboundConfig {
    pub fn server_address(&self) -> Result<Address, ClientError> {
        parse_server(&self.server)
    }

    pub fn identity(&self) -> Result<[u8; 16], ClientError> {
        parse_uuid(&self.uuid)
    }

    pub fn packet_encoding(&self) -> Result<PacketEncoding, ClientError> {
        PacketEncoding::from_option(self.packet_encoding.as_deref())
    }
}

impl AnchorOptions {
    /// Builds the obfuscator, or `None` when anchoring is disabled.
    pub fn build(&self) -> Result<Option<DestinationObfuscator>, ClientError> {
        if !self.enabled {
            return Ok(None);
        }
        if self.proxy {
            return Ok(Some(DestinationObfuscator::relay_passthrough()));
        }

        let key = self.load_key()?;
        let relay = match (self.host.as_deref(), self.port) {
            (Some(host), Some(port)) if !host.is_empty() && port != 0 => {
                relay_address(host, port)
            }
            _ => {
                return Err(ClientError::Config(
                    "anchor: client-encrypt mode requires relay host and port".into(),
                ));
            }
        };
        Ok(Some(DestinationObfuscator::client_encrypt(key, relay)))
    }

    fn load_key(&self) -> Result<RsaPublicKey, ClientError> {
        let pem = match (self.key.as_deref(), self.path_to_key.as_deref()) {
            (Some(body), _) if !body.trim().is_empty() => armor_public_key(body),
            (_, Some(path)) if !path.is_empty() => std::fs::read_to_string(path)
                .map_err(|e| ClientError::Config(format!("anchor: failed to read key: {e}")))?,
            _ => {
                return Err(ClientError::Config(
                    "anchor: client-encrypt mode requires a public key".into(),
                ));
            }
        };
        parse_public_key(&pem)
    }
}

/// Wraps a bare base64 key body in `PUBLIC KEY` armor, 64 columns per line.
fn armor_public_key(body: &str) -> String {
    let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let mut pem = String::with_capacity(body.len() + body.len() / 64 + 64);
    pem.push_str("-----BEGIN PUBLIC KEY-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

/// Parses an RSA public key from SubjectPublicKeyInfo or PKCS#1 PEM.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, ClientError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| ClientError::Config(format!("anchor: invalid RSA public key: {e}")))
}

pub fn parse_uuid(s: &str) -> Result<[u8; 16], ClientError> {
    uuid::Uuid::parse_str(s)
        .map(|u| *u.as_bytes())
        .map_err(|e| ClientError::Config(format!("invalid uuid: {e}")))
}

fn parse_server(server: &str) -> Result<Address, ClientError> {
    let (host, port) = split_host_port(server)
        .ok_or_else(|| ClientError::Config(format!("invalid server address: {server}")))?;
    Ok(relay_address(host, port))
}

fn relay_address(host: &str, port: u16) -> Address {
    match host.parse() {
        Ok(ip) => Address::from(std::net::SocketAddr::new(ip, port)),
        Err(_) => Address::domain(host, port),
    }
}

/// Load client configuration from a file path.
///
/// Supports TOML, JSON, and JSONC formats (detected by extension).
pub fn load_client_config(path: &Path) -> Result<ClientConfig, ClientError> {
    Ok(load_config(path)?)
}
