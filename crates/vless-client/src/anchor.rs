//! Destination anchoring.
//!
//! Separates the address a connection physically reaches from the
//! destination it is ultimately meant for. In client-encrypt mode the true
//! destination is RSA-encrypted (PKCS#1 v1.5) for a fixed relay, which is
//! both dialed and declared on the wire. In relay-passthrough mode the node
//! is a later hop of the chain: it connects straight to the destination the
//! upstream hop chose and forwards that hop's opaque blob unchanged.
//!
//! Every dial attempt computes its own [`ResolvedTarget`]; nothing here is
//! mutated after construction.

use bytes::Bytes;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use vless_proto::Address;

use crate::error::AnchorError;

/// Anchor operating mode, fixed at construction.
#[derive(Debug, Clone)]
pub enum AnchorMode {
    /// Encrypt the destination and dial the relay instead.
    ClientEncrypt { key: RsaPublicKey, relay: Address },
    /// Dial the destination itself, forwarding the upstream blob carried in
    /// the [`DialContext`].
    RelayPassthrough,
}

/// Per-attempt inputs supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct DialContext {
    anchor_payload: Option<Bytes>,
}

impl DialContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the opaque destination blob received from an upstream hop.
    pub fn with_anchor_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.anchor_payload = Some(payload.into());
        self
    }

    pub fn anchor_payload(&self) -> Option<&Bytes> {
        self.anchor_payload.as_ref()
    }
}

/// Where one dial attempt connects, what it declares and what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Address the transport connects to.
    pub dial_target: Address,
    /// Destination written into the request header.
    pub declared: Address,
    /// Destination the caller asked for.
    pub true_destination: Address,
    /// Value of the obfuscated-destination addon.
    pub obfuscated: Option<Bytes>,
}

impl ResolvedTarget {
    /// Target for a dial without anchoring: connect to the server, declare
    /// the caller's destination.
    pub fn direct(server: &Address, destination: &Address) -> Self {
        Self {
            dial_target: server.clone(),
            declared: destination.clone(),
            true_destination: destination.clone(),
            obfuscated: None,
        }
    }

    /// Whether the true destination is kept off the wire: the request
    /// declares a different address and datagrams must not name it either.
    pub fn hides_destination(&self) -> bool {
        self.declared != self.true_destination
    }
}

#[derive(Debug, Clone)]
pub struct DestinationObfuscator {
    mode: AnchorMode,
}

impl DestinationObfuscator {
    pub fn client_encrypt(key: RsaPublicKey, relay: Address) -> Self {
        Self {
            mode: AnchorMode::ClientEncrypt { key, relay },
        }
    }

    pub fn relay_passthrough() -> Self {
        Self {
            mode: AnchorMode::RelayPassthrough,
        }
    }

    pub fn mode(&self) -> &AnchorMode {
        &self.mode
    }

    /// Resolves one attempt. Neither mode dials the configured server:
    /// client-encrypt dials the relay, passthrough the destination itself.
    ///
    /// # Errors
    /// - `Encrypt` if the destination does not fit one RSA block.
    /// - `MissingPayload` in passthrough mode when the context carries no
    ///   (or an empty) blob.
    pub fn resolve(
        &self,
        destination: &Address,
        ctx: &DialContext,
    ) -> Result<ResolvedTarget, AnchorError> {
        match &self.mode {
            AnchorMode::ClientEncrypt { key, relay } => Ok(ResolvedTarget {
                dial_target: relay.clone(),
                declared: relay.clone(),
                true_destination: destination.clone(),
                obfuscated: Some(encrypt_destination(key, destination)?),
            }),
            AnchorMode::RelayPassthrough => {
                let payload = ctx
                    .anchor_payload()
                    .filter(|p| !p.is_empty())
                    .ok_or(AnchorError::MissingPayload)?;
                Ok(ResolvedTarget {
                    dial_target: destination.clone(),
                    declared: destination.clone(),
                    true_destination: destination.clone(),
                    obfuscated: Some(payload.clone()),
                })
            }
        }
    }
}

/// Encrypts the canonical `host:port` form of `destination`.
pub fn encrypt_destination(
    key: &RsaPublicKey,
    destination: &Address,
) -> Result<Bytes, AnchorError> {
    let plaintext = destination.to_string();
    let ciphertext = key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, plaintext.as_bytes())?;
    Ok(Bytes::from(ciphertext))
}
