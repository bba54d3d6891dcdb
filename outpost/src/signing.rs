//! DKIM signing of encoded messages.
//!
//! A message is encoded once per variant, signed, and the resulting
//! `DKIM-Signature` header is prepended to produce a [`RawMessage`] that can
//! be replayed to any number of hosts.

use std::{fmt, sync::Arc};

use mail_auth::{
    common::{
        crypto::{Ed25519Key, RsaKey, Sha256},
        headers::HeaderWriter,
    },
    dkim::{self, Canonicalization, Done},
};
use outpost_common::message::Mail;
use rustls_pki_types::{PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Headers covered by the signature, when present.
const SIGNED_HEADERS: [&str; 10] = [
    "From",
    "To",
    "Cc",
    "Subject",
    "Date",
    "Message-ID",
    "Reply-To",
    "In-Reply-To",
    "MIME-Version",
    "Content-Type",
];

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Invalid DKIM key: {0}")]
    InvalidKey(String),

    #[error("DKIM signing failed: {0}")]
    Sign(String),
}

/// Produces the signature header block for an encoded message.
pub trait MessageSigner: Send + Sync {
    /// Returns the complete header block, including its trailing CRLF.
    fn sign(&self, message: &[u8]) -> Result<String, SigningError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DkimAlgorithm {
    #[default]
    RsaSha256,
    Ed25519Sha256,
}

/// A private key usable for DKIM.
pub enum DkimKey {
    Rsa(RsaKey<Sha256>),
    Ed25519(Ed25519Key),
}

impl DkimKey {
    /// Loads a PEM encoded key.
    ///
    /// RSA keys may be PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`);
    /// Ed25519 keys must be PKCS#8.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] if the PEM or the key inside it
    /// cannot be read.
    pub fn from_pem(algorithm: DkimAlgorithm, pem: &str) -> Result<Self, SigningError> {
        let block = pem::parse(pem).map_err(|e| SigningError::InvalidKey(e.to_string()))?;

        match (algorithm, block.tag()) {
            (DkimAlgorithm::RsaSha256, "RSA PRIVATE KEY") => RsaKey::<Sha256>::from_key_der(
                PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(block.contents())),
            )
            .map(Self::Rsa)
            .map_err(|e| SigningError::InvalidKey(e.to_string())),
            (_, "PRIVATE KEY") => Self::from_pkcs8_der(algorithm, block.contents()),
            (_, tag) => Err(SigningError::InvalidKey(format!(
                "unsupported PEM block '{tag}' for {algorithm:?}"
            ))),
        }
    }

    /// Loads a PKCS#8 DER encoded key.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] if the key cannot be read.
    pub fn from_pkcs8_der(algorithm: DkimAlgorithm, der: &[u8]) -> Result<Self, SigningError> {
        match algorithm {
            DkimAlgorithm::RsaSha256 => {
                RsaKey::<Sha256>::from_key_der(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der)))
                    .map(Self::Rsa)
            }
            DkimAlgorithm::Ed25519Sha256 => Ed25519Key::from_pkcs8_der(der).map(Self::Ed25519),
        }
        .map_err(|e| SigningError::InvalidKey(e.to_string()))
    }

    #[must_use]
    pub const fn algorithm(&self) -> DkimAlgorithm {
        match self {
            Self::Rsa(_) => DkimAlgorithm::RsaSha256,
            Self::Ed25519(_) => DkimAlgorithm::Ed25519Sha256,
        }
    }
}

impl fmt::Debug for DkimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DkimKey").field(&self.algorithm()).finish()
    }
}

enum Inner {
    Rsa(dkim::DkimSigner<RsaKey<Sha256>, Done>),
    Ed25519(dkim::DkimSigner<Ed25519Key, Done>),
}

/// [`MessageSigner`] producing `DKIM-Signature` headers.
pub struct DkimSigner {
    domain: String,
    selector: String,
    inner: Inner,
}

impl DkimSigner {
    #[must_use]
    pub fn new(domain: impl Into<String>, selector: impl Into<String>, key: DkimKey) -> Self {
        let domain = domain.into();
        let selector = selector.into();

        let inner = match key {
            DkimKey::Rsa(key) => Inner::Rsa(
                dkim::DkimSigner::from_key(key)
                    .domain(domain.as_str())
                    .selector(selector.as_str())
                    .headers(SIGNED_HEADERS)
                    .header_canonicalization(Canonicalization::Relaxed)
                    .body_canonicalization(Canonicalization::Relaxed),
            ),
            DkimKey::Ed25519(key) => Inner::Ed25519(
                dkim::DkimSigner::from_key(key)
                    .domain(domain.as_str())
                    .selector(selector.as_str())
                    .headers(SIGNED_HEADERS)
                    .header_canonicalization(Canonicalization::Relaxed)
                    .body_canonicalization(Canonicalization::Relaxed),
            ),
        };

        Self {
            domain,
            selector,
            inner,
        }
    }
}

impl fmt::Debug for DkimSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkimSigner")
            .field("domain", &self.domain)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl MessageSigner for DkimSigner {
    fn sign(&self, message: &[u8]) -> Result<String, SigningError> {
        let signature = match &self.inner {
            Inner::Rsa(signer) => signer.sign(message),
            Inner::Ed25519(signer) => signer.sign(message),
        }
        .map_err(|e| SigningError::Sign(e.to_string()))?;

        Ok(signature.to_header())
    }
}

/// A signed, encoded message. Cloning shares the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct RawMessage(Arc<[u8]>);

impl RawMessage {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawMessage").field(&self.0.len()).finish()
    }
}

/// Encodes `mail` as it stands and prepends its signature.
///
/// # Errors
///
/// Propagates the signer's error.
pub fn sign_message(signer: &dyn MessageSigner, mail: &Mail) -> Result<RawMessage, SigningError> {
    let encoded = mail.encode();
    let signature = signer.sign(&encoded)?;

    let mut raw = Vec::with_capacity(signature.len() + encoded.len());
    raw.extend_from_slice(signature.as_bytes());
    raw.extend_from_slice(&encoded);

    Ok(RawMessage(raw.into()))
}
