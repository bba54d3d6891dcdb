use outpost_delivery::DnsError;
use thiserror::Error;

use crate::signing::SigningError;

/// A send call that was rejected before any delivery was attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// `From` is missing or is not exactly one valid mailbox.
    #[error("Invalid From header: {0}")]
    InvalidFrom(String),

    /// `To`, `Cc` and `Bcc` together name nobody.
    #[error("Message has no recipients")]
    NoRecipients,
}

/// Errors constructing a [`Service`](crate::Service).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to initialise DNS resolver: {0}")]
    Resolver(#[from] DnsError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("No DKIM signer or key configured")]
    MissingSigner,
}
