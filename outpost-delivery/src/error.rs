//! Outcome of a failed delivery to one recipient.
//!
//! The three categories only describe what went wrong. Whatever the
//! category, delivery moves on to the recipient's next candidate.

use outpost_smtp::client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    #[error("System error: {0}")]
    System(#[from] SystemError),
}

#[derive(Debug, Error)]
pub enum PermanentError {
    /// The recipient has no usable domain part.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// RCPT TO was refused with a 5xx reply.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// MAIL FROM or the message content was refused with a 5xx reply.
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    #[error("TLS required: {0}")]
    TlsRequired(String),
}

#[derive(Debug, Error)]
pub enum TemporaryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Server busy: {0}")]
    ServerBusy(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),
}

#[derive(Debug, Error)]
pub enum SystemError {
    /// The message copy for this recipient could not be signed.
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// Classifies a rejected reply by its code: 5xx is permanent, anything
    /// else temporary. `permanent` builds the permanent variant.
    pub(crate) fn from_reply(
        code: u16,
        message: String,
        permanent: impl FnOnce(String) -> PermanentError,
    ) -> Self {
        if (500..600).contains(&code) {
            Self::Permanent(permanent(message))
        } else {
            Self::Temporary(TemporaryError::SmtpTemporary(message))
        }
    }
}

/// A broken connection or TLS session is temporary, a reply the client
/// cannot make sense of is a system error.
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Io(e) => TemporaryError::ConnectionFailed(format!("I/O error: {e}")).into(),
            ClientError::Closed => {
                TemporaryError::ConnectionFailed("Connection closed unexpectedly".to_string()).into()
            }
            ClientError::Tls(reason) => TemporaryError::TlsHandshakeFailed(reason).into(),
            ClientError::MalformedReply(reason) => {
                SystemError::Internal(format!("SMTP protocol parse error: {reason}")).into()
            }
            ClientError::NonUtf8Reply(e) => {
                SystemError::Internal(format!("SMTP reply not valid UTF-8: {e}")).into()
            }
        }
    }
}
