//! Splits a message's address headers into sender and recipient groups.

use outpost_common::{
    address::{self, Mailbox},
    message::{Mail, ReservedHeader},
};
use tracing::debug;

use crate::error::SendError;

/// The parties of one send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub sender: Mailbox,
    /// `To` followed by `Cc`, order and duplicates preserved.
    pub visible: Vec<Mailbox>,
    pub blind: Vec<Mailbox>,
}

impl Classified {
    /// Number of report entries a send will produce.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.visible.len() + self.blind.len()
    }
}

/// Classifies the address headers of `mail`.
///
/// A missing or unparsable `To`, `Cc` or `Bcc` header counts as empty.
///
/// # Errors
///
/// [`SendError::InvalidFrom`] if `From` is not exactly one mailbox and
/// [`SendError::NoRecipients`] if nobody would receive the message.
pub fn classify(mail: &Mail) -> Result<Classified, SendError> {
    let from = mail
        .reserved(ReservedHeader::From)
        .ok_or_else(|| SendError::InvalidFrom("missing From header".to_string()))?;
    let sender = address::parse_single(from).map_err(|e| SendError::InvalidFrom(e.to_string()))?;

    let mut visible = recipients(mail, ReservedHeader::To);
    visible.extend(recipients(mail, ReservedHeader::Cc));
    let blind = recipients(mail, ReservedHeader::Bcc);

    if visible.is_empty() && blind.is_empty() {
        return Err(SendError::NoRecipients);
    }

    Ok(Classified {
        sender,
        visible,
        blind,
    })
}

fn recipients(mail: &Mail, header: ReservedHeader) -> Vec<Mailbox> {
    let Some(raw) = mail.reserved(header) else {
        return Vec::new();
    };

    address::parse_list(raw).unwrap_or_else(|e| {
        debug!(header = %header, error = %e, "Ignoring unparsable address header");
        Vec::new()
    })
}
