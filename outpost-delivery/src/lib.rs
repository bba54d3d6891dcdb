//! Per-recipient delivery for outbound mail.
//!
//! This crate provides functionality to:
//! - Resolve the mail exchangers of a recipient domain, falling back to the
//!   domain itself when no MX record is usable
//! - Try an ordered list of host/port candidates until one accepts
//! - Run a single-recipient SMTP conversation against one candidate

mod attempt;
mod dns;
mod error;
mod smtp_transaction;
mod types;

pub use attempt::{
    Candidate, Envelope, Submission, Submitter, attempt_in_order, build_candidates, deliver,
};
pub use dns::{DnsError, DnsResolver, MailServer, MxLookup, resolve_candidates};
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use smtp_transaction::{SmtpSubmitter, SmtpTransaction};
pub use types::{BccPolicy, DeliveryConfig, SmtpTimeouts, TlsPolicy};
