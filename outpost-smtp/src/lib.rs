//! Outbound SMTP client.
//!
//! Only the client half of the protocol lives here: outpost never accepts
//! mail, it only hands messages to the mail exchangers of each recipient.

pub mod client;
