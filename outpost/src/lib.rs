//! Direct-to-recipient mail dispatch.
//!
//! A [`Service`] signs a message with DKIM, resolves every recipient's mail
//! exchangers and hands the message to each of them in turn, one recipient
//! per SMTP conversation. The outcome of every recipient is collected in a
//! [`DeliveryReport`].
//!
//! ```no_run
//! # async fn run(key: outpost::DkimKey) -> Result<(), Box<dyn std::error::Error>> {
//! use outpost::{Mail, Service};
//!
//! let service = Service::new("example.com", "outpost", key)?;
//! let mut mail = Mail::new()
//!     .with_header("From", "Sender <sender@example.com>")
//!     .with_header("To", "someone@example.org")
//!     .with_header("Subject", "Hello")
//!     .with_body("Hi there");
//!
//! let report = service.send(&mut mail).await?;
//! for (recipient, outcome) in report.iter() {
//!     println!("{recipient}: {outcome:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
mod error;
pub mod message_id;
mod report;
mod service;
pub mod signing;

pub use classify::{Classified, classify};
pub use error::{SendError, ServiceError};
pub use message_id::MessageIdGenerator;
pub use outpost_common::message::Mail;
pub use report::DeliveryReport;
pub use service::{Service, ServiceBuilder};
pub use signing::{DkimAlgorithm, DkimKey, DkimSigner, MessageSigner, RawMessage, SigningError};
