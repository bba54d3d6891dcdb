//! SMTP client implementation for outbound delivery.
//!
//! Plain TCP with an optional STARTTLS upgrade. There is one method per
//! command and each returns the parsed [`Response`]; the caller decides
//! which codes count as failure.
//!
//! # Examples
//!
//! ```no_run
//! use outpost_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("mx.example.com:25", "mx.example.com".to_string()).await?;
//! client.read_greeting().await?;
//! client.ehlo("sender.example.org").await?;
//! client.mail_from("noreply@sender.example.org").await?;
//! client.rcpt_to("user@example.com").await?;
//! client.data().await?;
//! client.send_data(b"Subject: Test\r\n\r\nHello World\r\n").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
