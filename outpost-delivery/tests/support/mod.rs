//! Shared helpers for delivery integration tests.

pub mod mock_server;

pub use mock_server::{MockSmtpServer, SmtpCommand};
