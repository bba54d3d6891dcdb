use std::io;

use thiserror::Error;

/// Failures of a client conversation.
///
/// Replies are returned to the caller whatever their code, so every variant
/// means the conversation itself broke down.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed SMTP reply: {0}")]
    MalformedReply(String),

    #[error("SMTP reply not valid UTF-8: {0}")]
    NonUtf8Reply(#[from] std::str::Utf8Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Server closed the connection")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
