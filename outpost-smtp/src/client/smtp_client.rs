//! A single ESMTP connection, plain or upgraded with STARTTLS.

use std::sync::Arc;

use outpost_common::{incoming, internal, outgoing};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Replies longer than this are treated as malformed.
const MAX_REPLY_SIZE: usize = 1024 * 1024;

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    fn io(&mut self) -> &mut dyn Stream {
        match self {
            Self::Plain(stream) => stream,
            Self::Tls(stream) => stream.as_mut(),
        }
    }
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    if ignored > 0 || !native.errors.is_empty() {
        internal!(
            level = WARN,
            added,
            ignored,
            errors = native.errors.len(),
            "Some native root certificates were unusable"
        );
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Client side of one SMTP conversation.
///
/// Each command method returns the server's [`Response`] whatever its code;
/// only transport and parse failures are errors.
pub struct SmtpClient {
    transport: Option<Transport>,
    /// Bytes received but not yet parsed into a reply.
    pending: Vec<u8>,
    server_domain: String,
}

impl SmtpClient {
    /// Connects to `addr` (`host:port`).
    ///
    /// `server_domain` is the name the server's certificate is checked against
    /// after STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the TCP connection cannot be made.
    pub async fn connect(addr: &str, server_domain: String) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            transport: Some(Transport::Plain(stream)),
            pending: Vec::with_capacity(512),
            server_domain,
        })
    }

    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.transport, Some(Transport::Tls(_)))
    }

    /// Reads the 220 banner.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends one command line and reads the reply.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.write(format!("{command}\r\n").as_bytes()).await?;
        self.read_response().await
    }

    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content followed by the end-of-data marker.
    ///
    /// Lines starting with `.` are dot-stuffed (RFC 5321 section 4.5.2) and a
    /// missing final CRLF is added before the terminating `.`.
    pub async fn send_data(&mut self, data: &[u8]) -> Result<Response> {
        outgoing!(bytes = data.len(), "<message data>");
        self.write(&dot_stuff(data)).await?;
        self.read_response().await
    }

    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Sends STARTTLS and performs the handshake if the server answers 2xx.
    ///
    /// A refusal is returned as the response. Unparsed bytes received before
    /// the handshake are discarded (RFC 3207 section 4.2).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Tls`] if the handshake fails. The connection is
    /// unusable afterwards.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;
        if !response.is_success() {
            return Ok(response);
        }

        let stream = match self.transport.take() {
            Some(Transport::Plain(stream)) => stream,
            Some(tls @ Transport::Tls(_)) => {
                self.transport = Some(tls);
                return Err(ClientError::Tls("Connection is already TLS".to_string()));
            }
            None => return Err(ClientError::Closed),
        };

        let server_name = ServerName::try_from(self.server_domain.clone())
            .map_err(|e| ClientError::Tls(format!("Invalid server name: {e}")))?;
        let upgraded = tls_connector()
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::Tls(e.to_string()))?;

        self.transport = Some(Transport::Tls(Box::new(upgraded)));
        self.pending.clear();
        Ok(response)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let io = self.transport.as_mut().ok_or(ClientError::Closed)?.io();
        io.write_all(bytes).await?;
        io.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Response> {
        let Self {
            transport, pending, ..
        } = self;

        loop {
            if let Some((response, consumed)) = Response::parse_response(pending)? {
                pending.drain(..consumed);
                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if pending.len() > MAX_REPLY_SIZE {
                return Err(ClientError::MalformedReply(format!(
                    "Reply exceeds {MAX_REPLY_SIZE} bytes"
                )));
            }

            let io = transport.as_mut().ok_or(ClientError::Closed)?.io();
            if io.read_buf(pending).await? == 0 {
                return Err(ClientError::Closed);
            }
        }
    }
}

/// Applies dot-stuffing and appends the `.` terminator.
fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    let mut at_line_start = true;

    for &byte in data {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }

    if !out.ends_with(b"\r\n") {
        if out.ends_with(b"\n") {
            out.pop();
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
