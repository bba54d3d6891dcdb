//! The outbound message model.
//!
//! The headers the dispatcher acts on (`From`, `To`, `Cc`, `Bcc`,
//! `Message-ID`, `Subject`) are explicit fields. Everything else lives in an
//! ordered extension list. All header names are matched case-insensitively,
//! so a `Mail` never carries two headers with the same name.

use std::fmt::{self, Display};

use mailparse::MailParseError;

pub const CRLF: &[u8] = b"\r\n";

/// Header names with a dedicated field on [`Mail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedHeader {
    From,
    To,
    Cc,
    Bcc,
    MessageId,
    Subject,
}

impl ReservedHeader {
    /// Encoding order of the reserved headers.
    pub const ALL: [Self; 6] = [
        Self::From,
        Self::To,
        Self::Cc,
        Self::Bcc,
        Self::MessageId,
        Self::Subject,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::From => "From",
            Self::To => "To",
            Self::Cc => "Cc",
            Self::Bcc => "Bcc",
            Self::MessageId => "Message-ID",
            Self::Subject => "Subject",
        }
    }

    /// Case-insensitive lookup of a reserved header by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|header| header.as_str().eq_ignore_ascii_case(name))
    }
}

impl Display for ReservedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outbound message: raw header values and a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mail {
    pub from: Option<Vec<u8>>,
    pub to: Option<Vec<u8>>,
    pub cc: Option<Vec<u8>>,
    pub bcc: Option<Vec<u8>>,
    pub message_id: Option<Vec<u8>>,
    pub subject: Option<Vec<u8>>,
    /// Non-reserved headers, in insertion order.
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl Mail {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.set_header(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub const fn reserved(&self, header: ReservedHeader) -> Option<&Vec<u8>> {
        match header {
            ReservedHeader::From => self.from.as_ref(),
            ReservedHeader::To => self.to.as_ref(),
            ReservedHeader::Cc => self.cc.as_ref(),
            ReservedHeader::Bcc => self.bcc.as_ref(),
            ReservedHeader::MessageId => self.message_id.as_ref(),
            ReservedHeader::Subject => self.subject.as_ref(),
        }
    }

    pub const fn reserved_mut(&mut self, header: ReservedHeader) -> &mut Option<Vec<u8>> {
        match header {
            ReservedHeader::From => &mut self.from,
            ReservedHeader::To => &mut self.to,
            ReservedHeader::Cc => &mut self.cc,
            ReservedHeader::Bcc => &mut self.bcc,
            ReservedHeader::MessageId => &mut self.message_id,
            ReservedHeader::Subject => &mut self.subject,
        }
    }

    /// Returns the raw value of a header, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        if let Some(reserved) = ReservedHeader::from_name(name) {
            return self.reserved(reserved).map(Vec::as_slice);
        }

        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name.trim()))
            .map(|(_, value)| value.as_slice())
    }

    /// Sets a header, replacing any existing header with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        let name = name.into();
        let value = value.into();

        if let Some(reserved) = ReservedHeader::from_name(&name) {
            *self.reserved_mut(reserved) = Some(value);
            return;
        }

        let name = name.trim().to_string();
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Removes a header, returning its previous value.
    pub fn remove_header(&mut self, name: &str) -> Option<Vec<u8>> {
        if let Some(reserved) = ReservedHeader::from_name(name) {
            return self.reserved_mut(reserved).take();
        }

        let index = self
            .headers
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name.trim()))?;
        Some(self.headers.remove(index).1)
    }

    /// Iterates over every header present, reserved ones first.
    pub fn iter_headers(&self) -> impl Iterator<Item = (&str, &[u8])> {
        ReservedHeader::ALL
            .into_iter()
            .filter_map(|header| {
                self.reserved(header)
                    .map(|value| (header.as_str(), value.as_slice()))
            })
            .chain(
                self.headers
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_slice())),
            )
    }

    /// Encodes the message for the wire.
    ///
    /// Each header becomes a `Name: value` line terminated by CRLF, followed
    /// by a blank line, the body with line endings normalised to CRLF, and a
    /// trailing CRLF.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.body.len() + 512);

        for (name, value) in self.iter_headers() {
            buffer.extend_from_slice(name.as_bytes());
            buffer.extend_from_slice(b": ");
            buffer.extend_from_slice(value);
            buffer.extend_from_slice(CRLF);
        }

        buffer.extend_from_slice(CRLF);
        normalise_line_endings(&self.body, &mut buffer);
        buffer.extend_from_slice(CRLF);
        buffer
    }

    /// Builds a `Mail` from an RFC 5322 message, keeping raw header values
    /// and the body bytes untouched.
    ///
    /// # Errors
    ///
    /// Returns the `mailparse` error if the header block cannot be parsed.
    pub fn from_rfc5322(raw: &[u8]) -> Result<Self, MailParseError> {
        let (headers, body_offset) = mailparse::parse_headers(raw)?;
        let mut mail = Self::new();

        for header in &headers {
            mail.set_header(header.get_key(), header.get_value_raw().to_vec());
        }
        mail.body = raw.get(body_offset..).unwrap_or_default().to_vec();

        Ok(mail)
    }
}

/// Copies `body` into `out`, turning bare LF and bare CR into CRLF.
fn normalise_line_endings(body: &[u8], out: &mut Vec<u8>) {
    let mut bytes = body.iter().copied().peekable();

    while let Some(byte) = bytes.next() {
        match byte {
            b'\r' => {
                out.extend_from_slice(CRLF);
                if bytes.peek() == Some(&b'\n') {
                    bytes.next();
                }
            }
            b'\n' => out.extend_from_slice(CRLF),
            _ => out.push(byte),
        }
    }
}
