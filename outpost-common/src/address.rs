//! RFC 5322 address handling for outbound headers.
//!
//! Header values are split into mailboxes by `mailparse`, which is lenient
//! about what it accepts as an address. Every bare address it returns is
//! therefore checked against the RFC 5321 mailbox grammar before it is
//! allowed anywhere near an SMTP envelope:
//!
//! ```text
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Dot-string     = Atom *("." Atom)
//! Domain         = sub-domain *("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//! address-literal = "[" ( IPv4-address-literal / IPv6-address-literal ) "]"
//! ```
//!
//! # Size Constraints
//!
//! - Maximum local-part: 64 octets
//! - Maximum domain: 255 octets

use std::{
    fmt::{self, Display},
    net::{Ipv4Addr, Ipv6Addr},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use mailparse::MailAddr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while parsing an address header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,

    #[error("Header is not valid UTF-8")]
    NotUtf8,

    #[error("Malformed address header: {0}")]
    Malformed(String),

    #[error("Expected exactly one mailbox, found {0}")]
    NotSingle(usize),

    #[error("Group syntax is not allowed here")]
    UnexpectedGroup,

    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,

    #[error("Local-part exceeds 64 octets")]
    LocalPartTooLong,

    #[error("Domain exceeds 255 octets")]
    DomainTooLong,

    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),
}

pub type Result<T> = std::result::Result<T, AddressError>;

/// A single mailbox from an address header: `local-part@domain` plus the
/// display name it was written with, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mailbox {
    pub display_name: Option<String>,
    pub local_part: String,
    pub domain: String,
}

impl Mailbox {
    /// Parses and validates a bare `local-part@domain` address.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] if the address does not match the mailbox grammar.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(AddressError::Empty);
        }

        let at = find_unquoted_at(address)?;
        let (local_part, domain) = (&address[..at], &address[at + 1..]);

        if local_part.len() > 64 {
            return Err(AddressError::LocalPartTooLong);
        }
        if domain.len() > 255 {
            return Err(AddressError::DomainTooLong);
        }

        validate_local_part(local_part)?;
        if domain.starts_with('[') {
            validate_address_literal(domain)?;
        } else {
            validate_domain(domain)?;
        }

        Ok(Self {
            display_name: None,
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name.filter(|name| !name.trim().is_empty());
        self
    }

    /// The bare address, as used in SMTP envelopes and report keys.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }

    /// Renders the mailbox the way it should appear in a header field.
    ///
    /// A display name made of atoms (which covers RFC 2047 encoded-words) is
    /// written as is, other ASCII names are quoted and non-ASCII names are
    /// written as `utf-8` encoded-words.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        self.display_name.as_deref().map_or_else(
            || self.address(),
            |name| format!("{} <{}>", encode_phrase(name), self.address()),
        )
    }
}

impl Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Parses a header that must name exactly one mailbox, such as `From`.
///
/// # Errors
///
/// Fails if the header is not UTF-8, cannot be parsed, names zero or several
/// mailboxes, uses group syntax, or the address fails grammar validation.
pub fn parse_single(raw: &[u8]) -> Result<Mailbox> {
    let mut list = parse_raw(raw)?;
    match list.len() {
        1 => match list.remove(0) {
            MailAddr::Single(info) => {
                Ok(Mailbox::parse(&info.addr)?.with_display_name(info.display_name))
            }
            MailAddr::Group(_) => Err(AddressError::UnexpectedGroup),
        },
        n => Err(AddressError::NotSingle(n)),
    }
}

/// Parses an address-list header such as `To`, `Cc` or `Bcc`.
///
/// Groups are flattened into their members. Order and duplicates are kept.
///
/// # Errors
///
/// Fails if any entry of the list is invalid; a list is accepted or rejected as a whole.
pub fn parse_list(raw: &[u8]) -> Result<Vec<Mailbox>> {
    let mut mailboxes = Vec::new();

    for entry in parse_raw(raw)? {
        match entry {
            MailAddr::Single(info) => {
                mailboxes.push(Mailbox::parse(&info.addr)?.with_display_name(info.display_name));
            }
            MailAddr::Group(group) => {
                for info in group.addrs {
                    mailboxes
                        .push(Mailbox::parse(&info.addr)?.with_display_name(info.display_name));
                }
            }
        }
    }

    Ok(mailboxes)
}

fn parse_raw(raw: &[u8]) -> Result<Vec<MailAddr>> {
    let text = std::str::from_utf8(raw).map_err(|_| AddressError::NotUtf8)?;
    if text.trim().is_empty() {
        return Err(AddressError::Empty);
    }

    mailparse::addrparse(text)
        .map(|list| list.to_vec())
        .map_err(|e| AddressError::Malformed(e.to_string()))
}

/// Returns the domain portion of a bare address, if it has a non-empty one.
#[must_use]
pub fn domain_of(address: &str) -> Option<&str> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim())
        .filter(|domain| !domain.is_empty())
}

/// Longest run of UTF-8 bytes per encoded-word; 45 bytes of base64 plus the
/// `=?utf-8?B?` and `?=` delimiters stays within the 75 character limit.
const ENCODED_WORD_BYTES: usize = 45;

fn encode_phrase(name: &str) -> String {
    if !name.is_ascii() {
        return encode_words(name);
    }

    let mut words = name.split_ascii_whitespace().peekable();
    if words.peek().is_some() && words.clone().all(|word| word.chars().all(is_atext)) {
        return words.collect::<Vec<_>>().join(" ");
    }

    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// RFC 2047 B-encoding, split on character boundaries.
fn encode_words(text: &str) -> String {
    let mut words = Vec::new();
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        if i + ch.len_utf8() - start > ENCODED_WORD_BYTES {
            words.push(&text[start..i]);
            start = i;
        }
    }
    words.push(&text[start..]);

    words
        .into_iter()
        .map(|chunk| format!("=?utf-8?B?{}?=", STANDARD.encode(chunk)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find the position of '@' that is not inside a quoted string or address literal
fn find_unquoted_at(input: &str) -> Result<usize> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut prev_was_backslash = false;

    for (i, ch) in input.char_indices() {
        if ch == '"' && !prev_was_backslash && !in_brackets {
            in_quotes = !in_quotes;
        } else if ch == '[' && !in_quotes {
            in_brackets = true;
        } else if ch == ']' && !in_quotes {
            in_brackets = false;
        } else if ch == '@' && !in_quotes && !in_brackets {
            return Ok(i);
        }

        prev_was_backslash = ch == '\\' && !prev_was_backslash;
    }

    Err(AddressError::MissingAtSign)
}

fn validate_local_part(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart("empty".to_string()));
    }

    if input.starts_with('"') {
        return validate_quoted_string(input);
    }

    if input.starts_with('.') || input.ends_with('.') || input.contains("..") {
        return Err(AddressError::InvalidLocalPart(format!(
            "misplaced '.' in {input}"
        )));
    }

    match input.chars().find(|&ch| ch != '.' && !is_atext(ch)) {
        Some(ch) => Err(AddressError::InvalidLocalPart(format!(
            "invalid character '{ch}'"
        ))),
        None => Ok(()),
    }
}

fn validate_quoted_string(input: &str) -> Result<()> {
    if input.len() < 2 || !input.ends_with('"') {
        return Err(AddressError::InvalidLocalPart(
            "unclosed quoted string".to_string(),
        ));
    }

    let mut chars = input[1..input.len() - 1].chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) if next.is_ascii_graphic() || next == ' ' => {}
                _ => {
                    return Err(AddressError::InvalidLocalPart(
                        "invalid quoted-pair".to_string(),
                    ));
                }
            }
        } else if !is_qtext_smtp(ch) {
            return Err(AddressError::InvalidLocalPart(format!(
                "invalid character '{ch}' in quoted string"
            )));
        }
    }

    Ok(())
}

fn validate_domain(input: &str) -> Result<()> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("empty".to_string()));
    }

    for label in input.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && label.starts_with(|c: char| c.is_ascii_alphanumeric())
            && label.ends_with(|c: char| c.is_ascii_alphanumeric())
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

        if !valid {
            return Err(AddressError::InvalidDomain(format!(
                "bad label '{label}' in {input}"
            )));
        }
    }

    Ok(())
}

fn validate_address_literal(input: &str) -> Result<()> {
    let inner = input
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| AddressError::InvalidAddressLiteral(input.to_string()))?;

    let valid = inner
        .strip_prefix("IPv6:")
        .map_or_else(|| inner.parse::<Ipv4Addr>().is_ok(), |v6| {
            v6.parse::<Ipv6Addr>().is_ok()
        });

    if valid {
        Ok(())
    } else {
        Err(AddressError::InvalidAddressLiteral(input.to_string()))
    }
}

/// atext per RFC 5322
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// qtextSMTP: %d32-33 / %d35-91 / %d93-126
const fn is_qtext_smtp(ch: char) -> bool {
    matches!(ch as u32, 32..=33 | 35..=91 | 93..=126)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_single_with_display_name() {
        let mailbox = parse_single(b"\"Your Domain\" <noreply@yourdomain.com>").unwrap();
        assert_eq!(mailbox.address(), "noreply@yourdomain.com");
        assert_eq!(mailbox.display_name.as_deref(), Some("Your Domain"));
    }

    #[test]
    fn test_parse_single_rejects_lists_and_garbage() {
        assert_eq!(
            parse_single(b"a@d.com, b@d.com"),
            Err(AddressError::NotSingle(2))
        );
        assert_eq!(parse_single(b""), Err(AddressError::Empty));
        assert!(parse_single(b"not-an-address").is_err());
        assert_eq!(parse_single(&[0xff, 0xfe]), Err(AddressError::NotUtf8));
    }

    #[test]
    fn test_parse_list_keeps_order_and_duplicates() {
        let list = parse_list(b"b@e.com, \"Carol\" <c@e.com>, b@e.com").unwrap();
        let addresses: Vec<_> = list.iter().map(Mailbox::address).collect();
        assert_eq!(addresses, vec!["b@e.com", "c@e.com", "b@e.com"]);
    }

    #[test]
    fn test_parse_list_flattens_groups() {
        let list = parse_list(b"friends: a@x.org, b@y.org;, c@z.org").unwrap();
        let addresses: Vec<_> = list.iter().map(Mailbox::address).collect();
        assert_eq!(addresses, vec!["a@x.org", "b@y.org", "c@z.org"]);
    }

    #[test]
    fn test_parse_list_rejects_whole_list_on_bad_entry() {
        assert!(parse_list(b"good@example.com, bad@@example.com").is_err());
    }

    #[test]
    fn test_mailbox_grammar() {
        assert!(Mailbox::parse("user.name+tag@sub.example.com").is_ok());
        assert!(Mailbox::parse("\"john doe\"@example.com").is_ok());
        assert!(Mailbox::parse("user@[192.168.1.1]").is_ok());
        assert!(Mailbox::parse("user@[IPv6:2001:db8::1]").is_ok());

        assert!(Mailbox::parse(".user@example.com").is_err());
        assert!(Mailbox::parse("us..er@example.com").is_err());
        assert!(Mailbox::parse("user@-example.com").is_err());
        assert!(Mailbox::parse("user@example..com").is_err());
        assert!(Mailbox::parse("user@").is_err());
        assert_eq!(
            Mailbox::parse(&format!("{}@example.com", "a".repeat(65))),
            Err(AddressError::LocalPartTooLong)
        );
    }

    #[test]
    fn test_header_value_rendering() {
        let bare = Mailbox::parse("x@y.com").unwrap();
        assert_eq!(bare.to_header_value(), "x@y.com");

        let named = |name: &str| {
            Mailbox::parse("x@y.com")
                .unwrap()
                .with_display_name(Some(name.to_string()))
                .to_header_value()
        };

        assert_eq!(named("Say \"hi\""), "\"Say \\\"hi\\\"\" <x@y.com>");
        assert_eq!(named("Smith, J."), "\"Smith, J.\" <x@y.com>");
        assert_eq!(named("Jane  Doe"), "Jane Doe <x@y.com>");
        assert_eq!(
            named("=?utf-8?q?Jos=C3=A9?="),
            "=?utf-8?q?Jos=C3=A9?= <x@y.com>"
        );
        assert_eq!(named("José"), "=?utf-8?B?Sm9zw6k=?= <x@y.com>");
    }

    #[test]
    fn test_long_non_ascii_names_are_split_into_encoded_words() {
        let name = "é".repeat(40);
        let mailbox = Mailbox::parse("x@y.com")
            .unwrap()
            .with_display_name(Some(name.clone()));
        let rendered = mailbox.to_header_value();
        let phrase = rendered.strip_suffix(" <x@y.com>").unwrap();

        let words: Vec<_> = phrase.split(' ').collect();
        assert_eq!(words.len(), 2);

        let mut decoded = Vec::new();
        for word in words {
            assert!(word.len() <= 75);
            let payload = word
                .strip_prefix("=?utf-8?B?")
                .and_then(|w| w.strip_suffix("?="))
                .unwrap();
            decoded.extend(STANDARD.decode(payload).unwrap());
        }
        assert_eq!(String::from_utf8(decoded).unwrap(), name);
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("user@example.com"), Some("example.com"));
        assert_eq!(domain_of("user@"), None);
        assert_eq!(domain_of("no-at-sign"), None);
    }
}
