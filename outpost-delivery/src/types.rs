//! Delivery configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// SMTP operation timeout configuration
///
/// Every command of a conversation has its own deadline, and the whole
/// conversation with one candidate is bounded by `attempt_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpTimeouts {
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for EHLO/HELO commands
    ///
    /// Default: 30 seconds
    #[serde(default = "default_ehlo_timeout")]
    pub ehlo_secs: u64,

    /// Timeout for STARTTLS command and TLS upgrade
    ///
    /// Default: 30 seconds
    #[serde(default = "default_starttls_timeout")]
    pub starttls_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "default_mail_from_timeout")]
    pub mail_from_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "default_rcpt_to_timeout")]
    pub rcpt_to_secs: u64,

    /// Timeout for DATA command and message transmission
    ///
    /// This is longer than other timeouts to accommodate large messages.
    /// Default: 120 seconds (2 minutes)
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// Default: 10 seconds
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,

    /// Upper bound for one complete conversation with one candidate
    ///
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            ehlo_secs: default_ehlo_timeout(),
            starttls_secs: default_starttls_timeout(),
            mail_from_secs: default_mail_from_timeout(),
            rcpt_to_secs: default_rcpt_to_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
            attempt_secs: default_attempt_timeout(),
        }
    }
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_ehlo_timeout() -> u64 {
    30
}

const fn default_starttls_timeout() -> u64 {
    30
}

const fn default_mail_from_timeout() -> u64 {
    30
}

const fn default_rcpt_to_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_quit_timeout() -> u64 {
    10
}

const fn default_attempt_timeout() -> u64 {
    300
}

/// TLS policy for SMTP connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Attempt TLS via STARTTLS when advertised, fall back to plaintext.
    ///
    /// Follows RFC 3207 Section 4.1: if STARTTLS fails, reconnect without TLS.
    #[default]
    Opportunistic,

    /// Require TLS via STARTTLS, fail the candidate if unavailable.
    Required,

    /// Never use TLS.
    ///
    /// **WARNING**: Only use for testing.
    Disabled,
}

/// How a blind recipient's own copy carries the `Bcc` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BccPolicy {
    /// The copy carries a `Bcc` header naming only that recipient.
    #[default]
    Individual,

    /// The copy carries no `Bcc` header at all.
    Omit,
}

/// Settings for resolving and contacting recipient mail exchangers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Ports tried on every host, in order.
    ///
    /// Default: `[587, 25]`
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// Deadline for one MX lookup. On expiry the domain itself is used.
    ///
    /// Default: 8 seconds
    #[serde(default = "default_mx_lookup_timeout")]
    pub mx_lookup_timeout_secs: u64,

    #[serde(default)]
    pub tls: TlsPolicy,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,

    #[serde(default)]
    pub bcc: BccPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            mx_lookup_timeout_secs: default_mx_lookup_timeout(),
            tls: TlsPolicy::default(),
            timeouts: SmtpTimeouts::default(),
            bcc: BccPolicy::default(),
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub const fn mx_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.mx_lookup_timeout_secs)
    }
}

fn default_ports() -> Vec<u16> {
    vec![587, 25]
}

const fn default_mx_lookup_timeout() -> u64 {
    8
}
