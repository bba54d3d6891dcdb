//! Ordered delivery attempts for a single recipient.
//!
//! A recipient's candidates are every resolved host crossed with every
//! configured port, hosts outermost. They are tried strictly in order and
//! the first success ends the loop. When all of them fail the recipient's
//! outcome is the *first* error seen.

use std::{fmt, future::Future, net::Ipv6Addr, time::Duration};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    DeliveryConfig,
    dns::{MailServer, MxLookup, resolve_candidates},
    error::{DeliveryError, SystemError, TemporaryError},
};

/// One `host:port` pair to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub host: String,
    pub port: u16,
}

impl Candidate {
    #[must_use]
    pub const fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    /// Socket address form, bracketing IPv6 literals.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

/// Crosses hosts with ports, hosts outermost.
#[must_use]
pub fn build_candidates(servers: &[MailServer], ports: &[u16]) -> Vec<Candidate> {
    servers
        .iter()
        .flat_map(|server| {
            ports
                .iter()
                .map(|&port| Candidate::new(server.host.clone(), port))
        })
        .collect()
}

/// What is sent to one recipient, independent of the host it is sent to.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'a> {
    /// Identity announced in EHLO.
    pub helo_domain: &'a str,
    /// Bare envelope sender.
    pub sender: &'a str,
    /// Bare envelope recipient. Exactly one per conversation.
    pub recipient: &'a str,
    /// The complete signed message, replayed from the start on every attempt.
    pub message: &'a [u8],
}

/// Everything a submitter needs for one conversation with one candidate.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub candidate: &'a Candidate,
    pub envelope: Envelope<'a>,
}

/// Hands one message for one recipient to one host.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, submission: Submission<'_>) -> Result<(), DeliveryError>;
}

/// Runs `attempt` over `candidates` in order until one succeeds.
///
/// # Errors
///
/// Returns the first error produced if every candidate fails, or a system
/// error if there are no candidates at all.
pub async fn attempt_in_order<'a, T, F, Fut>(
    candidates: &'a [T],
    mut attempt: F,
) -> Result<(), DeliveryError>
where
    F: FnMut(&'a T) -> Fut,
    Fut: Future<Output = Result<(), DeliveryError>>,
{
    let mut first_error = None;

    for candidate in candidates {
        match attempt(candidate).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    Err(first_error.unwrap_or_else(|| {
        SystemError::Internal("No delivery candidates".to_string()).into()
    }))
}

/// Resolves `recipient` and tries each of its candidates with `submitter`.
///
/// Each attempt is bounded by `timeouts.attempt_secs`.
///
/// # Errors
///
/// Returns the recipient's outcome: an invalid-address error, or the first
/// error of an exhausted candidate list.
pub async fn deliver(
    lookup: &dyn MxLookup,
    submitter: &dyn Submitter,
    config: &DeliveryConfig,
    envelope: Envelope<'_>,
) -> Result<(), DeliveryError> {
    let recipient = envelope.recipient;
    let servers = resolve_candidates(lookup, recipient, config.mx_lookup_timeout()).await?;
    let candidates = build_candidates(&servers, &config.ports);
    let attempt_timeout = Duration::from_secs(config.timeouts.attempt_secs);

    let outcome = attempt_in_order(&candidates, |candidate| async move {
        debug!(recipient, %candidate, "Attempting delivery");

        let submission = Submission {
            candidate,
            envelope,
        };
        let result = tokio::time::timeout(attempt_timeout, submitter.submit(submission))
            .await
            .unwrap_or_else(|_| {
                Err(TemporaryError::Timeout(format!(
                    "Delivery to {candidate} timed out after {attempt_timeout:?}"
                ))
                .into())
            });

        if let Err(err) = &result {
            warn!(recipient, %candidate, error = %err, "Delivery attempt failed");
        }
        result
    })
    .await;

    if outcome.is_ok() {
        info!(recipient, "Delivered");
    }
    outcome
}
