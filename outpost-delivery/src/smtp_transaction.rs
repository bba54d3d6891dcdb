//! SMTP transaction execution
//!
//! One transaction delivers one signed message to one recipient through one
//! candidate host:
//! - TLS negotiation via STARTTLS, according to the [`TlsPolicy`]
//! - MAIL FROM
//! - a single RCPT TO
//! - DATA and the dot-stuffed message content
//! - QUIT for connection cleanup

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use outpost_common::internal;
use outpost_smtp::client::{self, SmtpClient};

use crate::{
    SmtpTimeouts, TlsPolicy,
    attempt::{Submission, Submitter},
    error::{DeliveryError, PermanentError, TemporaryError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsNegotiationOutcome {
    /// TLS was successfully negotiated via STARTTLS
    Success,
    /// TLS was not attempted
    Skipped,
    /// Opportunistic STARTTLS failed; reconnect in plaintext per RFC 3207
    RetryWithoutTls,
}

/// Awaits one client operation under a deadline.
async fn timed<T>(
    secs: u64,
    what: &str,
    operation: impl Future<Output = client::Result<T>>,
) -> Result<T, DeliveryError> {
    let limit = Duration::from_secs(secs);
    Ok(tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| TemporaryError::Timeout(format!("{what} timed out after {limit:?}")))??)
}

/// A single SMTP conversation for one recipient.
pub struct SmtpTransaction<'a> {
    submission: Submission<'a>,
    tls: TlsPolicy,
    timeouts: &'a SmtpTimeouts,
}

impl<'a> SmtpTransaction<'a> {
    #[must_use]
    pub const fn new(submission: Submission<'a>, tls: TlsPolicy, timeouts: &'a SmtpTimeouts) -> Self {
        Self {
            submission,
            tls,
            timeouts,
        }
    }

    /// Execute the complete SMTP transaction
    ///
    /// 1. Connects to the candidate and reads the greeting
    /// 2. Performs EHLO and, depending on the TLS policy, STARTTLS
    /// 3. If opportunistic STARTTLS fails, reconnects without TLS (RFC 3207)
    /// 4. Sends MAIL FROM, RCPT TO for the one recipient, DATA and the message
    /// 5. Sends QUIT
    ///
    /// # Errors
    /// Returns an error if any part of the SMTP transaction fails. A failed
    /// QUIT after the message was accepted is only logged.
    #[tracing::instrument(
        level = "info",
        skip(self),
        fields(server = %self.submission.candidate, recipient = self.submission.envelope.recipient)
    )]
    pub async fn execute(self) -> Result<(), DeliveryError> {
        let mut client = self.connect_and_greet().await?;

        if self.negotiate_tls(&mut client).await? == TlsNegotiationOutcome::RetryWithoutTls {
            tracing::info!("Reconnecting without STARTTLS per RFC 3207 Section 4.1");

            drop(client);
            client = self.connect_and_greet().await?;
            self.ehlo(&mut client, "EHLO").await?;
        }

        self.send_mail_from(&mut client).await?;
        self.send_rcpt_to(&mut client).await?;
        self.send_message_data(&mut client).await?;

        if let Err(e) = timed(self.timeouts.quit_secs, "QUIT", client.quit()).await {
            tracing::warn!(error = %e, "QUIT failed after successful delivery");
        }

        Ok(())
    }

    async fn connect_and_greet(&self) -> Result<SmtpClient, DeliveryError> {
        let candidate = self.submission.candidate;
        let address = candidate.address();

        let connect_timeout = Duration::from_secs(self.timeouts.connect_secs);
        let mut client = tokio::time::timeout(
            connect_timeout,
            SmtpClient::connect(&address, candidate.host.clone()),
        )
        .await
        .map_err(|_| {
            TemporaryError::Timeout(format!(
                "Connecting to {address} timed out after {connect_timeout:?}"
            ))
        })?
        .map_err(|e| TemporaryError::ConnectionFailed(format!("Failed to connect to {address}: {e}")))?;

        let greeting = timed(self.timeouts.connect_secs, "Greeting", client.read_greeting()).await?;
        if !greeting.is_success() {
            return Err(TemporaryError::ServerBusy(format!(
                "Server rejected connection: {} {}",
                greeting.code,
                greeting.message()
            ))
            .into());
        }

        Ok(client)
    }

    async fn ehlo(
        &self,
        client: &mut SmtpClient,
        what: &str,
    ) -> Result<client::Response, DeliveryError> {
        let response = timed(
            self.timeouts.ehlo_secs,
            what,
            client.ehlo(self.submission.envelope.helo_domain),
        )
        .await?;

        if !response.is_success() {
            return Err(TemporaryError::SmtpTemporary(format!(
                "Server rejected {what}: {} {}",
                response.code,
                response.message()
            ))
            .into());
        }

        Ok(response)
    }

    /// Sends EHLO and upgrades via STARTTLS as the policy allows.
    ///
    /// # Errors
    /// Returns an error if EHLO fails, or if TLS is required and cannot be
    /// negotiated.
    async fn negotiate_tls(
        &self,
        client: &mut SmtpClient,
    ) -> Result<TlsNegotiationOutcome, DeliveryError> {
        let ehlo_response = self.ehlo(client, "EHLO").await?;
        let require_tls = self.tls == TlsPolicy::Required;

        if self.tls == TlsPolicy::Disabled {
            return Ok(TlsNegotiationOutcome::Skipped);
        }

        if !ehlo_response.advertises("STARTTLS") {
            if require_tls {
                return Err(PermanentError::TlsRequired(
                    "Server does not advertise STARTTLS".to_string(),
                )
                .into());
            }
            return Ok(TlsNegotiationOutcome::Skipped);
        }

        let starttls_timeout = Duration::from_secs(self.timeouts.starttls_secs);
        let starttls_result = tokio::time::timeout(starttls_timeout, client.starttls())
            .await
            .map_err(|_| format!("STARTTLS timed out after {starttls_timeout:?}"))
            .and_then(|r| r.map_err(|e| format!("STARTTLS failed: {e}")))
            .and_then(|response| {
                if response.is_success() {
                    Ok(response)
                } else {
                    Err(format!(
                        "Server rejected STARTTLS: {} {}",
                        response.code,
                        response.message()
                    ))
                }
            });

        if let Err(error_msg) = starttls_result {
            if require_tls {
                return Err(PermanentError::TlsRequired(error_msg).into());
            }

            tracing::info!(
                error = %error_msg,
                "STARTTLS failed for opportunistic TLS, will retry without TLS"
            );
            return Ok(TlsNegotiationOutcome::RetryWithoutTls);
        }

        // RFC 3207: the session starts over after the upgrade
        self.ehlo(client, "EHLO after STARTTLS").await?;

        internal!(level = DEBUG, "TLS successfully negotiated via STARTTLS");
        Ok(TlsNegotiationOutcome::Success)
    }

    async fn send_mail_from(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let response = timed(
            self.timeouts.mail_from_secs,
            "MAIL FROM",
            client.mail_from(self.submission.envelope.sender),
        )
        .await?;

        if !response.is_success() {
            return Err(DeliveryError::from_reply(
                response.code,
                format!("Server rejected MAIL FROM: {} {}", response.code, response.message()),
                PermanentError::MessageRejected,
            ));
        }

        Ok(())
    }

    async fn send_rcpt_to(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let recipient = self.submission.envelope.recipient;
        let response = timed(
            self.timeouts.rcpt_to_secs,
            "RCPT TO",
            client.rcpt_to(recipient),
        )
        .await?;

        if !response.is_success() {
            return Err(DeliveryError::from_reply(
                response.code,
                format!(
                    "Server rejected RCPT TO {recipient}: {} {}",
                    response.code,
                    response.message()
                ),
                PermanentError::InvalidRecipient,
            ));
        }

        Ok(())
    }

    async fn send_message_data(&self, client: &mut SmtpClient) -> Result<(), DeliveryError> {
        let data_response = timed(self.timeouts.data_secs, "DATA command", client.data()).await?;

        if !data_response.is_intermediate() {
            return Err(DeliveryError::from_reply(
                data_response.code,
                format!(
                    "Server rejected DATA: {} {}",
                    data_response.code,
                    data_response.message()
                ),
                PermanentError::MessageRejected,
            ));
        }

        let send_response = timed(
            self.timeouts.data_secs,
            "Sending message data",
            client.send_data(self.submission.envelope.message),
        )
        .await?;

        if !send_response.is_success() {
            return Err(DeliveryError::from_reply(
                send_response.code,
                format!(
                    "Server rejected message data: {} {}",
                    send_response.code,
                    send_response.message()
                ),
                PermanentError::MessageRejected,
            ));
        }

        Ok(())
    }
}

/// [`Submitter`] speaking SMTP directly to the candidate host.
#[derive(Debug, Clone, Default)]
pub struct SmtpSubmitter {
    tls: TlsPolicy,
    timeouts: SmtpTimeouts,
}

impl SmtpSubmitter {
    #[must_use]
    pub const fn new(tls: TlsPolicy, timeouts: SmtpTimeouts) -> Self {
        Self { tls, timeouts }
    }
}

#[async_trait]
impl Submitter for SmtpSubmitter {
    async fn submit(&self, submission: Submission<'_>) -> Result<(), DeliveryError> {
        SmtpTransaction::new(submission, self.tls, &self.timeouts)
            .execute()
            .await
    }
}
