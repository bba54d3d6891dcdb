//! The long-lived dispatch service.

use std::sync::Arc;

use outpost_common::{address::Mailbox, internal, message::Mail};
use outpost_delivery::{
    BccPolicy, DeliveryConfig, DeliveryError, DnsResolver, Envelope, MxLookup, SmtpSubmitter,
    Submitter, SystemError, deliver,
};
use tracing::{info, warn};

use crate::{
    classify::classify,
    error::{SendError, ServiceError},
    message_id::MessageIdGenerator,
    report::DeliveryReport,
    signing::{DkimKey, DkimSigner, MessageSigner, RawMessage, SigningError, sign_message},
};

/// Signs and dispatches messages on behalf of one sending domain.
///
/// A `Service` is meant to be built once and shared between tasks. Each
/// [`send`](Self::send) call is independent; the only state shared between
/// calls is the Message-ID counter.
pub struct Service {
    domain: String,
    signer: Arc<dyn MessageSigner>,
    message_ids: MessageIdGenerator,
    resolver: Arc<dyn MxLookup>,
    submitter: Arc<dyn Submitter>,
    config: DeliveryConfig,
}

impl Service {
    /// Builds a service with the production DNS resolver, SMTP submitter and
    /// DKIM signer, using the default [`DeliveryConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Resolver`] if the system resolver configuration
    /// cannot be read.
    pub fn new(
        domain: impl Into<String>,
        selector: impl Into<String>,
        key: DkimKey,
    ) -> Result<Self, ServiceError> {
        Self::builder(domain, selector).key(key).build()
    }

    #[must_use]
    pub fn builder(domain: impl Into<String>, selector: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            domain: domain.into(),
            selector: selector.into(),
            signer: None,
            key: None,
            resolver: None,
            submitter: None,
            config: DeliveryConfig::default(),
        }
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub const fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Signs `mail` and delivers it to every `To`, `Cc` and `Bcc` recipient.
    ///
    /// A fresh Message-ID is injected, and a `Date` header if none is set.
    /// Visible recipients share one signed copy. Each blind recipient gets a
    /// copy of its own, signed separately, so no copy ever reveals another
    /// blind recipient. `mail` is left without a `Bcc` header.
    ///
    /// Per-recipient failures are recorded in the report; a report with
    /// failures is still `Ok`.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] if the sender is invalid or there is nobody
    /// to send to. Nothing is sent in that case.
    #[tracing::instrument(level = "info", skip_all, fields(domain = %self.domain))]
    pub async fn send(&self, mail: &mut Mail) -> Result<DeliveryReport, SendError> {
        let message_id = self.message_ids.generate();
        internal!(level = DEBUG, message_id = %message_id, "Allocated Message-ID");
        mail.message_id = Some(message_id.into_bytes());

        let classified = classify(mail)?;
        let sender = classified.sender.address();

        if mail.header("Date").is_none() {
            mail.set_header("Date", chrono::Utc::now().to_rfc2822());
        }
        mail.bcc = None;

        let mut report = DeliveryReport::with_capacity(classified.recipient_count());

        if !classified.visible.is_empty() {
            match sign_message(self.signer.as_ref(), mail) {
                Ok(raw) => {
                    for recipient in &classified.visible {
                        let address = recipient.address();
                        let outcome = self.deliver_to(&sender, &address, &raw).await;
                        report.push(address, outcome);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Failed to sign message for visible recipients");
                    for recipient in &classified.visible {
                        report.push(recipient.address(), Err(signing_failure(&err)));
                    }
                }
            }
        }

        for recipient in &classified.blind {
            let address = recipient.address();
            let outcome = match self.sign_blind_copy(mail, recipient) {
                Ok(raw) => self.deliver_to(&sender, &address, &raw).await,
                Err(err) => {
                    warn!(recipient = %address, error = %err, "Failed to sign blind copy");
                    Err(signing_failure(&err))
                }
            };
            report.push(address, outcome);
        }

        info!(
            recipients = report.len(),
            failed = report.failures().count(),
            "Send complete"
        );
        Ok(report)
    }

    fn sign_blind_copy(&self, mail: &mut Mail, recipient: &Mailbox) -> Result<RawMessage, SigningError> {
        mail.bcc = match self.config.bcc {
            BccPolicy::Individual => Some(recipient.to_header_value().into_bytes()),
            BccPolicy::Omit => None,
        };
        let signed = sign_message(self.signer.as_ref(), mail);
        mail.bcc = None;
        signed
    }

    async fn deliver_to(
        &self,
        sender: &str,
        recipient: &str,
        raw: &RawMessage,
    ) -> Result<(), DeliveryError> {
        let envelope = Envelope {
            helo_domain: &self.domain,
            sender,
            recipient,
            message: raw.as_bytes(),
        };

        deliver(
            self.resolver.as_ref(),
            self.submitter.as_ref(),
            &self.config,
            envelope,
        )
        .await
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("domain", &self.domain)
            .field("message_ids", &self.message_ids)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn signing_failure(err: &SigningError) -> DeliveryError {
    SystemError::Signing(err.to_string()).into()
}

/// Assembles a [`Service`] with custom collaborators.
///
/// Anything not supplied falls back to the production implementation.
/// Either a [`signer`](Self::signer) or a [`key`](Self::key) is required.
pub struct ServiceBuilder {
    domain: String,
    selector: String,
    signer: Option<Arc<dyn MessageSigner>>,
    key: Option<DkimKey>,
    resolver: Option<Arc<dyn MxLookup>>,
    submitter: Option<Arc<dyn Submitter>>,
    config: DeliveryConfig,
}

impl ServiceBuilder {
    #[must_use]
    pub fn signer(mut self, signer: Arc<dyn MessageSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn key(mut self, key: DkimKey) -> Self {
        self.key = Some(key);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn MxLookup>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn submitter(mut self, submitter: Arc<dyn Submitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    #[must_use]
    pub fn config(mut self, config: DeliveryConfig) -> Self {
        self.config = config;
        self
    }

    /// # Errors
    ///
    /// [`ServiceError::MissingSigner`] if neither a signer nor a key was
    /// given, or [`ServiceError::Resolver`] if the default resolver cannot be
    /// created.
    pub fn build(self) -> Result<Service, ServiceError> {
        let Self {
            domain,
            selector,
            signer,
            key,
            resolver,
            submitter,
            config,
        } = self;

        let signer: Arc<dyn MessageSigner> = match (signer, key) {
            (Some(signer), _) => signer,
            (None, Some(key)) => Arc::new(DkimSigner::new(domain.as_str(), selector, key)),
            (None, None) => return Err(ServiceError::MissingSigner),
        };

        let resolver: Arc<dyn MxLookup> = match resolver {
            Some(resolver) => resolver,
            None => Arc::new(DnsResolver::new(config.mx_lookup_timeout())?),
        };

        let submitter = submitter.unwrap_or_else(|| {
            Arc::new(SmtpSubmitter::new(config.tls, config.timeouts.clone()))
        });

        Ok(Service {
            message_ids: MessageIdGenerator::new(domain.as_str()),
            domain,
            signer,
            resolver,
            submitter,
            config,
        })
    }
}
