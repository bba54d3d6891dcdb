//! DNS resolution for mail delivery.
//!
//! MX lookups are bounded by a deadline. A lookup that fails, times out or
//! returns no records is not an error: the recipient domain itself becomes
//! the single candidate host (the implicit MX of RFC 5321 section 5.1).

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::{
    TokioResolver,
    config::ResolverOpts,
    name_server::TokioConnectionProvider,
};
use outpost_common::address::domain_of;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{DeliveryError, PermanentError};

/// Errors that can occur during DNS resolution.
#[derive(Debug, Error)]
pub enum DnsError {
    /// DNS query failed due to network or resolver issues.
    #[error("DNS lookup failed: {0}")]
    LookupFailed(#[from] hickory_resolver::ResolveError),

    /// DNS query timed out.
    #[error("DNS query timed out for domain: {0}")]
    Timeout(String),
}

/// A mail exchanger for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailServer {
    /// The hostname or IP address of the mail server.
    pub host: String,
    /// MX preference (lower value = higher priority). 0 for the implicit MX.
    pub priority: u16,
}

impl MailServer {
    #[must_use]
    pub const fn new(host: String, priority: u16) -> Self {
        Self { host, priority }
    }
}

/// Source of MX records.
#[async_trait]
pub trait MxLookup: Send + Sync {
    /// Returns the MX records for `domain` in resolver order.
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MailServer>, DnsError>;
}

/// [`MxLookup`] backed by the system resolver configuration.
#[derive(Debug)]
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl DnsResolver {
    /// Creates a resolver from the system configuration (`/etc/resolv.conf`).
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new(timeout: Duration) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self { resolver })
    }
}

#[async_trait]
impl MxLookup for DnsResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MailServer>, DnsError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| MailServer::new(mx.exchange().to_utf8(), mx.preference()))
                .collect()),
            Err(err) if err.is_no_records_found() => Ok(Vec::new()),
            Err(err) => Err(DnsError::LookupFailed(err)),
        }
    }
}

/// Resolves the ordered candidate hosts for one recipient address.
///
/// Address literals (`user@[192.0.2.1]`) are used directly. Otherwise the
/// MX records of the domain are sorted by preference, keeping resolver order
/// among equal preferences, with trailing root dots removed.
///
/// # Errors
///
/// Returns [`PermanentError::InvalidAddress`] if the address has no
/// non-empty domain part. DNS failures never surface as errors.
pub async fn resolve_candidates(
    lookup: &dyn MxLookup,
    address: &str,
    timeout: Duration,
) -> Result<Vec<MailServer>, DeliveryError> {
    let domain = domain_of(address)
        .ok_or_else(|| PermanentError::InvalidAddress(address.to_string()))?;

    if let Some(literal) = address_literal(domain) {
        debug!(address, literal, "Using address literal as the only host");
        return Ok(vec![MailServer::new(literal.to_string(), 0)]);
    }

    let records = match tokio::time::timeout(timeout, lookup.lookup_mx(domain)).await {
        Ok(Ok(records)) => records,
        Ok(Err(err)) => {
            warn!(domain, error = %err, "MX lookup failed, falling back to the domain");
            Vec::new()
        }
        Err(_) => {
            warn!(domain, ?timeout, "MX lookup timed out, falling back to the domain");
            Vec::new()
        }
    };

    if records.is_empty() {
        debug!(domain, "No MX records, using the domain itself");
        return Ok(vec![MailServer::new(domain.to_string(), 0)]);
    }

    let mut servers: Vec<MailServer> = records
        .into_iter()
        .map(|server| {
            MailServer::new(
                server.host.trim_end_matches('.').to_string(),
                server.priority,
            )
        })
        .collect();
    servers.sort_by_key(|server| server.priority);

    debug!(domain, count = servers.len(), "Resolved MX records");
    Ok(servers)
}

/// Extracts the IP from `[192.0.2.1]` or `[IPv6:2001:db8::1]`.
fn address_literal(domain: &str) -> Option<&str> {
    let inner = domain.strip_prefix('[')?.strip_suffix(']')?;
    Some(
        inner
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("IPv6:"))
            .map_or(inner, |_| &inner[5..]),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct StaticLookup {
        records: Vec<MailServer>,
        fail: bool,
        delay: Option<Duration>,
        queried: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MxLookup for StaticLookup {
        async fn lookup_mx(&self, domain: &str) -> Result<Vec<MailServer>, DnsError> {
            self.queried.lock().push(domain.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(DnsError::Timeout(domain.to_string()));
            }
            Ok(self.records.clone())
        }
    }

    fn hosts(servers: &[MailServer]) -> Vec<&str> {
        servers.iter().map(|s| s.host.as_str()).collect()
    }

    #[tokio::test]
    async fn test_sorted_by_priority_stable() {
        let lookup = StaticLookup {
            records: vec![
                MailServer::new("mx3.example.com.".to_string(), 20),
                MailServer::new("mx1.example.com.".to_string(), 10),
                MailServer::new("mx2.example.com.".to_string(), 10),
            ],
            ..Default::default()
        };

        let servers = resolve_candidates(&lookup, "user@example.com", Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(
            hosts(&servers),
            vec!["mx1.example.com", "mx2.example.com", "mx3.example.com"]
        );
        assert_eq!(lookup.queried.lock().clone(), vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_zero_records_fall_back_to_domain() {
        let lookup = StaticLookup::default();
        let servers = resolve_candidates(&lookup, "user@example.com", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(servers, vec![MailServer::new("example.com".to_string(), 0)]);
    }

    #[tokio::test]
    async fn test_lookup_error_falls_back_to_domain() {
        let lookup = StaticLookup {
            fail: true,
            ..Default::default()
        };
        let servers = resolve_candidates(&lookup, "user@example.com", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(hosts(&servers), vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_domain() {
        let lookup = StaticLookup {
            records: vec![MailServer::new("mx.example.com".to_string(), 10)],
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let servers = resolve_candidates(&lookup, "user@example.com", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(hosts(&servers), vec!["example.com"]);
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let lookup = StaticLookup::default();
        for address in ["nodomain", "user@", "user@  "] {
            let result = resolve_candidates(&lookup, address, Duration::from_secs(1)).await;
            assert!(
                matches!(
                    result,
                    Err(DeliveryError::Permanent(PermanentError::InvalidAddress(_)))
                ),
                "{address}"
            );
        }
        assert!(lookup.queried.lock().is_empty());
    }

    #[tokio::test]
    async fn test_address_literal_skips_lookup() {
        let lookup = StaticLookup::default();

        let servers = resolve_candidates(&lookup, "user@[192.0.2.1]", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(hosts(&servers), vec!["192.0.2.1"]);

        let servers = resolve_candidates(&lookup, "user@[IPv6:2001:db8::1]", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(hosts(&servers), vec!["2001:db8::1"]);

        assert!(lookup.queried.lock().is_empty());
    }

    #[tokio::test]
    #[ignore = "Requires network access"]
    async fn test_system_resolver_gmail() {
        let resolver = DnsResolver::new(Duration::from_secs(5)).unwrap();
        let servers = resolve_candidates(&resolver, "someone@gmail.com", Duration::from_secs(8))
            .await
            .unwrap();
        assert!(!servers.is_empty());
        assert!(servers.iter().all(|s| !s.host.ends_with('.')));
    }
}
