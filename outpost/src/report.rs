//! Per-recipient outcomes of one send call.

use outpost_delivery::DeliveryError;

/// Ordered `(recipient, outcome)` entries.
///
/// Entries follow `To`, then `Cc`, then `Bcc`. A recipient listed twice has
/// two entries, so this is a list with map-like lookups rather than a map.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    entries: Vec<(String, Result<(), DeliveryError>)>,
}

impl DeliveryReport {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, recipient: impl Into<String>, outcome: Result<(), DeliveryError>) {
        self.entries.push((recipient.into(), outcome));
    }

    /// Outcome of the first entry for `recipient`.
    #[must_use]
    pub fn get(&self, recipient: &str) -> Option<&Result<(), DeliveryError>> {
        self.entries
            .iter()
            .find(|(address, _)| address == recipient)
            .map(|(_, outcome)| outcome)
    }

    #[must_use]
    pub fn contains(&self, recipient: &str) -> bool {
        self.entries.iter().any(|(address, _)| address == recipient)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<(), DeliveryError>)> {
        self.entries
            .iter()
            .map(|(address, outcome)| (address.as_str(), outcome))
    }

    /// Recipients in report order, duplicates included.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(address, _)| address.as_str())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DeliveryError)> {
        self.entries
            .iter()
            .filter_map(|(address, outcome)| outcome.as_ref().err().map(|e| (address.as_str(), e)))
    }

    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.entries.iter().all(|(_, outcome)| outcome.is_ok())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for DeliveryReport {
    type Item = (String, Result<(), DeliveryError>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use outpost_delivery::{PermanentError, TemporaryError};
    use pretty_assertions::assert_eq;

    use super::*;

    fn report() -> DeliveryReport {
        let mut report = DeliveryReport::new();
        report.push("a@x.com", Ok(()));
        report.push(
            "b@y.com",
            Err(TemporaryError::ConnectionFailed("mx.y.com:25".to_string()).into()),
        );
        report.push(
            "a@x.com",
            Err(PermanentError::InvalidRecipient("no".to_string()).into()),
        );
        report
    }

    #[test]
    fn test_duplicates_are_kept_in_order() {
        let report = report();
        assert_eq!(report.len(), 3);
        assert_eq!(
            report.recipients().collect::<Vec<_>>(),
            vec!["a@x.com", "b@y.com", "a@x.com"]
        );
        assert!(matches!(report.get("a@x.com"), Some(Ok(()))));
        assert!(report.contains("b@y.com"));
        assert!(!report.contains("c@z.com"));
    }

    #[test]
    fn test_failures() {
        let report = report();
        let failed: Vec<&str> = report.failures().map(|(address, _)| address).collect();
        assert_eq!(failed, vec!["b@y.com", "a@x.com"]);
        assert!(!report.is_complete_success());

        let mut clean = DeliveryReport::new();
        assert!(clean.is_empty());
        clean.push("a@x.com", Ok(()));
        assert!(clean.is_complete_success());
    }

    #[test]
    fn test_into_iter() {
        let outcomes: Vec<bool> = report().into_iter().map(|(_, o)| o.is_ok()).collect();
        assert_eq!(outcomes, vec![true, false, false]);
    }
}
