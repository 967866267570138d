//! Type-safe identifier newtypes for certmason.
//!
//! These types keep request correlation identifiers and secret handles from
//! being mixed up with the plain strings that flow through configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the relation and the request index in a correlation ID
const RELATION_SEPARATOR: char = '/';

/// Correlation ID linking an issued certificate back to its request.
///
/// Correlation IDs identify the requesting party. Requests that arrive over
/// a relation are tagged `<relation-id>/<index>` so that published results
/// can be routed back to the same relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Create the ID for the `index`-th request on a relation
    pub fn for_relation(relation_id: &str, index: usize) -> Self {
        Self(format!("{}{}{}", relation_id, RELATION_SEPARATOR, index))
    }

    /// The relation part of the ID.
    ///
    /// IDs that were not built with [`CorrelationId::for_relation`] are
    /// returned whole.
    pub fn relation(&self) -> &str {
        match self.0.rsplit_once(RELATION_SEPARATOR) {
            Some((relation, _)) => relation,
            None => &self.0,
        }
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque reference to a secret held by the host.
///
/// The core never interprets the reference; it only hands it back to the
/// host's secret store to be dereferenced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef(String);

impl SecretRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_for_relation() {
        let id = CorrelationId::for_relation("certificates:4", 2);
        assert_eq!(id.as_str(), "certificates:4/2");
        assert_eq!(id.relation(), "certificates:4");
    }

    #[test]
    fn test_correlation_id_without_index() {
        let id = CorrelationId::from_string("standalone");
        assert_eq!(id.relation(), "standalone");
        assert_eq!(id.to_string(), "standalone");
    }

    #[test]
    fn test_secret_ref() {
        let secret = SecretRef::new("secret:abc123");
        assert_eq!(secret.as_str(), "secret:abc123");
        assert!(!secret.is_empty());
        assert!(SecretRef::default().is_empty());
    }
}
