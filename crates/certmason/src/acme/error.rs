//! ACME error types

use thiserror::Error;

use crate::dns::DnsProviderError;

/// Errors that can occur while talking to the CA
#[derive(Debug, Error)]
pub enum AcmeError {
    /// The CA rejected account registration
    #[error("Failed to register ACME account: {0}")]
    Registration(String),

    /// Failed to create certificate order
    #[error("Failed to create certificate order: {0}")]
    OrderCreation(String),

    /// An authorization is in a state that cannot be solved
    #[error("Authorization for '{domain}' cannot be completed: {message}")]
    Authorization { domain: String, message: String },

    /// No DNS-01 challenge offered for a domain
    #[error("No DNS-01 challenge available for domain '{0}'")]
    NoDns01Challenge(String),

    /// The session has no DNS provider bound
    #[error("DNS-01 challenge requires a bound DNS provider")]
    NoDnsProvider,

    /// DNS provider operation failed
    #[error("DNS provider error: {0}")]
    DnsProvider(#[from] DnsProviderError),

    /// Challenge could not be marked ready
    #[error("Challenge validation failed for domain '{domain}': {message}")]
    ChallengeValidation { domain: String, message: String },

    /// The order reached the `invalid` state
    #[error("Order became invalid: {0}")]
    OrderInvalid(String),

    /// Certificate finalization failed
    #[error("Failed to finalize certificate: {0}")]
    Finalization(String),

    /// The CA's certificate chain could not be used
    #[error("Failed to parse certificate: {0}")]
    CertificateParse(String),

    /// ACME protocol error from instant-acme
    #[error("ACME protocol error: {0}")]
    Protocol(String),

    /// A bounded wait elapsed
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<instant_acme::Error> for AcmeError {
    fn from(e: instant_acme::Error) -> Self {
        AcmeError::Protocol(e.to_string())
    }
}

/// Why an inbound CSR could not be used
#[derive(Debug, Error)]
pub enum CsrError {
    /// Not PEM at all
    #[error("CSR is not valid PEM: {0}")]
    Pem(String),

    /// PEM block of the wrong kind
    #[error("expected a CERTIFICATE REQUEST PEM block, found '{tag}'")]
    UnexpectedBlock { tag: String },

    /// PEM payload is not a PKCS#10 request
    #[error("CSR DER could not be parsed: {0}")]
    Der(String),

    /// Neither a common name nor DNS subject alternative names
    #[error("CSR names no DNS identifiers")]
    NoIdentifiers,
}

/// Per-request issuance failure
///
/// Neither variant aborts the pass; the request is skipped.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("malformed CSR: {0}")]
    MalformedCsr(#[from] CsrError),

    #[error("certificate issuance failed: {cause}")]
    Issuance {
        #[source]
        cause: AcmeError,
    },
}

impl From<AcmeError> for IssueError {
    fn from(cause: AcmeError) -> Self {
        IssueError::Issuance { cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_error_messages() {
        let err = IssueError::from(CsrError::UnexpectedBlock {
            tag: "CERTIFICATE".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "malformed CSR: expected a CERTIFICATE REQUEST PEM block, found 'CERTIFICATE'"
        );

        let err = IssueError::from(AcmeError::Timeout("order never became ready".to_string()));
        assert_eq!(
            err.to_string(),
            "certificate issuance failed: Operation timed out: order never became ready"
        );
    }

    #[test]
    fn test_dns_error_converts() {
        let err: AcmeError = DnsProviderError::ZoneNotFound {
            domain: "example.org".to_string(),
        }
        .into();
        assert!(matches!(err, AcmeError::DnsProvider(_)));
    }
}
