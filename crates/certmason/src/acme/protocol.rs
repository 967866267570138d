//! The ACME operations a reconciliation pass needs from a CA
//!
//! The production implementation wraps `instant-acme` (see
//! [`super::client::InstantAcmeDirectory`]); tests supply an in-process CA.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::AcmeError;

/// Registration result returned by the CA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Account URL assigned by the CA
    pub account_url: String,
}

/// Parameters for a new account
#[derive(Debug, Clone, Copy)]
pub struct NewAccountRequest<'a> {
    pub email: &'a str,
    pub directory_url: &'a str,
}

/// Entry point: a CA directory that can register accounts
#[async_trait]
pub trait AcmeDirectory: Send + Sync {
    /// Generate a fresh account key and register it, agreeing to the terms
    /// of service
    async fn register(&self, request: NewAccountRequest<'_>)
        -> Result<Box<dyn AcmeAccount>, AcmeError>;
}

/// A registered account
#[async_trait]
pub trait AcmeAccount: Send + Sync {
    fn registration(&self) -> &Registration;

    /// Open an order for the given DNS identifiers
    async fn new_order(&self, identifiers: &[String]) -> Result<Box<dyn AcmeOrder>, AcmeError>;
}

/// A DNS-01 challenge the CA is waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    /// Identifier being authorized (may be a wildcard)
    pub domain: String,
    pub token: String,
    pub key_authorization: String,
    /// Challenge URL, used to signal readiness
    pub url: String,
}

/// Order lifecycle states (RFC 8555 section 7.1.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

/// Order state after a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub status: OrderStatus,
    /// Certificate URL, present once the order is valid
    pub certificate_url: Option<String>,
    /// Problem reported by the CA for invalid orders
    pub error: Option<String>,
}

/// An open order
#[async_trait]
pub trait AcmeOrder: Send {
    /// DNS-01 challenges of every authorization that still needs solving
    ///
    /// Already-valid authorizations are skipped. An authorization without a
    /// DNS-01 challenge is [`AcmeError::NoDns01Challenge`].
    async fn dns01_challenges(&mut self) -> Result<Vec<PendingChallenge>, AcmeError>;

    /// Tell the CA to validate a challenge
    async fn set_challenge_ready(&mut self, challenge_url: &str) -> Result<(), AcmeError>;

    async fn refresh(&mut self) -> Result<OrderSnapshot, AcmeError>;

    /// Submit the CSR in DER form
    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), AcmeError>;

    /// Download the PEM chain (leaf first); `None` until the order is valid
    async fn certificate_chain(&mut self) -> Result<Option<String>, AcmeError>;
}
