//! ACME certificate issuance
//!
//! Issues certificates for client-supplied CSRs through Let's Encrypt and
//! compatible CAs, proving domain control with DNS-01 only.
//!
//! # Architecture
//!
//! - [`AcmeDirectory`], [`AcmeAccount`], [`AcmeOrder`] - The CA operations a
//!   pass uses; [`InstantAcmeDirectory`] implements them over `instant-acme`
//! - [`AccountManager`] - Registers the per-pass account and opens an [`AcmeSession`]
//! - [`CertificateIssuer`] - Drives one CSR through order, challenges and finalization
//! - [`ParsedCsr`] - Decodes inbound PEM CSRs

mod account;
mod client;
mod csr;
mod error;
mod issuer;
mod protocol;

pub use account::{AccountManager, AcmeSession};
pub use client::InstantAcmeDirectory;
pub use csr::{ParsedCsr, CSR_PEM_TAG};
pub use error::{AcmeError, CsrError, IssueError};
pub use issuer::{
    split_chain, CertificateIssuer, CertificateMetadata, IssuedCertificate, IssuerTimeouts,
};
pub use protocol::{
    AcmeAccount, AcmeDirectory, AcmeOrder, NewAccountRequest, OrderSnapshot, OrderStatus,
    PendingChallenge, Registration,
};
