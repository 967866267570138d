//! Per-CSR certificate issuance
//!
//! # Flow
//!
//! 1. Decode the PEM CSR and collect its DNS identifiers
//! 2. Open an order and take the DNS-01 challenge of each pending authorization
//! 3. Present each challenge, wait for propagation, mark it ready
//! 4. Poll until the order is `ready`
//! 5. Remove every presented record (also when 3 or 4 failed)
//! 6. Submit the CSR and poll until the order is `valid`
//! 7. Download the chain and split it into leaf, issuer and chain
//!
//! Cleanup failures are logged and never fail issuance.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use certmason_config::TimeoutConfig;

use super::account::AcmeSession;
use super::csr::ParsedCsr;
use super::error::{AcmeError, CsrError, IssueError};
use super::protocol::{AcmeOrder, OrderSnapshot, OrderStatus, PendingChallenge};
use crate::dns::Dns01Solver;

const CERTIFICATE_PEM_TAG: &str = "CERTIFICATE";

/// Where the CA published the certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    pub stable_url: String,
    pub url: String,
    /// Primary identifier of the request
    pub domain: String,
}

/// Certificate material returned by the CA for one CSR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub issuer_certificate_pem: String,
    /// Every certificate after the leaf, in CA order
    pub chain_pems: Vec<String>,
    pub csr_pem: String,
    /// Always `None` for client-supplied CSRs; the key never leaves the client
    pub private_key_pem: Option<String>,
    pub metadata: CertificateMetadata,
}

/// Bounds on the two order polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuerTimeouts {
    pub order_ready: Duration,
    pub certificate: Duration,
    pub poll_interval: Duration,
}

impl From<&TimeoutConfig> for IssuerTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            order_ready: config.order_ready(),
            certificate: config.certificate(),
            poll_interval: config.poll_interval(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertificateIssuer {
    timeouts: IssuerTimeouts,
}

impl CertificateIssuer {
    pub fn new(timeouts: IssuerTimeouts) -> Self {
        Self { timeouts }
    }

    /// Exchange one PEM CSR for a certificate
    pub async fn issue(
        &self,
        session: &AcmeSession,
        csr_pem: &str,
    ) -> Result<IssuedCertificate, IssueError> {
        let csr = ParsedCsr::from_pem(csr_pem)?;
        let identifiers = csr.identifiers();
        let domain = csr.primary_domain().ok_or(CsrError::NoIdentifiers)?;

        let solver = session.dns_solver().ok_or(AcmeError::NoDnsProvider)?;

        info!(domain = %domain, identifiers = ?identifiers, "Ordering certificate");
        let mut order = session.account().new_order(&identifiers).await?;
        let challenges = order.dns01_challenges().await?;

        let mut presented = Vec::with_capacity(challenges.len());
        let validation = self
            .validate(order.as_mut(), solver, &challenges, &mut presented)
            .await;

        if !presented.is_empty() {
            let failures = solver.cleanup_all(&presented).await;
            if failures > 0 {
                warn!(domain = %domain, failures, "Some challenge records were left behind");
            }
        }
        validation?;

        debug!(domain = %domain, "Submitting CSR");
        order.finalize(csr.der()).await?;

        let snapshot = self
            .poll_until(
                order.as_mut(),
                OrderStatus::Valid,
                self.timeouts.certificate,
            )
            .await?;

        let chain = order
            .certificate_chain()
            .await?
            .ok_or_else(|| AcmeError::Finalization("No certificate in response".to_string()))?;

        let (leaf, rest) = split_chain(&chain)?;
        let issuer = rest.first().cloned().ok_or_else(|| {
            AcmeError::CertificateParse("chain contains no issuer certificate".to_string())
        })?;

        let url = snapshot.certificate_url.unwrap_or_else(|| {
            warn!(domain = %domain, "CA did not report a certificate URL");
            String::new()
        });

        info!(domain = %domain, chain_len = rest.len(), "Certificate issued");

        Ok(IssuedCertificate {
            certificate_pem: leaf,
            issuer_certificate_pem: issuer,
            chain_pems: rest,
            csr_pem: csr_pem.to_string(),
            private_key_pem: None,
            metadata: CertificateMetadata {
                stable_url: url.clone(),
                url,
                domain,
            },
        })
    }

    /// Present, propagate and mark ready every challenge, then wait for the
    /// order to become ready. `presented` collects what needs cleanup.
    async fn validate(
        &self,
        order: &mut dyn AcmeOrder,
        solver: &Dns01Solver,
        challenges: &[PendingChallenge],
        presented: &mut Vec<PendingChallenge>,
    ) -> Result<(), AcmeError> {
        for challenge in challenges {
            presented.push(challenge.clone());
            solver.present(challenge).await?;
            order.set_challenge_ready(&challenge.url).await?;
            debug!(domain = %challenge.domain, "Challenge marked ready");
        }

        self.poll_until(order, OrderStatus::Ready, self.timeouts.order_ready)
            .await
            .map(|_| ())
    }

    async fn poll_until(
        &self,
        order: &mut dyn AcmeOrder,
        target: OrderStatus,
        timeout: Duration,
    ) -> Result<OrderSnapshot, AcmeError> {
        let deadline = Instant::now() + timeout;

        loop {
            let snapshot = order.refresh().await?;
            if snapshot.status == target {
                return Ok(snapshot);
            }
            if snapshot.status == OrderStatus::Invalid {
                return Err(AcmeError::OrderInvalid(
                    snapshot
                        .error
                        .unwrap_or_else(|| "no problem reported by the CA".to_string()),
                ));
            }

            if Instant::now() >= deadline {
                return Err(AcmeError::Timeout(format!(
                    "order still {:?} after {}s waiting for {:?}",
                    snapshot.status,
                    timeout.as_secs(),
                    target
                )));
            }

            trace!(status = ?snapshot.status, target = ?target, "Order not there yet, waiting");
            tokio::time::sleep(self.timeouts.poll_interval).await;
        }
    }
}

/// Split a PEM chain into the leaf and every certificate after it
pub fn split_chain(chain_pem: &str) -> Result<(String, Vec<String>), AcmeError> {
    let blocks = pem::parse_many(chain_pem)
        .map_err(|e| AcmeError::CertificateParse(format!("invalid PEM chain: {}", e)))?;

    let mut certificates = blocks
        .iter()
        .filter(|block| block.tag() == CERTIFICATE_PEM_TAG)
        .map(|block| {
            pem::encode_config(
                block,
                pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
            )
        });

    let leaf = certificates
        .next()
        .ok_or_else(|| AcmeError::CertificateParse("chain contains no certificate".to_string()))?;
    Ok((leaf, certificates.collect()))
}
