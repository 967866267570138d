//! DNS-01 challenge solving
//!
//! [`ChallengeSolver`] builds a provider by plugin id, then binds it into the
//! pass's ACME session once the account is registered. The bound [`Dns01Solver`] is what the issuer drives
//! for each challenge.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::credentials::CredentialSet;
use super::error::DnsError;
use super::propagation::PropagationChecker;
use super::provider::{dns01_txt_value, DnsProvider, DnsResult};
use super::registry::{ProviderRegistry, ProviderSettings};
use crate::acme::{AcmeSession, PendingChallenge};

/// A DNS provider paired with its propagation checker
#[derive(Debug)]
pub struct Dns01Solver {
    provider: Arc<dyn DnsProvider>,
    propagation: PropagationChecker,
}

impl Dns01Solver {
    pub fn new(provider: Arc<dyn DnsProvider>, propagation: PropagationChecker) -> Self {
        Self {
            provider,
            propagation,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Publish the challenge record and wait until it is visible
    pub async fn present(&self, challenge: &PendingChallenge) -> DnsResult<()> {
        debug!(
            domain = %challenge.domain,
            provider = self.provider.name(),
            "Presenting DNS-01 challenge"
        );
        self.provider
            .present(
                &challenge.domain,
                &challenge.token,
                &challenge.key_authorization,
            )
            .await?;

        let expected = dns01_txt_value(&challenge.key_authorization);
        self.propagation
            .wait_for(&challenge.domain, &expected)
            .await
    }

    /// Remove every presented record, logging failures
    ///
    /// Returns the number of records that could not be removed.
    pub async fn cleanup_all(&self, challenges: &[PendingChallenge]) -> usize {
        let mut failures = 0;
        for challenge in challenges {
            if let Err(e) = self
                .provider
                .cleanup(
                    &challenge.domain,
                    &challenge.token,
                    &challenge.key_authorization,
                )
                .await
            {
                warn!(
                    domain = %challenge.domain,
                    error = %e,
                    "Failed to clean up DNS-01 challenge record"
                );
                failures += 1;
            }
        }
        debug!(
            cleaned = challenges.len() - failures,
            failed = failures,
            "DNS-01 cleanup finished"
        );
        failures
    }
}

/// Binds the configured DNS provider into an ACME session
#[derive(Debug)]
pub struct ChallengeSolver<'a> {
    registry: &'a ProviderRegistry,
}

impl<'a> ChallengeSolver<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Construct the provider for `plugin_id`
    ///
    /// Needs no ACME session, so configuration errors surface before any
    /// account is registered.
    pub fn prepare(
        &self,
        plugin_id: &str,
        credentials: &CredentialSet,
        settings: &ProviderSettings,
    ) -> Result<Dns01Solver, DnsError> {
        let provider = self.registry.create(plugin_id, credentials, settings)?;
        let propagation = PropagationChecker::new(&settings.propagation);
        Ok(Dns01Solver::new(provider, propagation))
    }

    /// Make the session DNS-01 only, solved by `solver`
    pub fn bind(session: &mut AcmeSession, solver: Dns01Solver) {
        info!(
            provider = solver.provider_name(),
            verify_propagation = solver.propagation.config().verify,
            "Bound DNS-01 provider"
        );
        session.bind_dns_provider(solver);
    }
}
