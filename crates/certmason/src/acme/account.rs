//! Per-pass ACME account and session
//!
//! Every pass registers a fresh account with a freshly generated key. The
//! session is dropped at the end of the pass; nothing is persisted.

use std::sync::Arc;

use tracing::info;

use super::error::AcmeError;
use super::protocol::{AcmeAccount, AcmeDirectory, NewAccountRequest, Registration};
use crate::dns::Dns01Solver;

/// Creates ACME sessions against a CA directory
#[derive(Clone)]
pub struct AccountManager {
    directory: Arc<dyn AcmeDirectory>,
}

impl AccountManager {
    pub fn new(directory: Arc<dyn AcmeDirectory>) -> Self {
        Self { directory }
    }

    /// Register a new account at `directory_url`, agreeing to the terms of
    /// service
    pub async fn new_session(
        &self,
        email: &str,
        directory_url: &str,
    ) -> Result<AcmeSession, AcmeError> {
        let account = self
            .directory
            .register(NewAccountRequest {
                email,
                directory_url,
            })
            .await
            .map_err(|e| match e {
                AcmeError::Registration(_) => e,
                other => AcmeError::Registration(other.to_string()),
            })?;

        info!(
            email = %email,
            account_url = %account.registration().account_url,
            "ACME session established"
        );

        Ok(AcmeSession {
            email: email.to_string(),
            account,
            solver: None,
        })
    }
}

impl std::fmt::Debug for AccountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager").finish_non_exhaustive()
    }
}

/// A registered account plus the DNS-01 solver bound for this pass
pub struct AcmeSession {
    email: String,
    account: Box<dyn AcmeAccount>,
    solver: Option<Dns01Solver>,
}

impl AcmeSession {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn registration(&self) -> &Registration {
        self.account.registration()
    }

    pub fn account(&self) -> &dyn AcmeAccount {
        self.account.as_ref()
    }

    /// Make this session DNS-01 only, solved by `solver`
    pub fn bind_dns_provider(&mut self, solver: Dns01Solver) {
        self.solver = Some(solver);
    }

    pub fn dns_solver(&self) -> Option<&Dns01Solver> {
        self.solver.as_ref()
    }
}

impl std::fmt::Debug for AcmeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeSession")
            .field("email", &self.email)
            .field("registration", self.registration())
            .field(
                "dns_provider",
                &self.solver.as_ref().map(Dns01Solver::provider_name),
            )
            .finish()
    }
}
