//! One reconciliation pass
//!
//! A pass validates configuration, resolves DNS credentials and builds the
//! DNS-01 provider. Only then does it register an ACME account, bind the
//! provider to it and issue a certificate for every outstanding request. Failures before the request loop block the unit;
//! failures inside it only affect the request at hand.

mod publisher;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use certmason_common::{CorrelationId, UnitStatus};
use certmason_config::{ConfigError, OperatorConfig};

use crate::acme::{
    AccountManager, AcmeError, AcmeSession, CertificateIssuer, IssueError, IssuerTimeouts,
};
use crate::dns::{
    ChallengeSolver, CredentialResolver, DnsError, EnvScope, ProviderRegistry, ProviderSettings,
};
use crate::host::{CertificateSigningRequest, Host, HostError};

pub use publisher::{PublishError, ResultPublisher};

/// Failures that end a pass before any request is processed
#[derive(Debug, Error)]
pub enum PassError {
    #[error("not the leader")]
    NotLeader,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Dns(#[from] DnsError),

    #[error("{0}")]
    Registration(#[source] AcmeError),

    #[error("failed to list certificate requests: {0}")]
    ListRequests(#[source] HostError),
}

/// Why a single request was skipped
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// What happened to one outstanding request
#[derive(Debug)]
pub enum RequestOutcome {
    Published {
        correlation_id: CorrelationId,
        domain: String,
    },
    Failed {
        correlation_id: CorrelationId,
        error: RequestError,
    },
}

impl RequestOutcome {
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            RequestOutcome::Published { correlation_id, .. }
            | RequestOutcome::Failed { correlation_id, .. } => correlation_id,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, RequestOutcome::Published { .. })
    }
}

/// Result of a pass: the status handed to the host plus per-request detail
#[derive(Debug)]
pub struct PassReport {
    pub status: UnitStatus,
    /// Set when the pass stopped before the request loop
    pub failure: Option<PassError>,
    /// One entry per outstanding request, in source order
    pub outcomes: Vec<RequestOutcome>,
}

impl PassReport {
    fn blocked(failure: PassError) -> Self {
        Self {
            status: UnitStatus::blocked(failure.to_string()),
            failure: Some(failure),
            outcomes: Vec::new(),
        }
    }

    fn completed(outcomes: Vec<RequestOutcome>) -> Self {
        let status = if outcomes.is_empty() {
            UnitStatus::active("no outstanding certificate requests")
        } else {
            let issued = outcomes.iter().filter(|o| o.is_published()).count();
            UnitStatus::active(format!(
                "{} issued, {} failed",
                issued,
                outcomes.len() - issued
            ))
        };
        Self {
            status,
            failure: None,
            outcomes,
        }
    }

    pub fn issued(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_published()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.issued()
    }
}

/// Drives reconciliation passes against a host
pub struct Reconciler<H> {
    host: H,
    accounts: AccountManager,
    registry: ProviderRegistry,
}

impl<H: Host> Reconciler<H> {
    pub fn new(host: H, accounts: AccountManager, registry: ProviderRegistry) -> Self {
        Self {
            host,
            accounts,
            registry,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Run one pass and report the resulting status to the host
    ///
    /// The status is set whatever the outcome. A host that cannot record it
    /// is logged, not retried.
    #[instrument(name = "reconcile", skip_all, fields(plugin = %config.plugin))]
    pub async fn run_pass(&self, config: &OperatorConfig) -> PassReport {
        let report = match self.reconcile(config).await {
            Ok(outcomes) => PassReport::completed(outcomes),
            Err(failure) => {
                warn!(error = %failure, "Reconciliation pass blocked");
                PassReport::blocked(failure)
            }
        };

        if let Err(e) = self.host.set_status(&report.status) {
            error!(error = %e, status = %report.status, "Failed to set unit status");
        }

        info!(
            status = %report.status,
            issued = report.issued(),
            failed = report.failed(),
            "Reconciliation pass finished"
        );
        report
    }

    async fn reconcile(&self, config: &OperatorConfig) -> Result<Vec<RequestOutcome>, PassError> {
        if !self.host.is_leader() {
            return Err(PassError::NotLeader);
        }

        config.validate()?;

        let credentials =
            CredentialResolver::new(&self.host).resolve(&config.plugin_config_secret_id)?;
        let _env = config
            .export_credentials_env
            .then(|| EnvScope::export(&credentials));

        let solver = ChallengeSolver::new(&self.registry).prepare(
            &config.plugin,
            &credentials,
            &ProviderSettings::from_config(config),
        )?;

        let mut session = self
            .accounts
            .new_session(&config.email, &config.server)
            .await
            .map_err(PassError::Registration)?;
        ChallengeSolver::bind(&mut session, solver);

        let requests = self
            .host
            .list_outstanding()
            .map_err(PassError::ListRequests)?;
        info!(count = requests.len(), "Processing outstanding certificate requests");

        let issuer = CertificateIssuer::new(IssuerTimeouts::from(&config.timeouts));
        let publisher = ResultPublisher::new(&self.host);

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            outcomes.push(process_request(&issuer, &session, &publisher, request).await);
        }
        Ok(outcomes)
    }
}

#[instrument(name = "issue", skip_all, fields(correlation_id = %request.correlation_id))]
async fn process_request(
    issuer: &CertificateIssuer,
    session: &AcmeSession,
    publisher: &ResultPublisher<'_>,
    request: CertificateSigningRequest,
) -> RequestOutcome {
    if request.is_ca {
        debug!("CA certificate requested; the CA decides what it issues");
    }

    let result = async {
        let certificate = issuer.issue(session, &request.csr_pem).await?;
        let bundle = ResultPublisher::package(request.correlation_id.clone(), certificate);
        publisher.publish(&bundle)?;
        Ok::<_, RequestError>(bundle.certificate.metadata.domain)
    }
    .await;

    match result {
        Ok(domain) => RequestOutcome::Published {
            correlation_id: request.correlation_id,
            domain,
        },
        Err(e) => {
            error!(error = %e, "Certificate request failed");
            RequestOutcome::Failed {
                correlation_id: request.correlation_id,
                error: e,
            }
        }
    }
}

impl<H> std::fmt::Debug for Reconciler<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
