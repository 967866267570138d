//! Hands issued certificates back to the requesting unit

use thiserror::Error;
use tracing::info;

use certmason_common::CorrelationId;

use crate::acme::IssuedCertificate;
use crate::host::{HostError, IssuedCertificateBundle, RequestSource};

/// The host refused a bundle
#[derive(Debug, Error)]
#[error("failed to publish certificate for '{correlation_id}': {source}")]
pub struct PublishError {
    pub correlation_id: CorrelationId,
    #[source]
    pub source: HostError,
}

/// Packages issued certificates and delivers them through the [`RequestSource`]
///
/// There is no retry within a pass. A request whose bundle could not be
/// published stays outstanding and is issued again on the next pass.
pub struct ResultPublisher<'a> {
    sink: &'a dyn RequestSource,
}

impl<'a> ResultPublisher<'a> {
    pub fn new(sink: &'a dyn RequestSource) -> Self {
        Self { sink }
    }

    pub fn package(
        correlation_id: CorrelationId,
        certificate: IssuedCertificate,
    ) -> IssuedCertificateBundle {
        IssuedCertificateBundle::new(correlation_id, certificate)
    }

    pub fn publish(&self, bundle: &IssuedCertificateBundle) -> Result<(), PublishError> {
        self.sink
            .publish(&bundle.correlation_id, bundle)
            .map_err(|source| PublishError {
                correlation_id: bundle.correlation_id.clone(),
                source,
            })?;

        info!(
            correlation_id = %bundle.correlation_id,
            domain = %bundle.certificate.metadata.domain,
            "Certificate published"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ResultPublisher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultPublisher").finish_non_exhaustive()
    }
}
