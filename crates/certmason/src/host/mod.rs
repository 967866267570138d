//! Boundary to the host lifecycle framework
//!
//! The reconciliation core only talks to the host through these traits.
//! [`FileHost`] implements all of them over a state directory for the CLI.

mod fs;
mod relation;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use certmason_common::{CorrelationId, SecretRef, UnitStatus};

use crate::acme::IssuedCertificate;

pub use fs::FileHost;
pub use relation::{RelationCertificate, RelationCertificates, RelationRequest, RelationRequests};

/// Errors raised by a host implementation
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Publishing to a relation that no longer exists
    #[error("relation '{0}' is not known to the host")]
    UnknownRelation(String),

    /// Identifier that cannot be mapped to host storage
    #[error("invalid identifier '{0}'")]
    InvalidId(String),
}

/// A pending request, as yielded by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSigningRequest {
    pub correlation_id: CorrelationId,
    pub csr_pem: String,
    pub is_ca: bool,
}

/// A certificate ready to hand back to the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCertificateBundle {
    pub correlation_id: CorrelationId,
    #[serde(flatten)]
    pub certificate: IssuedCertificate,
}

impl IssuedCertificateBundle {
    pub fn new(correlation_id: CorrelationId, certificate: IssuedCertificate) -> Self {
        Self {
            correlation_id,
            certificate,
        }
    }
}

/// Dereferences opaque secret handles
pub trait SecretStore {
    /// Secret content as key/value pairs; `Ok(None)` when the secret does not exist
    fn secret(&self, id: &SecretRef) -> Result<Option<BTreeMap<String, String>>, HostError>;
}

/// Pending certificate requests and the sink for their results
pub trait RequestSource {
    /// Requests without a published certificate, in stable order
    fn list_outstanding(&self) -> Result<Vec<CertificateSigningRequest>, HostError>;

    fn publish(
        &self,
        correlation_id: &CorrelationId,
        bundle: &IssuedCertificateBundle,
    ) -> Result<(), HostError>;
}

/// Receives the unit status at the end of each pass
pub trait UnitStatusSink {
    fn set_status(&self, status: &UnitStatus) -> Result<(), HostError>;
}

/// Whether this unit may issue certificates
pub trait Leadership {
    fn is_leader(&self) -> bool;
}

/// Everything a pass needs from the host
pub trait Host: SecretStore + RequestSource + UnitStatusSink + Leadership {}

impl<T: SecretStore + RequestSource + UnitStatusSink + Leadership> Host for T {}
