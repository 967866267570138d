//! Filesystem-backed host
//!
//! # Layout
//!
//! ```text
//! state/
//! ├── secrets/<secret-id>.json        # {"key": "value", ...}
//! ├── requests/<relation-id>.json     # {"certificate_signing_requests": [...]}
//! ├── issued/<relation-id>.json       # {"certificates": [...]}
//! └── status.json                     # {"status": "active", "message": "..."}
//! ```
//!
//! A request is outstanding while `issued/<relation-id>.json` holds no
//! certificate for the same CSR.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use certmason_common::{CorrelationId, SecretRef, UnitStatus};

use super::relation::{RelationCertificate, RelationCertificates, RelationRequests};
use super::{
    CertificateSigningRequest, HostError, IssuedCertificateBundle, Leadership, RequestSource,
    SecretStore, UnitStatusSink,
};

const SECRETS_DIR: &str = "secrets";
const REQUESTS_DIR: &str = "requests";
const ISSUED_DIR: &str = "issued";
const STATUS_FILE: &str = "status.json";

#[derive(Debug, Clone)]
pub struct FileHost {
    root: PathBuf,
    leader: bool,
}

impl FileHost {
    pub fn new(root: impl Into<PathBuf>, leader: bool) -> Self {
        Self {
            root: root.into(),
            leader,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join(STATUS_FILE)
    }

    fn entry_path(&self, dir: &str, id: &str) -> Result<PathBuf, HostError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(HostError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(dir).join(format!("{}.json", id)))
    }

    fn relations(&self) -> Result<Vec<String>, HostError> {
        let dir = self.root.join(REQUESTS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(HostError::Io { path: dir, source }),
        };

        let mut relations = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| HostError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                relations.push(stem.to_string());
            }
        }
        relations.sort();
        Ok(relations)
    }

    fn issued_for(&self, relation: &str) -> Result<RelationCertificates, HostError> {
        let path = self.entry_path(ISSUED_DIR, relation)?;
        Ok(read_json(&path)?.unwrap_or_default())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, HostError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(HostError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| HostError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Write through a temporary file so readers never see a partial document
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), HostError> {
    let io_err = |source| HostError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let content = serde_json::to_string_pretty(value).map_err(|source| HostError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

impl SecretStore for FileHost {
    fn secret(&self, id: &SecretRef) -> Result<Option<BTreeMap<String, String>>, HostError> {
        let path = self.entry_path(SECRETS_DIR, id.as_str())?;
        trace!(path = %path.display(), "Reading secret");
        read_json(&path)
    }
}

impl RequestSource for FileHost {
    fn list_outstanding(&self) -> Result<Vec<CertificateSigningRequest>, HostError> {
        let mut outstanding = Vec::new();

        for relation in self.relations()? {
            let path = self.entry_path(REQUESTS_DIR, &relation)?;
            let requests: RelationRequests = read_json(&path)?.unwrap_or_default();
            let issued = self.issued_for(&relation)?;

            for (index, request) in requests.certificate_signing_requests.into_iter().enumerate() {
                if issued.covers(&request.certificate_signing_request) {
                    trace!(relation = %relation, index, "Request already fulfilled");
                    continue;
                }
                outstanding.push(CertificateSigningRequest {
                    correlation_id: CorrelationId::for_relation(&relation, index),
                    csr_pem: request.certificate_signing_request,
                    is_ca: request.ca,
                });
            }
        }

        debug!(count = outstanding.len(), "Listed outstanding certificate requests");
        Ok(outstanding)
    }

    fn publish(
        &self,
        correlation_id: &CorrelationId,
        bundle: &IssuedCertificateBundle,
    ) -> Result<(), HostError> {
        let relation = correlation_id.relation();
        let requests_path = self.entry_path(REQUESTS_DIR, relation)?;
        if !requests_path.exists() {
            return Err(HostError::UnknownRelation(relation.to_string()));
        }

        let mut issued = self.issued_for(relation)?;
        issued.upsert(RelationCertificate::from(bundle));
        write_json(&self.entry_path(ISSUED_DIR, relation)?, &issued)?;

        debug!(correlation_id = %correlation_id, "Published certificate");
        Ok(())
    }
}

impl UnitStatusSink for FileHost {
    fn set_status(&self, status: &UnitStatus) -> Result<(), HostError> {
        write_json(&self.status_path(), status)
    }
}

impl Leadership for FileHost {
    fn is_leader(&self) -> bool {
        self.leader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::{CertificateMetadata, IssuedCertificate};
    use tempfile::TempDir;

    fn bundle(id: &CorrelationId, csr: &str) -> IssuedCertificateBundle {
        IssuedCertificateBundle::new(
            id.clone(),
            IssuedCertificate {
                certificate_pem: "leaf".to_string(),
                issuer_certificate_pem: "issuer".to_string(),
                chain_pems: vec!["issuer".to_string(), "root".to_string()],
                csr_pem: csr.to_string(),
                private_key_pem: None,
                metadata: CertificateMetadata {
                    stable_url: "https://ca/cert/1".to_string(),
                    url: "https://ca/cert/1".to_string(),
                    domain: "example.com".to_string(),
                },
            },
        )
    }

    fn write_requests(root: &Path, relation: &str, csrs: &[&str]) {
        let requests = RelationRequests {
            certificate_signing_requests: csrs
                .iter()
                .map(|csr| super::super::RelationRequest {
                    ca: false,
                    certificate_signing_request: csr.to_string(),
                })
                .collect(),
        };
        write_json(&root.join(REQUESTS_DIR).join(format!("{}.json", relation)), &requests)
            .unwrap();
    }

    #[test]
    fn test_secret_lookup() {
        let dir = TempDir::new().unwrap();
        let host = FileHost::new(dir.path(), true);
        fs::create_dir_all(dir.path().join(SECRETS_DIR)).unwrap();
        fs::write(
            dir.path().join(SECRETS_DIR).join("dns.json"),
            r#"{"hetzner-api-key": "k"}"#,
        )
        .unwrap();

        let secret = host.secret(&SecretRef::new("dns")).unwrap().unwrap();
        assert_eq!(secret.get("hetzner-api-key").map(String::as_str), Some("k"));
        assert!(host.secret(&SecretRef::new("missing")).unwrap().is_none());
        assert!(matches!(
            host.secret(&SecretRef::new("../escape")),
            Err(HostError::InvalidId(_))
        ));
    }

    #[test]
    fn test_list_outstanding_is_stable() {
        let dir = TempDir::new().unwrap();
        let host = FileHost::new(dir.path(), true);
        write_requests(dir.path(), "b-relation", &["csr-3"]);
        write_requests(dir.path(), "a-relation", &["csr-1", "csr-2"]);

        let ids: Vec<String> = host
            .list_outstanding()
            .unwrap()
            .into_iter()
            .map(|r| r.correlation_id.into_string())
            .collect();
        assert_eq!(ids, vec!["a-relation/0", "a-relation/1", "b-relation/0"]);
    }

    #[test]
    fn test_publish_marks_request_fulfilled() {
        let dir = TempDir::new().unwrap();
        let host = FileHost::new(dir.path(), true);
        write_requests(dir.path(), "rel", &["csr-1", "csr-2"]);

        let id = CorrelationId::for_relation("rel", 0);
        host.publish(&id, &bundle(&id, "csr-1")).unwrap();
        // Publishing twice keeps one entry
        host.publish(&id, &bundle(&id, "csr-1")).unwrap();

        let issued = host.issued_for("rel").unwrap();
        assert_eq!(issued.certificates.len(), 1);
        assert_eq!(issued.certificates[0].ca, "issuer");
        assert_eq!(issued.certificates[0].chain, vec!["issuer", "root"]);

        let outstanding = host.list_outstanding().unwrap();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].correlation_id.as_str(), "rel/1");
    }

    #[test]
    fn test_publish_to_unknown_relation() {
        let dir = TempDir::new().unwrap();
        let host = FileHost::new(dir.path(), true);
        let id = CorrelationId::for_relation("gone", 0);

        let err = host.publish(&id, &bundle(&id, "csr")).unwrap_err();
        assert!(matches!(err, HostError::UnknownRelation(ref r) if r == "gone"));
    }

    #[test]
    fn test_status_written() {
        let dir = TempDir::new().unwrap();
        let host = FileHost::new(dir.path(), false);
        host.set_status(&UnitStatus::blocked("not the leader"))
            .unwrap();

        let written: UnitStatus = read_json(&host.status_path()).unwrap().unwrap();
        assert_eq!(written, UnitStatus::blocked("not the leader"));
        assert!(!host.is_leader());
    }

    #[test]
    fn test_invalid_json_reported() {
        let dir = TempDir::new().unwrap();
        let host = FileHost::new(dir.path(), true);
        fs::create_dir_all(dir.path().join(REQUESTS_DIR)).unwrap();
        fs::write(dir.path().join(REQUESTS_DIR).join("rel.json"), "{not json").unwrap();

        assert!(matches!(
            host.list_outstanding(),
            Err(HostError::Json { .. })
        ));
    }
}
