//! JSON shapes exchanged with requesting units

use serde::{Deserialize, Serialize};

use super::IssuedCertificateBundle;

/// Request data published by a requirer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRequests {
    #[serde(default)]
    pub certificate_signing_requests: Vec<RelationRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRequest {
    #[serde(default)]
    pub ca: bool,
    pub certificate_signing_request: String,
}

/// Certificates published back to a requirer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationCertificates {
    #[serde(default)]
    pub certificates: Vec<RelationCertificate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationCertificate {
    /// Issuer certificate
    pub ca: String,
    pub chain: Vec<String>,
    pub certificate_signing_request: String,
    pub certificate: String,
}

impl From<&IssuedCertificateBundle> for RelationCertificate {
    fn from(bundle: &IssuedCertificateBundle) -> Self {
        let cert = &bundle.certificate;
        Self {
            ca: cert.issuer_certificate_pem.clone(),
            chain: cert.chain_pems.clone(),
            certificate_signing_request: cert.csr_pem.clone(),
            certificate: cert.certificate_pem.clone(),
        }
    }
}

impl RelationCertificates {
    /// Replace the entry for the same CSR, or append
    pub fn upsert(&mut self, certificate: RelationCertificate) {
        let csr = certificate.certificate_signing_request.trim().to_string();
        match self
            .certificates
            .iter_mut()
            .find(|c| c.certificate_signing_request.trim() == csr)
        {
            Some(existing) => *existing = certificate,
            None => self.certificates.push(certificate),
        }
    }

    pub fn covers(&self, csr_pem: &str) -> bool {
        let csr = csr_pem.trim();
        self.certificates
            .iter()
            .any(|c| c.certificate_signing_request.trim() == csr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(csr: &str, leaf: &str) -> RelationCertificate {
        RelationCertificate {
            ca: "issuer".to_string(),
            chain: vec!["issuer".to_string()],
            certificate_signing_request: csr.to_string(),
            certificate: leaf.to_string(),
        }
    }

    #[test]
    fn test_request_wire_format() {
        let requests: RelationRequests = serde_json::from_str(
            r#"{"certificate_signing_requests":[{"ca":false,"certificate_signing_request":"-----BEGIN CERTIFICATE REQUEST-----"}]}"#,
        )
        .unwrap();
        assert_eq!(requests.certificate_signing_requests.len(), 1);
        assert!(!requests.certificate_signing_requests[0].ca);

        let empty: RelationRequests = serde_json::from_str("{}").unwrap();
        assert!(empty.certificate_signing_requests.is_empty());
    }

    #[test]
    fn test_certificate_wire_format() {
        let json = serde_json::to_string_pretty(&cert("csr-a", "leaf-1")).unwrap();
        insta::assert_snapshot!(json, @r#"
        {
          "ca": "issuer",
          "chain": [
            "issuer"
          ],
          "certificate_signing_request": "csr-a",
          "certificate": "leaf-1"
        }
        "#);
    }

    #[test]
    fn test_upsert_replaces_matching_csr() {
        let mut certs = RelationCertificates::default();
        certs.upsert(cert("csr-a", "leaf-1"));
        certs.upsert(cert("csr-b", "leaf-2"));
        certs.upsert(cert("csr-a\n", "leaf-3"));

        assert_eq!(certs.certificates.len(), 2);
        assert_eq!(certs.certificates[0].certificate, "leaf-3");
        assert!(certs.covers("csr-b"));
        assert!(!certs.covers("csr-c"));
    }
}
