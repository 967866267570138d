//! Inbound certificate signing request decoding

use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;

use super::error::CsrError;

/// PEM tag of a PKCS#10 request
pub const CSR_PEM_TAG: &str = "CERTIFICATE REQUEST";

/// A decoded CSR and the DNS identifiers it asks for
#[derive(Debug, Clone)]
pub struct ParsedCsr {
    der: Vec<u8>,
    common_name: Option<String>,
    dns_names: Vec<String>,
}

impl ParsedCsr {
    /// Decode a PEM `CERTIFICATE REQUEST` block
    pub fn from_pem(csr_pem: &str) -> Result<Self, CsrError> {
        let block = pem::parse(csr_pem.trim()).map_err(|e| CsrError::Pem(e.to_string()))?;
        if block.tag() != CSR_PEM_TAG {
            return Err(CsrError::UnexpectedBlock {
                tag: block.tag().to_string(),
            });
        }
        Self::from_der(block.into_contents())
    }

    /// Parse DER-encoded PKCS#10
    pub fn from_der(der: Vec<u8>) -> Result<Self, CsrError> {
        let (common_name, dns_names) = {
            let (_, csr) = X509CertificationRequest::from_der(&der)
                .map_err(|e| CsrError::Der(e.to_string()))?;

            let common_name = csr
                .certification_request_info
                .subject
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string);

            let mut dns_names = Vec::new();
            if let Some(extensions) = csr.requested_extensions() {
                for extension in extensions {
                    if let ParsedExtension::SubjectAlternativeName(san) = extension {
                        for name in &san.general_names {
                            if let GeneralName::DNSName(dns) = name {
                                dns_names.push(dns.to_string());
                            }
                        }
                    }
                }
            }
            (common_name, dns_names)
        };

        let parsed = Self {
            der,
            common_name,
            dns_names,
        };
        if parsed.identifiers().is_empty() {
            return Err(CsrError::NoIdentifiers);
        }
        Ok(parsed)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }

    /// Every DNS identifier to order: the common name first, then SANs
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = Vec::with_capacity(self.dns_names.len() + 1);
        let candidates = self
            .common_name
            .iter()
            .chain(self.dns_names.iter())
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty());
        for name in candidates {
            if !identifiers.contains(&name) {
                identifiers.push(name);
            }
        }
        identifiers
    }

    /// Primary domain: the common name, else the first SAN
    pub fn primary_domain(&self) -> Option<String> {
        self.identifiers().into_iter().next()
    }
}
