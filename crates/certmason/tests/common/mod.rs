//! In-process collaborators for reconciliation tests
//!
//! - [`MockCa`] - ACME CA that validates every marked challenge unless told otherwise
//! - [`MockDns`] - DNS provider registered as `mock`, recording every call
//! - [`MemoryHost`] - host state kept in memory

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use certmason::acme::{
    AccountManager, AcmeAccount, AcmeDirectory, AcmeError, AcmeOrder, NewAccountRequest,
    OrderSnapshot, OrderStatus, PendingChallenge, Registration,
};
use certmason::dns::{DnsProvider, DnsProviderError, DnsResult, ProviderRegistry};
use certmason::host::{
    CertificateSigningRequest, HostError, IssuedCertificateBundle, Leadership, RequestSource,
    SecretStore, UnitStatusSink,
};
use certmason::Reconciler;
use certmason_common::{CorrelationId, SecretRef, UnitStatus};
use certmason_config::{OperatorConfig, PropagationSettings, TimeoutConfig};

pub const SECRET_ID: &str = "secret/1";
pub const MOCK_TOKEN_KEY: &str = "MOCK_TOKEN";

// ============================================================================
// Fixtures
// ============================================================================

pub fn config() -> OperatorConfig {
    OperatorConfig {
        email: "a@b.com".to_string(),
        server: "https://acme.example/directory".to_string(),
        plugin: "mock".to_string(),
        plugin_config_secret_id: SecretRef::new(SECRET_ID),
        export_credentials_env: false,
        timeouts: TimeoutConfig {
            order_ready_secs: 5,
            certificate_secs: 5,
            poll_interval_secs: 1,
            dns_api_secs: 5,
        },
        propagation: PropagationSettings {
            initial_delay_secs: 0,
            check_interval_secs: 1,
            timeout_secs: 1,
            verify: false,
            nameservers: Vec::new(),
        },
    }
}

pub fn csr_pem(names: &[&str]) -> String {
    let mut params =
        rcgen::CertificateParams::new(names.iter().map(|s| s.to_string()).collect::<Vec<_>>())
            .unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, names[0]);
    let key = rcgen::KeyPair::generate().unwrap();
    params.serialize_request(&key).unwrap().pem().unwrap()
}

fn self_signed(name: &str) -> String {
    rcgen::generate_simple_self_signed(vec![name.to_string()])
        .unwrap()
        .cert
        .pem()
}

pub fn request(relation: &str, index: usize, csr_pem: String) -> CertificateSigningRequest {
    CertificateSigningRequest {
        correlation_id: CorrelationId::for_relation(relation, index),
        csr_pem,
        is_ca: false,
    }
}

// ============================================================================
// Mock ACME CA
// ============================================================================

#[derive(Default)]
pub struct CaState {
    pub registrations: AtomicUsize,
    pub orders: Mutex<Vec<Vec<String>>>,
    pub finalized: AtomicUsize,
    /// Domains whose authorizations are rejected
    pub rejected: Mutex<HashSet<String>>,
    /// Orders never leave `Pending`
    pub stall_pending: AtomicBool,
    /// Finalized orders never leave `Processing`
    pub stall_processing: AtomicBool,
}

impl CaState {
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn reject_domain(&self, domain: &str) {
        self.rejected.lock().insert(domain.to_string());
    }

    pub fn accept_domain(&self, domain: &str) {
        self.rejected.lock().remove(domain);
    }

    pub fn finalized(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }
}

pub struct MockCa {
    pub state: Arc<CaState>,
    reject_registration: bool,
    issuer_pem: String,
    root_pem: String,
}

impl MockCa {
    pub fn new() -> Self {
        Self {
            state: Arc::new(CaState::default()),
            reject_registration: false,
            issuer_pem: self_signed("Mock Intermediate"),
            root_pem: self_signed("Mock Root"),
        }
    }

    pub fn rejecting_registration() -> Self {
        Self {
            reject_registration: true,
            ..Self::new()
        }
    }

    pub fn issuer_pem(&self) -> &str {
        &self.issuer_pem
    }
}

#[async_trait]
impl AcmeDirectory for MockCa {
    async fn register(
        &self,
        request: NewAccountRequest<'_>,
    ) -> Result<Box<dyn AcmeAccount>, AcmeError> {
        self.state.registrations.fetch_add(1, Ordering::SeqCst);
        if self.reject_registration {
            return Err(AcmeError::Registration(
                "urn:ietf:params:acme:error:rejectedIdentifier".to_string(),
            ));
        }

        let id = self.state.registrations();
        Ok(Box::new(MockAccount {
            registration: Registration {
                account_url: format!("{}/acct/{}", request.directory_url, id),
            },
            state: self.state.clone(),
            issuer_pem: self.issuer_pem.clone(),
            root_pem: self.root_pem.clone(),
        }))
    }
}

struct MockAccount {
    registration: Registration,
    state: Arc<CaState>,
    issuer_pem: String,
    root_pem: String,
}

#[async_trait]
impl AcmeAccount for MockAccount {
    fn registration(&self) -> &Registration {
        &self.registration
    }

    async fn new_order(&self, identifiers: &[String]) -> Result<Box<dyn AcmeOrder>, AcmeError> {
        let mut orders = self.state.orders.lock();
        orders.push(identifiers.to_vec());
        let number = orders.len();

        Ok(Box::new(MockOrder {
            number,
            identifiers: identifiers.to_vec(),
            ready: HashSet::new(),
            status: OrderStatus::Pending,
            error: None,
            state: self.state.clone(),
            issuer_pem: self.issuer_pem.clone(),
            root_pem: self.root_pem.clone(),
        }))
    }
}

struct MockOrder {
    number: usize,
    identifiers: Vec<String>,
    ready: HashSet<String>,
    status: OrderStatus,
    error: Option<String>,
    state: Arc<CaState>,
    issuer_pem: String,
    root_pem: String,
}

impl MockOrder {
    fn challenge_url(&self, index: usize) -> String {
        format!("https://acme.example/chall/{}/{}", self.number, index)
    }

    fn certificate_url(&self) -> String {
        format!("https://acme.example/cert/{}", self.number)
    }
}

#[async_trait]
impl AcmeOrder for MockOrder {
    async fn dns01_challenges(&mut self) -> Result<Vec<PendingChallenge>, AcmeError> {
        Ok(self
            .identifiers
            .iter()
            .enumerate()
            .map(|(i, domain)| PendingChallenge {
                domain: domain.clone(),
                token: format!("token-{}-{}", self.number, i),
                key_authorization: format!("token-{}-{}.thumbprint", self.number, i),
                url: self.challenge_url(i),
            })
            .collect())
    }

    async fn set_challenge_ready(&mut self, challenge_url: &str) -> Result<(), AcmeError> {
        self.ready.insert(challenge_url.to_string());
        Ok(())
    }

    async fn refresh(&mut self) -> Result<OrderSnapshot, AcmeError> {
        match self.status {
            OrderStatus::Pending if self.state.stall_pending.load(Ordering::SeqCst) => {}
            OrderStatus::Pending if self.ready.len() == self.identifiers.len() => {
                let rejected = self.state.rejected.lock();
                match self.identifiers.iter().find(|d| rejected.contains(*d)) {
                    Some(domain) => {
                        self.status = OrderStatus::Invalid;
                        self.error = Some(format!("no TXT record found for {}", domain));
                    }
                    None => self.status = OrderStatus::Ready,
                }
            }
            OrderStatus::Processing if !self.state.stall_processing.load(Ordering::SeqCst) => {
                self.status = OrderStatus::Valid
            }
            _ => {}
        }

        Ok(OrderSnapshot {
            status: self.status,
            certificate_url: (self.status == OrderStatus::Valid).then(|| self.certificate_url()),
            error: self.error.clone(),
        })
    }

    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), AcmeError> {
        if self.status != OrderStatus::Ready {
            return Err(AcmeError::Finalization(format!(
                "order is {:?}, not ready",
                self.status
            )));
        }
        if csr_der.is_empty() {
            return Err(AcmeError::Finalization("empty CSR".to_string()));
        }
        self.state.finalized.fetch_add(1, Ordering::SeqCst);
        self.status = OrderStatus::Processing;
        Ok(())
    }

    async fn certificate_chain(&mut self) -> Result<Option<String>, AcmeError> {
        if self.status != OrderStatus::Valid {
            return Ok(None);
        }
        Ok(Some(format!(
            "{}{}{}",
            self_signed(&self.identifiers[0]),
            self.issuer_pem,
            self.root_pem
        )))
    }
}

// ============================================================================
// Mock DNS provider
// ============================================================================

#[derive(Debug, Default)]
pub struct MockDns {
    pub constructed: AtomicUsize,
    pub presented: Mutex<Vec<String>>,
    pub cleaned: Mutex<Vec<String>>,
    /// Credentials handed to the constructor
    pub credentials: Mutex<BTreeMap<String, String>>,
    /// Process environment value of each key in `watch_env`, read during `present`
    pub env_seen: Mutex<BTreeMap<String, Option<String>>>,
    pub watch_env: Mutex<Vec<String>>,
    /// Domains for which `present` fails
    pub failing: Mutex<HashSet<String>>,
}

impl MockDns {
    pub fn presented(&self) -> Vec<String> {
        self.presented.lock().clone()
    }

    pub fn cleaned(&self) -> Vec<String> {
        self.cleaned.lock().clone()
    }

    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsProvider for MockDns {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn present(&self, domain: &str, _token: &str, _key_authorization: &str) -> DnsResult<()> {
        for key in self.watch_env.lock().iter() {
            self.env_seen
                .lock()
                .insert(key.clone(), std::env::var(key).ok());
        }

        self.presented.lock().push(domain.to_string());
        if self.failing.lock().contains(domain) {
            return Err(DnsProviderError::RecordCreation {
                record_name: format!("_acme-challenge.{}", domain),
                message: "zone is read-only".to_string(),
            });
        }
        Ok(())
    }

    async fn cleanup(&self, domain: &str, _token: &str, _key_authorization: &str) -> DnsResult<()> {
        self.cleaned.lock().push(domain.to_string());
        Ok(())
    }
}

/// Registry with `mock` bound to `dns`; construction requires `MOCK_TOKEN`
pub fn registry(dns: Arc<MockDns>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::with_builtin();
    registry.register("mock", move |credentials, _settings| {
        credentials.require(&[MOCK_TOKEN_KEY])?;
        dns.constructed.fetch_add(1, Ordering::SeqCst);
        *dns.credentials.lock() = credentials
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(dns.clone() as Arc<dyn DnsProvider>)
    });
    registry
}

// ============================================================================
// In-memory host
// ============================================================================

pub struct MemoryHost {
    pub leader: bool,
    pub secrets: BTreeMap<String, BTreeMap<String, String>>,
    pub requests: Vec<CertificateSigningRequest>,
    pub published: Mutex<Vec<IssuedCertificateBundle>>,
    pub statuses: Mutex<Vec<UnitStatus>>,
    pub list_calls: AtomicUsize,
    pub refuse_publish: bool,
}

impl MemoryHost {
    pub fn new(requests: Vec<CertificateSigningRequest>) -> Self {
        let mut secret = BTreeMap::new();
        secret.insert("mock-token".to_string(), "t0ken".to_string());

        let mut secrets = BTreeMap::new();
        secrets.insert(SECRET_ID.to_string(), secret);

        Self {
            leader: true,
            secrets,
            requests,
            published: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            refuse_publish: false,
        }
    }

    pub fn published_ids(&self) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .map(|b| b.correlation_id.to_string())
            .collect()
    }

    pub fn last_status(&self) -> Option<UnitStatus> {
        self.statuses.lock().last().cloned()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl SecretStore for MemoryHost {
    fn secret(&self, id: &SecretRef) -> Result<Option<BTreeMap<String, String>>, HostError> {
        Ok(self.secrets.get(id.as_str()).cloned())
    }
}

impl RequestSource for MemoryHost {
    fn list_outstanding(&self) -> Result<Vec<CertificateSigningRequest>, HostError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let published = self.published_ids();
        Ok(self
            .requests
            .iter()
            .filter(|r| !published.contains(&r.correlation_id.to_string()))
            .cloned()
            .collect())
    }

    fn publish(
        &self,
        correlation_id: &CorrelationId,
        bundle: &IssuedCertificateBundle,
    ) -> Result<(), HostError> {
        if self.refuse_publish {
            return Err(HostError::UnknownRelation(
                correlation_id.relation().to_string(),
            ));
        }
        self.published.lock().push(bundle.clone());
        Ok(())
    }
}

impl UnitStatusSink for MemoryHost {
    fn set_status(&self, status: &UnitStatus) -> Result<(), HostError> {
        self.statuses.lock().push(status.clone());
        Ok(())
    }
}

impl Leadership for MemoryHost {
    fn is_leader(&self) -> bool {
        self.leader
    }
}

/// Everything a test needs to drive and inspect a pass
pub struct Harness {
    pub reconciler: Reconciler<MemoryHost>,
    pub ca: Arc<CaState>,
    pub issuer_pem: String,
    pub dns: Arc<MockDns>,
}

impl Harness {
    pub fn new(host: MemoryHost) -> Self {
        Self::with_ca(host, MockCa::new())
    }

    pub fn with_ca(host: MemoryHost, ca: MockCa) -> Self {
        let dns = Arc::new(MockDns::default());
        let state = ca.state.clone();
        let issuer_pem = ca.issuer_pem().to_string();
        Self {
            reconciler: Reconciler::new(
                host,
                AccountManager::new(Arc::new(ca)),
                registry(dns.clone()),
            ),
            ca: state,
            issuer_pem,
            dns,
        }
    }

    pub fn host(&self) -> &MemoryHost {
        self.reconciler.host()
    }
}
