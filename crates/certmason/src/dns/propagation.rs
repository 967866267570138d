//! DNS propagation checking for DNS-01 challenges
//!
//! After a provider publishes a TXT record the solver waits here before
//! telling the CA the challenge is ready. With verification disabled only the
//! initial delay applies.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use certmason_config::PropagationSettings;

use super::provider::{challenge_record_fqdn, DnsProviderError, DnsResult};

/// Propagation timing, in resolved durations
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationConfig {
    pub initial_delay: Duration,
    pub check_interval: Duration,
    pub timeout: Duration,
    pub verify: bool,
}

impl From<&PropagationSettings> for PropagationConfig {
    fn from(settings: &PropagationSettings) -> Self {
        Self {
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            check_interval: Duration::from_secs(settings.check_interval_secs),
            timeout: Duration::from_secs(settings.timeout_secs),
            verify: settings.verify,
        }
    }
}

/// Waits for challenge TXT records to become visible
pub struct PropagationChecker {
    config: PropagationConfig,
    resolver: Option<TokioAsyncResolver>,
}

impl PropagationChecker {
    pub fn new(settings: &PropagationSettings) -> Self {
        let config = PropagationConfig::from(settings);
        let resolver = config
            .verify
            .then(|| Self::create_resolver(settings));
        Self { config, resolver }
    }

    fn create_resolver(settings: &PropagationSettings) -> TokioAsyncResolver {
        let resolver_config = resolver_config(&settings.nameservers);

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 3;
        // Stale negative answers would hide the new record
        opts.cache_size = 0;

        TokioAsyncResolver::tokio(resolver_config, opts)
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Wait until `_acme-challenge.<domain>` carries `expected_value`
    pub async fn wait_for(&self, domain: &str, expected_value: &str) -> DnsResult<()> {
        let record_name = challenge_record_fqdn(domain);
        let start = Instant::now();

        if !self.config.initial_delay.is_zero() {
            debug!(
                record = %record_name,
                delay_secs = self.config.initial_delay.as_secs(),
                "Waiting before propagation check"
            );
            tokio::time::sleep(self.config.initial_delay).await;
        }

        let Some(resolver) = &self.resolver else {
            return Ok(());
        };

        let deadline = start + self.config.timeout;
        loop {
            match Self::check_record(resolver, &record_name, expected_value).await {
                Ok(true) => {
                    debug!(
                        record = %record_name,
                        elapsed_secs = start.elapsed().as_secs(),
                        "DNS propagation confirmed"
                    );
                    return Ok(());
                }
                Ok(false) => trace!(record = %record_name, "Record not yet propagated"),
                Err(e) => warn!(record = %record_name, error = %e, "DNS lookup error"),
            }

            if Instant::now() >= deadline {
                return Err(DnsProviderError::PropagationTimeout {
                    record: record_name,
                    elapsed_secs: start.elapsed().as_secs(),
                });
            }

            tokio::time::sleep(self.config.check_interval).await;
        }
    }

    async fn check_record(
        resolver: &TokioAsyncResolver,
        record_name: &str,
        expected_value: &str,
    ) -> DnsResult<bool> {
        let fqdn = format!("{}.", record_name);
        match resolver.txt_lookup(fqdn.as_str()).await {
            Ok(records) => Ok(records.iter().any(|record| {
                // Long TXT values arrive split into several strings
                let value: String = record
                    .txt_data()
                    .iter()
                    .map(|data| String::from_utf8_lossy(data))
                    .collect();
                value == expected_value
            })),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(false),
            Err(e) => Err(DnsProviderError::ApiRequest(format!(
                "DNS lookup failed for '{}': {}",
                record_name, e
            ))),
        }
    }
}

impl std::fmt::Debug for PropagationChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationChecker")
            .field("config", &self.config)
            .field("verifying", &self.resolver.is_some())
            .finish()
    }
}

/// Nameservers to query; an empty list uses the host's resolver configuration
fn resolver_config(nameservers: &[IpAddr]) -> ResolverConfig {
    if nameservers.is_empty() {
        return match hickory_resolver::system_conf::read_system_conf() {
            Ok((config, _)) => config,
            Err(e) => {
                warn!(error = %e, "Failed to read system resolver configuration, using defaults");
                ResolverConfig::default()
            }
        };
    }

    let mut config = ResolverConfig::new();
    for ip in nameservers {
        config.add_name_server(NameServerConfig::new(SocketAddr::new(*ip, 53), Protocol::Udp));
    }
    config
}
