//! DNS-01 challenge support
//!
//! # Architecture
//!
//! - [`CredentialResolver`] - Resolves and normalizes provider credentials
//! - [`ProviderRegistry`] - Maps plugin ids to provider constructors
//! - [`ChallengeSolver`] - Binds the selected provider into the ACME session
//! - [`Dns01Solver`] - Presents and cleans up challenge records
//! - [`PropagationChecker`] - Waits for records to become visible
//!
//! # Providers
//!
//! - [`HetznerProvider`] - Hetzner DNS API
//! - [`CloudflareProvider`] - Cloudflare API v4
//! - [`WebhookProvider`] - Operator-run HTTP endpoint

pub mod credentials;
mod error;
pub mod propagation;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod solver;

pub use credentials::{normalize_key, CredentialResolver, CredentialSet, EnvScope};
pub use error::DnsError;
pub use propagation::{PropagationChecker, PropagationConfig};
pub use provider::{
    challenge_record_fqdn, dns01_txt_value, DnsProvider, DnsProviderError, DnsResult, RecordBook,
};
pub use providers::{CloudflareProvider, HetznerProvider, WebhookProvider};
pub use registry::{ProviderConstructor, ProviderRegistry, ProviderSettings};
pub use solver::{ChallengeSolver, Dns01Solver};
