//! Built-in DNS provider implementations
//!
//! - [`HetznerProvider`] - Hetzner DNS API
//! - [`CloudflareProvider`] - Cloudflare API v4
//! - [`WebhookProvider`] - Operator-run HTTP endpoint

pub mod cloudflare;
pub mod hetzner;
pub mod webhook;

pub use cloudflare::CloudflareProvider;
pub use hetzner::HetznerProvider;
pub use webhook::{WebhookMode, WebhookProvider};
