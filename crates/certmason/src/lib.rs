//! certmason library
//!
//! Issues X.509 certificates for client-supplied CSRs through an ACME CA,
//! proving domain control with DNS-01. Work happens in reconciliation passes:
//! each pass is triggered externally, runs to completion and exits.
//!
//! - **ACME**: per-pass account, orders, finalization and chain handling
//! - **DNS**: credential resolution, provider registry, challenge records
//! - **Host**: secrets, pending requests, published results and unit status
//! - **Reconcile**: the pass itself
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certmason::acme::{AccountManager, InstantAcmeDirectory};
//! use certmason::dns::ProviderRegistry;
//! use certmason::host::FileHost;
//! use certmason::reconcile::Reconciler;
//!
//! let reconciler = Reconciler::new(
//!     FileHost::new("/var/lib/certmason", true),
//!     AccountManager::new(Arc::new(InstantAcmeDirectory)),
//!     ProviderRegistry::with_builtin(),
//! );
//! let report = reconciler.run_pass(&config).await;
//! println!("{}", report.status);
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod dns;
pub mod host;
pub mod reconcile;

// ============================================================================
// Public API Re-exports
// ============================================================================

pub use reconcile::{PassError, PassReport, Reconciler, RequestOutcome};
