//! Common types shared across certmason crates
//!
//! # Module Organization
//!
//! - [`ids`]: Type-safe identifier newtypes (CorrelationId, SecretRef)
//! - [`status`]: Unit status reported back to the host

pub mod ids;
pub mod status;

pub use ids::{CorrelationId, SecretRef};
pub use status::{StatusKind, UnitStatus};
