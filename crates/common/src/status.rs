//! Unit status reported to the host after each reconciliation pass.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-valued health signal understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Configuration is valid and the reconciliation loop ran
    Active,
    /// Operator intervention is required before certificates can be issued
    Blocked,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Active => write!(f, "active"),
            StatusKind::Blocked => write!(f, "blocked"),
        }
    }
}

/// Status plus a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub status: StatusKind,
    #[serde(default)]
    pub message: String,
}

impl UnitStatus {
    pub fn active(message: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Active,
            message: message.into(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Blocked,
            message: message.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == StatusKind::Active
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.status)
        } else {
            write!(f, "{}: {}", self.status, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let status = UnitStatus::blocked("invalid config: server is empty");
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(
            json,
            r#"{"status":"blocked","message":"invalid config: server is empty"}"#
        );

        let parsed: UnitStatus = serde_json::from_str(r#"{"status":"active"}"#).unwrap();
        assert!(parsed.is_active());
        assert!(parsed.message.is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(UnitStatus::active("").to_string(), "active");
        assert_eq!(
            UnitStatus::blocked("not the leader").to_string(),
            "blocked: not the leader"
        );
    }
}
