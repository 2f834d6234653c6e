//! Incident model and lifecycle orchestration.

pub mod orchestrator;
pub mod parse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::analyze::Analysis;
use crate::respond::SuggestedFix;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid {source_tag} payload: {reason}")]
    InvalidPayload { source_tag: String, reason: String },
    #[error("unknown severity '{0}'")]
    UnknownSeverity(String),
}

/// Incident severity. Ordering follows urgency: Critical is greatest,
/// Info is least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Severity {
    fn rank(self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseError> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(ParseError::UnknownSeverity(other.to_string())),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incident lifecycle status.
///
/// Acknowledged and Mitigating are reserved: they round-trip through storage
/// and the API but no core operation currently transitions into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Triggered,
    Acknowledged,
    Analyzing,
    Mitigating,
    Resolved,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Triggered => "triggered",
            Status::Acknowledged => "acknowledged",
            Status::Analyzing => "analyzing",
            Status::Mitigating => "mitigating",
            Status::Resolved => "resolved",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "acknowledged" => Status::Acknowledged,
            "analyzing" => Status::Analyzing,
            "mitigating" => Status::Mitigating,
            "resolved" => Status::Resolved,
            _ => Status::Triggered,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked incident, from trigger to resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub source: String,
    pub status: Status,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub raw_payload: serde_json::Value,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub suggested_fixes: Vec<SuggestedFix>,
    pub postmortem: Option<String>,
}

impl Incident {
    pub fn new(
        id: String,
        title: String,
        description: String,
        severity: Severity,
        source: String,
        labels: BTreeMap<String, String>,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            title,
            description,
            severity,
            source,
            status: Status::Triggered,
            triggered_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
            labels,
            raw_payload,
            evidence: Vec::new(),
            analysis: None,
            suggested_fixes: Vec::new(),
            postmortem: None,
        }
    }

    /// Resolution time in seconds. Present only once the incident is resolved.
    pub fn mttr_seconds(&self) -> Option<i64> {
        self.resolved_at
            .map(|r| (r - self.triggered_at).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
        assert_eq!(
            [Severity::Low, Severity::Critical, Severity::Medium]
                .iter()
                .max(),
            Some(&Severity::Critical)
        );
    }

    #[test]
    fn severity_parse_round_trips() {
        for s in ["critical", "high", "medium", "low", "info"] {
            assert_eq!(Severity::parse(s).unwrap().as_str(), s);
        }
        assert!(Severity::parse("panic").is_err());
    }

    #[test]
    fn mttr_absent_until_resolved() {
        let mut inc = Incident::new(
            "test-1".into(),
            "t".into(),
            "d".into(),
            Severity::High,
            "generic".into(),
            BTreeMap::new(),
            serde_json::Value::Null,
        );
        assert_eq!(inc.mttr_seconds(), None);

        inc.status = Status::Resolved;
        inc.resolved_at = Some(inc.triggered_at + chrono::Duration::seconds(2733));
        assert_eq!(inc.mttr_seconds(), Some(2733));
    }
}
