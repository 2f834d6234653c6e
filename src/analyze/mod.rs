//! Root-cause analysis capability.
//!
//! The orchestrator only depends on the [`Analyzer`] trait. The default
//! implementation is a keyword heuristic over the merged evidence; an
//! Ollama-backed provider can be configured instead. Either way the
//! pipeline receives a best-effort [`Analysis`], degraded if necessary,
//! never an aborted stage.

pub mod extract;
pub mod ollama;

use crate::config::AnalysisConfig;
use crate::incident::Incident;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_CONFIDENCE: u8 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub time: String,
    pub event: String,
}

/// Structured root-cause hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub root_cause: String,
    /// 0-100.
    pub confidence: u8,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub affected_components: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,
    /// Raw provider output, kept when structured extraction was lossy.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub raw_response: Option<String>,
    /// True when the capability failed and this is a placeholder result.
    #[serde(default)]
    pub degraded: bool,
}

impl Analysis {
    /// Placeholder result recording a capability failure.
    pub fn degraded(reason: &str) -> Self {
        Self {
            root_cause: format!("Analysis unavailable: {reason}"),
            confidence: 0,
            evidence: Vec::new(),
            affected_components: Vec::new(),
            timeline: Vec::new(),
            raw_response: Some(reason.to_string()),
            degraded: true,
        }
    }
}

#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, incident: &Incident, evidence_text: &str) -> Result<Analysis>;
}

/// Build the configured analyzer; unknown providers fall back to the
/// heuristic matcher rather than failing startup.
pub fn build_analyzer(config: &AnalysisConfig) -> Arc<dyn Analyzer> {
    match config.provider.as_str() {
        "ollama" => {
            info!(endpoint = %config.endpoint, model = %config.model, "Using Ollama analyzer");
            Arc::new(ollama::OllamaAnalyzer::new(
                config.endpoint.clone(),
                config.model.clone(),
            ))
        }
        "heuristic" => Arc::new(HeuristicAnalyzer),
        other => {
            warn!(provider = %other, "Unknown analysis provider, using heuristic matcher");
            Arc::new(HeuristicAnalyzer)
        }
    }
}

struct FailurePattern {
    name: &'static str,
    needles: &'static [&'static str],
    root_cause: &'static str,
    component: &'static str,
}

/// Keyword signatures for common production failure modes.
const PATTERNS: &[FailurePattern] = &[
    FailurePattern {
        name: "oom_kill",
        needles: &["oom", "out of memory", "killed process", "memory limit"],
        root_cause: "Memory exhaustion - process was OOM killed",
        component: "memory",
    },
    FailurePattern {
        name: "connection_pool",
        needles: &["connection pool", "pool exhausted", "no available connections"],
        root_cause: "Database connection pool exhaustion",
        component: "database",
    },
    FailurePattern {
        name: "disk_full",
        needles: &["no space left", "disk full", "enospc"],
        root_cause: "Disk space exhaustion",
        component: "storage",
    },
    FailurePattern {
        name: "timeout",
        needles: &["timeout", "timed out", "deadline exceeded"],
        root_cause: "Request timeout - service not responding in time",
        component: "network",
    },
    FailurePattern {
        name: "crash_loop",
        needles: &["crashloopbackoff", "restarting", "exit code"],
        root_cause: "Container crash loop - application failing to start",
        component: "application",
    },
    FailurePattern {
        name: "ssl_cert",
        needles: &["certificate", "ssl", "tls", "x509"],
        root_cause: "SSL/TLS certificate issue",
        component: "security",
    },
    FailurePattern {
        name: "dns",
        needles: &["dns", "name resolution", "nxdomain", "could not resolve"],
        root_cause: "DNS resolution failure",
        component: "network",
    },
    FailurePattern {
        name: "rate_limit",
        needles: &["rate limit", "429", "too many requests", "throttl"],
        root_cause: "Rate limiting triggered",
        component: "api",
    },
];

/// Offline analyzer: matches evidence against known failure signatures.
/// Always succeeds, so it doubles as the fallback provider.
pub struct HeuristicAnalyzer;

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[async_trait::async_trait]
impl Analyzer for HeuristicAnalyzer {
    async fn analyze(&self, incident: &Incident, evidence_text: &str) -> Result<Analysis> {
        let lower = evidence_text.to_lowercase();

        let mut best: Option<(&FailurePattern, usize)> = None;
        for pattern in PATTERNS {
            let hits: usize = pattern
                .needles
                .iter()
                .map(|n| count_occurrences(&lower, n))
                .sum();
            if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
                best = Some((pattern, hits));
            }
        }

        let analysis = match best {
            Some((pattern, hits)) => {
                let excerpts: Vec<String> = evidence_text
                    .lines()
                    .filter(|l| {
                        let ll = l.to_lowercase();
                        pattern.needles.iter().any(|n| ll.contains(n))
                    })
                    .take(5)
                    .map(str::to_string)
                    .collect();

                let timeline = excerpts
                    .first()
                    .map(|first| {
                        vec![TimelineEvent {
                            time: incident.triggered_at.to_rfc3339(),
                            event: format!("First matching evidence: {first}"),
                        }]
                    })
                    .unwrap_or_default();

                info!(
                    incident = %incident.id,
                    pattern = pattern.name,
                    hits,
                    "Failure signature matched"
                );

                Analysis {
                    root_cause: pattern.root_cause.to_string(),
                    confidence: (40 + hits.min(5) as u8 * 10).min(90),
                    evidence: excerpts,
                    affected_components: vec![pattern.component.to_string()],
                    timeline,
                    raw_response: None,
                    degraded: false,
                }
            }
            None => Analysis {
                root_cause: format!(
                    "No known failure signature matched for '{}'",
                    incident.title
                ),
                confidence: 30,
                evidence: evidence_text
                    .lines()
                    .filter(|l| l.contains("[ERROR]"))
                    .take(5)
                    .map(str::to_string)
                    .collect(),
                affected_components: Vec::new(),
                timeline: Vec::new(),
                raw_response: None,
                degraded: false,
            },
        };

        Ok(analysis)
    }
}
