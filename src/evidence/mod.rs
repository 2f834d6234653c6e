//! Evidence gathering: pluggable timestamped-log sources and the
//! concurrent fan-out aggregator that merges their output.

pub mod aggregator;
pub mod elastic;
pub mod file;
pub mod git;
pub mod kubernetes;

pub use aggregator::Aggregator;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::config::EvidenceSourceConfig;

/// A single timestamped diagnostic record from one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    /// Free-form level tag: error / warning / info / debug.
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl EvidenceRecord {
    /// Render as the line format the analyzer consumes.
    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp.to_rfc3339(),
            self.source,
            self.level.to_uppercase(),
            self.message
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level.as_str(), "error" | "fatal" | "critical")
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.level.as_str(), "warning" | "warn")
    }
}

/// Detect a level tag from raw log line content.
pub fn detect_level(line: &str) -> &'static str {
    let upper = line.to_uppercase();
    if ["ERROR", "FATAL", "CRITICAL", "EXCEPTION"]
        .iter()
        .any(|t| upper.contains(t))
    {
        "error"
    } else if upper.contains("WARN") {
        "warning"
    } else if upper.contains("DEBUG") || upper.contains("TRACE") {
        "debug"
    } else {
        "info"
    }
}

/// A pluggable provider of evidence records over a time window.
#[async_trait::async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Source tag used in merged output and failure logs.
    fn name(&self) -> &str;

    /// Gather records within `[start, end]`, narrowed by the incident's
    /// label filters. A failing source is isolated by the aggregator.
    async fn gather(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<EvidenceRecord>>;
}

/// Build the configured evidence sources. Unknown types are logged and
/// skipped rather than failing startup.
pub fn build_sources(configs: &[EvidenceSourceConfig]) -> Vec<Arc<dyn EvidenceSource>> {
    let mut sources: Vec<Arc<dyn EvidenceSource>> = Vec::new();
    for cfg in configs {
        match cfg.source_type.as_str() {
            "file" => sources.push(Arc::new(file::FileSource::new(cfg.paths.clone()))),
            "git" => sources.push(Arc::new(git::GitHistorySource::new(
                cfg.repos.clone(),
                cfg.max_commits.unwrap_or(20),
            ))),
            "kubernetes" | "k8s" => sources.push(Arc::new(kubernetes::KubernetesLogSource::new(
                cfg.namespaces.clone(),
                cfg.context.clone(),
            ))),
            "elasticsearch" | "es" => match &cfg.host {
                Some(host) => sources.push(Arc::new(elastic::ElasticsearchSource::new(
                    host.clone(),
                    cfg.index_pattern.clone(),
                    cfg.username.clone(),
                    cfg.password.clone(),
                ))),
                None => warn!("Elasticsearch evidence source missing host, skipping"),
            },
            other => warn!(source_type = %other, "Unknown evidence source type, skipping"),
        }
    }
    sources
}
