//! Daemon configuration, loaded from a TOML file with sensible defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub evidence: EvidenceConfig,
    pub analysis: AnalysisConfig,
    pub notifications: NotificationsConfig,
    pub postmortem: PostmortemConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            evidence: EvidenceConfig::default(),
            analysis: AnalysisConfig::default(),
            notifications: NotificationsConfig::default(),
            postmortem: PostmortemConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file is not an error;
    /// defaults apply and a warning is logged.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            warn!(%path, "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {path}"))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {path}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/incidents.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Trailing window gathered per incident.
    pub lookback_minutes: i64,
    /// Cap on rendered evidence lines handed to the analyzer.
    pub max_lines: usize,
    pub sources: Vec<EvidenceSourceConfig>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: 60,
            max_lines: 500,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceSourceConfig {
    #[serde(rename = "type")]
    pub source_type: String,
    /// Glob patterns for `file` sources.
    #[serde(default)]
    pub paths: Vec<String>,
    /// Repository paths for `git` sources.
    #[serde(default)]
    pub repos: Vec<String>,
    #[serde(default)]
    pub max_commits: Option<usize>,
    /// Namespaces for `kubernetes` sources.
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Optional kubectl context for `kubernetes` sources.
    #[serde(default)]
    pub context: Option<String>,
    /// `host:port` for `elasticsearch` sources.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub index_pattern: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// `heuristic` (default, offline) or `ollama`.
    pub provider: String,
    pub endpoint: String,
    pub model: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: "heuristic".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationsConfig {
    pub channels: Vec<NotifyChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyChannelConfig {
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Target channel name for chat-style webhooks.
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostmortemConfig {
    pub enabled: bool,
}

impl Default for PostmortemConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load("/nonexistent/incidentd.toml").unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.evidence.lookback_minutes, 60);
        assert_eq!(cfg.evidence.max_lines, 500);
        assert_eq!(cfg.analysis.provider, "heuristic");
        assert!(cfg.postmortem.enabled);
    }

    #[test]
    fn parses_full_config() {
        let raw = r##"
[server]
bind = "127.0.0.1:9000"

[storage]
path = "/var/lib/incidentd/incidents.db"

[evidence]
lookback_minutes = 30
max_lines = 200

[[evidence.sources]]
type = "file"
paths = ["/var/log/app/*.log"]

[[evidence.sources]]
type = "git"
repos = ["/srv/app"]
max_commits = 10

[[evidence.sources]]
type = "kubernetes"
namespaces = ["prod", "staging"]
context = "prod-cluster"

[[evidence.sources]]
type = "elasticsearch"
host = "es.internal:9200"
index_pattern = "app-logs-*"

[analysis]
provider = "ollama"
endpoint = "http://ollama:11434"
model = "llama3.2:3b"

[[notifications.channels]]
type = "webhook"
url = "https://hooks.slack.com/services/T/B/X"
channel = "#oncall"

[postmortem]
enabled = false
"##;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.evidence.sources.len(), 4);
        assert_eq!(cfg.evidence.sources[0].source_type, "file");
        assert_eq!(cfg.evidence.sources[1].max_commits, Some(10));
        assert_eq!(cfg.evidence.sources[2].namespaces, vec!["prod", "staging"]);
        assert_eq!(
            cfg.evidence.sources[3].host.as_deref(),
            Some("es.internal:9200")
        );
        assert_eq!(cfg.analysis.provider, "ollama");
        assert_eq!(cfg.notifications.channels.len(), 1);
        assert!(!cfg.postmortem.enabled);
    }
}
