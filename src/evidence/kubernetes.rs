//! Kubernetes evidence source: pod logs and cluster events via kubectl.

use super::{detect_level, EvidenceRecord, EvidenceSource};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

pub struct KubernetesLogSource {
    namespaces: Vec<String>,
    context: Option<String>,
}

impl KubernetesLogSource {
    pub fn new(namespaces: Vec<String>, context: Option<String>) -> Self {
        let namespaces = if namespaces.is_empty() {
            vec!["default".to_string()]
        } else {
            namespaces
        };
        Self {
            namespaces,
            context,
        }
    }

    fn kubectl(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("kubectl");
        if let Some(ctx) = &self.context {
            cmd.arg("--context").arg(ctx);
        }
        cmd
    }

    async fn kubectl_json(&self, args: &[&str]) -> Result<serde_json::Value> {
        let output = self
            .kubectl()
            .args(args)
            .arg("-o")
            .arg("json")
            .output()
            .await
            .context("failed to execute kubectl")?;
        if !output.status.success() {
            anyhow::bail!(
                "kubectl {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        serde_json::from_slice(&output.stdout).context("invalid kubectl json output")
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<EvidenceRecord>> {
        let pods = self.kubectl_json(&["get", "pods", "-n", namespace]).await?;
        let since_seconds = (Utc::now() - start).num_seconds().max(1);

        let mut records = Vec::new();
        for pod in items(&pods) {
            let Some(pod_name) = pod.pointer("/metadata/name").and_then(|n| n.as_str()) else {
                continue;
            };
            // Label filter narrows to the pods the alert named.
            if let Some(wanted) = filters.get("pod") {
                if !pod_name.contains(wanted.as_str()) {
                    continue;
                }
            }

            for container in containers(pod) {
                let output = self
                    .kubectl()
                    .args(["logs", pod_name, "-n", namespace, "-c", container.as_str()])
                    .arg(format!("--since={since_seconds}s"))
                    .arg("--timestamps")
                    .output()
                    .await
                    .context("failed to execute kubectl logs")?;
                if !output.status.success() {
                    warn!(
                        pod = %pod_name,
                        container = %container,
                        "kubectl logs failed: {}",
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                    continue;
                }

                for line in String::from_utf8_lossy(&output.stdout).lines() {
                    if let Some(record) = parse_pod_log_line(line, namespace, pod_name, &container)
                    {
                        if record.timestamp >= start && record.timestamp <= end {
                            records.push(record);
                        }
                    }
                }
            }
        }
        Ok(records)
    }

    async fn events(&self, namespace: &str, start: DateTime<Utc>) -> Result<Vec<EvidenceRecord>> {
        let events = self
            .kubectl_json(&["get", "events", "-n", namespace])
            .await?;
        Ok(events_after(&events, namespace, start))
    }
}

fn items(value: &serde_json::Value) -> impl Iterator<Item = &serde_json::Value> {
    value
        .get("items")
        .and_then(|i| i.as_array())
        .map(|a| a.iter())
        .unwrap_or_default()
}

fn containers(pod: &serde_json::Value) -> Vec<String> {
    pod.pointer("/spec/containers")
        .and_then(|c| c.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|c| c.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse one `kubectl logs --timestamps` line:
/// `2024-01-15T10:30:00.123456789Z log message`. Lines without a parseable
/// timestamp cannot be placed in the window and are dropped.
fn parse_pod_log_line(
    line: &str,
    namespace: &str,
    pod: &str,
    container: &str,
) -> Option<EvidenceRecord> {
    let (ts, message) = line.split_once(' ')?;
    let timestamp = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    let message = message.trim();
    if message.is_empty() {
        return None;
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("namespace".to_string(), namespace.to_string());
    metadata.insert("pod".to_string(), pod.to_string());
    metadata.insert("container".to_string(), container.to_string());

    Some(EvidenceRecord {
        timestamp,
        source: format!("k8s/{namespace}/{pod}/{container}"),
        level: detect_level(message).to_string(),
        message: message.to_string(),
        metadata,
    })
}

/// Extract cluster events newer than `start` from `kubectl get events` JSON.
/// Warning-type events map to the warning level, everything else to info.
fn events_after(
    events: &serde_json::Value,
    namespace: &str,
    start: DateTime<Utc>,
) -> Vec<EvidenceRecord> {
    let mut records = Vec::new();
    for event in items(events) {
        let timestamp = event
            .get("lastTimestamp")
            .and_then(|t| t.as_str())
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        if timestamp < start {
            continue;
        }

        let reason = event
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or("Unknown");
        let message = event.get("message").and_then(|m| m.as_str()).unwrap_or("");
        let level = if event.get("type").and_then(|t| t.as_str()) == Some("Warning") {
            "warning"
        } else {
            "info"
        };

        let mut metadata = BTreeMap::new();
        if let Some(kind) = event.pointer("/involvedObject/kind").and_then(|k| k.as_str()) {
            metadata.insert("kind".to_string(), kind.to_string());
        }
        if let Some(name) = event.pointer("/involvedObject/name").and_then(|n| n.as_str()) {
            metadata.insert("name".to_string(), name.to_string());
        }

        records.push(EvidenceRecord {
            timestamp,
            source: format!("k8s-event/{namespace}"),
            level: level.to_string(),
            message: format!("[{reason}] {message}"),
            metadata,
        });
    }
    records
}

#[async_trait::async_trait]
impl EvidenceSource for KubernetesLogSource {
    fn name(&self) -> &str {
        "kubernetes"
    }

    async fn gather(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &BTreeMap<String, String>,
    ) -> Result<Vec<EvidenceRecord>> {
        let mut records = Vec::new();
        for namespace in &self.namespaces {
            match self.pod_logs(namespace, start, end, filters).await {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => warn!(namespace = %namespace, "Pod logs unavailable: {e:#}"),
            }
            match self.events(namespace, start).await {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => warn!(namespace = %namespace, "Cluster events unavailable: {e:#}"),
            }
        }
        Ok(records)
    }
}
