//! Ollama-backed root-cause analyzer.

use super::{extract, Analysis, Analyzer};
use crate::incident::Incident;
use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;
use tracing::info;

const SYSTEM_PROMPT: &str = "You are an SRE assistant performing root-cause analysis \
of production incidents. Respond with a JSON object containing: root_cause (string), \
confidence (0-100), evidence (list of log excerpts), affected_components (list), \
timeline (list of {time, event}).";

pub struct OllamaAnalyzer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaAnalyzer {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("failed to build HTTP client"),
            endpoint,
            model,
        }
    }

    fn build_prompt(incident: &Incident, evidence_text: &str) -> String {
        format!(
            "Analyze the following production incident and determine the root cause.\n\n\
## Incident Details\n\
- ID: {}\n\
- Title: {}\n\
- Description: {}\n\
- Severity: {}\n\
- Source: {}\n\
- Triggered: {}\n\
- Labels: {}\n\n\
## Evidence ({} lines)\n\
{}\n",
            incident.id,
            incident.title,
            incident.description,
            incident.severity,
            incident.source,
            incident.triggered_at.to_rfc3339(),
            serde_json::to_string(&incident.labels).unwrap_or_default(),
            evidence_text.lines().count(),
            evidence_text,
        )
    }
}

#[async_trait::async_trait]
impl Analyzer for OllamaAnalyzer {
    async fn analyze(&self, incident: &Incident, evidence_text: &str) -> Result<Analysis> {
        let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "prompt": Self::build_prompt(incident, evidence_text),
            "system": SYSTEM_PROMPT,
            "stream": false,
            "options": {
                "temperature": 0.3,
                "num_predict": 2048,
            },
        });

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("ollama request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("ollama returned {status}: {body}");
        }

        let body: serde_json::Value = resp.json().await.context("invalid ollama response")?;
        let text = body
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or_default();

        let analysis = extract::parse_response(text);
        info!(
            incident = %incident.id,
            confidence = analysis.confidence,
            degraded = analysis.degraded,
            "Ollama analysis complete"
        );
        Ok(analysis)
    }
}
