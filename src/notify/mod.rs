//! Lifecycle notifications. Channel failures are logged, never allowed to
//! fail the pipeline.

pub mod teams;
pub mod webhook;

use crate::incident::{Incident, Severity};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::NotifyChannelConfig;

/// A single delivery channel (Slack-compatible webhook, log, ...).
#[async_trait::async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one message. Returns false on failure; never errors.
    async fn deliver(&self, message: &Value) -> bool;
}

/// Log-only channel, always configured as a floor so every lifecycle event
/// is at least observable in the daemon logs.
struct LogChannel;

#[async_trait::async_trait]
impl NotifyChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, message: &Value) -> bool {
        debug!(payload = %message, "Notification");
        true
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#FF0000",
        Severity::High => "#FF6B00",
        Severity::Medium => "#FFB800",
        Severity::Low => "#00B8FF",
        Severity::Info => "#808080",
    }
}

/// Fans lifecycle events out to every configured channel.
#[derive(Clone)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
}

impl Notifier {
    pub fn new(configs: &[NotifyChannelConfig]) -> Self {
        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![Arc::new(LogChannel)];
        for cfg in configs {
            match cfg.channel_type.as_str() {
                "webhook" => match &cfg.url {
                    Some(url) => channels.push(Arc::new(webhook::WebhookChannel::new(
                        url.clone(),
                        cfg.channel.clone(),
                    ))),
                    None => warn!("Webhook notification channel missing url, skipping"),
                },
                "teams" => match &cfg.url {
                    Some(url) => channels.push(Arc::new(teams::TeamsChannel::new(url.clone()))),
                    None => warn!("Teams notification channel missing url, skipping"),
                },
                "log" => {} // already present
                other => warn!(channel_type = %other, "Unknown notification channel type, skipping"),
            }
        }
        Self { channels }
    }

    #[cfg(test)]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    async fn dispatch(&self, message: Value) -> bool {
        let mut all_ok = true;
        for channel in &self.channels {
            if !channel.deliver(&message).await {
                warn!(channel = channel.name(), "Notification delivery failed");
                all_ok = false;
            }
        }
        all_ok
    }

    pub async fn incident_triggered(&self, incident: &Incident) -> bool {
        self.dispatch(json!({
            "event": "incident_triggered",
            "color": severity_color(incident.severity),
            "title": format!("Incident Detected: {}", incident.title),
            "text": incident.description,
            "fields": {
                "severity": incident.severity.as_str().to_uppercase(),
                "source": incident.source,
                "id": incident.id,
                "status": "Analyzing...",
            },
        }))
        .await
    }

    pub async fn analysis_complete(&self, incident: &Incident) -> bool {
        let analysis = incident.analysis.as_ref();
        let fixes: Vec<String> = incident
            .suggested_fixes
            .iter()
            .take(3)
            .map(|f| format!("{} ({:?} risk)", f.title, f.risk))
            .collect();

        self.dispatch(json!({
            "event": "analysis_complete",
            "color": "#00B8FF",
            "title": format!("Analysis Complete: {}", incident.title),
            "fields": {
                "root_cause": analysis.map(|a| a.root_cause.as_str()).unwrap_or("Unknown"),
                "confidence": analysis.map(|a| a.confidence).unwrap_or(0),
                "suggested_fixes": if fixes.is_empty() {
                    vec!["No suggestions available".to_string()]
                } else {
                    fixes
                },
                "id": incident.id,
            },
        }))
        .await
    }

    pub async fn incident_resolved(&self, incident: &Incident) -> bool {
        let mttr = incident
            .mttr_seconds()
            .map(crate::stats::format_duration)
            .unwrap_or_else(|| "Unknown".to_string());

        self.dispatch(json!({
            "event": "incident_resolved",
            "color": "#36A64F",
            "title": format!("Incident Resolved: {}", incident.title),
            "fields": {
                "id": incident.id,
                "resolution_time": mttr,
            },
        }))
        .await
    }

    pub async fn pipeline_error(&self, incident: &Incident, error: &str) -> bool {
        self.dispatch(json!({
            "event": "pipeline_error",
            "color": "#FF0000",
            "title": format!("Incident processing failed: {}", incident.title),
            "fields": {
                "id": incident.id,
                "status": incident.status.as_str(),
                "error": error,
            },
        }))
        .await
    }
}
