//! Slack-compatible webhook notification channel.

use super::NotifyChannel;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::error;

pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    channel: Option<String>,
}

impl WebhookChannel {
    pub fn new(url: String, channel: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            url,
            channel,
        }
    }

    /// Wrap an internal event message in a Slack attachment payload.
    fn format(&self, message: &Value) -> Value {
        let fields: Vec<Value> = message
            .get("fields")
            .and_then(|f| f.as_object())
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        json!({
                            "title": k,
                            "value": match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            },
                            "short": true,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        json!({
            "username": "incidentd",
            "channel": self.channel.as_deref().unwrap_or("#incidents"),
            "attachments": [{
                "color": message.get("color").and_then(|c| c.as_str()).unwrap_or("#808080"),
                "title": message.get("title").and_then(|t| t.as_str()).unwrap_or(""),
                "text": message.get("text").and_then(|t| t.as_str()).unwrap_or(""),
                "fields": fields,
                "footer": "incidentd",
            }],
        })
    }
}

#[async_trait::async_trait]
impl NotifyChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, message: &Value) -> bool {
        let payload = self.format(message);
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                error!(status = %resp.status(), "Webhook notification rejected");
                false
            }
            Err(e) => {
                error!("Webhook notification failed: {e}");
                false
            }
        }
    }
}
