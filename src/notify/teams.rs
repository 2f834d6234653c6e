//! Microsoft Teams notification channel (MessageCard webhooks).

use super::NotifyChannel;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::error;

pub struct TeamsChannel {
    client: reqwest::Client,
    url: String,
}

impl TeamsChannel {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            url,
        }
    }
}

/// Wrap an internal event message in a Teams MessageCard payload.
pub(super) fn format(message: &Value) -> Value {
    let title = message.get("title").and_then(|t| t.as_str()).unwrap_or("");
    // MessageCard colors have no leading '#'.
    let color = message
        .get("color")
        .and_then(|c| c.as_str())
        .unwrap_or("#808080")
        .trim_start_matches('#');

    let facts: Vec<Value> = message
        .get("fields")
        .and_then(|f| f.as_object())
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    json!({
                        "name": k,
                        "value": match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        },
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "@type": "MessageCard",
        "@context": "http://schema.org/extensions",
        "themeColor": color,
        "summary": title,
        "sections": [{
            "activityTitle": title,
            "text": message.get("text").and_then(|t| t.as_str()).unwrap_or(""),
            "facts": facts,
            "markdown": true,
        }],
    })
}

#[async_trait::async_trait]
impl NotifyChannel for TeamsChannel {
    fn name(&self) -> &str {
        "teams"
    }

    async fn deliver(&self, message: &Value) -> bool {
        let payload = format(message);
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                error!(status = %resp.status(), "Teams notification rejected");
                false
            }
            Err(e) => {
                error!("Teams notification failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_card_shape() {
        let card = format(&json!({
            "title": "Incident Detected: API down",
            "color": "#FF0000",
            "text": "all 500s",
            "fields": {"severity": "CRITICAL", "id": "prom-1"},
        }));

        assert_eq!(card["@type"], "MessageCard");
        assert_eq!(card["themeColor"], "FF0000");
        assert_eq!(card["summary"], "Incident Detected: API down");
        let facts = card["sections"][0]["facts"].as_array().unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().any(|f| f["name"] == "severity"));
    }
}
