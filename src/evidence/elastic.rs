//! Elasticsearch evidence source: range query over an index pattern.

use super::{EvidenceRecord, EvidenceSource};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

const MAX_HITS: usize = 1000;

pub struct ElasticsearchSource {
    client: reqwest::Client,
    host: String,
    index_pattern: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchSource {
    pub fn new(
        host: String,
        index_pattern: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build HTTP client"),
            host,
            index_pattern: index_pattern.unwrap_or_else(|| "logs-*".to_string()),
            username,
            password,
        }
    }
}

/// Flatten a `_search` response into evidence records. Hits without a
/// parseable `@timestamp` are dropped; a missing level defaults to info.
fn records_from_response(body: &serde_json::Value) -> Vec<EvidenceRecord> {
    let hits = body
        .pointer("/hits/hits")
        .and_then(|h| h.as_array())
        .map(|a| a.as_slice())
        .unwrap_or_default();

    let mut records = Vec::new();
    for hit in hits {
        let Some(doc) = hit.get("_source") else {
            continue;
        };
        let Some(timestamp) = doc
            .get("@timestamp")
            .and_then(|t| t.as_str())
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
        else {
            continue;
        };

        let index = hit
            .get("_index")
            .and_then(|i| i.as_str())
            .unwrap_or("unknown");
        let level = doc
            .get("level")
            .and_then(|l| l.as_str())
            .unwrap_or("info")
            .to_lowercase();
        let message = doc
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| doc.to_string());

        let mut metadata = BTreeMap::new();
        metadata.insert("index".to_string(), index.to_string());

        records.push(EvidenceRecord {
            timestamp,
            source: format!("es/{index}"),
            level,
            message,
            metadata,
        });
    }
    records
}

#[async_trait::async_trait]
impl EvidenceSource for ElasticsearchSource {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn gather(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _filters: &BTreeMap<String, String>,
    ) -> Result<Vec<EvidenceRecord>> {
        let query = json!({
            "query": {
                "bool": {
                    "must": [{
                        "range": {
                            "@timestamp": {
                                "gte": start.to_rfc3339(),
                                "lte": end.to_rfc3339(),
                            }
                        }
                    }]
                }
            },
            "sort": [{"@timestamp": "desc"}],
            "size": MAX_HITS,
        });

        let url = format!("http://{}/{}/_search", self.host, self.index_pattern);
        let mut request = self.client.post(&url).json(&query);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let resp = request.send().await.context("elasticsearch query failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("elasticsearch returned {}", resp.status());
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .context("invalid elasticsearch response")?;

        Ok(records_from_response(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_hits_become_records() {
        let body = json!({
            "hits": {
                "hits": [
                    {
                        "_index": "logs-2024.05.01",
                        "_source": {
                            "@timestamp": "2024-05-01T10:00:01Z",
                            "level": "ERROR",
                            "message": "oom killed"
                        }
                    },
                    {
                        "_index": "logs-2024.05.01",
                        "_source": {"message": "no timestamp, dropped"}
                    }
                ]
            }
        });

        let records = records_from_response(&body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "es/logs-2024.05.01");
        assert_eq!(records[0].level, "error");
        assert_eq!(records[0].message, "oom killed");
    }

    #[test]
    fn empty_response_yields_no_records() {
        assert!(records_from_response(&json!({})).is_empty());
    }
}
