//! Webhook payload parsers for the supported monitoring vendors.
//!
//! Each parser extracts the minimal common field set (title, description,
//! severity, labels) and derives a deterministic incident identity: the
//! vendor's own alert id where one exists, a content fingerprint otherwise.
//! Unknown source tags fall back to the generic parser.

use super::{Incident, ParseError, Severity};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Parse a webhook payload from the given source into a candidate incident.
pub fn parse(source_tag: &str, payload: Value) -> Result<Incident, ParseError> {
    match source_tag {
        "pagerduty" => parse_pagerduty(payload),
        "prometheus" | "alertmanager" => parse_prometheus(payload),
        "datadog" => parse_datadog(payload),
        "grafana" => parse_grafana(payload),
        _ => parse_generic(payload),
    }
}

/// Short content fingerprint for payloads without a vendor-supplied id.
/// serde_json::Value maps are key-sorted, so serialization is canonical.
fn fingerprint(value: &Value) -> String {
    let canonical = serde_json::to_string(value).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..12].to_string()
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

fn labels_from_object(value: &Value) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    if let Some(map) = value.as_object() {
        for (k, v) in map {
            if let Some(s) = v.as_str() {
                labels.insert(k.clone(), s.to_string());
            }
        }
    }
    labels
}

fn parse_pagerduty(payload: Value) -> Result<Incident, ParseError> {
    let data = payload
        .get("event")
        .and_then(|e| e.get("data"))
        .cloned()
        .unwrap_or(Value::Null);

    let id = match str_at(&data, &["id"]) {
        Some(id) => format!("pd-{}", id),
        None => format!("pd-{}", fingerprint(&payload)),
    };

    let severity = match str_at(&data, &["urgency"]).unwrap_or("info") {
        "critical" => Severity::Critical,
        "error" => Severity::High,
        "warning" => Severity::Medium,
        "info" => Severity::Low,
        _ => Severity::Medium,
    };

    let mut labels = BTreeMap::new();
    if let Some(service) = str_at(&data, &["service", "name"]) {
        labels.insert("service".to_string(), service.to_string());
    }
    if let Some(policy) = str_at(&data, &["escalation_policy", "name"]) {
        labels.insert("escalation_policy".to_string(), policy.to_string());
    }

    Ok(Incident::new(
        id,
        str_at(&data, &["title"])
            .unwrap_or("Unknown PagerDuty Incident")
            .to_string(),
        str_at(&data, &["description"]).unwrap_or("").to_string(),
        severity,
        "pagerduty".to_string(),
        labels,
        payload,
    ))
}

fn parse_prometheus(payload: Value) -> Result<Incident, ParseError> {
    // AlertManager batches alerts; we admit the first and keep the rest in
    // the raw payload.
    let alert = payload
        .get("alerts")
        .and_then(|a| a.as_array())
        .and_then(|a| a.first())
        .cloned()
        .ok_or_else(|| ParseError::InvalidPayload {
            source_tag: "prometheus".to_string(),
            reason: "no alerts in payload".to_string(),
        })?;

    let labels_value = alert.get("labels").cloned().unwrap_or(Value::Null);
    let labels = labels_from_object(&labels_value);

    let id = match str_at(&alert, &["fingerprint"]) {
        Some(fp) => format!("prom-{}", fp),
        None => format!("prom-{}", fingerprint(&labels_value)),
    };

    let severity = match labels.get("severity").map(String::as_str).unwrap_or("warning") {
        "critical" => Severity::Critical,
        "warning" => Severity::Medium,
        "info" => Severity::Low,
        _ => Severity::Medium,
    };

    let alert_name = labels
        .get("alertname")
        .map(String::as_str)
        .unwrap_or("UnknownAlert");
    let title = format!("[{}] {}", severity.as_str().to_uppercase(), alert_name);

    let description = str_at(&alert, &["annotations", "description"])
        .or_else(|| str_at(&alert, &["annotations", "summary"]))
        .unwrap_or("")
        .to_string();

    Ok(Incident::new(
        id,
        title,
        description,
        severity,
        "prometheus".to_string(),
        labels,
        payload,
    ))
}

fn parse_datadog(payload: Value) -> Result<Incident, ParseError> {
    let id = match str_at(&payload, &["alert_id"]) {
        Some(id) => format!("dd-{}", id),
        None => format!("dd-{}", fingerprint(&payload)),
    };

    // Datadog priorities are P1 (1) through P5 (5), worst first.
    let priority = payload
        .get("priority")
        .and_then(|p| p.as_i64().or_else(|| p.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(3);
    let severity = match priority {
        1 => Severity::Critical,
        2 => Severity::High,
        3 => Severity::Medium,
        4 => Severity::Low,
        5 => Severity::Info,
        _ => Severity::Medium,
    };

    let mut labels = BTreeMap::new();
    if let Some(host) = str_at(&payload, &["host"]) {
        labels.insert("host".to_string(), host.to_string());
    }
    if let Some(scope) = str_at(&payload, &["scope"]) {
        labels.insert("scope".to_string(), scope.to_string());
    }

    Ok(Incident::new(
        id,
        str_at(&payload, &["title"])
            .unwrap_or("Unknown Datadog Alert")
            .to_string(),
        str_at(&payload, &["body"]).unwrap_or("").to_string(),
        severity,
        "datadog".to_string(),
        labels,
        payload,
    ))
}

fn parse_grafana(payload: Value) -> Result<Incident, ParseError> {
    let alert = payload
        .get("alerts")
        .and_then(|a| a.as_array())
        .and_then(|a| a.first())
        .cloned()
        .unwrap_or(Value::Null);

    let id = match str_at(&payload, &["ruleId"])
        .or_else(|| str_at(&alert, &["fingerprint"]))
    {
        Some(id) => format!("gf-{}", id),
        None => format!("gf-{}", fingerprint(&payload)),
    };

    let severity = match str_at(&payload, &["state"]).unwrap_or("alerting") {
        "alerting" => Severity::High,
        "no_data" => Severity::Medium,
        "ok" => Severity::Info,
        _ => Severity::Medium,
    };

    let labels = labels_from_object(&alert.get("labels").cloned().unwrap_or(Value::Null));

    let title = str_at(&payload, &["title"])
        .map(str::to_string)
        .or_else(|| labels.get("alertname").cloned())
        .unwrap_or_else(|| "Unknown Grafana Alert".to_string());

    Ok(Incident::new(
        id,
        title,
        str_at(&payload, &["message"]).unwrap_or("").to_string(),
        severity,
        "grafana".to_string(),
        labels,
        payload,
    ))
}

fn parse_generic(payload: Value) -> Result<Incident, ParseError> {
    // No vendor id to lean on: the content fingerprint keeps identity
    // deterministic so duplicate storms dedup correctly.
    let id = format!("custom-{}", fingerprint(&payload));

    let severity = match str_at(&payload, &["severity"]) {
        Some(s) => Severity::parse(s)?,
        None => Severity::Medium,
    };

    let title = str_at(&payload, &["title"])
        .or_else(|| str_at(&payload, &["name"]))
        .unwrap_or("Unknown Incident")
        .to_string();
    let description = str_at(&payload, &["description"])
        .or_else(|| str_at(&payload, &["message"]))
        .unwrap_or("")
        .to_string();

    let labels = labels_from_object(&payload.get("labels").cloned().unwrap_or(Value::Null));

    Ok(Incident::new(
        id,
        title,
        description,
        severity,
        "custom".to_string(),
        labels,
        payload,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prometheus_uses_fingerprint_identity() {
        let payload = json!({
            "alerts": [{
                "fingerprint": "abc123",
                "labels": {"alertname": "HighMemory", "severity": "critical", "pod": "api-1"},
                "annotations": {"description": "memory above 95%"}
            }]
        });
        let inc = parse("prometheus", payload).unwrap();
        assert_eq!(inc.id, "prom-abc123");
        assert_eq!(inc.severity, Severity::Critical);
        assert_eq!(inc.title, "[CRITICAL] HighMemory");
        assert_eq!(inc.labels.get("pod").unwrap(), "api-1");
    }

    #[test]
    fn prometheus_empty_alerts_rejected() {
        let err = parse("prometheus", json!({"alerts": []})).unwrap_err();
        assert!(matches!(err, ParseError::InvalidPayload { .. }));
    }

    #[test]
    fn alertmanager_alias_maps_to_prometheus() {
        let payload = json!({"alerts": [{"fingerprint": "x", "labels": {}}]});
        let inc = parse("alertmanager", payload).unwrap();
        assert_eq!(inc.source, "prometheus");
    }

    #[test]
    fn generic_identity_is_content_deterministic() {
        let payload = json!({"title": "disk full", "severity": "high"});
        let a = parse("generic", payload.clone()).unwrap();
        let b = parse("unrecognized-vendor", payload).unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("custom-"));

        let other = parse("generic", json!({"title": "disk almost full"})).unwrap();
        assert_ne!(a.id, other.id);
    }

    #[test]
    fn generic_rejects_unknown_severity() {
        let err = parse("generic", json!({"title": "x", "severity": "panic"})).unwrap_err();
        assert!(matches!(err, ParseError::UnknownSeverity(_)));
    }

    #[test]
    fn datadog_priority_maps_to_severity() {
        let inc = parse(
            "datadog",
            json!({"alert_id": "42", "title": "CPU", "priority": 1}),
        )
        .unwrap();
        assert_eq!(inc.id, "dd-42");
        assert_eq!(inc.severity, Severity::Critical);
    }

    #[test]
    fn grafana_state_maps_to_severity() {
        let inc = parse(
            "grafana",
            json!({"ruleId": "7", "state": "ok", "title": "Latency"}),
        )
        .unwrap();
        assert_eq!(inc.id, "gf-7");
        assert_eq!(inc.severity, Severity::Info);
    }
}
