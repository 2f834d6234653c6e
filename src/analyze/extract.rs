//! Best-effort structured extraction from a free-text provider response.
//!
//! Providers are asked for JSON but do not reliably produce it. Extraction
//! tries, in order: a fenced ```json block, a bare JSON object containing
//! "root_cause", then labelled-line scanning. The last resort keeps the raw
//! text and marks the result degraded.

use super::{Analysis, TimelineEvent, DEFAULT_CONFIDENCE};
use serde::Deserialize;

#[derive(Deserialize)]
struct WireAnalysis {
    root_cause: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    affected_components: Vec<String>,
    #[serde(default)]
    timeline: Vec<TimelineEvent>,
}

impl WireAnalysis {
    fn into_analysis(self, raw: &str) -> Analysis {
        Analysis {
            root_cause: self.root_cause,
            confidence: self
                .confidence
                .map(|c| c.clamp(0.0, 100.0) as u8)
                .unwrap_or(DEFAULT_CONFIDENCE),
            evidence: self.evidence,
            affected_components: self.affected_components,
            timeline: self.timeline,
            raw_response: Some(raw.to_string()),
            degraded: false,
        }
    }
}

/// Parse a provider response into an [`Analysis`]. Never fails: structure
/// that cannot be recovered yields a degraded result with the raw text.
pub fn parse_response(response: &str) -> Analysis {
    if let Some(json) = fenced_json_block(response) {
        if let Ok(wire) = serde_json::from_str::<WireAnalysis>(json) {
            return wire.into_analysis(response);
        }
    }

    if let Some(json) = bare_json_object(response) {
        if let Ok(wire) = serde_json::from_str::<WireAnalysis>(json) {
            return wire.into_analysis(response);
        }
    }

    // Labelled-line fallback.
    let root_cause = extract_labelled(response, "root cause")
        .unwrap_or_else(|| response.chars().take(500).collect());

    Analysis {
        root_cause,
        confidence: extract_confidence(response).unwrap_or(DEFAULT_CONFIDENCE),
        evidence: extract_bullets(response, "evidence"),
        affected_components: extract_bullets(response, "affected"),
        timeline: Vec::new(),
        raw_response: Some(response.to_string()),
        degraded: true,
    }
}

fn fenced_json_block(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

/// Find the innermost-balanced object that mentions "root_cause".
fn bare_json_object(text: &str) -> Option<&str> {
    let key = text.find("\"root_cause\"")?;
    let open = text[..key].rfind('{')?;
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..open + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// `Root cause: <rest of line>` (case-insensitive, optional `**` markers).
fn extract_labelled(text: &str, label: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let pos = lower.find(&label.to_lowercase())?;
    // Offsets in the lowered text only line up for ASCII input; `get`
    // rejects the rest instead of slicing mid-character.
    let tail = text.get(pos + label.len()..)?;
    let line = tail.lines().next()?;
    let value = line.trim_start_matches(['*', ':', ' ']).trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// First `N%` figure in the text.
fn extract_confidence(text: &str) -> Option<u8> {
    let percent = text.find('%')?;
    let digits: String = text[..percent]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse::<u32>().ok().map(|v| v.min(100) as u8)
}

/// Bullet items following a section header, capped at 5.
fn extract_bullets(text: &str, section: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let Some(section_text) = lower
        .find(&section.to_lowercase())
        .and_then(|pos| text.get(pos..))
    else {
        return Vec::new();
    };

    section_text
        .lines()
        .skip(1)
        .take_while(|l| {
            let t = l.trim_start();
            t.starts_with('-') || t.starts_with('*') || t.starts_with('•') || t.is_empty()
        })
        .filter_map(|l| {
            let t = l.trim_start().trim_start_matches(['-', '*', '•']).trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .take(5)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_json() {
        let response = r#"Here is my analysis:
```json
{"root_cause": "OOM kill on api pods", "confidence": 85, "evidence": ["oom killer invoked"], "affected_components": ["api"]}
```"#;
        let a = parse_response(response);
        assert_eq!(a.root_cause, "OOM kill on api pods");
        assert_eq!(a.confidence, 85);
        assert!(!a.degraded);
        assert_eq!(a.evidence, vec!["oom killer invoked"]);
    }

    #[test]
    fn parses_bare_json_object() {
        let response = r#"Analysis follows {"root_cause": "disk full", "confidence": 70} done"#;
        let a = parse_response(response);
        assert_eq!(a.root_cause, "disk full");
        assert_eq!(a.confidence, 70);
        assert!(!a.degraded);
    }

    #[test]
    fn falls_back_to_labelled_lines() {
        let response = "\
**Root cause**: database connection pool exhausted\n\
Confidence: 72%\n\
Evidence:\n\
- pool exhausted at 10:00\n\
- 503s from api gateway\n";
        let a = parse_response(response);
        assert_eq!(a.root_cause, "database connection pool exhausted");
        assert_eq!(a.confidence, 72);
        assert_eq!(a.evidence.len(), 2);
        assert!(a.degraded);
        assert!(a.raw_response.is_some());
    }

    #[test]
    fn unstructured_text_is_degraded_with_default_confidence() {
        let a = parse_response("the model rambled with no structure at all");
        assert!(a.degraded);
        assert_eq!(a.confidence, DEFAULT_CONFIDENCE);
        assert!(a.raw_response.is_some());
    }

    #[test]
    fn confidence_is_clamped() {
        let a = parse_response("Root cause: x\nI am 250% sure");
        assert_eq!(a.confidence, 100);
    }
}
