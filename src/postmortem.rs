//! Postmortem draft generation from a fully analyzed incident.

use crate::incident::Incident;

/// Render a markdown postmortem skeleton. The draft is a starting point
/// for the incident owner, not a finished document.
pub fn draft(incident: &Incident) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Postmortem: {}\n\n", incident.title));
    out.push_str(&format!(
        "- **Incident ID**: {}\n- **Severity**: {}\n- **Source**: {}\n- **Triggered**: {}\n",
        incident.id,
        incident.severity,
        incident.source,
        incident.triggered_at.to_rfc3339(),
    ));
    if let Some(resolved) = incident.resolved_at {
        out.push_str(&format!("- **Resolved**: {}\n", resolved.to_rfc3339()));
    }
    out.push('\n');

    out.push_str("## Summary\n\n");
    if incident.description.is_empty() {
        out.push_str("_TODO: one-paragraph summary of impact._\n\n");
    } else {
        out.push_str(&format!("{}\n\n", incident.description));
    }

    out.push_str("## Root Cause\n\n");
    match &incident.analysis {
        Some(analysis) => {
            out.push_str(&format!(
                "{} (confidence: {}%)\n\n",
                analysis.root_cause, analysis.confidence
            ));
            if !analysis.affected_components.is_empty() {
                out.push_str(&format!(
                    "Affected components: {}\n\n",
                    analysis.affected_components.join(", ")
                ));
            }
        }
        None => out.push_str("_Analysis pending._\n\n"),
    }

    if let Some(analysis) = &incident.analysis {
        if !analysis.timeline.is_empty() {
            out.push_str("## Timeline\n\n");
            for event in &analysis.timeline {
                out.push_str(&format!("- {}: {}\n", event.time, event.event));
            }
            out.push('\n');
        }
    }

    if !incident.suggested_fixes.is_empty() {
        out.push_str("## Remediation\n\n");
        for fix in &incident.suggested_fixes {
            out.push_str(&format!("- [ ] {}: {}\n", fix.title, fix.description));
        }
        out.push('\n');
    }

    out.push_str("## Lessons Learned\n\n_TODO_\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::Analysis;
    use crate::incident::{Incident, Severity};
    use std::collections::BTreeMap;

    #[test]
    fn draft_includes_analysis_and_fixes() {
        let mut incident = Incident::new(
            "prom-1".into(),
            "API down".into(),
            "all 500s".into(),
            Severity::Critical,
            "prometheus".into(),
            BTreeMap::new(),
            serde_json::Value::Null,
        );
        incident.analysis = Some(Analysis {
            root_cause: "OOM kill".into(),
            confidence: 80,
            evidence: vec![],
            affected_components: vec!["memory".into()],
            timeline: vec![],
            raw_response: None,
            degraded: false,
        });

        let text = draft(&incident);
        assert!(text.contains("# Postmortem: API down"));
        assert!(text.contains("OOM kill (confidence: 80%)"));
        assert!(text.contains("Affected components: memory"));
    }

    #[test]
    fn draft_without_analysis_marks_pending() {
        let incident = Incident::new(
            "x".into(),
            "t".into(),
            "".into(),
            Severity::Low,
            "generic".into(),
            BTreeMap::new(),
            serde_json::Value::Null,
        );
        let text = draft(&incident);
        assert!(text.contains("_Analysis pending._"));
        assert!(text.contains("_TODO: one-paragraph summary of impact._"));
    }
}
