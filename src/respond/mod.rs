//! Remediation suggestions: playbooks matched against the root-cause
//! hypothesis, command templates filled from incident labels.

use crate::analyze::Analysis;
use crate::incident::Incident;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixCategory {
    Immediate,
    Rollback,
    Config,
    Scaling,
    Infra,
    Code,
    Investigate,
}

/// Risk of applying a fix, ordered safest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedFix {
    pub title: String,
    pub description: String,
    pub category: FixCategory,
    pub risk: RiskLevel,
    pub commands: Vec<String>,
    pub impact: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub rollback_commands: Vec<String>,
    pub estimated_time: String,
    /// 0.0-1.0, used as a tiebreaker within one risk level.
    pub confidence: f64,
}

struct PlaybookFix {
    title: &'static str,
    description: &'static str,
    category: FixCategory,
    risk: RiskLevel,
    commands: &'static [&'static str],
    impact: &'static str,
    prerequisites: &'static [&'static str],
    estimated_time: &'static str,
    confidence: f64,
}

struct Playbook {
    /// Root-cause keywords that select this playbook.
    keywords: &'static [&'static str],
    fixes: &'static [PlaybookFix],
}

const PLAYBOOKS: &[Playbook] = &[
    // oom_kill
    Playbook {
        keywords: &["oom", "out of memory", "memory exhaust", "killed"],
        fixes: &[
            PlaybookFix {
                title: "Restart affected pods",
                description: "Restart pods that were OOM killed to restore service",
                category: FixCategory::Immediate,
                risk: RiskLevel::Low,
                commands: &["kubectl rollout restart deployment/{deployment} -n {namespace}"],
                impact: "Brief service interruption during rolling restart",
                prerequisites: &[],
                estimated_time: "2-3 minutes",
                confidence: 0.8,
            },
            PlaybookFix {
                title: "Increase memory limits",
                description: "Increase memory limits to prevent future OOM kills",
                category: FixCategory::Config,
                risk: RiskLevel::Medium,
                commands: &[
                    "kubectl set resources deployment/{deployment} -n {namespace} --limits=memory={new_limit}",
                ],
                impact: "Pods will be recreated with new limits",
                prerequisites: &["Verify cluster has sufficient memory"],
                estimated_time: "< 5 minutes",
                confidence: 0.8,
            },
        ],
    },
    // connection_pool
    Playbook {
        keywords: &["connection pool", "pool exhaust", "no connections"],
        fixes: &[
            PlaybookFix {
                title: "Restart application pods",
                description: "Restart to reset connection pool state",
                category: FixCategory::Immediate,
                risk: RiskLevel::Low,
                commands: &["kubectl rollout restart deployment/{deployment} -n {namespace}"],
                impact: "Connections will be re-established",
                prerequisites: &[],
                estimated_time: "1-2 minutes",
                confidence: 0.8,
            },
            PlaybookFix {
                title: "Increase connection pool size",
                description: "Increase maximum connections to handle load",
                category: FixCategory::Config,
                risk: RiskLevel::Medium,
                commands: &[
                    "kubectl set env deployment/{deployment} DB_POOL_SIZE={new_pool_size} -n {namespace}",
                ],
                impact: "Higher database load, verify DB can handle it",
                prerequisites: &["Check database max_connections setting"],
                estimated_time: "< 5 minutes",
                confidence: 0.8,
            },
        ],
    },
    // timeout
    Playbook {
        keywords: &["timeout", "timed out", "deadline", "slow response"],
        fixes: &[PlaybookFix {
            title: "Scale up deployment",
            description: "Add more replicas to handle load",
            category: FixCategory::Scaling,
            risk: RiskLevel::Low,
            commands: &["kubectl scale deployment/{deployment} --replicas={new_replicas} -n {namespace}"],
            impact: "Additional pods will be created",
            prerequisites: &[],
            estimated_time: "< 5 minutes",
            confidence: 0.8,
        }],
    },
    // crash_loop
    Playbook {
        keywords: &["crash", "crashloop", "restarting", "exit code"],
        fixes: &[
            PlaybookFix {
                title: "Check pod logs",
                description: "Review crash logs for root cause",
                category: FixCategory::Investigate,
                risk: RiskLevel::Low,
                commands: &[
                    "kubectl logs {pod} --previous -n {namespace}",
                    "kubectl describe pod {pod} -n {namespace}",
                ],
                impact: "None - diagnostic only",
                prerequisites: &[],
                estimated_time: "< 5 minutes",
                confidence: 0.8,
            },
            PlaybookFix {
                title: "Rollback deployment",
                description: "Rollback to previous working version",
                category: FixCategory::Rollback,
                risk: RiskLevel::Medium,
                commands: &["kubectl rollout undo deployment/{deployment} -n {namespace}"],
                impact: "Application will revert to previous version",
                prerequisites: &[],
                estimated_time: "< 5 minutes",
                confidence: 0.8,
            },
        ],
    },
];

const MAX_SUGGESTIONS: usize = 5;

/// Generates ranked remediation suggestions from an analysis result.
#[derive(Clone, Default)]
pub struct FixSuggester;

impl FixSuggester {
    pub fn new() -> Self {
        Self
    }

    /// Suggestions sorted risk ascending, then confidence descending,
    /// capped at five.
    pub fn suggest(&self, incident: &Incident, analysis: &Analysis) -> Vec<SuggestedFix> {
        let root_cause = analysis.root_cause.to_lowercase();

        let mut suggestions = Vec::new();
        for playbook in PLAYBOOKS {
            if playbook.keywords.iter().any(|k| root_cause.contains(k)) {
                info!(incident = %incident.id, "Matched remediation playbook");
                suggestions.extend(playbook.fixes.iter().map(|f| populate(f, incident)));
            }
        }

        if suggestions.is_empty() {
            suggestions = generic_suggestions(incident);
        }

        suggestions.sort_by(|a, b| {
            a.risk
                .cmp(&b.risk)
                .then(b.confidence.total_cmp(&a.confidence))
        });
        suggestions.truncate(MAX_SUGGESTIONS);
        suggestions
    }
}

/// Fill `{placeholder}` command templates from incident labels.
fn populate(fix: &PlaybookFix, incident: &Incident) -> SuggestedFix {
    let labels = &incident.labels;
    let deployment = labels
        .get("deployment")
        .or_else(|| labels.get("app"))
        .map(String::as_str)
        .unwrap_or("YOUR_DEPLOYMENT");
    let namespace = labels
        .get("namespace")
        .map(String::as_str)
        .unwrap_or("default");
    let pod = labels.get("pod").map(String::as_str).unwrap_or("YOUR_POD");

    let context = [
        ("{deployment}", deployment),
        ("{namespace}", namespace),
        ("{pod}", pod),
        ("{new_limit}", "2Gi"),
        ("{new_pool_size}", "100"),
        ("{new_replicas}", "5"),
    ];

    let commands = fix
        .commands
        .iter()
        .map(|cmd| {
            let mut out = cmd.to_string();
            for (key, value) in &context {
                out = out.replace(key, value);
            }
            out
        })
        .collect();

    SuggestedFix {
        title: fix.title.to_string(),
        description: fix.description.to_string(),
        category: fix.category,
        risk: fix.risk,
        commands,
        impact: fix.impact.to_string(),
        prerequisites: fix.prerequisites.iter().map(|s| s.to_string()).collect(),
        rollback_commands: Vec::new(),
        estimated_time: fix.estimated_time.to_string(),
        confidence: fix.confidence,
    }
}

/// Safe defaults when no playbook matches the hypothesis.
fn generic_suggestions(incident: &Incident) -> Vec<SuggestedFix> {
    let labels = &incident.labels;
    let deployment = labels
        .get("deployment")
        .or_else(|| labels.get("app"))
        .map(String::as_str)
        .unwrap_or("YOUR_DEPLOYMENT");
    let namespace = labels
        .get("namespace")
        .map(String::as_str)
        .unwrap_or("default");

    vec![
        SuggestedFix {
            title: "Gather more diagnostics".to_string(),
            description: "Collect additional information to diagnose the issue".to_string(),
            category: FixCategory::Investigate,
            risk: RiskLevel::Low,
            commands: vec![
                format!("kubectl logs -l app={deployment} --tail=500 -n {namespace}"),
                format!("kubectl describe pods -l app={deployment} -n {namespace}"),
            ],
            impact: "None - diagnostic only".to_string(),
            prerequisites: Vec::new(),
            rollback_commands: Vec::new(),
            estimated_time: "5 minutes".to_string(),
            confidence: 0.9,
        },
        SuggestedFix {
            title: "Restart affected service".to_string(),
            description: "Rolling restart to clear potentially corrupted state".to_string(),
            category: FixCategory::Immediate,
            risk: RiskLevel::Low,
            commands: vec![format!(
                "kubectl rollout restart deployment/{deployment} -n {namespace}"
            )],
            impact: "Brief service interruption during rolling restart".to_string(),
            prerequisites: Vec::new(),
            rollback_commands: Vec::new(),
            estimated_time: "2-3 minutes".to_string(),
            confidence: 0.6,
        },
        SuggestedFix {
            title: "Rollback to previous version".to_string(),
            description: "Revert to the last known good deployment".to_string(),
            category: FixCategory::Rollback,
            risk: RiskLevel::Medium,
            commands: vec![format!(
                "kubectl rollout undo deployment/{deployment} -n {namespace}"
            )],
            impact: "Application will revert to previous version".to_string(),
            prerequisites: Vec::new(),
            rollback_commands: Vec::new(),
            estimated_time: "2-3 minutes".to_string(),
            confidence: 0.5,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{Incident, Severity};
    use std::collections::BTreeMap;

    fn incident_with_labels(labels: &[(&str, &str)]) -> Incident {
        Incident::new(
            "test-1".into(),
            "t".into(),
            "d".into(),
            Severity::High,
            "generic".into(),
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            serde_json::Value::Null,
        )
    }

    fn analysis(root_cause: &str) -> Analysis {
        Analysis {
            root_cause: root_cause.into(),
            confidence: 80,
            evidence: Vec::new(),
            affected_components: Vec::new(),
            timeline: Vec::new(),
            raw_response: None,
            degraded: false,
        }
    }

    #[test]
    fn oom_playbook_populates_labels() {
        let incident = incident_with_labels(&[("deployment", "api"), ("namespace", "prod")]);
        let fixes = FixSuggester::new().suggest(&incident, &analysis("process was OOM killed"));

        assert!(!fixes.is_empty());
        let restart = &fixes[0];
        assert_eq!(restart.risk, RiskLevel::Low);
        assert_eq!(
            restart.commands[0],
            "kubectl rollout restart deployment/api -n prod"
        );
    }

    #[test]
    fn ranking_is_risk_then_confidence() {
        let incident = incident_with_labels(&[]);
        let fixes = FixSuggester::new().suggest(
            &incident,
            &analysis("container crash loop, restarting with exit code 1"),
        );

        for pair in fixes.windows(2) {
            assert!(pair[0].risk <= pair[1].risk);
            if pair[0].risk == pair[1].risk {
                assert!(pair[0].confidence >= pair[1].confidence);
            }
        }
    }

    #[test]
    fn unmatched_root_cause_gets_generic_suggestions() {
        let incident = incident_with_labels(&[("app", "web")]);
        let fixes = FixSuggester::new().suggest(&incident, &analysis("cosmic rays"));

        assert_eq!(fixes.len(), 3);
        assert_eq!(fixes[0].category, FixCategory::Investigate);
        assert!(fixes[0].commands[0].contains("app=web"));
    }

    #[test]
    fn suggestions_are_capped() {
        let incident = incident_with_labels(&[]);
        // Matches both oom (killed) and crash_loop (crash, restarting) playbooks.
        let fixes = FixSuggester::new().suggest(
            &incident,
            &analysis("killed after crash, restarting out of memory"),
        );
        assert!(fixes.len() <= 5);
    }
}
