//! Concurrent fan-out across evidence sources with deterministic merge.

use super::{EvidenceRecord, EvidenceSource};
use crate::incident::Incident;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// Fans out to all configured sources concurrently, tolerates per-source
/// failure, and merges results in timestamp order.
#[derive(Clone)]
pub struct Aggregator {
    sources: Vec<Arc<dyn EvidenceSource>>,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn EvidenceSource>>) -> Self {
        Self { sources }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Gather merged evidence for an incident over the trailing window.
    ///
    /// Each source runs concurrently; one flaky source contributes zero
    /// records and a log line, never a failed gather.
    pub async fn gather(&self, incident: &Incident, lookback_minutes: i64) -> Vec<EvidenceRecord> {
        let end = Utc::now();
        let start = end - Duration::minutes(lookback_minutes);
        let filters = incident.labels.clone();

        let tasks = self.sources.iter().map(|source| {
            let source = source.clone();
            let filters = filters.clone();
            async move {
                let name = source.name().to_string();
                (name, source.gather(start, end, &filters).await)
            }
        });

        let mut records = Vec::new();
        for (name, result) in futures::future::join_all(tasks).await {
            match result {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => error!(source = %name, incident = %incident.id, "Evidence gathering failed: {e:#}"),
            }
        }

        // Stable sort keeps per-source arrival order for equal timestamps.
        records.sort_by_key(|r| r.timestamp);

        info!(
            incident = %incident.id,
            records = records.len(),
            sources = self.sources.len(),
            "Evidence gathered"
        );
        records
    }

    /// Render records as analyzer-ready lines, capped at `max_lines`.
    ///
    /// When over the cap, error then warning records are retained
    /// preferentially (chronological order preserved among survivors) and a
    /// truncation marker is appended.
    pub fn render(records: &[EvidenceRecord], max_lines: usize) -> Vec<String> {
        if records.len() <= max_lines {
            return records.iter().map(EvidenceRecord::render).collect();
        }

        let mut keep: Vec<usize> = Vec::with_capacity(max_lines);
        for (i, r) in records.iter().enumerate() {
            if keep.len() >= max_lines {
                break;
            }
            if r.is_error() {
                keep.push(i);
            }
        }
        for (i, r) in records.iter().enumerate() {
            if keep.len() >= max_lines {
                break;
            }
            if r.is_warning() {
                keep.push(i);
            }
        }
        for (i, r) in records.iter().enumerate() {
            if keep.len() >= max_lines {
                break;
            }
            if !r.is_error() && !r.is_warning() {
                keep.push(i);
            }
        }
        keep.sort_unstable();

        let dropped = records.len() - keep.len();
        let mut lines: Vec<String> = keep.iter().map(|&i| records[i].render()).collect();
        lines.push(format!("... ({dropped} more records truncated)"));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{Incident, Severity};
    use anyhow::{anyhow, Result};
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap;

    struct FixedSource {
        name: String,
        records: Vec<EvidenceRecord>,
    }

    #[async_trait::async_trait]
    impl EvidenceSource for FixedSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn gather(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _filters: &BTreeMap<String, String>,
        ) -> Result<Vec<EvidenceRecord>> {
            Ok(self.records.clone())
        }
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl EvidenceSource for FailingSource {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn gather(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _filters: &BTreeMap<String, String>,
        ) -> Result<Vec<EvidenceRecord>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn record(ts: &str, source: &str, level: &str, message: &str) -> EvidenceRecord {
        EvidenceRecord {
            timestamp: ts.parse().unwrap(),
            source: source.into(),
            level: level.into(),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    fn test_incident() -> Incident {
        Incident::new(
            "test-1".into(),
            "t".into(),
            "d".into(),
            Severity::High,
            "generic".into(),
            BTreeMap::new(),
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn merge_is_timestamp_ascending_across_sources() {
        let a = Arc::new(FixedSource {
            name: "a".into(),
            records: vec![
                record("2024-05-01T10:00:02Z", "a", "info", "second"),
                record("2024-05-01T10:00:05Z", "a", "info", "third"),
            ],
        });
        let b = Arc::new(FixedSource {
            name: "b".into(),
            records: vec![record("2024-05-01T10:00:01Z", "b", "info", "first")],
        });

        let agg = Aggregator::new(vec![a, b]);
        let merged = agg.gather(&test_incident(), 60).await;

        let messages: Vec<&str> = merged.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn one_failing_source_does_not_fail_the_gather() {
        let good = Arc::new(FixedSource {
            name: "good".into(),
            records: vec![
                record("2024-05-01T10:00:01Z", "good", "error", "boom"),
                record("2024-05-01T10:00:02Z", "good", "info", "ok"),
            ],
        });
        let also_good = Arc::new(FixedSource {
            name: "also".into(),
            records: vec![record("2024-05-01T10:00:03Z", "also", "info", "fine")],
        });

        let agg = Aggregator::new(vec![good, Arc::new(FailingSource), also_good]);
        let merged = agg.gather(&test_incident(), 60).await;

        assert_eq!(merged.len(), 3);
        assert!(merged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn truncation_prefers_errors_and_appends_marker() {
        let mut records = Vec::new();
        for i in 0..10 {
            let level = if i == 7 {
                "error"
            } else if i == 3 {
                "warning"
            } else {
                "info"
            };
            records.push(record(
                &format!("2024-05-01T10:00:{i:02}Z"),
                "s",
                level,
                &format!("line {i}"),
            ));
        }

        let lines = Aggregator::render(&records, 3);
        assert_eq!(lines.len(), 4);
        // Error and warning survive, chronological order preserved.
        assert!(lines[0].contains("line 0"));
        assert!(lines[1].contains("line 3"));
        assert!(lines[2].contains("line 7"));
        assert_eq!(lines[3], "... (7 more records truncated)");
    }

    #[test]
    fn no_truncation_under_cap() {
        let records = vec![record("2024-05-01T10:00:00Z", "s", "info", "only")];
        let lines = Aggregator::render(&records, 500);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].contains("truncated"));
    }
}
