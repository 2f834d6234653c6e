//! Windowed MTTR analytics over persisted incidents.
//!
//! Averages are computed in the application rather than SQL so that empty
//! windows report an absent average instead of zero.

use crate::storage::{IncidentSummary, Store};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Human-readable duration: `45m 33s`, switching to `1h 5m` once minutes
/// reach 60.
pub fn format_duration(seconds: i64) -> String {
    let minutes = seconds / 60;
    let secs = seconds % 60;
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m {}s", minutes, secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DurationStats {
    pub average_seconds: Option<f64>,
    pub average: Option<String>,
    pub min_seconds: Option<i64>,
    pub min: Option<String>,
    pub max_seconds: Option<i64>,
    pub max: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WindowStats {
    pub average_seconds: Option<f64>,
    pub average: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityStats {
    pub average_seconds: f64,
    pub average: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MttrReport {
    pub period_days: i64,
    pub total_incidents: u64,
    pub resolved: u64,
    pub active: u64,
    pub mttr: DurationStats,
    pub last_24h: WindowStats,
    pub last_7d: WindowStats,
    pub by_severity: BTreeMap<String, SeverityStats>,
}

/// Computes windowed resolution-time statistics from the incident store.
#[derive(Clone)]
pub struct MttrEngine {
    store: Store,
}

impl MttrEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn report(&self, lookback_days: i64) -> Result<MttrReport> {
        let now = Utc::now();
        // One fetch covers the lookback and both fixed sub-windows.
        let fetch_since = now - Duration::days(lookback_days.max(7));
        let summaries = self.store.query_window(fetch_since).await?;
        Ok(compute_report(&summaries, now, lookback_days))
    }
}

fn compute_report(
    summaries: &[IncidentSummary],
    now: DateTime<Utc>,
    lookback_days: i64,
) -> MttrReport {
    let cutoff = now - Duration::days(lookback_days);
    let in_window: Vec<&IncidentSummary> = summaries
        .iter()
        .filter(|s| s.triggered_at >= cutoff)
        .collect();

    let resolved: Vec<&IncidentSummary> = in_window
        .iter()
        .copied()
        .filter(|s| s.is_resolved() && s.mttr_seconds.is_some())
        .collect();

    let mttr_values: Vec<i64> = resolved.iter().filter_map(|s| s.mttr_seconds).collect();

    let mttr = if mttr_values.is_empty() {
        DurationStats::default()
    } else {
        let avg = mttr_values.iter().sum::<i64>() as f64 / mttr_values.len() as f64;
        let min = *mttr_values.iter().min().unwrap_or(&0);
        let max = *mttr_values.iter().max().unwrap_or(&0);
        DurationStats {
            average_seconds: Some(avg),
            average: Some(format_duration(avg.round() as i64)),
            min_seconds: Some(min),
            min: Some(format_duration(min)),
            max_seconds: Some(max),
            max: Some(format_duration(max)),
        }
    };

    let sub_window = |since: DateTime<Utc>| -> WindowStats {
        let values: Vec<i64> = summaries
            .iter()
            .filter(|s| s.triggered_at >= since && s.is_resolved())
            .filter_map(|s| s.mttr_seconds)
            .collect();
        if values.is_empty() {
            WindowStats::default()
        } else {
            let avg = values.iter().sum::<i64>() as f64 / values.len() as f64;
            WindowStats {
                average_seconds: Some(avg),
                average: Some(format_duration(avg.round() as i64)),
                count: values.len() as u64,
            }
        }
    };

    let mut by_severity: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for s in &resolved {
        if let Some(mttr) = s.mttr_seconds {
            by_severity.entry(s.severity.clone()).or_default().push(mttr);
        }
    }
    let by_severity = by_severity
        .into_iter()
        .map(|(severity, values)| {
            let avg = values.iter().sum::<i64>() as f64 / values.len() as f64;
            (
                severity,
                SeverityStats {
                    average_seconds: avg,
                    average: format_duration(avg.round() as i64),
                    count: values.len() as u64,
                },
            )
        })
        .collect();

    MttrReport {
        period_days: lookback_days,
        total_incidents: in_window.len() as u64,
        resolved: resolved.len() as u64,
        active: in_window.iter().filter(|s| !s.is_resolved()).count() as u64,
        mttr,
        last_24h: sub_window(now - Duration::hours(24)),
        last_7d: sub_window(now - Duration::days(7)),
        by_severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(
        id: &str,
        severity: &str,
        status: &str,
        age: Duration,
        mttr: Option<i64>,
        now: DateTime<Utc>,
    ) -> IncidentSummary {
        IncidentSummary {
            id: id.into(),
            severity: severity.into(),
            status: status.into(),
            triggered_at: now - age,
            mttr_seconds: mttr,
        }
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(2733), "45m 33s");
        assert_eq!(format_duration(0), "0m 0s");
        assert_eq!(format_duration(59), "0m 59s");
        assert_eq!(format_duration(3600), "1h 0m");
        assert_eq!(format_duration(3900), "1h 5m");
    }

    #[test]
    fn empty_window_reports_absent_average() {
        let now = Utc::now();
        let report = compute_report(&[], now, 30);
        assert_eq!(report.total_incidents, 0);
        assert_eq!(report.resolved, 0);
        assert_eq!(report.active, 0);
        assert!(report.mttr.average_seconds.is_none());
        assert!(report.last_24h.average_seconds.is_none());
        assert_eq!(report.last_24h.count, 0);
    }

    #[test]
    fn unresolved_incidents_count_as_active_not_resolved() {
        let now = Utc::now();
        let summaries = vec![
            summary("a", "high", "analyzing", Duration::hours(1), None, now),
            summary("b", "low", "resolved", Duration::hours(2), Some(30), now),
        ];
        let report = compute_report(&summaries, now, 30);
        assert_eq!(report.total_incidents, 2);
        assert_eq!(report.resolved, 1);
        assert_eq!(report.active, 1);
        assert_eq!(report.mttr.average_seconds, Some(30.0));
    }

    #[test]
    fn severity_grouping_averages() {
        let now = Utc::now();
        let summaries = vec![
            summary("a", "high", "resolved", Duration::days(2), Some(60), now),
            summary("b", "high", "resolved", Duration::days(3), Some(120), now),
            summary("c", "low", "resolved", Duration::days(4), Some(30), now),
        ];
        let report = compute_report(&summaries, now, 30);

        let high = report.by_severity.get("high").unwrap();
        assert_eq!(high.average_seconds, 90.0);
        assert_eq!(high.count, 2);
        assert_eq!(high.average, "1m 30s");

        let low = report.by_severity.get("low").unwrap();
        assert_eq!(low.average_seconds, 30.0);
        assert_eq!(low.count, 1);
    }

    #[test]
    fn sub_windows_filter_by_trigger_time() {
        let now = Utc::now();
        let summaries = vec![
            // Inside 24h.
            summary("a", "high", "resolved", Duration::hours(3), Some(100), now),
            // Inside 7d but not 24h.
            summary("b", "high", "resolved", Duration::days(3), Some(200), now),
            // Inside 30d only.
            summary("c", "high", "resolved", Duration::days(20), Some(300), now),
        ];
        let report = compute_report(&summaries, now, 30);

        assert_eq!(report.last_24h.count, 1);
        assert_eq!(report.last_24h.average_seconds, Some(100.0));
        assert_eq!(report.last_7d.count, 2);
        assert_eq!(report.last_7d.average_seconds, Some(150.0));
        assert_eq!(report.mttr.average_seconds, Some(200.0));
        assert_eq!(report.mttr.min_seconds, Some(100));
        assert_eq!(report.mttr.max_seconds, Some(300));
    }

    #[test]
    fn lookback_excludes_older_incidents() {
        let now = Utc::now();
        let summaries = vec![
            summary("a", "high", "resolved", Duration::days(2), Some(60), now),
            summary("b", "high", "resolved", Duration::days(40), Some(600), now),
        ];
        let report = compute_report(&summaries, now, 7);
        assert_eq!(report.total_incidents, 1);
        assert_eq!(report.mttr.average_seconds, Some(60.0));
    }
}
