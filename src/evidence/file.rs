//! Local log file evidence source.

use super::{detect_level, EvidenceRecord, EvidenceSource};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use tracing::warn;

/// Only the tail of each file is scanned; older lines are outside any
/// reasonable incident window anyway.
const TAIL_LINES: usize = 10_000;

/// Reads timestamped lines from files matching configured glob patterns.
pub struct FileSource {
    paths: Vec<String>,
}

impl FileSource {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }

    fn read_file(
        path: &std::path::Path,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EvidenceRecord>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let lines: Vec<&str> = content.lines().collect();
        let tail_start = lines.len().saturating_sub(TAIL_LINES);
        let source = format!("file/{}", path.display());

        let mut records = Vec::new();
        for line in &lines[tail_start..] {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Lines without a parseable leading timestamp cannot be placed
            // in the window and are skipped.
            let Some(timestamp) = parse_leading_timestamp(line) else {
                continue;
            };
            if timestamp < start || timestamp > end {
                continue;
            }

            let mut metadata = BTreeMap::new();
            metadata.insert("file".to_string(), path.display().to_string());
            records.push(EvidenceRecord {
                timestamp,
                source: source.clone(),
                level: detect_level(line).to_string(),
                message: line.to_string(),
                metadata,
            });
        }
        Ok(records)
    }
}

/// Parse an ISO-ish timestamp at the start of a log line.
/// Accepts `2024-05-01T10:00:01Z`, `2024-05-01 10:00:01` and the
/// nginx-style `[2024/05/01 10:00:01]`.
fn parse_leading_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let head: String = line
        .trim_start_matches('[')
        .chars()
        .take(32)
        .collect::<String>()
        .replace('/', "-");

    if let Ok(dt) = DateTime::parse_from_rfc3339(head.split_whitespace().next()?) {
        return Some(dt.with_timezone(&Utc));
    }

    let head = head.replace(']', "");
    let prefix = head.get(..19)?;
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(prefix, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[async_trait::async_trait]
impl EvidenceSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn gather(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _filters: &BTreeMap<String, String>,
    ) -> Result<Vec<EvidenceRecord>> {
        let paths = self.paths.clone();

        // Blocking file IO stays off the runtime worker threads.
        tokio::task::spawn_blocking(move || {
            let mut records = Vec::new();
            for pattern in &paths {
                let matches = match glob::glob(pattern) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(pattern = %pattern, "Bad glob pattern: {e}");
                        continue;
                    }
                };
                for entry in matches.flatten() {
                    match Self::read_file(&entry, start, end) {
                        Ok(mut batch) => records.append(&mut batch),
                        Err(e) => warn!(path = %entry.display(), "Skipping file: {e:#}"),
                    }
                }
            }
            Ok(records)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn leading_timestamp_formats() {
        assert!(parse_leading_timestamp("2024-05-01T10:00:01Z ERROR boom").is_some());
        assert!(parse_leading_timestamp("2024-05-01 10:00:01 info ok").is_some());
        assert!(parse_leading_timestamp("[2024/05/01 10:00:01] GET /").is_some());
        assert!(parse_leading_timestamp("no timestamp here").is_none());
    }

    #[tokio::test]
    async fn gathers_lines_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("app.log");
        let mut f = std::fs::File::create(&log_path).unwrap();

        let now = Utc::now();
        let recent = now - chrono::Duration::minutes(5);
        let stale = now - chrono::Duration::hours(48);
        writeln!(f, "{} ERROR oom killed", recent.format("%Y-%m-%dT%H:%M:%SZ")).unwrap();
        writeln!(f, "{} info old line", stale.format("%Y-%m-%dT%H:%M:%SZ")).unwrap();
        writeln!(f, "line without timestamp").unwrap();
        drop(f);

        let source = FileSource::new(vec![dir
            .path()
            .join("*.log")
            .to_string_lossy()
            .into_owned()]);
        let records = source
            .gather(now - chrono::Duration::minutes(60), now, &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "error");
        assert!(records[0].message.contains("oom killed"));
    }
}
