//! Git history evidence source: recent commits often correlate with the
//! deploy that caused the incident.

use super::{EvidenceRecord, EvidenceSource};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

pub struct GitHistorySource {
    repos: Vec<String>,
    max_commits: usize,
}

impl GitHistorySource {
    pub fn new(repos: Vec<String>, max_commits: usize) -> Self {
        Self { repos, max_commits }
    }

    async fn log_repo(
        &self,
        repo: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EvidenceRecord>> {
        let output = tokio::process::Command::new("git")
            .arg("-C")
            .arg(repo)
            .arg("log")
            .arg(format!("--since={}", start.to_rfc3339()))
            .arg(format!("--until={}", end.to_rfc3339()))
            .arg(format!("-n{}", self.max_commits))
            .arg("--pretty=format:%H|%aI|%an|%s")
            .output()
            .await
            .context("failed to execute git log")?;

        if !output.status.success() {
            anyhow::bail!(
                "git log failed for {}: {}",
                repo,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut records = Vec::new();
        for line in stdout.lines() {
            let parts: Vec<&str> = line.splitn(4, '|').collect();
            if parts.len() < 4 {
                continue;
            }
            let (hash, ts, author, subject) = (parts[0], parts[1], parts[2], parts[3]);
            let timestamp = match DateTime::parse_from_rfc3339(ts) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(_) => Utc::now(),
            };

            let short = &hash[..hash.len().min(8)];
            let mut metadata = BTreeMap::new();
            metadata.insert("commit".to_string(), hash.to_string());
            metadata.insert("author".to_string(), author.to_string());
            metadata.insert("repo".to_string(), repo.to_string());

            records.push(EvidenceRecord {
                timestamp,
                source: format!("git/{repo}"),
                level: "info".to_string(),
                message: format!("[{short}] {author}: {subject}"),
                metadata,
            });
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl EvidenceSource for GitHistorySource {
    fn name(&self) -> &str {
        "git"
    }

    async fn gather(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _filters: &BTreeMap<String, String>,
    ) -> Result<Vec<EvidenceRecord>> {
        let mut records = Vec::new();
        for repo in &self.repos {
            match self.log_repo(repo, start, end).await {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => warn!(repo = %repo, "Git history unavailable: {e:#}"),
            }
        }
        Ok(records)
    }
}
