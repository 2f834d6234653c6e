//! SQLite persistence layer for incident records.

pub mod schema;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::incident::{Incident, Severity, Status};

/// Connection pool type.
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// The slice of an incident that windowed MTTR queries need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub id: String,
    pub severity: String,
    pub status: String,
    pub triggered_at: DateTime<Utc>,
    pub mttr_seconds: Option<i64>,
}

impl IncidentSummary {
    pub fn is_resolved(&self) -> bool {
        self.status == "resolved"
    }
}

/// Incident persistence over the shared pool. Upserts are idempotent and
/// keyed by incident identity.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Insert or replace the full incident record.
    pub async fn save(&self, incident: &Incident) -> Result<()> {
        let pool = self.pool.clone();
        let incident = incident.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get()?;
            conn.execute(
                "INSERT OR REPLACE INTO incidents
                 (id, title, description, severity, source, status,
                  triggered_at, acknowledged_at, resolved_at,
                  labels_json, raw_payload_json, evidence_json,
                  analysis_json, suggested_fixes_json, postmortem,
                  mttr_seconds, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, datetime('now'))",
                params![
                    incident.id,
                    incident.title,
                    incident.description,
                    incident.severity.as_str(),
                    incident.source,
                    incident.status.as_str(),
                    incident.triggered_at.to_rfc3339(),
                    incident.acknowledged_at.map(|t| t.to_rfc3339()),
                    incident.resolved_at.map(|t| t.to_rfc3339()),
                    serde_json::to_string(&incident.labels)?,
                    serde_json::to_string(&incident.raw_payload)?,
                    serde_json::to_string(&incident.evidence)?,
                    incident
                        .analysis
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    serde_json::to_string(&incident.suggested_fixes)?,
                    incident.postmortem,
                    incident.mttr_seconds(),
                ],
            )
            .context("failed to upsert incident")?;
            Ok(())
        })
        .await?
    }

    /// Alias for [`Store::save`]; updates are the same idempotent upsert.
    pub async fn update(&self, incident: &Incident) -> Result<()> {
        self.save(incident).await
    }

    /// Persist pipeline results without clobbering a concurrent resolution.
    ///
    /// A resolve can land between the pipeline's last in-memory check and
    /// its persist; the status guard makes the stale write a no-op in that
    /// window. Returns whether a row was updated.
    pub async fn update_unless_resolved(&self, incident: &Incident) -> Result<bool> {
        let pool = self.pool.clone();
        let incident = incident.clone();

        tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = pool.get()?;
            let changed = conn.execute(
                "UPDATE incidents SET
                     title = ?2, description = ?3, severity = ?4, source = ?5,
                     status = ?6, triggered_at = ?7, acknowledged_at = ?8,
                     resolved_at = ?9, labels_json = ?10, raw_payload_json = ?11,
                     evidence_json = ?12, analysis_json = ?13,
                     suggested_fixes_json = ?14, postmortem = ?15,
                     mttr_seconds = ?16, updated_at = datetime('now')
                 WHERE id = ?1 AND status != 'resolved'",
                params![
                    incident.id,
                    incident.title,
                    incident.description,
                    incident.severity.as_str(),
                    incident.source,
                    incident.status.as_str(),
                    incident.triggered_at.to_rfc3339(),
                    incident.acknowledged_at.map(|t| t.to_rfc3339()),
                    incident.resolved_at.map(|t| t.to_rfc3339()),
                    serde_json::to_string(&incident.labels)?,
                    serde_json::to_string(&incident.raw_payload)?,
                    serde_json::to_string(&incident.evidence)?,
                    incident
                        .analysis
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    serde_json::to_string(&incident.suggested_fixes)?,
                    incident.postmortem,
                    incident.mttr_seconds(),
                ],
            )
            .context("failed to update incident")?;
            Ok(changed > 0)
        })
        .await?
    }

    /// Fetch one incident by identity.
    pub async fn get(&self, id: &str) -> Result<Option<Incident>> {
        let pool = self.pool.clone();
        let id = id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Incident>> {
            let conn = pool.get()?;
            conn.query_row(
                "SELECT id, title, description, severity, source, status,
                        triggered_at, acknowledged_at, resolved_at,
                        labels_json, raw_payload_json, evidence_json,
                        analysis_json, suggested_fixes_json, postmortem
                 FROM incidents WHERE id = ?1",
                params![id],
                row_to_incident,
            )
            .optional()
            .context("failed to fetch incident")
        })
        .await?
    }

    /// Summaries of incidents triggered at or after `since`, newest first.
    pub async fn query_window(&self, since: DateTime<Utc>) -> Result<Vec<IncidentSummary>> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<IncidentSummary>> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(
                "SELECT id, severity, status, triggered_at, mttr_seconds
                 FROM incidents
                 WHERE triggered_at >= ?1
                 ORDER BY triggered_at DESC",
            )?;

            let rows = stmt.query_map(params![since.to_rfc3339()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                ))
            })?;

            let mut summaries = Vec::new();
            for r in rows {
                let (id, severity, status, triggered_at, mttr_seconds) = r?;
                let triggered_at = DateTime::parse_from_rfc3339(&triggered_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default();
                summaries.push(IncidentSummary {
                    id,
                    severity,
                    status,
                    triggered_at,
                    mttr_seconds,
                });
            }
            Ok(summaries)
        })
        .await?
    }
}

fn row_to_incident(row: &rusqlite::Row<'_>) -> rusqlite::Result<Incident> {
    let parse_ts = |s: String| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default()
    };

    let severity = Severity::parse(&row.get::<_, String>(3)?).unwrap_or(Severity::Medium);
    let labels: BTreeMap<String, String> =
        serde_json::from_str(&row.get::<_, String>(9)?).unwrap_or_default();
    let raw_payload = row
        .get::<_, Option<String>>(10)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);
    let evidence: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(11)?).unwrap_or_default();
    let analysis = row
        .get::<_, Option<String>>(12)?
        .and_then(|s| serde_json::from_str(&s).ok());
    let suggested_fixes =
        serde_json::from_str(&row.get::<_, String>(13)?).unwrap_or_default();

    Ok(Incident {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        severity,
        source: row.get(4)?,
        status: Status::from_str_lossy(&row.get::<_, String>(5)?),
        triggered_at: parse_ts(row.get(6)?),
        acknowledged_at: row.get::<_, Option<String>>(7)?.map(parse_ts),
        resolved_at: row.get::<_, Option<String>>(8)?.map(parse_ts),
        labels,
        raw_payload,
        evidence,
        analysis,
        suggested_fixes,
        postmortem: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::Severity;
    use chrono::Duration;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incidents.db");
        let pool = open_pool(path.to_str().unwrap()).unwrap();
        (dir, Store::new(pool))
    }

    fn incident(id: &str) -> Incident {
        Incident::new(
            id.into(),
            "High error rate".into(),
            "500s spiking".into(),
            Severity::High,
            "prometheus".into(),
            [("service".to_string(), "api".to_string())].into(),
            serde_json::json!({"alerts": []}),
        )
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let (_dir, store) = temp_store();
        let mut inc = incident("prom-abc");
        inc.evidence = vec!["[ts] [src] [ERROR] boom".into()];

        store.save(&inc).await.unwrap();
        let loaded = store.get("prom-abc").await.unwrap().unwrap();

        assert_eq!(loaded.id, "prom-abc");
        assert_eq!(loaded.severity, Severity::High);
        assert_eq!(loaded.labels.get("service").unwrap(), "api");
        assert_eq!(loaded.evidence.len(), 1);
        assert_eq!(loaded.status, Status::Triggered);
    }

    #[tokio::test]
    async fn save_is_idempotent_upsert() {
        let (_dir, store) = temp_store();
        let mut inc = incident("dd-1");

        store.save(&inc).await.unwrap();
        inc.status = Status::Resolved;
        inc.resolved_at = Some(inc.triggered_at + Duration::seconds(60));
        store.update(&inc).await.unwrap();

        let loaded = store.get("dd-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, Status::Resolved);
        assert_eq!(loaded.mttr_seconds(), Some(60));

        let all = store
            .query_window(Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].mttr_seconds, Some(60));
    }

    #[tokio::test]
    async fn guarded_update_skips_resolved_rows() {
        let (_dir, store) = temp_store();
        let mut inc = incident("prom-race");
        store.save(&inc).await.unwrap();

        // Stale pipeline snapshot, taken before resolution.
        let mut stale = inc.clone();
        stale.status = Status::Analyzing;
        stale.postmortem = Some("draft".into());

        inc.status = Status::Resolved;
        inc.resolved_at = Some(inc.triggered_at + Duration::seconds(90));
        store.update(&inc).await.unwrap();

        assert!(!store.update_unless_resolved(&stale).await.unwrap());
        let loaded = store.get("prom-race").await.unwrap().unwrap();
        assert_eq!(loaded.status, Status::Resolved);
        assert_eq!(loaded.mttr_seconds(), Some(90));
    }

    #[tokio::test]
    async fn guarded_update_writes_active_rows() {
        let (_dir, store) = temp_store();
        let mut inc = incident("prom-live");
        store.save(&inc).await.unwrap();

        inc.status = Status::Analyzing;
        inc.evidence = vec!["[ts] [src] [ERROR] boom".into()];
        assert!(store.update_unless_resolved(&inc).await.unwrap());

        let loaded = store.get("prom-live").await.unwrap().unwrap();
        assert_eq!(loaded.status, Status::Analyzing);
        assert_eq!(loaded.evidence.len(), 1);
    }

    #[tokio::test]
    async fn get_unknown_returns_none() {
        let (_dir, store) = temp_store();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_window_excludes_older_incidents() {
        let (_dir, store) = temp_store();
        let mut old = incident("old-1");
        old.triggered_at = Utc::now() - Duration::days(40);
        store.save(&old).await.unwrap();
        store.save(&incident("new-1")).await.unwrap();

        let window = store
            .query_window(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, "new-1");
    }
}
