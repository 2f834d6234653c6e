//! The incident lifecycle orchestrator: admission, dedup, the per-incident
//! background pipeline, and resolve/query operations.

use super::{parse, Incident, Status};
use crate::analyze::{Analysis, Analyzer};
use crate::evidence::Aggregator;
use crate::notify::Notifier;
use crate::postmortem;
use crate::respond::FixSuggester;
use crate::storage::Store;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct OrchestratorConfig {
    pub evidence_lookback_minutes: i64,
    pub max_evidence_lines: usize,
    pub postmortem_enabled: bool,
}

struct Inner {
    /// Active (non-resolved) incidents keyed by identity. Locks are held
    /// only for map access, never across capability calls.
    active: Mutex<HashMap<String, Incident>>,
    /// Supervisor map of running pipeline tasks, keyed by incident id.
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    aggregator: Aggregator,
    analyzer: Arc<dyn Analyzer>,
    suggester: FixSuggester,
    notifier: Notifier,
    store: Store,
    config: OrchestratorConfig,
}

/// Owns incident identity and state and drives the response pipeline.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        aggregator: Aggregator,
        analyzer: Arc<dyn Analyzer>,
        suggester: FixSuggester,
        notifier: Notifier,
        store: Store,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
                aggregator,
                analyzer,
                suggester,
                notifier,
                store,
                config,
            }),
        }
    }

    /// Admit a trigger. Duplicate identities are idempotent: the existing
    /// incident is returned with its raw payload refreshed and no second
    /// pipeline is started. New incidents are persisted, announced, and get
    /// a background pipeline task; the call returns without waiting for it.
    pub async fn submit(&self, source_tag: &str, payload: serde_json::Value) -> Result<Incident> {
        let incident = parse::parse(source_tag, payload.clone())?;
        let id = incident.id.clone();

        {
            let mut active = self.inner.active.lock().await;
            if let Some(existing) = active.get_mut(&id) {
                info!(incident = %id, "Duplicate trigger, updating existing incident");
                existing.raw_payload = payload;
                return Ok(existing.clone());
            }
            active.insert(id.clone(), incident.clone());
        }

        info!(incident = %id, source = %source_tag, severity = %incident.severity, "Incident admitted");
        if let Err(e) = self.inner.store.save(&incident).await {
            // Undo the admission so a retried alert re-admits cleanly
            // instead of hitting the dedup branch forever.
            self.inner.active.lock().await.remove(&id);
            return Err(e);
        }
        self.inner.notifier.incident_triggered(&incident).await;

        let inner = self.inner.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = run_pipeline(&inner, &task_id).await {
                error!(incident = %task_id, "Pipeline failed: {e:#}");
                let snapshot = inner.active.lock().await.get(&task_id).cloned();
                if let Some(snapshot) = snapshot {
                    inner
                        .notifier
                        .pipeline_error(&snapshot, &format!("{e:#}"))
                        .await;
                }
            }
            inner.tasks.lock().await.remove(&task_id);
        });
        self.inner.tasks.lock().await.insert(id, handle);

        Ok(incident)
    }

    /// Resolve an active incident. Unknown or already-resolved identities
    /// return `None`; that is a branch for the caller, not an error.
    pub async fn resolve(&self, id: &str) -> Result<Option<Incident>> {
        let snapshot = {
            let mut active = self.inner.active.lock().await;
            match active.get_mut(id) {
                Some(incident) => {
                    incident.status = Status::Resolved;
                    incident.resolved_at = Some(chrono::Utc::now());
                    incident.clone()
                }
                None => return Ok(None),
            }
        };

        self.inner.store.update(&snapshot).await?;
        self.inner.notifier.incident_resolved(&snapshot).await;

        self.inner.active.lock().await.remove(id);
        // Detach rather than abort: a still-running pipeline observes the
        // removal and stops at its next checkpoint.
        self.inner.tasks.lock().await.remove(id);

        if let Some(mttr) = snapshot.mttr_seconds() {
            info!(
                incident = %id,
                mttr = %crate::stats::format_duration(mttr),
                "Incident resolved"
            );
        }
        Ok(Some(snapshot))
    }

    /// Current active incidents, oldest trigger first.
    pub async fn active(&self) -> Vec<Incident> {
        let active = self.inner.active.lock().await;
        let mut incidents: Vec<Incident> = active.values().cloned().collect();
        incidents.sort_by_key(|i| i.triggered_at);
        incidents
    }

    /// One active incident by identity.
    pub async fn get(&self, id: &str) -> Option<Incident> {
        self.inner.active.lock().await.get(id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.active.lock().await.len()
    }

    /// True while the incident's pipeline task is still running.
    pub async fn pipeline_running(&self, id: &str) -> bool {
        self.inner.tasks.lock().await.contains_key(id)
    }
}

/// Update one active incident in place. Returns the updated snapshot, or
/// `None` when the incident left the active set (resolved mid-pipeline),
/// which ends the pipeline at the next checkpoint.
async fn checkpoint(
    inner: &Inner,
    id: &str,
    mutate: impl FnOnce(&mut Incident),
) -> Option<Incident> {
    let mut active = inner.active.lock().await;
    match active.get_mut(id) {
        Some(incident) => {
            mutate(incident);
            Some(incident.clone())
        }
        None => {
            warn!(incident = %id, "Incident resolved during pipeline, stopping early");
            None
        }
    }
}

/// The five-stage response pipeline, one run per admitted incident.
/// Errors propagate to the single task-boundary handler in `submit`;
/// there is no stage-level retry.
async fn run_pipeline(inner: &Arc<Inner>, id: &str) -> Result<()> {
    let Some(snapshot) = checkpoint(inner, id, |i| i.status = Status::Analyzing).await else {
        return Ok(());
    };

    // Stage 1: evidence, fanned out across sources.
    info!(incident = %id, "Gathering evidence");
    let records = inner
        .aggregator
        .gather(&snapshot, inner.config.evidence_lookback_minutes)
        .await;
    let lines = Aggregator::render(&records, inner.config.max_evidence_lines);
    let evidence_text = lines.join("\n");
    let Some(snapshot) = checkpoint(inner, id, |i| i.evidence = lines).await else {
        return Ok(());
    };

    // Stage 2: root-cause hypothesis. A failing analyzer degrades the
    // result instead of failing the incident.
    info!(incident = %id, "Running root-cause analysis");
    let analysis = match inner.analyzer.analyze(&snapshot, &evidence_text).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!(incident = %id, "Analyzer failed, recording degraded result: {e:#}");
            Analysis::degraded(&format!("{e:#}"))
        }
    };

    // Stage 3: remediation suggestions.
    let fixes = inner.suggester.suggest(&snapshot, &analysis);
    let Some(snapshot) = checkpoint(inner, id, |i| {
        i.analysis = Some(analysis);
        i.suggested_fixes = fixes;
    })
    .await
    else {
        return Ok(());
    };

    // Stage 4: announce the analysis.
    inner.notifier.analysis_complete(&snapshot).await;

    // Stage 5: postmortem draft, then persist the final state.
    let snapshot = if inner.config.postmortem_enabled {
        let draft = postmortem::draft(&snapshot);
        match checkpoint(inner, id, |i| i.postmortem = Some(draft)).await {
            Some(snapshot) => snapshot,
            None => return Ok(()),
        }
    } else {
        snapshot
    };

    // Status-guarded write: a resolve landing after the last checkpoint
    // must not be clobbered by this snapshot.
    if !inner.store.update_unless_resolved(&snapshot).await? {
        warn!(incident = %id, "Incident resolved during final persist, keeping resolved record");
        return Ok(());
    }
    info!(incident = %id, "Pipeline complete");
    Ok(())
}
