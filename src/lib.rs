//! incidentd -- automated incident-response orchestrator.
//!
//! Ingests alert webhooks from monitoring tools, deduplicates them into
//! incidents, and drives a per-incident response pipeline: evidence
//! gathering, root-cause analysis, fix suggestions, notifications, and a
//! postmortem draft, with windowed MTTR statistics over resolved incidents.

pub mod analyze;
pub mod api;
pub mod config;
pub mod evidence;
pub mod incident;
pub mod notify;
pub mod postmortem;
pub mod respond;
pub mod stats;
pub mod storage;

use anyhow::Result;
use config::Config;
use incident::orchestrator::{Orchestrator, OrchestratorConfig};

/// Wire the orchestrator and its capabilities from configuration.
pub fn build_orchestrator(config: &Config, store: storage::Store) -> Orchestrator {
    let sources = evidence::build_sources(&config.evidence.sources);
    let aggregator = evidence::Aggregator::new(sources);
    let analyzer = analyze::build_analyzer(&config.analysis);
    let notifier = notify::Notifier::new(&config.notifications.channels);

    Orchestrator::new(
        aggregator,
        analyzer,
        respond::FixSuggester::new(),
        notifier,
        store,
        OrchestratorConfig {
            evidence_lookback_minutes: config.evidence.lookback_minutes,
            max_evidence_lines: config.evidence.max_lines,
            postmortem_enabled: config.postmortem.enabled,
        },
    )
}

/// Start the incidentd daemon: storage, orchestrator, and API server.
pub async fn serve(config: Config) -> Result<()> {
    if let Some(parent) = std::path::Path::new(&config.storage.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::info!(db_path = %config.storage.path, "Initializing database");
    let pool = storage::open_pool(&config.storage.path)?;
    let store = storage::Store::new(pool);

    let orchestrator = build_orchestrator(&config, store.clone());
    let mttr = stats::MttrEngine::new(store.clone());

    let state = api::state::AppState {
        orchestrator,
        store,
        mttr,
    };
    let app = api::router(state);

    let addr: std::net::SocketAddr = config.server.bind.parse()?;
    tracing::info!(%addr, "incidentd listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
