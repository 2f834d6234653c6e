use crate::incident::orchestrator::Orchestrator;
use crate::stats::MttrEngine;
use crate::storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: Store,
    pub mttr: MttrEngine,
}
