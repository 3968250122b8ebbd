use std::{fmt, sync::Arc};

use comarca_core::{
    CronScheduler, LogAggregator, Orchestrator, TribunalRegistry,
    store::JobStore,
};

use crate::config::Config;

/// Shared handles passed to every handler. The orchestrator and scheduler
/// are process-wide services owned by `main`; handlers only borrow them.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Option<Arc<CronScheduler>>,
    pub store: Arc<dyn JobStore>,
    pub aggregator: Arc<LogAggregator>,
    pub registry: Arc<TribunalRegistry>,
    pub config: Arc<Config>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        scheduler: Option<Arc<CronScheduler>>,
        config: Arc<Config>,
    ) -> Self {
        let store = orchestrator.store();
        let aggregator = orchestrator.aggregator();
        let registry = orchestrator.registry();
        Self {
            orchestrator,
            scheduler,
            store,
            aggregator,
            registry,
            config,
        }
    }
}
