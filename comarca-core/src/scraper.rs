use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::Result,
    logs::LogAggregator,
    model::{ExecutionId, JobId, LogEntry, LogLevel, ScrapeOptions},
    store::JobStore,
    tribunal::{Sistema, TribunalConfig},
};

/// What a finished adapter call hands back.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScrapeOutcome {
    /// Number of records collected from the portal.
    pub count: u64,
    /// Opaque references to downloaded artifacts, resolved elsewhere.
    pub artifacts: Vec<String>,
}

/// Capability interface implemented once per e-filing sistema.
///
/// Adapters stream diagnostics through the sink as they work, not only at
/// completion; errors are returned, never panicked, and the runner converts
/// them into execution faults at its boundary.
#[async_trait]
pub trait ScraperAdapter: Send + Sync {
    fn sistema(&self) -> Sistema;

    async fn execute(
        &self,
        tribunal: &TribunalConfig,
        options: &ScrapeOptions,
        logs: &ExecutionLogSink,
    ) -> Result<ScrapeOutcome>;
}

/// Explicit adapter dispatch table keyed by sistema.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Sistema, Arc<dyn ScraperAdapter>>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> =
            self.adapters.keys().map(Sistema::as_str).collect();
        f.debug_struct("AdapterRegistry")
            .field("registered", &registered)
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ScraperAdapter>) {
        self.adapters.insert(adapter.sistema(), adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ScraperAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, sistema: Sistema) -> Option<Arc<dyn ScraperAdapter>> {
        self.adapters.get(&sistema).cloned()
    }
}

/// Scope-stamping log handle passed into adapters and the runner.
///
/// Entries go to the in-memory aggregator first (live delivery), then to the
/// store; a store failure is logged and swallowed so live delivery never
/// blocks on the persistence path.
#[derive(Clone)]
pub struct ExecutionLogSink {
    aggregator: Arc<LogAggregator>,
    store: Arc<dyn JobStore>,
    job_id: JobId,
    execution_id: Option<ExecutionId>,
}

impl fmt::Debug for ExecutionLogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionLogSink")
            .field("job_id", &self.job_id)
            .field("execution_id", &self.execution_id)
            .finish()
    }
}

impl ExecutionLogSink {
    pub fn new(
        aggregator: Arc<LogAggregator>,
        store: Arc<dyn JobStore>,
        job_id: JobId,
        execution_id: Option<ExecutionId>,
    ) -> Self {
        Self {
            aggregator,
            store,
            job_id,
            execution_id,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry =
            LogEntry::new(level, message, self.job_id, self.execution_id);
        self.aggregator.append(entry.clone());

        let persisted = match self.execution_id {
            Some(execution_id) => {
                self.store
                    .append_execution_log(self.job_id, execution_id, entry)
                    .await
            }
            None => self.store.append_job_log(self.job_id, entry).await,
        };
        if let Err(err) = persisted {
            warn!(job = %self.job_id, error = %err, "failed to persist log entry; live delivery unaffected");
        }
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message).await;
    }
}
