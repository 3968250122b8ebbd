use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{Mutex, mpsc},
    task::{JoinHandle, JoinSet},
    time::interval,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{Result, ScrapeError},
    logs::LogAggregator,
    model::{
        Execution, ExecutionFault, ExecutionId, ExecutionStatus, FaultKind,
        JobId, ScrapeJob, ScrapeOptions, ScrapeType,
    },
    runner::{ExecutionOutcome, run_execution},
    scraper::{AdapterRegistry, ExecutionLogSink},
    store::{ExecutionUpdate, JobStore},
    tribunal::TribunalRegistry,
};

/// Tunables for dispatch and execution.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Global ceiling on simultaneously running executions.
    pub max_concurrent_executions: usize,
    /// Per-execution deadline enforced by the runner.
    pub execution_timeout: Duration,
    /// Safety-net dispatch cadence; normal dispatch is event-driven off
    /// completions and job creation.
    pub dispatch_tick: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 4,
            execution_timeout: Duration::from_secs(300),
            dispatch_tick: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct CompletionMsg {
    job_id: JobId,
    execution_id: ExecutionId,
    outcome: ExecutionOutcome,
}

#[derive(Debug)]
struct DispatchState {
    running: usize,
    completion_tx: Option<mpsc::Sender<CompletionMsg>>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

#[derive(Debug)]
struct RuntimeHandles {
    cancel: CancellationToken,
    completion_loop: JoinHandle<()>,
    dispatch_ticker: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

/// Creates jobs, fans executions out under the concurrency cap, and owns
/// every job/execution status transition.
///
/// Runners report outcomes over a channel consumed by a single completion
/// loop, so status writes have one writer; the dispatch lock serializes
/// claiming. An explicit service object: the process entry point calls
/// [`Orchestrator::start`]/[`Orchestrator::stop`] and hands references to
/// handlers, nothing lives in ambient global state.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    registry: Arc<TribunalRegistry>,
    adapters: AdapterRegistry,
    aggregator: Arc<LogAggregator>,
    config: OrchestratorConfig,
    dispatch_state: Mutex<DispatchState>,
    runtime: Mutex<Option<RuntimeHandles>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<TribunalRegistry>,
        adapters: AdapterRegistry,
        aggregator: Arc<LogAggregator>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            adapters,
            aggregator,
            config,
            dispatch_state: Mutex::new(DispatchState {
                running: 0,
                completion_tx: None,
                cancel: CancellationToken::new(),
                tasks: JoinSet::new(),
            }),
            runtime: Mutex::new(None),
        }
    }

    pub fn aggregator(&self) -> Arc<LogAggregator> {
        Arc::clone(&self.aggregator)
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    pub fn registry(&self) -> Arc<TribunalRegistry> {
        Arc::clone(&self.registry)
    }

    fn job_sink(&self, job_id: JobId) -> ExecutionLogSink {
        ExecutionLogSink::new(
            Arc::clone(&self.aggregator),
            Arc::clone(&self.store),
            job_id,
            None,
        )
    }

    /// Validates and persists a job with one pending execution per target.
    /// No partial job is created on failure; dispatch runs immediately when
    /// the orchestrator is started.
    pub async fn create_job(
        &self,
        scrape_type: ScrapeType,
        targets: &[String],
        options: ScrapeOptions,
    ) -> Result<ScrapeJob> {
        if targets.is_empty() {
            return Err(ScrapeError::validation(
                "at least one tribunal target is required",
            ));
        }

        let mut tribunals = Vec::with_capacity(targets.len());
        for target in targets {
            tribunals.push(self.registry.resolve(target)?);
        }

        let job = ScrapeJob::new(scrape_type, tribunals, options);
        self.store.insert_job(&job).await?;

        self.job_sink(job.id)
            .info(format!(
                "job created: {scrape_type} across {} targets",
                job.executions.len()
            ))
            .await;
        info!(job = %job.id, kind = %scrape_type, targets = job.executions.len(), "scrape job created");

        self.dispatch().await;

        let fresh = self.store.fetch_job(job.id).await?;
        Ok(fresh.unwrap_or(job))
    }

    /// Starts the completion loop, dispatch tick, and buffer sweeper.
    /// Idempotent; reconciles jobs a prior process left running first.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Ok(());
        }

        self.reconcile_interrupted().await?;

        let (tx, rx) = mpsc::channel(
            self.config.max_concurrent_executions.max(16) * 4,
        );
        let cancel = CancellationToken::new();
        {
            let mut state = self.dispatch_state.lock().await;
            state.running = 0;
            state.completion_tx = Some(tx);
            state.cancel = cancel.clone();
        }

        let completion_loop = tokio::spawn(Arc::clone(self).completion_loop(rx));
        let dispatch_ticker = tokio::spawn(
            Arc::clone(self).dispatch_tick_loop(cancel.child_token()),
        );
        let sweeper = Arc::clone(&self.aggregator)
            .spawn_retention_sweeper(cancel.child_token());

        *runtime = Some(RuntimeHandles {
            cancel,
            completion_loop,
            dispatch_ticker,
            sweeper,
        });
        drop(runtime);

        info!("orchestrator started");
        self.dispatch().await;
        Ok(())
    }

    /// Stops ticking and awaits in-flight executions so their outcomes are
    /// recorded; nothing is abandoned silently. Idempotent.
    pub async fn stop(&self) {
        let Some(handles) = self.runtime.lock().await.take() else {
            return;
        };
        handles.cancel.cancel();

        {
            let mut state = self.dispatch_state.lock().await;
            while state.tasks.join_next().await.is_some() {}
            state.completion_tx = None;
        }

        // All senders are gone once the tasks finished and ours is dropped;
        // the loop drains any queued outcomes and exits.
        let _ = handles.completion_loop.await;
        let _ = handles.dispatch_ticker.await;
        let _ = handles.sweeper.await;
        info!("orchestrator stopped");
    }

    /// Non-blocking slot fill: claims pending executions oldest-job-first up
    /// to the concurrency cap and hands each to a runner task.
    pub async fn dispatch(&self) {
        let mut state = self.dispatch_state.lock().await;
        let Some(tx) = state.completion_tx.clone() else {
            return;
        };
        if state.cancel.is_cancelled() {
            return;
        }

        while state.running < self.config.max_concurrent_executions {
            let claimed = match self.next_pending().await {
                Ok(Some(claimed)) => claimed,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "dispatch could not read pending executions");
                    break;
                }
            };
            let (job, execution) = claimed;

            if let Err(err) = self
                .store
                .update_execution(
                    job.id,
                    execution.id,
                    ExecutionUpdate::running(Utc::now()),
                )
                .await
            {
                warn!(job = %job.id, execution = %execution.id, error = %err, "failed to claim execution");
                break;
            }
            self.refresh_job_status(job.id).await;

            state.running += 1;
            let adapter = self.adapters.get(execution.tribunal.id.sistema);
            let sink = ExecutionLogSink::new(
                Arc::clone(&self.aggregator),
                Arc::clone(&self.store),
                job.id,
                Some(execution.id),
            );
            let timeout = self.config.execution_timeout;
            let tx = tx.clone();
            state.tasks.spawn(async move {
                let outcome = run_execution(
                    &execution,
                    adapter,
                    &job.options,
                    &sink,
                    timeout,
                )
                .await;
                let msg = CompletionMsg {
                    job_id: job.id,
                    execution_id: execution.id,
                    outcome,
                };
                if tx.send(msg).await.is_err() {
                    warn!(job = %job.id, execution = %execution.id, "completion channel closed; outcome dropped");
                }
            });
        }
    }

    async fn completion_loop(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<CompletionMsg>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(err) = self.record_completion(&msg).await {
                error!(job = %msg.job_id, execution = %msg.execution_id, error = %err, "failed to record execution outcome");
            }
            {
                let mut state = self.dispatch_state.lock().await;
                state.running = state.running.saturating_sub(1);
                while state.tasks.try_join_next().is_some() {}
            }
            // Freed slot is reused immediately.
            self.dispatch().await;
        }
    }

    async fn dispatch_tick_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = interval(self.config.dispatch_tick);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => self.dispatch().await,
            }
        }
    }

    async fn next_pending(&self) -> Result<Option<(ScrapeJob, Execution)>> {
        let jobs = self.store.non_terminal_jobs().await?;
        for job in jobs {
            if let Some(execution) = job
                .executions
                .iter()
                .find(|e| e.status == ExecutionStatus::Pending)
            {
                let execution = execution.clone();
                return Ok(Some((job, execution)));
            }
        }
        Ok(None)
    }

    async fn record_completion(&self, msg: &CompletionMsg) -> Result<()> {
        let now = Utc::now();
        let update = match &msg.outcome {
            ExecutionOutcome::Completed { count } => {
                ExecutionUpdate::completed(now, *count)
            }
            ExecutionOutcome::Failed { fault } => {
                ExecutionUpdate::failed(now, fault.clone())
            }
        };
        self.store
            .update_execution(msg.job_id, msg.execution_id, update)
            .await?;

        let status = self.refresh_job_status(msg.job_id).await;
        if let Some(status) = status
            && status.is_terminal()
        {
            let job = self
                .store
                .fetch_job(msg.job_id)
                .await?
                .ok_or_else(|| {
                    ScrapeError::not_found(format!("job {}", msg.job_id))
                })?;
            let completed = job
                .executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Completed)
                .count();
            self.job_sink(job.id)
                .info(format!(
                    "job finished with status {status}: {completed}/{} targets completed",
                    job.executions.len()
                ))
                .await;
            self.aggregator.mark_complete(job.id);
            info!(
                target: "scrape::summary",
                job = %job.id,
                status = %status,
                completed,
                total = job.executions.len(),
                "job reached terminal status"
            );
        }
        Ok(())
    }

    /// Recomputes and persists the derived job status. Returns the derived
    /// status when the job still exists.
    async fn refresh_job_status(
        &self,
        job_id: JobId,
    ) -> Option<crate::model::JobStatus> {
        match self.store.fetch_job(job_id).await {
            Ok(Some(job)) => {
                let derived = job.derived_status();
                if derived != job.status {
                    if let Err(err) =
                        self.store.update_job_status(job_id, derived).await
                    {
                        warn!(job = %job_id, error = %err, "failed to persist job status");
                    }
                }
                Some(derived)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(job = %job_id, error = %err, "failed to reload job for status refresh");
                None
            }
        }
    }

    /// Startup reconciliation: a job a prior process instance left mid-run
    /// cannot be resumed (its executions' progress is unknown), so its
    /// non-terminal executions are marked failed-interrupted and the job is
    /// driven to a terminal status. Jobs still fully pending are left alone
    /// and picked up by normal dispatch.
    async fn reconcile_interrupted(&self) -> Result<()> {
        let stale = self.store.non_terminal_jobs().await?;
        for job in stale {
            let untouched = job
                .executions
                .iter()
                .all(|e| e.status == ExecutionStatus::Pending);
            if untouched {
                continue;
            }

            let now = Utc::now();
            for execution in &job.executions {
                if !execution.status.is_terminal() {
                    self.store
                        .update_execution(
                            job.id,
                            execution.id,
                            ExecutionUpdate::failed(
                                now,
                                ExecutionFault::new(
                                    FaultKind::Internal,
                                    "interrupted by orchestrator restart",
                                ),
                            ),
                        )
                        .await?;
                }
            }
            self.job_sink(job.id)
                .warn("job interrupted by orchestrator restart")
                .await;
            self.refresh_job_status(job.id).await;
            self.aggregator.mark_complete(job.id);
            warn!(job = %job.id, "marked stale running job as interrupted");
        }
        Ok(())
    }
}
