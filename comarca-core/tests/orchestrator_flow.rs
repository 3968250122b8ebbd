//! End-to-end orchestration flows against stub adapters: concurrency cap,
//! bulkhead isolation, timeout faults, restart reconciliation, and
//! poll/stream transport equivalence.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use comarca_core::{
    AdapterRegistry, ExecutionLogSink, ExecutionStatus, ExecutionUpdate,
    FaultKind, JobId, JobStatus, LogAggregator, MemoryJobStore, Orchestrator,
    OrchestratorConfig, Result, ScrapeError, ScrapeJob, ScrapeOptions,
    ScrapeOutcome, ScrapeType, ScraperAdapter, Sistema, TribunalConfig,
    TribunalRegistry,
    logs::{open_stream, query_logs},
    store::JobStore,
};

const PJE_TARGETS: [&str; 5] = [
    "TRT1-PJE-1g",
    "TRT1-PJE-2g",
    "TRT2-PJE-1g",
    "TRT2-PJE-2g",
    "TRT3-PJE-1g",
];

/// Counts concurrent `execute` calls and remembers the high-water mark.
struct GaugedAdapter {
    current: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl GaugedAdapter {
    fn new(delay: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        }
    }
}

#[async_trait]
impl ScraperAdapter for GaugedAdapter {
    fn sistema(&self) -> Sistema {
        Sistema::Pje
    }

    async fn execute(
        &self,
        tribunal: &TribunalConfig,
        _options: &ScrapeOptions,
        logs: &ExecutionLogSink,
    ) -> Result<ScrapeOutcome> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        logs.info(format!("visiting {}", tribunal.id)).await;
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ScrapeOutcome {
            count: 3,
            artifacts: vec![],
        })
    }
}

/// Fails for one specific court code, succeeds everywhere else.
struct SelectiveAdapter {
    failing_code: &'static str,
}

#[async_trait]
impl ScraperAdapter for SelectiveAdapter {
    fn sistema(&self) -> Sistema {
        Sistema::Pje
    }

    async fn execute(
        &self,
        tribunal: &TribunalConfig,
        _options: &ScrapeOptions,
        logs: &ExecutionLogSink,
    ) -> Result<ScrapeOutcome> {
        if tribunal.id.code == self.failing_code {
            logs.warn(format!("session rejected by {}", tribunal.id)).await;
            return Err(ScrapeError::Scrape {
                tribunal: tribunal.id.to_string(),
                message: "captcha wall".into(),
            });
        }
        Ok(ScrapeOutcome {
            count: 2,
            artifacts: vec![],
        })
    }
}

struct SlowAdapter;

#[async_trait]
impl ScraperAdapter for SlowAdapter {
    fn sistema(&self) -> Sistema {
        Sistema::Pje
    }

    async fn execute(
        &self,
        _tribunal: &TribunalConfig,
        _options: &ScrapeOptions,
        _logs: &ExecutionLogSink,
    ) -> Result<ScrapeOutcome> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ScrapeOutcome::default())
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    store: Arc<MemoryJobStore>,
    aggregator: Arc<LogAggregator>,
}

fn harness(
    adapter: Arc<dyn ScraperAdapter>,
    config: OrchestratorConfig,
) -> Harness {
    let store = Arc::new(MemoryJobStore::default());
    let aggregator = Arc::new(LogAggregator::default());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(TribunalRegistry::builtin()),
        AdapterRegistry::new().with_adapter(adapter),
        Arc::clone(&aggregator),
        config,
    ));
    Harness {
        orchestrator,
        store,
        aggregator,
    }
}

fn targets() -> Vec<String> {
    PJE_TARGETS.iter().map(|t| (*t).to_string()).collect()
}

async fn wait_terminal(store: &MemoryJobStore, job_id: JobId) -> ScrapeJob {
    for _ in 0..500 {
        let job = store.fetch_job(job_id).await.unwrap().unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal status");
}

#[tokio::test]
async fn concurrency_cap_is_never_exceeded_and_slots_are_reused() {
    let adapter = Arc::new(GaugedAdapter::new(Duration::from_millis(50)));
    let h = harness(
        Arc::clone(&adapter) as Arc<dyn ScraperAdapter>,
        OrchestratorConfig {
            max_concurrent_executions: 2,
            execution_timeout: Duration::from_secs(5),
            dispatch_tick: Duration::from_millis(50),
        },
    );
    h.orchestrator.start().await.unwrap();

    let job = h
        .orchestrator
        .create_job(ScrapeType::Movements, &targets(), ScrapeOptions::default())
        .await
        .unwrap();

    let finished = wait_terminal(&h.store, job.id).await;
    h.orchestrator.stop().await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert!(
        finished
            .executions
            .iter()
            .all(|e| e.status == ExecutionStatus::Completed)
    );
    assert!(
        finished
            .executions
            .iter()
            .all(|e| e.result_count == Some(3))
    );
    let peak = adapter.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "cap exceeded: {peak} concurrent executions");
}

#[tokio::test]
async fn one_failing_target_never_aborts_siblings() {
    let h = harness(
        Arc::new(SelectiveAdapter {
            failing_code: "TRT2",
        }),
        OrchestratorConfig {
            max_concurrent_executions: 3,
            execution_timeout: Duration::from_secs(5),
            dispatch_tick: Duration::from_millis(50),
        },
    );
    h.orchestrator.start().await.unwrap();

    let job = h
        .orchestrator
        .create_job(ScrapeType::FullCase, &targets(), ScrapeOptions::default())
        .await
        .unwrap();
    let finished = wait_terminal(&h.store, job.id).await;
    h.orchestrator.stop().await;

    assert_eq!(finished.status, JobStatus::PartiallyFailed);
    for execution in &finished.executions {
        if execution.tribunal.id.code == "TRT2" {
            assert_eq!(execution.status, ExecutionStatus::Failed);
            let fault = execution.fault.as_ref().expect("fault detail");
            assert_eq!(fault.kind, FaultKind::Scrape);
            assert!(fault.message.contains("captcha"));
        } else {
            assert_eq!(execution.status, ExecutionStatus::Completed);
        }
    }

    // Logs stay queryable for failed jobs, including the failure narrative.
    let page = query_logs(h.store.as_ref(), &h.aggregator, job.id, 0)
        .await
        .unwrap();
    assert!(!page.has_more);
    assert!(
        page.logs
            .iter()
            .any(|l| l.message.contains("session rejected"))
    );
}

#[tokio::test]
async fn timed_out_execution_records_timeout_fault() {
    let h = harness(
        Arc::new(SlowAdapter),
        OrchestratorConfig {
            max_concurrent_executions: 2,
            execution_timeout: Duration::from_millis(100),
            dispatch_tick: Duration::from_millis(50),
        },
    );
    h.orchestrator.start().await.unwrap();

    let job = h
        .orchestrator
        .create_job(
            ScrapeType::Documents,
            &["TRT3-PJE-1g".to_string()],
            ScrapeOptions::default(),
        )
        .await
        .unwrap();
    let finished = wait_terminal(&h.store, job.id).await;
    h.orchestrator.stop().await;

    assert_eq!(finished.status, JobStatus::Failed);
    let fault = finished.executions[0].fault.as_ref().expect("fault detail");
    assert_eq!(fault.kind, FaultKind::Timeout);
}

#[tokio::test]
async fn stream_and_poll_observe_the_same_entries() {
    let h = harness(
        Arc::new(GaugedAdapter::new(Duration::from_millis(20))),
        OrchestratorConfig {
            max_concurrent_executions: 2,
            execution_timeout: Duration::from_secs(5),
            dispatch_tick: Duration::from_millis(50),
        },
    );
    h.orchestrator.start().await.unwrap();

    let job = h
        .orchestrator
        .create_job(ScrapeType::Movements, &targets(), ScrapeOptions::default())
        .await
        .unwrap();

    // Open the stream while work is in flight: backfill then follow.
    let stream = open_stream(h.store.as_ref(), &h.aggregator, job.id)
        .await
        .unwrap();
    let mut seen: Vec<String> =
        stream.backfill.iter().map(|l| l.message.clone()).collect();
    let watermark = stream.last_buffered_sequence;

    if !seen.iter().any(|m| m.contains("job finished")) {
        let mut live = stream.live.expect("job buffer still live");
        loop {
            let frame =
                tokio::time::timeout(Duration::from_secs(5), live.recv())
                    .await
                    .expect("stream stalled")
                    .expect("buffer closed before terminal entry");
            if frame.sequence <= watermark {
                continue;
            }
            let terminal = frame.entry.message.contains("job finished");
            seen.push(frame.entry.message.clone());
            if terminal {
                break;
            }
        }
    }

    let finished = wait_terminal(&h.store, job.id).await;
    assert_eq!(finished.status, JobStatus::Completed);

    let page = query_logs(h.store.as_ref(), &h.aggregator, job.id, 0)
        .await
        .unwrap();
    h.orchestrator.stop().await;

    let polled: Vec<String> =
        page.logs.iter().map(|l| l.message.clone()).collect();

    // Same entries end to end: no duplicates, no gaps.
    assert_eq!(seen.len(), polled.len());
    let seen_set: HashSet<&String> = seen.iter().collect();
    let polled_set: HashSet<&String> = polled.iter().collect();
    assert_eq!(seen_set.len(), seen.len(), "stream delivered a duplicate");
    assert_eq!(seen_set, polled_set);
}

#[tokio::test]
async fn restart_marks_half_run_jobs_interrupted_and_redispatches_pending() {
    let store = Arc::new(MemoryJobStore::default());
    let registry = TribunalRegistry::builtin();

    // A job a previous process left mid-run.
    let mut stale = ScrapeJob::new(
        ScrapeType::Movements,
        vec![registry.resolve("TRT1-PJE-1g").unwrap()],
        ScrapeOptions::default(),
    );
    stale.status = JobStatus::Running;
    store.insert_job(&stale).await.unwrap();
    store
        .update_execution(
            stale.id,
            stale.executions[0].id,
            ExecutionUpdate::running(Utc::now()),
        )
        .await
        .unwrap();

    // An untouched pending job that should simply be dispatched.
    let fresh = ScrapeJob::new(
        ScrapeType::Movements,
        vec![registry.resolve("TRT3-PJE-1g").unwrap()],
        ScrapeOptions::default(),
    );
    store.insert_job(&fresh).await.unwrap();

    let aggregator = Arc::new(LogAggregator::default());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(TribunalRegistry::builtin()),
        AdapterRegistry::new()
            .with_adapter(Arc::new(GaugedAdapter::new(Duration::from_millis(10)))),
        aggregator,
        OrchestratorConfig {
            max_concurrent_executions: 2,
            execution_timeout: Duration::from_secs(5),
            dispatch_tick: Duration::from_millis(50),
        },
    ));
    orchestrator.start().await.unwrap();

    let interrupted = wait_terminal(&store, stale.id).await;
    assert_eq!(interrupted.status, JobStatus::Failed);
    let fault = interrupted.executions[0].fault.as_ref().expect("fault");
    assert_eq!(fault.kind, FaultKind::Internal);
    assert!(fault.message.contains("restart"));

    let resumed = wait_terminal(&store, fresh.id).await;
    assert_eq!(resumed.status, JobStatus::Completed);

    orchestrator.stop().await;
}
