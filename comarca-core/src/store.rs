use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{Result, ScrapeError},
    model::{
        ExecutionFault, ExecutionId, ExecutionStatus, JobId, JobStatus,
        LogEntry, ScrapeJob, ScrapeType,
    },
};

/// Filter for job listings; `None` fields match everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub scrape_type: Option<ScrapeType>,
}

impl JobFilter {
    fn matches(&self, job: &ScrapeJob) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.scrape_type.is_none_or(|t| job.scrape_type == t)
    }
}

/// Partial update applied to one execution as a single transactional unit,
/// so a crash mid-transition cannot leave status and outcome disagreeing.
#[derive(Clone, Debug, Default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_count: Option<u64>,
    pub fault: Option<ExecutionFault>,
}

impl ExecutionUpdate {
    pub fn running(started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(ExecutionStatus::Running),
            started_at: Some(started_at),
            ..Self::default()
        }
    }

    pub fn completed(finished_at: DateTime<Utc>, result_count: u64) -> Self {
        Self {
            status: Some(ExecutionStatus::Completed),
            finished_at: Some(finished_at),
            result_count: Some(result_count),
            ..Self::default()
        }
    }

    pub fn failed(finished_at: DateTime<Utc>, fault: ExecutionFault) -> Self {
        Self {
            status: Some(ExecutionStatus::Failed),
            finished_at: Some(finished_at),
            fault: Some(fault),
            ..Self::default()
        }
    }
}

/// Abstracts the durable record store consumed by the orchestrator and the
/// log transports. The production store lives outside this system; this
/// port plus [`MemoryJobStore`] is the whole persistence surface here.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a job together with all of its executions atomically.
    async fn insert_job(&self, job: &ScrapeJob) -> Result<()>;

    async fn fetch_job(&self, job_id: JobId) -> Result<Option<ScrapeJob>>;

    /// Jobs matching the filter, newest first.
    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<ScrapeJob>>;

    async fn update_job_status(&self, job_id: JobId, status: JobStatus) -> Result<()>;

    async fn update_execution(
        &self,
        job_id: JobId,
        execution_id: ExecutionId,
        update: ExecutionUpdate,
    ) -> Result<()>;

    async fn append_job_log(&self, job_id: JobId, entry: LogEntry) -> Result<()>;

    async fn append_execution_log(
        &self,
        job_id: JobId,
        execution_id: ExecutionId,
        entry: LogEntry,
    ) -> Result<()>;

    /// Jobs left in a non-terminal status, for startup reconciliation.
    async fn non_terminal_jobs(&self) -> Result<Vec<ScrapeJob>>;
}

/// In-memory reference implementation backing tests and local operation.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, ScrapeJob>>,
}

impl MemoryJobStore {
    async fn with_job<T>(
        &self,
        job_id: JobId,
        f: impl FnOnce(&mut ScrapeJob) -> Result<T>,
    ) -> Result<T> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| ScrapeError::not_found(format!("job {job_id}")))?;
        f(job)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_job(&self, job: &ScrapeJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn fetch_job(&self, job_id: JobId) -> Result<Option<ScrapeJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&job_id).cloned())
    }

    async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<ScrapeJob>> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<ScrapeJob> =
            jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn update_job_status(&self, job_id: JobId, status: JobStatus) -> Result<()> {
        self.with_job(job_id, |job| {
            job.status = status;
            Ok(())
        })
        .await
    }

    async fn update_execution(
        &self,
        job_id: JobId,
        execution_id: ExecutionId,
        update: ExecutionUpdate,
    ) -> Result<()> {
        self.with_job(job_id, |job| {
            let execution = job
                .executions
                .iter_mut()
                .find(|e| e.id == execution_id)
                .ok_or_else(|| {
                    ScrapeError::not_found(format!("execution {execution_id}"))
                })?;
            if let Some(status) = update.status {
                execution.status = status;
            }
            if let Some(started_at) = update.started_at {
                execution.started_at = Some(started_at);
            }
            if let Some(finished_at) = update.finished_at {
                execution.finished_at = Some(finished_at);
            }
            if let Some(result_count) = update.result_count {
                execution.result_count = Some(result_count);
            }
            if let Some(fault) = update.fault {
                execution.fault = Some(fault);
            }
            Ok(())
        })
        .await
    }

    async fn append_job_log(&self, job_id: JobId, entry: LogEntry) -> Result<()> {
        self.with_job(job_id, |job| {
            job.logs.push(entry);
            Ok(())
        })
        .await
    }

    async fn append_execution_log(
        &self,
        job_id: JobId,
        execution_id: ExecutionId,
        entry: LogEntry,
    ) -> Result<()> {
        self.with_job(job_id, |job| {
            let execution = job
                .executions
                .iter_mut()
                .find(|e| e.id == execution_id)
                .ok_or_else(|| {
                    ScrapeError::not_found(format!("execution {execution_id}"))
                })?;
            execution.logs.push(entry);
            Ok(())
        })
        .await
    }

    async fn non_terminal_jobs(&self) -> Result<Vec<ScrapeJob>> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<ScrapeJob> = jobs
            .values()
            .filter(|j| !j.status.is_terminal())
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }
}
