use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    error::{Result, ScrapeError},
    logs::aggregator::{LogAggregator, LogFrame},
    model::{ExecutionId, JobId, JobStatus, LogEntry, LogLevel, ScrapeJob},
    store::JobStore,
};

/// One page of the poll transport.
///
/// `has_more` mirrors the job's liveness; callers repeat with
/// `from_index = last_index` until it turns false.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogQueryPage {
    pub logs: Vec<LogEntry>,
    pub last_index: usize,
    pub job_status: JobStatus,
    pub has_more: bool,
}

/// Everything the push transport needs to serve one subscriber: the merged
/// backfill, the live receiver, and the sequence watermark separating the
/// two phases.
#[derive(Debug)]
pub struct LogStream {
    pub backfill: Vec<LogEntry>,
    /// Highest buffered sequence included in the backfill; the follow phase
    /// must skip frames at or below it.
    pub last_buffered_sequence: u64,
    /// Absent once the job's buffer has been released; the stream is then
    /// backfill-only.
    pub live: Option<broadcast::Receiver<LogFrame>>,
    pub job_status: JobStatus,
}

type EntryKey = (DateTime<Utc>, Option<ExecutionId>, LogLevel, String);

fn entry_key(entry: &LogEntry) -> EntryKey {
    (
        entry.timestamp,
        entry.execution_id,
        entry.level,
        entry.message.clone(),
    )
}

/// Merges persisted history with the live buffer into one ascending
/// timeline. Entries present on both sides (the common case, since the sink
/// writes both paths) are kept once; ordering across scopes is re-sorted,
/// never assumed.
pub fn merged_entries(job: &ScrapeJob, buffered: &[LogFrame]) -> Vec<LogEntry> {
    let mut merged: Vec<LogEntry> = Vec::with_capacity(
        job.logs.len()
            + job.executions.iter().map(|e| e.logs.len()).sum::<usize>()
            + buffered.len(),
    );
    merged.extend(job.logs.iter().cloned());
    for execution in &job.executions {
        merged.extend(execution.logs.iter().cloned());
    }

    let seen: HashSet<EntryKey> = merged.iter().map(entry_key).collect();
    for frame in buffered {
        if !seen.contains(&entry_key(&frame.entry)) {
            merged.push(frame.entry.clone());
        }
    }

    merged.sort_by_key(|entry| entry.timestamp);
    merged
}

/// Poll transport: returns merged entries from `from_index` on.
pub async fn query_logs(
    store: &dyn JobStore,
    aggregator: &LogAggregator,
    job_id: JobId,
    from_index: usize,
) -> Result<LogQueryPage> {
    let job = store
        .fetch_job(job_id)
        .await?
        .ok_or_else(|| ScrapeError::not_found(format!("job {job_id}")))?;
    let merged = merged_entries(&job, &aggregator.snapshot(job_id));

    let logs = if from_index < merged.len() {
        merged[from_index..].to_vec()
    } else {
        Vec::new()
    };

    Ok(LogQueryPage {
        logs,
        last_index: merged.len(),
        job_status: job.status,
        has_more: !job.status.is_terminal(),
    })
}

/// Push transport setup: backfill plus live receiver.
///
/// Persisted history is read before the buffer cut, so an entry landing in
/// between shows up exactly once (in the snapshot); the sequence watermark
/// keeps the follow phase from replaying anything the backfill already
/// delivered.
pub async fn open_stream(
    store: &dyn JobStore,
    aggregator: &LogAggregator,
    job_id: JobId,
) -> Result<LogStream> {
    let job = store
        .fetch_job(job_id)
        .await?
        .ok_or_else(|| ScrapeError::not_found(format!("job {job_id}")))?;

    let (snapshot, live) = aggregator.subscribe_with_snapshot(job_id);
    let last_buffered_sequence =
        snapshot.iter().map(|f| f.sequence).max().unwrap_or(0);
    let backfill = merged_entries(&job, &snapshot);

    Ok(LogStream {
        backfill,
        last_buffered_sequence,
        live,
        job_status: job.status,
    })
}
