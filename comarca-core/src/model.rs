use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tribunal::TribunalConfig;

/// Unique identifier for scrape jobs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for per-tribunal executions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of data collection a job performs across its targets.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeType {
    FullCase,
    Movements,
    Documents,
    Parties,
}

impl ScrapeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeType::FullCase => "full_case",
            ScrapeType::Movements => "movements",
            ScrapeType::Documents => "documents",
            ScrapeType::Parties => "parties",
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            ScrapeType::FullCase,
            ScrapeType::Movements,
            ScrapeType::Documents,
            ScrapeType::Parties,
        ]
    }
}

impl fmt::Display for ScrapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScrapeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full_case" => Ok(ScrapeType::FullCase),
            "movements" => Ok(ScrapeType::Movements),
            "documents" => Ok(ScrapeType::Documents),
            "parties" => Ok(ScrapeType::Parties),
            other => Err(format!("unsupported scrape type: {other}")),
        }
    }
}

/// Aggregate job states derived from execution states.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    PartiallyFailed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::PartiallyFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::PartiallyFailed => "partially_failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tribunal execution states.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Derives a job's aggregate status from its executions' statuses.
///
/// This is the single source of truth for the status invariant: a job is
/// never `Completed` unless every execution completed, and any failed
/// execution yields a distinguishable failed/partial terminal status.
pub fn aggregate_status(executions: &[ExecutionStatus]) -> JobStatus {
    if executions.is_empty() {
        return JobStatus::Pending;
    }
    if executions
        .iter()
        .all(|s| matches!(s, ExecutionStatus::Pending))
    {
        return JobStatus::Pending;
    }
    if executions.iter().any(|s| !s.is_terminal()) {
        return JobStatus::Running;
    }

    let completed = executions
        .iter()
        .filter(|s| matches!(s, ExecutionStatus::Completed))
        .count();
    if completed == executions.len() {
        JobStatus::Completed
    } else if completed == 0 {
        JobStatus::Failed
    } else {
        JobStatus::PartiallyFailed
    }
}

/// Log severities carried on every entry.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// A timestamped diagnostic record scoped to a job or one of its executions.
///
/// Entries are immutable once appended; messages are sanitized at
/// construction so credential material never crosses the process boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub job_id: JobId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
}

impl LogEntry {
    pub fn new(
        level: LogLevel,
        message: impl Into<String>,
        job_id: JobId,
        execution_id: Option<ExecutionId>,
    ) -> Self {
        let message =
            crate::logs::sanitize::sanitize_message(&message.into()).into_owned();
        Self {
            timestamp: Utc::now(),
            level,
            message,
            job_id,
            execution_id,
        }
    }

    pub fn job_scoped(level: LogLevel, message: impl Into<String>, job_id: JobId) -> Self {
        Self::new(level, message, job_id, None)
    }
}

/// What went wrong in a failed execution.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Scrape,
    Timeout,
    Internal,
}

/// Structured failure detail recorded on a failed execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFault {
    pub kind: FaultKind,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ExecutionFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// The unit of work for one tribunal target within a job.
///
/// An execution belongs to exactly one job and is never reassigned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub job_id: JobId,
    pub tribunal: TribunalConfig,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_count: Option<u64>,
    pub fault: Option<ExecutionFault>,
    pub logs: Vec<LogEntry>,
}

impl Execution {
    pub fn pending(job_id: JobId, tribunal: TribunalConfig) -> Self {
        Self {
            id: ExecutionId::new(),
            job_id,
            tribunal,
            status: ExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
            result_count: None,
            fault: None,
            logs: Vec::new(),
        }
    }
}

/// Pass-through options forwarded to scraper adapters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScrapeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

/// A top-level scrape request spanning one or more tribunal targets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: JobId,
    pub scrape_type: ScrapeType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub options: ScrapeOptions,
    pub logs: Vec<LogEntry>,
    pub executions: Vec<Execution>,
}

impl ScrapeJob {
    pub fn new(
        scrape_type: ScrapeType,
        tribunals: Vec<TribunalConfig>,
        options: ScrapeOptions,
    ) -> Self {
        let id = JobId::new();
        let executions = tribunals
            .into_iter()
            .map(|t| Execution::pending(id, t))
            .collect();
        Self {
            id,
            scrape_type,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            options,
            logs: Vec::new(),
            executions,
        }
    }

    /// Recomputes the aggregate status from execution states.
    pub fn derived_status(&self) -> JobStatus {
        let states: Vec<ExecutionStatus> =
            self.executions.iter().map(|e| e.status).collect();
        aggregate_status(&states)
    }

    pub fn execution(&self, id: ExecutionId) -> Option<&Execution> {
        self.executions.iter().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ExecutionStatus::{Completed, Failed, Pending, Running};

    #[test]
    fn aggregate_status_truth_table() {
        assert_eq!(aggregate_status(&[]), JobStatus::Pending);
        assert_eq!(aggregate_status(&[Pending, Pending]), JobStatus::Pending);
        assert_eq!(aggregate_status(&[Running, Pending]), JobStatus::Running);
        assert_eq!(aggregate_status(&[Completed, Pending]), JobStatus::Running);
        assert_eq!(aggregate_status(&[Failed, Running]), JobStatus::Running);
        assert_eq!(
            aggregate_status(&[Completed, Completed]),
            JobStatus::Completed
        );
        assert_eq!(aggregate_status(&[Failed, Failed]), JobStatus::Failed);
        assert_eq!(
            aggregate_status(&[Completed, Failed]),
            JobStatus::PartiallyFailed
        );
    }

    #[test]
    fn failed_execution_never_yields_completed() {
        for mix in [
            vec![Failed],
            vec![Failed, Completed],
            vec![Completed, Failed, Completed],
        ] {
            assert_ne!(aggregate_status(&mix), JobStatus::Completed);
        }
    }

    #[test]
    fn scrape_type_round_trips_wire_names() {
        for kind in ScrapeType::all() {
            assert_eq!(kind.as_str().parse::<ScrapeType>().unwrap(), *kind);
        }
        assert!("fullCase".parse::<ScrapeType>().is_err());
    }
}
