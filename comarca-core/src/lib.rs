//! # Comarca Core
//!
//! Scrape orchestration engine for Brazilian judicial e-filing platforms.
//!
//! A scrape job fans out into one execution per tribunal target; executions
//! run concurrently under a cap, tolerate per-target failure, and stream
//! diagnostics into a bounded per-job buffer with live fan-out. Consumers
//! read logs through a poll query or a backfill-then-follow push stream,
//! both backed by the same merged, sorted source. A cron scheduler triggers
//! recurring jobs.
//!
//! The actual portal automation lives behind [`scraper::ScraperAdapter`];
//! the durable record store behind [`store::JobStore`]. This crate owns the
//! orchestration semantics, not those collaborators.

pub mod error;
pub mod logs;
pub mod model;
pub mod orchestrator;
pub mod runner;
pub mod schedule;
pub mod scraper;
pub mod store;
pub mod tribunal;

pub use error::{Result, ScrapeError};
pub use logs::{LogAggregator, LogFrame, LogQueryPage, LogStream};
pub use model::{
    Execution, ExecutionFault, ExecutionId, ExecutionStatus, FaultKind, JobId,
    JobStatus, LogEntry, LogLevel, ScrapeJob, ScrapeOptions, ScrapeType,
    aggregate_status,
};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use runner::ExecutionOutcome;
pub use schedule::{CronScheduler, RecurringJob, next_run_time, validate};
pub use scraper::{
    AdapterRegistry, ExecutionLogSink, ScrapeOutcome, ScraperAdapter,
};
pub use store::{ExecutionUpdate, JobFilter, JobStore, MemoryJobStore};
pub use tribunal::{
    Grau, Sistema, TribunalConfig, TribunalId, TribunalRegistry,
};
