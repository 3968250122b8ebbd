use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use tracing::warn;

use crate::{
    error::ScrapeError,
    model::{Execution, ExecutionFault, FaultKind, ScrapeOptions},
    scraper::{ExecutionLogSink, ScraperAdapter},
};

/// Terminal result the runner reports back to the orchestrator. An
/// execution never leaves the runner unresolved: adapter errors, panics,
/// and timeouts all collapse into `Failed`.
#[derive(Clone, Debug)]
pub enum ExecutionOutcome {
    Completed { count: u64 },
    Failed { fault: ExecutionFault },
}

/// Runs one tribunal-target scrape through its adapter.
///
/// The timeout is enforced here; on expiry the adapter future is dropped
/// (cooperative cancellation) and a timeout fault is recorded regardless of
/// whether the adapter observed it. A late result has nowhere to land and
/// is discarded with the future.
pub async fn run_execution(
    execution: &Execution,
    adapter: Option<Arc<dyn ScraperAdapter>>,
    options: &ScrapeOptions,
    sink: &ExecutionLogSink,
    timeout: Duration,
) -> ExecutionOutcome {
    let tribunal = &execution.tribunal;

    let Some(adapter) = adapter else {
        let message = format!(
            "no scraper adapter registered for sistema {}",
            tribunal.id.sistema
        );
        sink.error(&message).await;
        return ExecutionOutcome::Failed {
            fault: ExecutionFault::new(FaultKind::Internal, message),
        };
    };

    sink.info(format!(
        "starting {} scrape against {} ({})",
        tribunal.id.sistema, tribunal.id, tribunal.name
    ))
    .await;

    let attempt = AssertUnwindSafe(adapter.execute(tribunal, options, sink))
        .catch_unwind();

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(Ok(outcome))) => {
            sink.info(format!(
                "finished {}: {} records, {} artifacts",
                tribunal.id,
                outcome.count,
                outcome.artifacts.len()
            ))
            .await;
            ExecutionOutcome::Completed {
                count: outcome.count,
            }
        }
        Ok(Ok(Err(err))) => {
            let kind = match &err {
                ScrapeError::Timeout { .. } => FaultKind::Timeout,
                _ => FaultKind::Scrape,
            };
            let message = err.to_string();
            sink.error(format!("scrape failed against {}: {message}", tribunal.id))
                .await;
            ExecutionOutcome::Failed {
                fault: ExecutionFault::new(kind, message),
            }
        }
        Ok(Err(panic)) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "adapter panicked".to_string());
            warn!(tribunal = %tribunal.id, "scraper adapter panicked: {message}");
            sink.error(format!("adapter fault against {}: {message}", tribunal.id))
                .await;
            ExecutionOutcome::Failed {
                fault: ExecutionFault::new(FaultKind::Internal, message),
            }
        }
        Err(_elapsed) => {
            let message = format!(
                "scrape timed out against {} after {}s; cancellation requested",
                tribunal.id,
                timeout.as_secs()
            );
            sink.error(&message).await;
            ExecutionOutcome::Failed {
                fault: ExecutionFault::new(FaultKind::Timeout, message),
            }
        }
    }
}
