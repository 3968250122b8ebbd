use std::{convert::Infallible, pin::Pin, time::Duration};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{
        Sse,
        sse::{Event, KeepAlive},
    },
};
use comarca_core::{
    JobId, LogEntry, LogQueryPage,
    logs::{LogStream, open_stream, query_logs},
};
use serde::Deserialize;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::warn;
use uuid::Uuid;

use crate::{errors::ApiError, state::AppState};

const LAST_EVENT_ID_HEADER: &str = "last-event-id";

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub from_index: usize,
}

/// Poll transport: merged logs from `from_index`, plus the cursor for the
/// next call.
pub async fn query_logs_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogQueryPage>, ApiError> {
    let page = query_logs(
        state.store.as_ref(),
        &state.aggregator,
        JobId(job_id),
        query.from_index,
    )
    .await?;
    Ok(Json(page))
}

/// Push transport: replay merged history, then follow live appends on the
/// same connection. `Last-Event-ID` resumes from a previous position.
pub async fn stream_logs_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<
    Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>,
    ApiError,
> {
    let last_index = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<usize>().ok());
    let stream = build_log_event_stream(&state, JobId(job_id), last_index).await?;

    Ok(Sse::new(stream).keep_alive(default_keep_alive()))
}

async fn build_log_event_stream(
    state: &AppState,
    job_id: JobId,
    last_index: Option<usize>,
) -> Result<
    Pin<
        Box<
            dyn tokio_stream::Stream<Item = Result<Event, Infallible>>
                + Send
                + 'static,
        >,
    >,
    ApiError,
> {
    let LogStream {
        backfill,
        last_buffered_sequence,
        live,
        ..
    } = open_stream(state.store.as_ref(), &state.aggregator, job_id).await?;

    // Entry ids are positions in the merged timeline; a reconnect with
    // Last-Event-ID replays everything after that position.
    let resume_from = last_index.map(|idx| idx + 1).unwrap_or(0);
    let next_index = backfill.len();
    let history_events: Vec<Result<Event, Infallible>> = backfill
        .into_iter()
        .enumerate()
        .skip(resume_from)
        .filter_map(|(index, entry)| log_entry_to_event(index, &entry).map(Ok))
        .collect();
    let history_stream = tokio_stream::iter(history_events);

    let live_stream = async_stream::stream! {
        let Some(receiver) = live else {
            return;
        };
        let mut frames = BroadcastStream::new(receiver);
        let mut index = next_index;
        // The backfill already covers everything buffered at subscribe
        // time; skip those frames so the seam is gap- and duplicate-free.
        let mut last_sequence = last_buffered_sequence;

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => {
                    if frame.sequence <= last_sequence {
                        continue;
                    }
                    last_sequence = frame.sequence;
                    if let Some(event) = log_entry_to_event(index, &frame.entry) {
                        index += 1;
                        yield Ok::<Event, Infallible>(event);
                    }
                }
                Err(err) => {
                    warn!(job = %job_id, "log broadcast lagged: {err}");
                }
            }
        }
    };

    Ok(Box::pin(history_stream.chain(live_stream)))
}

fn log_entry_to_event(index: usize, entry: &LogEntry) -> Option<Event> {
    match serde_json::to_string(entry) {
        Ok(data) => Some(
            Event::default()
                .event("log")
                .id(index.to_string())
                .data(data),
        ),
        Err(err) => {
            warn!("failed to serialize log entry: {err}");
            None
        }
    }
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
