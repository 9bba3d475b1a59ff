//! Server-Sent Events (SSE) streaming of prediction job events.
//!
//! Each frame carries the event kind as the SSE `event:` name, the job id
//! as the SSE `id:` and the [`JobEvent`] itself as JSON data.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use dtiscope_common::error::ApiError;
use dtiscope_predict::JobEvent;
use futures_core::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::state::SharedState;

/// Frames buffered per client before the forwarder waits.
const CLIENT_BUFFER: usize = 64;

#[derive(Debug, Default, Deserialize)]
pub struct EventParams {
    /// Follow a single job; the stream ends after its `finished` event.
    pub job_id: Option<String>,
}

fn frame(event: &JobEvent) -> Option<Event> {
    match Event::default().event(event.name()).id(event.job_id()).json_data(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(job_id = event.job_id(), error = %e, "Failed to encode job event");
            None
        }
    }
}

/// GET /api/events[?job_id=...]
///
/// Without `job_id` every job's events are streamed until the client leaves.
/// Lagging clients miss events rather than slowing the jobs down.
pub async fn sse_handler(
    State(state): State<SharedState>,
    Query(params): Query<EventParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before looking at the job so its final event cannot slip by.
    let mut rx = state.subscribe();
    let (tx, out) = mpsc::channel::<Result<Event, Infallible>>(CLIENT_BUFFER);

    let already_finished = match params.job_id.as_deref() {
        Some(id) => {
            let status = state
                .jobs
                .get_status(id)
                .await
                .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;
            status.status.is_terminal().then(|| JobEvent::Finished {
                job_id: status.job_id,
                status: status.status,
                error: status.error,
            })
        }
        None => None,
    };

    if let Some(event) = already_finished {
        if let Some(frame) = frame(&event) {
            let _ = tx.send(Ok(frame)).await;
        }
        return Ok(Sse::new(ReceiverStream::new(out)).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("ping"),
        ));
    }

    let follow = params.job_id;
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = tx.closed() => break,
                received = rx.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "SSE client lagging, events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            if follow.as_deref().is_some_and(|id| event.job_id() != id) {
                continue;
            }
            let last = follow.is_some() && event.is_final();
            if let Some(frame) = frame(&event) {
                if tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            if last {
                break;
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(out)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
