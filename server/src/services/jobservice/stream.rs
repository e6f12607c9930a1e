//! Server-sent events for a job's log.
//!
//! Every log line becomes one unnamed `data:` event whose id is the line number, so a client can
//! tell how far it got. The stream ends with `data: Deploy complete`, or with an `error` event if
//! the log could not be read.

use crate::services::{ApiError, SharedState};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use joblib::{JobId, TailEvent};
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

pub const COMPLETE_MESSAGE: &str = "Deploy complete";

pub async fn stream_log(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job: JobId = name.parse()?;
    let events = state.coordinator.stream_job(job.clone()).await?;
    debug!(%job, "log stream opened");

    let mut line_no: u64 = 0;
    let stream = ReceiverStream::new(events).map(move |event| {
        if let TailEvent::Line(_) = event {
            line_no += 1;
        }
        Ok(to_sse(event, line_no))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: TailEvent, line_no: u64) -> Event {
    match event {
        TailEvent::Line(line) => Event::default()
            .id(line_no.to_string())
            .data(visible_text(&line)),
        TailEvent::Complete { .. } => Event::default().data(COMPLETE_MESSAGE),
        TailEvent::Failed(message) => Event::default().event("error").data(visible_text(&message)),
    }
}

/// An SSE data field cannot hold a carriage return. Progress output redraws the line with `\r`,
/// so keep the last non-blank segment, which is what a terminal would have shown.
fn visible_text(line: &str) -> &str {
    line.split(['\r', '\n'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or("")
}
