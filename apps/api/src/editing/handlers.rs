//! Axum route handlers for the Edit API.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::{stream, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::editing::models::{EditRequest, EditResult};
use crate::editing::streaming::{ChannelSink, EditEvent};
use crate::errors::AppError;
use crate::state::AppState;

/// POST /api/v1/edits
///
/// Runs one editing turn and returns the whole result at once.
pub async fn handle_generate_edits(
    State(state): State<AppState>,
    Json(request): Json<EditRequest>,
) -> Result<Json<EditResult>, AppError> {
    let cancel = CancellationToken::new();
    let result = state
        .orchestrator
        .generate_edits(request, None, &cancel)
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/edits/stream
///
/// Same turn as `handle_generate_edits`, delivered as server-sent events:
/// `chunk` and `plan` while the turn runs, then exactly one `result` or `error`.
/// Closing the connection cancels the turn.
pub async fn handle_stream_edits(
    State(state): State<AppState>,
    Json(request): Json<EditRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let orchestrator = state.orchestrator.clone();
    let turn_cancel = cancel.clone();
    tokio::spawn(async move {
        let sink = ChannelSink::new(tx.clone());
        let last = match orchestrator
            .generate_edits(request, Some(&sink), &turn_cancel)
            .await
        {
            Ok(result) => EditEvent::Result { result },
            Err(e) => EditEvent::Error {
                code: e.code().to_string(),
                message: e.public_message(),
            },
        };
        if tx.send(last).is_err() {
            debug!("Stream client disconnected before the turn finished");
        }
    });

    // Dropping the response stream drops the guard, which cancels the turn.
    let guard = cancel.drop_guard();
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse(&event)), (rx, guard)))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: &EditEvent) -> Event {
    let name = match event {
        EditEvent::Chunk { .. } => "chunk",
        EditEvent::Plan { .. } => "plan",
        EditEvent::Result { .. } => "result",
        EditEvent::Error { .. } => "error",
    };
    Event::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|e| {
            warn!("Failed to encode {name} event: {e}");
            Event::default()
                .event("error")
                .data(r#"{"type":"error","code":"INTERNAL_ERROR","message":"event encoding failed"}"#)
        })
}
