//! Server-Sent Events endpoint
//!
//! Streams source-tagged state transitions to connected clients. Position
//! updates are high-frequency and only sent to clients that ask for them with
//! `?progress=true`.

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;

use crate::api::server::AppContext;

#[derive(Debug, Default, Deserialize)]
pub struct EventStreamParams {
    /// Opt in to the position stream
    #[serde(default)]
    progress: bool,
}

/// GET /events - SSE event stream
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Query(params): Query<EventStreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let broadcaster = ctx.service.broadcaster();

    // Subscribe before collecting the initial state so nothing falls between
    let state_rx = broadcaster.subscribe_state();
    let position_rx = params.progress.then(|| broadcaster.subscribe_position());
    let initial = broadcaster.initial_events(ctx.service.broker().active());

    hearth_common::sse::create_event_sse_stream("hearth-audio", initial, state_rx, position_rx)
}
