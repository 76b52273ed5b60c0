use std::{pin::Pin, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
    Json,
};
use common::types::{ChatRequest, ChatResponseChunk};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api_state::ApiState;

pub const CHUNK_EVENT: &str = "chunk";
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, axum::Error>> + Send>>;

/// Streams the answer to a chat request as server-sent events.
///
/// Each event carries one serialized [`ChatResponseChunk`]. When the client goes
/// away the response body is dropped, which cancels the orchestrator.
pub async fn chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> Sse<KeepAliveStream<EventStream>> {
    debug!(session_id = %request.session_id, "chat request received");

    let cancel = CancellationToken::new();
    let disconnect_guard = cancel.clone().drop_guard();
    let chunks = state.orchestrator.chat(request, cancel);

    let events: EventStream = Box::pin(chunks.map(move |chunk| {
        let _armed = &disconnect_guard;
        chunk_event(&chunk)
    }));

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

fn chunk_event(chunk: &ChatResponseChunk) -> Result<Event, axum::Error> {
    Event::default().event(CHUNK_EVENT).json_data(chunk)
}
