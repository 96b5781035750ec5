//! Server-Sent Events support

use crate::events::EngineEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert the engine's broadcast channel to an SSE stream that opens with
/// an `init` snapshot
pub fn sse_stream(
    init: Value,
    broadcast_rx: tokio::sync::broadcast::Receiver<EngineEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = futures::stream::once(async move {
        Ok(Event::default().event("init").data(init.to_string()))
    });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(engine_event_to_axum(&event))),
        Err(e) => {
            // Lagged subscriber; the client resyncs from the next init
            tracing::warn!(error = %e, "SSE subscriber lagged");
            None
        }
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn engine_event_to_axum(event: &EngineEvent) -> Event {
    let data = serde_json::to_value(event)
        .unwrap_or_else(|e| json!({ "type": "error", "message": e.to_string() }));
    Event::default().event(event.name()).data(data.to_string())
}
