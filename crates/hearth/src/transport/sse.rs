// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-Sent Events stream of bus traffic.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::bus::{epoch_secs, HomeEvent};
use crate::App;

/// `GET /ui/stream` — every bus event, framed as
/// `event: <type>\ndata: <json>\n\n`, starting with a heartbeat.
pub async fn ui_stream(
    State(app): State<Arc<App>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = app.bus.subscribe().await;
    let heartbeat = HomeEvent::Heartbeat { ts: epoch_secs() };

    let stream = tokio_stream::once(heartbeat).chain(ReceiverStream::new(rx)).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().event(event.event_type()).data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
