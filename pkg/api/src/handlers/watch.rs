use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub seq: Option<u64>,
}

/// GET /apis/coredump.k8s.io/v1alpha1/watch — SSE stream of store events,
/// buffered backlog after `seq` first, then live events.
pub async fn watch_events(
    State(state): State<AppState>,
    Query(query): Query<WatchQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let prefix = query.prefix.unwrap_or_default();
    let from_seq = query.seq.unwrap_or(0);

    info!(
        "Watch subscription: prefix='{}', from_seq={}",
        prefix, from_seq
    );

    let event_log = &state.registry.store().event_log;
    // Subscribe before reading the backlog so nothing falls in between.
    let rx = event_log.subscribe();
    let buffered = event_log.events_since(from_seq).await;
    let last_buffered = buffered.last().map(|e| e.seq).unwrap_or(from_seq);

    let prefix_clone = prefix.clone();

    let buffered_stream = tokio_stream::iter(
        buffered
            .into_iter()
            .filter(move |e| prefix.is_empty() || e.key.starts_with(&prefix))
            .map(|e| {
                let data = serde_json::to_string(&e).unwrap_or_default();
                Ok::<_, Infallible>(Event::default().data(data))
            }),
    );

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) => {
            if event.seq > last_buffered
                && (prefix_clone.is_empty() || event.key.starts_with(&prefix_clone))
                && let Ok(data) = serde_json::to_string(&event)
            {
                return Some(Ok::<_, Infallible>(Event::default().data(data)));
            }
            None
        }
        Err(_) => None,
    });

    Sse::new(buffered_stream.chain(live_stream)).keep_alive(KeepAlive::default())
}
