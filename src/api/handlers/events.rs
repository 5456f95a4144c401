//! Server-Sent Events endpoint.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};

use crate::app_state::AppState;
use crate::swap::CSV_HEADER;

/// SSE stream: a `header` event, then one `swap` event per CSV record.
#[instrument(skip(state))]
pub async fn sse_handler(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (rx, guard) = state.subscribe();
    info!(subscribers = state.subscriber_count(), "SSE subscriber connected");

    let header = stream::once(async { Ok::<_, Infallible>(Event::default().event("header").data(CSV_HEADER)) });
    let records = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = match rx.recv().await {
            Ok(record) => Event::default().event("swap").data(record),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "SSE subscriber lagging");
                Event::default().event("lagged").data(skipped.to_string())
            }
            Err(RecvError::Closed) => return None,
        };
        Some((Ok::<_, Infallible>(event), (rx, guard)))
    });

    Sse::new(header.chain(records))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
