//! Stream response encoder
//!
//! Results are written either as an SSE stream (one `data:` event per item
//! plus a final `exit` event) or collected into a single batched JSON array.
//! Dropping the SSE response cancels the producer through a token guard, so
//! a client disconnect stops the walk instead of writing into the void.

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Encode everything arriving on `rx` as an event stream.
pub fn sse_response<T: Serialize + Send + 'static>(
    mut rx: mpsc::Receiver<T>,
    token: CancellationToken,
) -> Response {
    let guard = token.drop_guard();
    let stream = async_stream::stream! {
        // Held for the lifetime of the response; dropping it (client gone or
        // stream finished) cancels the walker.
        let _guard = guard;
        while let Some(item) = rx.recv().await {
            match Event::default().json_data(&item) {
                Ok(event) => yield Ok::<Event, Infallible>(event),
                Err(e) => warn!(error = %e, "could not encode result"),
            }
        }
        yield Ok(Event::default().event("exit").data("exit"));
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("keep-alive"),
        )
        .into_response()
}

/// Drain `rx` into a vector for a batched JSON response.
pub async fn collect<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
    let mut all = Vec::new();
    while let Some(item) = rx.recv().await {
        all.push(item);
    }
    all
}
