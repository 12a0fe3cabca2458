//! The streaming pump: relays upstream chunks to the client with the
//! correct framing (SSE or NDJSON), records the target's fate when the
//! stream ends, and propagates client cancellation to the upstream
//! producer.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, ErrorDetails};
use crate::state::AvailabilityTracker;

/// Capacity of the buffer between the upstream reader and the
/// client-facing pump.
const STREAM_BUFFER_SIZE: usize = 16;

/// Moves the upstream read onto its own task behind a bounded buffer. When
/// the client side of the channel is dropped (disconnect, shutdown), the
/// send fails and the producer exits, releasing the upstream body.
pub fn spawn_producer<T: Send + 'static>(
    mut upstream: Pin<Box<dyn Stream<Item = Result<T, Error>> + Send>>,
) -> ReceiverStream<Result<T, Error>> {
    let (tx, rx) = tokio::sync::mpsc::channel(STREAM_BUFFER_SIZE);
    tokio::spawn(async move {
        while let Some(item) = upstream.next().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}

/// SSE emission: one `data: <json>` event per chunk, then `data: [DONE]`
/// iff the upstream closed cleanly. A transport error after commit closes
/// the stream and counts one failure against the target; clean completion
/// resets it.
pub fn sse_pump<T, F>(
    upstream: ReceiverStream<Result<T, Error>>,
    mut rewrite: F,
    tracker: Arc<AvailabilityTracker>,
    key: String,
    threshold: u32,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: Serialize,
    F: FnMut(&mut T) + Send + 'static,
{
    async_stream::stream! {
        let mut upstream = upstream;
        while let Some(item) = upstream.next().await {
            match item {
                Ok(mut chunk) => {
                    rewrite(&mut chunk);
                    match Event::default().json_data(&chunk) {
                        Ok(event) => yield Ok(event),
                        Err(e) => {
                            tracing::debug!(error = %e, "Skipping unserializable chunk");
                            continue;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(backend = %key, error = %e, "Stream failed after commit");
                    tracker.record_failure(&key, threshold);
                    return;
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
        tracker.reset(&key);
    }
}

/// NDJSON emission: one JSON line per chunk, no terminator (the final
/// chunk carries `done: true`). `convert` maps an upstream chunk to zero or
/// more client-facing lines.
pub fn ndjson_pump<T, U, F>(
    upstream: ReceiverStream<Result<T, Error>>,
    mut convert: F,
    tracker: Arc<AvailabilityTracker>,
    key: String,
    threshold: u32,
) -> impl Stream<Item = Result<Bytes, Infallible>>
where
    U: Serialize,
    F: FnMut(T) -> Vec<U> + Send + 'static,
{
    async_stream::stream! {
        let mut upstream = upstream;
        while let Some(item) = upstream.next().await {
            match item {
                Ok(chunk) => {
                    for line in convert(chunk) {
                        match serde_json::to_vec(&line) {
                            Ok(mut data) => {
                                data.push(b'\n');
                                yield Ok(Bytes::from(data));
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "Skipping unserializable chunk");
                                continue;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(backend = %key, error = %e, "Stream failed after commit");
                    tracker.record_failure(&key, threshold);
                    return;
                }
            }
        }
        tracker.reset(&key);
    }
}

/// Records a failed stream construction against the target and converts
/// the upstream error into the 500-family error the client sees. A
/// streaming dispatch never retries another target, even though no bytes
/// were committed.
pub fn fail_before_commit(
    tracker: &AvailabilityTracker,
    key: &str,
    threshold: u32,
    error: Error,
) -> Error {
    tracker.record_failure(key, threshold);
    Error::new(ErrorDetails::Stream {
        message: error.to_string(),
    })
}

/// Wraps an event stream as `text/event-stream` with the headers the
/// OpenAI-compatible surface promises.
pub fn sse_response(
    stream: impl Stream<Item = Result<Event, Infallible>> + Send + 'static,
) -> Response {
    let mut response = Sse::new(stream).keep_alive(KeepAlive::new()).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Wraps a line stream as `application/x-ndjson`.
pub fn ndjson_response(
    stream: impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
) -> Response {
    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson"),
    );
    response
}
