use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue},
    response::IntoResponse,
};
use futures::stream;

/// Returns the request body unchanged, under the request's content type.
pub async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    ([(CONTENT_TYPE, content_type)], body)
}

/// Chunked response of several frames with no declared length.
pub async fn stream() -> Body {
    let events = (1..=3).map(|n| Ok::<_, Infallible>(format!("event {n};")));
    Body::from_stream(stream::iter(events))
}
