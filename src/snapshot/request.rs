use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header::CONTENT_LENGTH, HeaderMap, HeaderName, Method},
};
use bytes::BytesMut;
use futures::{stream, StreamExt};
use hyper::body::Body as HttpBody;
use tracing::error;

use super::{Direction, OrDash, BODY_TOO_LARGE, NO_BODY};
use crate::correlation::{Correlation, CorrelationIds};

/// Facts about an inbound request, taken when the middleware runs.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    correlation: Correlation,
    method: Method,
    size: i64,
    remote_addr: Option<SocketAddr>,
    client_ip: Option<IpAddr>,
    path: String,
    params: String,
    headers: HeaderMap,
    body: Option<String>,
}

impl RequestSnapshot {
    /// Snapshots `request` and assigns it a correlation id.
    ///
    /// `forwarded` lists the headers consulted, in order, to resolve the
    /// client IP before falling back to the peer address. A failed id
    /// generation is logged and leaves the correlation empty.
    pub fn capture(request: &Request, ids: &dyn CorrelationIds, forwarded: &[HeaderName]) -> Self {
        let remote_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let mut snapshot = Self {
            correlation: Correlation::default(),
            method: request.method().clone(),
            size: content_length(request),
            remote_addr,
            client_ip: client_ip(request.headers(), forwarded, remote_addr),
            path: request.uri().path().to_owned(),
            params: request.uri().query().unwrap_or_default().to_owned(),
            headers: request.headers().clone(),
            body: None,
        };

        match ids.generate() {
            Ok(id) => snapshot.correlation = Correlation::from(id),
            Err(e) => error!(
                error = %e,
                "UUID hasn't been generated for request {}",
                snapshot.short_string()
            ),
        }

        snapshot
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn correlation(&self) -> Correlation {
        self.correlation
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Declared content length; `-1` when unknown.
    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn short_string(&self) -> String {
        format!(
            "{} {} {} {}",
            self.correlation,
            Direction::Request,
            self.method,
            self.path
        )
    }

    pub fn full_string(&self) -> String {
        if self.size > 0 {
            format!("{}, body: {}", self, self.body.as_deref().unwrap_or(NO_BODY))
        } else {
            format!("{}, {}", self, NO_BODY)
        }
    }

    /// Buffers the body of `request` and hands back a request whose body
    /// replays the same bytes.
    ///
    /// Nothing is read when the declared length is not positive, or when it
    /// exceeds `limit`. A body that outgrows `limit` while being read is
    /// handed on unread past that point. A failed read is logged, and the
    /// downstream body yields the bytes read so far followed by the same
    /// error.
    pub async fn read_body(&self, request: Request, limit: usize) -> (Request, String) {
        if self.size <= 0 {
            return (request, NO_BODY.to_owned());
        }
        if usize::try_from(self.size).map_or(true, |size| size > limit) {
            return (request, BODY_TOO_LARGE.to_owned());
        }

        let (parts, body) = request.into_parts();
        let mut chunks = body.into_data_stream();
        let mut buf = BytesMut::new();

        while let Some(chunk) = chunks.next().await {
            let (item, text) = match chunk {
                Ok(data) if buf.len() + data.len() <= limit => {
                    buf.extend_from_slice(&data);
                    continue;
                }
                Ok(data) => (Ok(data), BODY_TOO_LARGE),
                Err(e) => {
                    error!(
                        error = %e,
                        "Request body hasn't been read for request {}",
                        self.short_string()
                    );
                    (Err(e), NO_BODY)
                }
            };

            let replay = stream::iter([Ok(buf.freeze()), item]).chain(chunks);
            return (
                Request::from_parts(parts, Body::from_stream(replay)),
                text.to_owned(),
            );
        }

        let bytes = buf.freeze();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        (Request::from_parts(parts, Body::from(bytes)), text)
    }
}

impl fmt::Display for RequestSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {} bytes from {} ip {}",
            self.short_string(),
            self.size,
            OrDash(&self.remote_addr),
            OrDash(&self.client_ip)
        )?;
        if !self.params.is_empty() {
            write!(f, ", params: {}", self.params)?;
        }
        write!(f, ", headers: {:?}", self.headers)
    }
}

/// `Content-Length` when declared, otherwise the exact body size if known,
/// otherwise `-1`.
pub fn content_length(request: &Request) -> i64 {
    request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .or_else(|| {
            request
                .body()
                .size_hint()
                .exact()
                .and_then(|size| i64::try_from(size).ok())
        })
        .unwrap_or(-1)
}

fn client_ip(
    headers: &HeaderMap,
    forwarded: &[HeaderName],
    remote_addr: Option<SocketAddr>,
) -> Option<IpAddr> {
    forwarded
        .iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.split(',').next()?.trim().parse().ok())
        .or_else(|| remote_addr.map(|addr| addr.ip()))
}
