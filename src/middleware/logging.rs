use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, Method},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, info, trace, warn};

use super::capture::CaptureBody;
use crate::{
    config::LoggingConfig,
    correlation::{CorrelationIds, RandomUuid},
    level::{LevelHandle, LogLevel},
    snapshot::{RequestSnapshot, ResponseSnapshot},
};

/// State shared by every invocation of [`http_logger`].
#[derive(Clone)]
pub struct HttpLogger {
    level: LevelHandle,
    ids: Arc<dyn CorrelationIds>,
    forwarded_headers: Arc<[HeaderName]>,
    max_body_bytes: usize,
}

impl HttpLogger {
    pub fn new(level: LevelHandle) -> Self {
        Self::from_config(&LoggingConfig::default(), level)
    }

    /// Builds the logger from config. Invalid forwarded header names are
    /// skipped with a warning.
    pub fn from_config(config: &LoggingConfig, level: LevelHandle) -> Self {
        let forwarded_headers = config
            .forwarded_headers
            .iter()
            .filter_map(|name| match HeaderName::try_from(name.as_str()) {
                Ok(name) => Some(name),
                Err(e) => {
                    warn!("Ignoring forwarded header {:?}: {}", name, e);
                    None
                }
            })
            .collect();

        Self {
            level,
            ids: Arc::new(RandomUuid),
            forwarded_headers,
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub fn with_correlation_ids(mut self, ids: impl CorrelationIds + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn level(&self) -> LogLevel {
        self.level.get()
    }

    pub fn level_handle(&self) -> &LevelHandle {
        &self.level
    }
}

/// Logs each request and its response at the verbosity of the current level.
///
/// | level               | request line        | response line             |
/// |---------------------|---------------------|---------------------------|
/// | trace               | full, with body     | full, with captured body  |
/// | debug               | summary             | summary                   |
/// | info                | method and path     | summary                   |
/// | warn, error, fatal  | none                | none                      |
///
/// Only trace buffers the request body and retains response bytes. Below
/// trace the response body is counted, not copied, so the summary reports
/// the bytes actually written. Either way the response line is written once
/// the body has finished streaming.
pub async fn http_logger(State(logger): State<HttpLogger>, request: Request, next: Next) -> Response {
    let level = logger.level();
    if level.is_quiet() {
        return next.run(request).await;
    }

    let start = Instant::now();
    let rq = RequestSnapshot::capture(&request, logger.ids.as_ref(), &logger.forwarded_headers);

    let (rq, request) = match level {
        LogLevel::Trace => {
            let (request, body) = rq.read_body(request, logger.max_body_bytes).await;
            let rq = rq.with_body(body);
            trace!("{}", rq.full_string());
            (rq, request)
        }
        LogLevel::Debug => {
            debug!("{}", rq);
            (rq, request)
        }
        _ => {
            info!("{}", rq.short_string());
            (rq, request)
        }
    };

    let response = next.run(request).await;
    let latency = start.elapsed();

    // The router discards HEAD bodies without polling them.
    if *rq.method() == Method::HEAD {
        let rs = ResponseSnapshot::new(rq.correlation(), response.status(), 0, latency);
        log_response(level, rs, Some(String::new()));
        return response;
    }

    let limit = if level == LogLevel::Trace {
        logger.max_body_bytes
    } else {
        0
    };
    let (parts, body) = response.into_parts();
    let correlation = rq.correlation();
    let status = parts.status;
    let short = rq.short_string();

    let body = CaptureBody::new(body, limit, move |outcome| match outcome {
        Ok(captured) => {
            let rs = ResponseSnapshot::new(correlation, status, captured.size(), latency);
            log_response(level, rs, (level == LogLevel::Trace).then(|| captured.text()));
        }
        Err(incomplete) => {
            if level == LogLevel::Trace {
                error!("Response body hasn't been captured for request {}", short);
            }
            let rs = ResponseSnapshot::new(correlation, status, incomplete.size, latency);
            log_response(level, rs, None);
        }
    });

    Response::from_parts(parts, Body::new(body))
}

/// Writes the response line. At trace level a captured `body` is rendered
/// in full; without one only the summary is written.
fn log_response(level: LogLevel, rs: ResponseSnapshot, body: Option<String>) {
    match (level, body) {
        (LogLevel::Trace, Some(body)) => trace!("{}", rs.with_body(body).full_string()),
        (LogLevel::Trace, None) => trace!("{}", rs),
        (LogLevel::Debug, _) => debug!("{}", rs),
        _ => info!("{}", rs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{correlation_of, Exhausted, LogCapture};
    use axum::{
        body,
        http::{self, header::CONTENT_LENGTH, StatusCode},
        routing::{get, post},
        Router,
    };
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tower::ServiceExt;

    fn app(logger: HttpLogger) -> Router {
        Router::new()
            .route("/hello", get(|| async { "hello" }))
            .route("/echo", post(|body: String| async move { body }))
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
            .route(
                "/stream",
                get(|| async {
                    Body::from_stream(futures::stream::iter(
                        ["one,", "two,", "three"].map(Ok::<_, Infallible>),
                    ))
                }),
            )
            .layer(axum::middleware::from_fn_with_state(logger, http_logger))
    }

    fn logger(level: LogLevel) -> HttpLogger {
        HttpLogger::new(LevelHandle::new(level))
    }

    async fn call(app: Router, request: Request) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn get_request(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn head_request(uri: &str) -> Request {
        http::Request::builder()
            .method("HEAD")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_request(uri: &str, body: &'static str) -> Request {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn info_logs_short_request_and_response_summary() {
        let (logs, _guard) = LogCapture::install();

        let (status, body) = call(app(logger(LogLevel::Info)), get_request("/hello?x=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello");

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].trim_start().starts_with("INFO"));
        assert!(lines[0].ends_with(" --> GET /hello"));
        assert!(lines[1].contains(" <--  200 5 bytes "));
        assert!(lines[1].ends_with("ms"));
    }

    #[tokio::test]
    async fn response_line_carries_request_correlation() {
        let (logs, _guard) = LogCapture::install();

        call(app(logger(LogLevel::Debug)), get_request("/hello")).await;

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        let id = correlation_of(&lines[0]);
        assert!(uuid::Uuid::parse_str(id).is_ok(), "{id}");
        assert_eq!(correlation_of(&lines[1]), id);
    }

    #[tokio::test]
    async fn debug_logs_summaries_without_bodies() {
        let (logs, _guard) = LogCapture::install();

        let (_, body) = call(app(logger(LogLevel::Debug)), post_request("/echo?v=2", "ping")).await;
        assert_eq!(body, "ping");

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].trim_start().starts_with("DEBUG"));
        assert!(lines[0].contains(" --> POST /echo, 4 bytes from - ip -, params: v=2, headers: "));
        assert!(!lines[0].contains("body"));
        assert!(lines[1].contains(" <--  200 4 bytes "));
        assert!(!lines[1].contains("body"));
    }

    #[tokio::test]
    async fn trace_logs_request_and_captured_response_bodies() {
        let (logs, _guard) = LogCapture::install();

        let (_, body) = call(app(logger(LogLevel::Trace)), post_request("/echo", "ping")).await;
        assert_eq!(body, "ping");

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].trim_start().starts_with("TRACE"));
        assert!(lines[0].ends_with(", body: ping"));
        assert!(lines[1].contains(" <--  200 4 bytes "));
        assert!(lines[1].ends_with(", body: ping"));
        assert_eq!(correlation_of(&lines[0]), correlation_of(&lines[1]));
    }

    #[tokio::test]
    async fn trace_uses_placeholder_for_empty_exchanges() {
        let (logs, _guard) = LogCapture::install();

        let (status, _) = call(app(logger(LogLevel::Trace)), get_request("/empty")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].ends_with(", <no body>"));
        assert!(lines[1].contains(" <--  204 0 bytes "));
        assert!(lines[1].ends_with(", <no body>"));
    }

    #[tokio::test]
    async fn trace_captures_streamed_response() {
        let (logs, _guard) = LogCapture::install();

        let (_, body) = call(app(logger(LogLevel::Trace)), get_request("/stream")).await;
        assert_eq!(body, "one,two,three");

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[1].contains(" <--  200 13 bytes "));
        assert!(lines[1].ends_with(", body: one,two,three"));
    }

    #[tokio::test]
    async fn info_counts_streamed_response_bytes() {
        let (logs, _guard) = LogCapture::install();

        let (_, body) = call(app(logger(LogLevel::Info)), get_request("/stream")).await;
        assert_eq!(body, "one,two,three");

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[1].trim_start().starts_with("INFO"));
        assert!(lines[1].contains(" <--  200 13 bytes "), "{}", lines[1]);
        assert!(!lines[1].contains("body"));
    }

    #[tokio::test]
    async fn debug_counts_streamed_response_bytes() {
        let (logs, _guard) = LogCapture::install();

        call(app(logger(LogLevel::Debug)), get_request("/stream")).await;

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[1].trim_start().starts_with("DEBUG"));
        assert!(lines[1].contains(" <--  200 13 bytes "), "{}", lines[1]);
    }

    #[tokio::test]
    async fn debug_dropped_response_is_summarized_without_error() {
        let (logs, _guard) = LogCapture::install();

        let response = app(logger(LogLevel::Debug))
            .oneshot(get_request("/stream"))
            .await
            .unwrap();
        drop(response);

        assert!(!logs.contents().contains("ERROR"), "{}", logs.contents());
        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[1].contains(" <--  200 0 bytes "));
    }

    #[tokio::test]
    async fn trace_head_request_is_not_reported_as_lost() {
        let (logs, _guard) = LogCapture::install();

        let (status, body) = call(app(logger(LogLevel::Trace)), head_request("/hello")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        let contents = logs.contents();
        assert!(!contents.contains("hasn't been captured"), "{contents}");
        assert!(!contents.contains("ERROR"), "{contents}");
        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].contains(" --> HEAD /hello"));
        assert!(lines[1].contains(" <--  200 0 bytes "));
        assert!(lines[1].ends_with(", <no body>"));
        assert_eq!(correlation_of(&lines[0]), correlation_of(&lines[1]));
    }

    #[tokio::test]
    async fn info_head_request_reports_no_bytes_written() {
        let (logs, _guard) = LogCapture::install();

        call(app(logger(LogLevel::Info)), head_request("/stream")).await;

        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[0].ends_with(" --> HEAD /stream"));
        assert!(lines[1].contains(" <--  200 0 bytes "));
    }

    #[tokio::test]
    async fn trace_skips_reading_oversized_request_bodies() {
        let (logs, _guard) = LogCapture::install();
        let logger = logger(LogLevel::Trace).with_max_body_bytes(4);

        let (_, body) = call(app(logger), post_request("/echo", "hello world")).await;
        assert_eq!(body, "hello world");

        let lines = logs.exchange_lines();
        assert!(lines[0].ends_with(", body: <body too large>"), "{lines:?}");
        assert!(lines[1].ends_with(", body: hell... (truncated, 11 bytes total)"));
    }

    #[tokio::test]
    async fn dropped_response_body_is_reported() {
        let (logs, _guard) = LogCapture::install();

        let response = app(logger(LogLevel::Trace))
            .oneshot(get_request("/stream"))
            .await
            .unwrap();
        drop(response);

        let contents = logs.contents();
        assert!(contents.contains("Response body hasn't been captured for request"));
        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert!(lines[1].contains(" <--  200 0 bytes "));
        assert!(!lines[1].contains("body"));
    }

    #[tokio::test]
    async fn failed_correlation_keeps_both_lines_nil() {
        let (logs, _guard) = LogCapture::install();
        let logger = logger(LogLevel::Info).with_correlation_ids(Exhausted);

        call(app(logger), get_request("/hello")).await;

        assert!(logs
            .contents()
            .contains("UUID hasn't been generated for request <nil> --> GET /hello"));
        let lines = logs.exchange_lines();
        assert_eq!(lines.len(), 2, "{lines:?}");
        assert_eq!(correlation_of(&lines[0]), "<nil>");
        assert_eq!(correlation_of(&lines[1]), "<nil>");
    }

    #[tokio::test]
    async fn quiet_levels_only_forward() {
        for level in [LogLevel::Warn, LogLevel::Error, LogLevel::Fatal] {
            let (logs, _guard) = LogCapture::install();
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            let app = Router::new()
                .route(
                    "/count",
                    get(move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "counted"
                    }),
                )
                .layer(axum::middleware::from_fn_with_state(logger(level), http_logger));

            let (_, body) = call(app, get_request("/count")).await;

            assert_eq!(body, "counted");
            assert_eq!(hits.load(Ordering::SeqCst), 1, "{level}");
            assert!(logs.contents().is_empty(), "{level}: {}", logs.contents());
        }
    }

    #[tokio::test]
    async fn level_is_read_per_request() {
        let (logs, _guard) = LogCapture::install();
        let logger = logger(LogLevel::Warn);
        let handle = logger.level_handle().clone();
        let app = app(logger);

        call(app.clone(), get_request("/hello")).await;
        assert!(logs.exchange_lines().is_empty());

        handle.set(LogLevel::Info);
        call(app, get_request("/hello")).await;
        assert_eq!(logs.exchange_lines().len(), 2);
    }

    #[test]
    fn invalid_forwarded_headers_are_dropped() {
        let config = LoggingConfig {
            forwarded_headers: vec!["x-real-ip".into(), "bad header".into()],
            ..LoggingConfig::default()
        };
        let logger = HttpLogger::from_config(&config, LevelHandle::default());

        assert_eq!(&*logger.forwarded_headers, &[HeaderName::from_static("x-real-ip")]);
    }
}
