use std::{fmt, time::Duration};

use axum::http::StatusCode;

use super::{Direction, NO_BODY};
use crate::correlation::Correlation;

/// Facts about the outbound response, paired with a request by correlation.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    correlation: Correlation,
    status: StatusCode,
    size: u64,
    latency: Duration,
    body: Option<String>,
}

impl ResponseSnapshot {
    pub fn new(correlation: Correlation, status: StatusCode, size: u64, latency: Duration) -> Self {
        Self {
            correlation,
            status,
            size,
            latency,
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn correlation(&self) -> Correlation {
        self.correlation
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn full_string(&self) -> String {
        if self.size > 0 {
            format!("{}, body: {}", self, self.body.as_deref().unwrap_or(NO_BODY))
        } else {
            format!("{}, {}", self, NO_BODY)
        }
    }
}

impl fmt::Display for ResponseSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}  {} {} bytes {}ms",
            self.correlation,
            Direction::Response,
            self.status.as_u16(),
            self.size,
            self.latency.as_millis()
        )
    }
}
