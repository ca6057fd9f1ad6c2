//! Immutable views of a request and its response, rendered as log lines.
//!
//! The rendered layouts are consumed by log scrapers, so field order and
//! punctuation are fixed.

use std::fmt;

mod direction;
mod request;
mod response;

pub use direction::Direction;
pub use request::{content_length, RequestSnapshot};
pub use response::ResponseSnapshot;

/// Placeholder logged when a request or response carries no body.
pub const NO_BODY: &str = "<no body>";

/// Placeholder logged when a request body exceeds the capture limit.
pub const BODY_TOO_LARGE: &str = "<body too large>";

/// Renders an optional value, or `-` when absent.
pub(crate) struct OrDash<'a, T>(pub(crate) &'a Option<T>);

impl<T: fmt::Display> fmt::Display for OrDash<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => fmt::Display::fmt(value, f),
            None => f.write_str("-"),
        }
    }
}
