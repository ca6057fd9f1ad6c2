use std::{
    io,
    sync::{Arc, Mutex},
};

use tracing::{subscriber::DefaultGuard, Level};
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

use crate::correlation::{CorrelationError, CorrelationIds};

/// In-memory sink for a thread-scoped fmt subscriber.
#[derive(Clone, Default)]
pub(crate) struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Routes every event on the current thread into the returned capture
    /// until the guard is dropped.
    pub(crate) fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .with_target(false)
            .without_time()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    /// Lines emitted by the request logger itself.
    pub(crate) fn exchange_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| !line.trim_start().starts_with("ERROR"))
            .filter(|line| line.contains(" --> ") || line.contains(" <-- "))
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Generator whose entropy source always fails.
pub(crate) struct Exhausted;

impl CorrelationIds for Exhausted {
    fn generate(&self) -> Result<Uuid, CorrelationError> {
        Err(CorrelationError::Entropy(rand::Error::new(io::Error::other(
            "entropy exhausted",
        ))))
    }
}

/// Second whitespace-separated token of a formatted line: the correlation id
/// that follows the level.
pub(crate) fn correlation_of(line: &str) -> &str {
    line.split_whitespace().nth(1).unwrap_or_default()
}
