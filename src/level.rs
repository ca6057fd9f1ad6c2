use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Minimum level the request logger honours.
///
/// `Warn`, `Error` and `Fatal` are the quiet tiers: the middleware only
/// forwards requests at those thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

#[derive(Debug, Error)]
#[error("unknown log level: {0:?}")]
pub struct LevelParseError(String);

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }

    pub const fn is_quiet(self) -> bool {
        matches!(self, LogLevel::Warn | LogLevel::Error | LogLevel::Fatal)
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    ///
    /// tracing has no fatal level, so `Fatal` filters like `Error`.
    pub const fn filter_directive(self) -> &'static str {
        match self {
            LogLevel::Fatal => "error",
            level => level.as_str(),
        }
    }

    /// Subscriber filter admitting exactly the lines the middleware writes
    /// at this level.
    pub fn env_filter(self) -> EnvFilter {
        EnvFilter::new(self.filter_directive())
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Fatal,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            _ => Err(LevelParseError(s.to_owned())),
        }
    }
}

/// Shared, swappable log level.
///
/// Every clone observes the same value. The middleware reads it once when a
/// request arrives; the config watcher writes it between requests.
#[derive(Debug, Clone)]
pub struct LevelHandle(Arc<AtomicU8>);

impl LevelHandle {
    pub fn new(level: LogLevel) -> Self {
        Self(Arc::new(AtomicU8::new(level as u8)))
    }

    pub fn get(&self) -> LogLevel {
        LogLevel::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Stores `level` and returns the previous one.
    pub fn set(&self, level: LogLevel) -> LogLevel {
        LogLevel::from_u8(self.0.swap(level as u8, Ordering::AcqRel))
    }
}

impl Default for LevelHandle {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}
