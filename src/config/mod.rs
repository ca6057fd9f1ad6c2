use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::level::LogLevel;

pub mod watcher;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    /// Upper bound on request and response bytes buffered for trace lines.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Headers consulted, in order, when resolving the client IP.
    #[serde(default = "default_forwarded_headers")]
    pub forwarded_headers: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            max_body_bytes: default_max_body_bytes(),
            forwarded_headers: default_forwarded_headers(),
        }
    }
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_forwarded_headers() -> Vec<String> {
    vec!["x-forwarded-for".to_string(), "x-real-ip".to_string()]
}

impl AppConfig {
    pub fn config_path() -> String {
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.timeout_seconds", 30)?
            .add_source(config::File::with_name(config_path))
            .add_source(
                config::Environment::with_prefix("WIRELOG")
                    .prefix_separator("__")
                    .separator("__"),
            );

        // Override with environment variables if present
        if let Ok(host) = std::env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }
        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>()?)?;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            builder = builder.set_override("logging.level", level.parse::<LogLevel>()?.as_str())?;
        }

        let settings = builder.build()?;
        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }
}
