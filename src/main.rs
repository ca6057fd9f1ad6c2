use anyhow::Result;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast::error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

use wirelog::{
    config::{watcher::ConfigWatcher, AppConfig},
    create_app,
    level::{LevelHandle, LogLevel},
    middleware::HttpLogger,
    AppState,
};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = AppConfig::config_path();
    let initial_config = AppConfig::load_from(&config_path)?;

    // One level drives both the subscriber filter and the middleware.
    let level = LevelHandle::new(initial_config.logging.level);
    let filter = init_tracing(level.get())?;
    info!("Initial configuration loaded from {}", config_path);

    let logger = HttpLogger::from_config(&initial_config.logging, level.clone());

    let config_watcher = Arc::new(ConfigWatcher::new(&config_path)?);
    tokio::spawn(apply_reloads(config_watcher.clone(), level, filter));

    let app = create_app(
        AppState { logger },
        Duration::from_secs(initial_config.server.timeout_seconds),
    );

    let addr = format!("{}:{}", initial_config.server.host, initial_config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("wirelog server starting on {}", addr);
    info!(
        "Request logging at {}; edit {} to change it",
        initial_config.logging.level, config_path
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_tracing(level: LogLevel) -> Result<FilterHandle> {
    let (filter, handle) = reload::Layer::new(level.env_filter());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(handle)
}

/// Applies the logging level of every reloaded config between requests.
async fn apply_reloads(watcher: Arc<ConfigWatcher>, level: LevelHandle, filter: FilterHandle) {
    let mut reload_rx = watcher.subscribe_to_reloads();
    loop {
        let new_config = match reload_rx.recv().await {
            Ok(config) => config,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Skipped {} configuration reloads", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let next = new_config.logging.level;
        if let Err(e) = filter.reload(next.env_filter()) {
            warn!("Failed to update log filter: {}", e);
        }
        let previous = level.set(next);
        if previous != next {
            info!("Request log level changed from {} to {}", previous, next);
        }
    }
}
