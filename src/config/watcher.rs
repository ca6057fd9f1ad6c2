use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::AppConfig;

/// Reloads [`AppConfig`] whenever the file on disk is modified and
/// broadcasts each successfully parsed version.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    reload_tx: broadcast::Sender<AppConfig>,
}

impl ConfigWatcher {
    pub fn new(config_path: &str) -> Result<Self> {
        let (reload_tx, _) = broadcast::channel(16);

        let path = config_path.to_string();
        let reload_tx_clone = reload_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if event.kind.is_modify() => match AppConfig::load_from(&path) {
                    Ok(new_config) => {
                        if reload_tx_clone.send(new_config).is_err() {
                            debug!("No active config reload subscribers");
                        } else {
                            info!("Configuration reloaded successfully");
                        }
                    }
                    Err(e) => error!("Failed to reload configuration from {}: {}", path, e),
                },
                Ok(_) => {}
                Err(e) => error!("File watcher error: {}", e),
            },
            Config::default(),
        )?;

        watcher.watch(Path::new(config_path), RecursiveMode::NonRecursive)?;
        info!("Started watching configuration file: {}", config_path);

        Ok(ConfigWatcher {
            _watcher: watcher,
            reload_tx,
        })
    }

    pub fn subscribe_to_reloads(&self) -> broadcast::Receiver<AppConfig> {
        self.reload_tx.subscribe()
    }
}
