//! Polling reload of the configuration file.
//!
//! The file is re-read on a fixed interval. When the merged document differs from the last one
//! applied, it goes through [`WatchmanService::apply_config`]: the event handler table is
//! replaced, every action is rebuilt and actions see the new document. An unreadable or invalid
//! file is logged and the running configuration stays in effect. File reads and parsing run on
//! the blocking pool.

use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConfigManager;
use crate::error::{Result, WatchmanError};
use crate::service::WatchmanService;

#[derive(Debug, Default)]
pub struct ReloadStats {
    pub checks: AtomicU64,
    pub applied: AtomicU64,
    pub failures: AtomicU64,
}

pub struct ConfigReloader {
    reloader_id: Uuid,
    config_file: PathBuf,
    environment: String,
    enabled: bool,
    interval: Duration,
    service: Arc<WatchmanService>,
    last_applied: Mutex<Value>,
    stats: ReloadStats,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConfigReloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigReloader")
            .field("reloader_id", &self.reloader_id)
            .field("config_file", &self.config_file)
            .field("interval", &self.interval)
            .field("is_running", &self.is_running())
            .finish()
    }
}

impl ConfigReloader {
    /// Watch the file `service` was configured from
    pub fn new(service: Arc<WatchmanService>) -> Result<Self> {
        let manager = Arc::clone(service.config());
        if manager.config_file().as_os_str().is_empty() {
            return Err(WatchmanError::Configuration(
                "configuration was not loaded from a file, nothing to reload".to_string(),
            ));
        }

        let settings = manager.config();
        Ok(Self {
            reloader_id: Uuid::new_v4(),
            config_file: manager.config_file().to_path_buf(),
            environment: manager.environment().to_string(),
            enabled: settings.reload.enabled,
            interval: settings.reload.interval(),
            last_applied: Mutex::new(manager.raw().clone()),
            service,
            stats: ReloadStats::default(),
            handle: Mutex::new(None),
        })
    }

    /// Re-read the file once; returns whether a changed configuration was applied
    ///
    /// Blocks on file IO; from async code use the background task started by
    /// [`start`](Self::start).
    pub fn check_now(&self) -> Result<bool> {
        self.stats.checks.fetch_add(1, Ordering::Relaxed);

        let loaded = ConfigManager::load_file_with_env(&self.config_file, &self.environment)
            .map_err(|e| {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                WatchmanError::from(e)
            })?;

        let mut last_applied = self.last_applied.lock();
        if *last_applied == *loaded.raw() {
            debug!(reloader_id = %self.reloader_id, "Configuration unchanged");
            return Ok(false);
        }

        self.service.apply_config(&loaded).inspect_err(|_| {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
        })?;
        *last_applied = loaded.raw().clone();
        self.stats.applied.fetch_add(1, Ordering::Relaxed);

        info!(
            reloader_id = %self.reloader_id,
            config_file = %self.config_file.display(),
            events = loaded.config().event_handlers.len(),
            "Applied reloaded configuration"
        );
        Ok(true)
    }

    /// Start polling in the background; does nothing when reload is disabled or already running
    pub fn start(self: &Arc<Self>) {
        if !self.enabled {
            info!(reloader_id = %self.reloader_id, "Config reload disabled by configuration");
            return;
        }

        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }

        let reloader: Weak<Self> = Arc::downgrade(self);
        let interval = self.interval;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(reloader) = reloader.upgrade() else {
                    break;
                };
                let reloader_id = reloader.reloader_id;
                match tokio::task::spawn_blocking(move || reloader.check_now()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(
                        reloader_id = %reloader_id,
                        error = %e,
                        "Config reload failed, keeping current configuration"
                    ),
                    Err(e) => warn!(
                        reloader_id = %reloader_id,
                        error = %e,
                        "Config reload task did not complete"
                    ),
                }
            }
        }));

        info!(
            reloader_id = %self.reloader_id,
            interval = ?self.interval,
            config_file = %self.config_file.display(),
            "Started config reloader"
        );
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
            info!(reloader_id = %self.reloader_id, "Stopped config reloader");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    pub fn stats(&self) -> &ReloadStats {
        &self.stats
    }
}

impl Drop for ConfigReloader {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
