//! # Reporter Lifecycle Manager
//!
//! Keeps exactly one active reporter per relevant action name and flushes them periodically.
//!
//! The key set of the reporter map always equals the set most recently passed to
//! [`ReporterManager::reconcile`]. Reconciliation runs under a single lock, so a concurrent
//! [`ReporterManager::record`] observes either the old set or the new one, never a mix.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::reporter::{MetricDescriptor, Reporter, ReporterFactory};
use crate::config::MetricsConfig;

struct ReporterSet {
    namespace: String,
    region: String,
    metric_name: String,
    factory: Arc<dyn ReporterFactory>,
    reporters: Mutex<HashMap<String, Arc<dyn Reporter>>>,
}

impl ReporterSet {
    fn enable_locked<'a, I>(&self, reporters: &mut HashMap<String, Arc<dyn Reporter>>, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            if reporters.contains_key(name) {
                continue;
            }
            let descriptor = MetricDescriptor::for_action(&self.metric_name, name);
            let reporter = self
                .factory
                .create(&self.namespace, &descriptor, &self.region);
            reporters.insert(name.to_string(), reporter);
            debug!(action = %name, "Enabled action reporter");
        }
    }

    fn disable_locked<'a, I>(&self, reporters: &mut HashMap<String, Arc<dyn Reporter>>, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            if let Some(reporter) = reporters.get(name) {
                reporter.flush();
                reporters.remove(name);
                debug!(action = %name, "Disabled action reporter");
            }
        }
    }

    fn flush_all(&self) {
        let reporters = self.reporters.lock();
        for reporter in reporters.values() {
            reporter.flush();
        }
    }
}

/// Owns the action name to reporter mapping
pub struct ReporterManager {
    set: Arc<ReporterSet>,
    flush_interval: Duration,
    auto_flush: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ReporterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterManager")
            .field("namespace", &self.set.namespace)
            .field("region", &self.set.region)
            .field("metric_name", &self.set.metric_name)
            .field("flush_interval", &self.flush_interval)
            .field("active", &self.active_names())
            .field("auto_flush", &self.is_auto_flush_enabled())
            .finish()
    }
}

impl ReporterManager {
    pub fn new(config: &MetricsConfig, factory: Arc<dyn ReporterFactory>) -> Self {
        Self {
            set: Arc::new(ReporterSet {
                namespace: config.namespace.clone(),
                region: config.region.clone(),
                metric_name: config.metric_name.clone(),
                factory,
                reporters: Mutex::new(HashMap::new()),
            }),
            flush_interval: config.flush_interval(),
            auto_flush: Mutex::new(None),
        }
    }

    /// Converge the active reporter set onto exactly `target`
    pub fn reconcile(&self, target: &BTreeSet<String>) {
        let mut reporters = self.set.reporters.lock();
        let to_disable: Vec<String> = reporters
            .keys()
            .filter(|name| !target.contains(*name))
            .cloned()
            .collect();

        self.set
            .enable_locked(&mut reporters, target.iter().map(String::as_str));
        self.set
            .disable_locked(&mut reporters, to_disable.iter().map(String::as_str));

        info!(
            active = reporters.len(),
            disabled = to_disable.len(),
            "Reconciled action reporters"
        );
    }

    /// Create a reporter for each name that does not have one yet
    pub fn enable<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        let mut reporters = self.set.reporters.lock();
        self.set
            .enable_locked(&mut reporters, names.iter().map(|name| name.as_ref()));
    }

    /// Flush and then remove the reporter for each name that has one
    pub fn disable<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        let mut reporters = self.set.reporters.lock();
        self.set
            .disable_locked(&mut reporters, names.iter().map(|name| name.as_ref()));
    }

    /// Forward a sample to the reporter for `action`; unknown actions are ignored
    ///
    /// The sample is recorded under the set lock, so it can never land in a reporter that a
    /// concurrent reconcile has already flushed and dropped.
    pub fn record(&self, action: &str, value: f64) {
        if let Some(reporter) = self.set.reporters.lock().get(action) {
            reporter.record(value);
        }
    }

    /// Flush every active reporter without removing any
    pub fn flush_all(&self) {
        self.set.flush_all();
    }

    /// Start or stop the periodic flush
    ///
    /// Both directions are idempotent. Stopping a running timer performs one final flush.
    pub fn set_auto_flush(&self, enabled: bool) {
        let mut auto_flush = self.auto_flush.lock();

        match (enabled, auto_flush.is_some()) {
            (true, false) => {
                let set: Weak<ReporterSet> = Arc::downgrade(&self.set);
                let flush_interval = self.flush_interval;

                *auto_flush = Some(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(flush_interval);
                    // The first tick completes immediately
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        match set.upgrade() {
                            Some(set) => set.flush_all(),
                            None => break,
                        }
                    }
                }));

                info!(flush_interval = ?flush_interval, "Started reporter auto flush");
            }
            (false, true) => {
                if let Some(handle) = auto_flush.take() {
                    handle.abort();
                }
                drop(auto_flush);
                self.flush_all();
                info!("Stopped reporter auto flush");
            }
            _ => {}
        }
    }

    pub fn is_auto_flush_enabled(&self) -> bool {
        self.auto_flush.lock().is_some()
    }

    pub fn active_names(&self) -> BTreeSet<String> {
        self.set.reporters.lock().keys().cloned().collect()
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}

impl Drop for ReporterManager {
    fn drop(&mut self) {
        if let Some(handle) = self.auto_flush.get_mut().take() {
            handle.abort();
        }
    }
}
