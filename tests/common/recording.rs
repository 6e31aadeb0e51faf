//! Recording test doubles for checkpointers, actions and reporters.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

use watchman::config::EventHandlerTable;
use watchman::events::EventSource;
use watchman::metrics::{MetricDescriptor, Reporter, ReporterFactory};
use watchman::processor::{CheckpointError, Checkpointer, Record};
use watchman::registry::{ActionCatalog, ActionHandler, FnAction};
use watchman::router::EventRouter;

/// Checkpointer that remembers every request and answers with a fixed result
pub struct RecordingCheckpointer {
    calls: Mutex<Vec<Option<String>>>,
    rejection: Option<String>,
}

impl RecordingCheckpointer {
    pub fn succeeding() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            rejection: None,
        }
    }

    pub fn rejecting(error: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            rejection: Some(error.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Checkpointer for RecordingCheckpointer {
    async fn checkpoint(
        &self,
        sequence_number: Option<&str>,
    ) -> Result<Option<String>, CheckpointError> {
        let requested = sequence_number.map(str::to_string);
        self.calls.lock().push(requested.clone());
        match &self.rejection {
            Some(error) => Err(CheckpointError::Rejected {
                error: error.clone(),
            }),
            None => Ok(Some(requested.unwrap_or_else(|| "SHARD_END".to_string()))),
        }
    }
}

/// One observed action invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub action: String,
    pub data: Value,
    pub options: Option<Value>,
    pub service_config: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
}

/// Shared log of action invocations and handler constructions
#[derive(Default)]
pub struct ActionLog {
    calls: Mutex<Vec<ActionCall>>,
    constructed: Mutex<HashMap<String, usize>>,
}

impl ActionLog {
    pub fn calls(&self) -> Vec<ActionCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, action: &str) -> Vec<ActionCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.action == action)
            .cloned()
            .collect()
    }

    /// How many handler instances the catalog has built for `action`
    pub fn constructed(&self, action: &str) -> usize {
        self.constructed.lock().get(action).copied().unwrap_or(0)
    }
}

/// Catalog whose actions record their calls into the returned log
pub fn recording_catalog(actions: &[(&str, Behavior)]) -> (Arc<ActionCatalog>, Arc<ActionLog>) {
    let catalog = Arc::new(ActionCatalog::new());
    let log = Arc::new(ActionLog::default());

    for (name, behavior) in actions {
        let name = name.to_string();
        let behavior = *behavior;
        let log = Arc::clone(&log);
        catalog.register(name.clone(), move || {
            *log.constructed.lock().entry(name.clone()).or_default() += 1;
            let log = Arc::clone(&log);
            let name = name.clone();
            Arc::new(FnAction::new(move |data, options, service_config| {
                let log = Arc::clone(&log);
                let action = name.clone();
                async move {
                    log.calls.lock().push(ActionCall {
                        action: action.clone(),
                        data,
                        options,
                        service_config,
                    });
                    match behavior {
                        Behavior::Succeed => Ok(()),
                        Behavior::Fail => Err(anyhow::anyhow!("{action} refused the event")),
                    }
                }
            })) as Arc<dyn ActionHandler>
        });
    }

    (catalog, log)
}

/// Catalog whose actions each block until `parties` calls across all of them are in flight
///
/// Dispatch that awaits one call before starting the next never gets past the first call.
pub fn rendezvous_catalog(names: &[&str], parties: usize) -> Arc<ActionCatalog> {
    let catalog = Arc::new(ActionCatalog::new());
    let barrier = Arc::new(Barrier::new(parties));

    for name in names {
        let barrier = Arc::clone(&barrier);
        catalog.register(*name, move || {
            let barrier = Arc::clone(&barrier);
            Arc::new(FnAction::new(move |_data, _options, _config| {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            })) as Arc<dyn ActionHandler>
        });
    }

    catalog
}

pub fn router(table: EventHandlerTable, catalog: Arc<ActionCatalog>, config: Value) -> EventRouter {
    EventRouter::new(EventSource::Watchman, Arc::new(config), table, catalog)
        .expect("router should build")
}

/// Record whose payload is `payload` serialized as JSON
pub fn json_record(sequence_number: &str, payload: &Value) -> Record {
    Record::from_payload(payload.to_string().as_bytes(), "partition-1", sequence_number)
}

pub fn raw_record(sequence_number: &str, payload: &[u8]) -> Record {
    Record::from_payload(payload, "partition-1", sequence_number)
}

/// Reporter that keeps its samples and counts flushes
#[derive(Default)]
pub struct RecordingReporter {
    pub samples: Mutex<Vec<f64>>,
    pub flushes: AtomicUsize,
}

impl RecordingReporter {
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

/// Factory that keeps every reporter it creates and a log of lifecycle events
#[derive(Default)]
pub struct RecordingReporterFactory {
    reporters: Mutex<HashMap<String, Arc<RecordingReporter>>>,
    events: Arc<Mutex<Vec<String>>>,
}

struct LoggedReporter {
    action: String,
    inner: Arc<RecordingReporter>,
    events: Arc<Mutex<Vec<String>>>,
}

impl Reporter for LoggedReporter {
    fn record(&self, value: f64) {
        self.inner.samples.lock().push(value);
    }

    fn flush(&self) {
        self.inner.flushes.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(format!("flush:{}", self.action));
    }
}

impl RecordingReporterFactory {
    pub fn reporter(&self, action: &str) -> Option<Arc<RecordingReporter>> {
        self.reporters.lock().get(action).cloned()
    }

    /// `create:<action>` and `flush:<action>` entries in the order they happened
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }
}

impl ReporterFactory for RecordingReporterFactory {
    fn create(
        &self,
        _namespace: &str,
        descriptor: &MetricDescriptor,
        _region: &str,
    ) -> Arc<dyn Reporter> {
        let action = descriptor
            .dimension("Action")
            .unwrap_or_default()
            .to_string();
        let inner = Arc::new(RecordingReporter::default());
        self.reporters
            .lock()
            .insert(action.clone(), Arc::clone(&inner));
        self.events.lock().push(format!("create:{action}"));
        Arc::new(LoggedReporter {
            action,
            inner,
            events: Arc::clone(&self.events),
        })
    }
}
