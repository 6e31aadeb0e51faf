use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{ActionSpec, EventHandlerTable};
use crate::error::{Result, WatchmanError};
use crate::events::{Event, EventSource};
use crate::metrics::ReporterManager;
use crate::registry::{ActionError, ActionLoader, ActionRegistry};

/// Result of a single action invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub action: String,
    pub outcome: std::result::Result<(), ActionError>,
    pub elapsed: Duration,
}

impl ActionReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// What [`EventRouter::process`] did with a decoded record
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The record carried no event `type`
    NoEvent,
    /// The event has no configured action list
    Unrouted { event: String },
    /// The event's action list ran; one report per configured action
    Handled {
        event: String,
        reports: Vec<ActionReport>,
    },
}

impl DispatchOutcome {
    pub fn reports(&self) -> &[ActionReport] {
        match self {
            Self::Handled { reports, .. } => reports,
            _ => &[],
        }
    }
}

/// Table, registry and service config published together so a dispatch never mixes
/// generations
#[derive(Debug, Default)]
struct RoutingState {
    table: EventHandlerTable,
    registry: ActionRegistry,
    service_config: Arc<Value>,
}

/// Routes events from one stream source to their configured actions
pub struct EventRouter {
    source: EventSource,
    loader: Arc<dyn ActionLoader>,
    state: RwLock<Arc<RoutingState>>,
    reload_lock: Mutex<()>,
    reporters: Option<Arc<ReporterManager>>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.snapshot();
        f.debug_struct("EventRouter")
            .field("source", &self.source)
            .field("events", &state.table.len())
            .field("actions", &state.registry.names())
            .field("has_reporters", &self.reporters.is_some())
            .finish()
    }
}

impl EventRouter {
    /// Build a router and load the actions referenced by `event_handlers`
    pub fn new(
        source: EventSource,
        service_config: Arc<Value>,
        event_handlers: EventHandlerTable,
        loader: Arc<dyn ActionLoader>,
    ) -> Result<Self> {
        let router = Self {
            source,
            loader,
            state: RwLock::new(Arc::new(RoutingState::default())),
            reload_lock: Mutex::new(()),
            reporters: None,
        };
        router.reload(event_handlers, service_config)?;

        info!(source = %source, "Event router initialized");
        Ok(router)
    }

    /// Build a router from a source name; an empty or unknown name is a construction error
    pub fn from_name(
        name: &str,
        service_config: Arc<Value>,
        event_handlers: EventHandlerTable,
        loader: Arc<dyn ActionLoader>,
    ) -> Result<Self> {
        let source = name.parse::<EventSource>()?;
        Self::new(source, service_config, event_handlers, loader)
    }

    /// Record per-action timings into `reporters`
    pub fn with_reporters(mut self, reporters: Arc<ReporterManager>) -> Self {
        self.reporters = Some(reporters);
        self
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    fn snapshot(&self) -> Arc<RoutingState> {
        Arc::clone(&self.state.read())
    }

    /// Decode `raw` into an event and run its configured actions
    pub async fn process(&self, raw: &Value) -> DispatchOutcome {
        let Some(event) = Event::decode(raw) else {
            debug!(source = %self.source, "Record carries no event type");
            return DispatchOutcome::NoEvent;
        };

        let state = self.snapshot();
        let Some(actions) = state.table.actions_for(&event.name) else {
            debug!(source = %self.source, event = %event.name, "No actions configured for event");
            return DispatchOutcome::Unrouted { event: event.name };
        };

        let reports = self.run_actions(&state, &event, actions).await;
        DispatchOutcome::Handled {
            event: event.name,
            reports,
        }
    }

    /// Run `actions` for `event` against the currently loaded handlers
    ///
    /// Every action is invoked concurrently and awaited to completion. Failures are logged and
    /// reported but never returned as an error.
    pub async fn handle_event(&self, event: &Event, actions: &[ActionSpec]) -> Vec<ActionReport> {
        let state = self.snapshot();
        self.run_actions(&state, event, actions).await
    }

    async fn run_actions(
        &self,
        state: &RoutingState,
        event: &Event,
        actions: &[ActionSpec],
    ) -> Vec<ActionReport> {
        if actions.is_empty() {
            return Vec::new();
        }

        let invocations = actions.iter().map(|spec| {
            let handler = state.registry.get(spec.name());
            let service_config = Arc::clone(&state.service_config);
            async move {
                let action = spec.name().to_string();
                let started = Instant::now();

                let outcome = match handler {
                    Some(handler) => {
                        let call = handler.call(&event.data, spec.options(), &service_config);
                        match AssertUnwindSafe(call).catch_unwind().await {
                            Ok(Ok(())) => Ok(()),
                            Ok(Err(e)) => Err(ActionError::Failed {
                                action: action.clone(),
                                reason: format!("{e:#}"),
                            }),
                            Err(_) => Err(ActionError::Failed {
                                action: action.clone(),
                                reason: "action panicked".to_string(),
                            }),
                        }
                    }
                    None => Err(ActionError::NotLoaded {
                        action: action.clone(),
                    }),
                };

                ActionReport {
                    action,
                    outcome,
                    elapsed: started.elapsed(),
                }
            }
        });

        let reports = join_all(invocations).await;

        for report in &reports {
            match &report.outcome {
                Ok(()) => info!(
                    source = %self.source,
                    event = %event.name,
                    action = %report.action,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Action completed"
                ),
                Err(e) => warn!(
                    source = %self.source,
                    event = %event.name,
                    action = %report.action,
                    error = %e,
                    "Action failed"
                ),
            }

            if let Some(reporters) = &self.reporters {
                reporters.record(&report.action, report.elapsed.as_secs_f64() * 1000.0);
            }
        }

        reports
    }

    /// Replace the event handler table and reload every action it references
    ///
    /// Every referenced action gets a freshly loaded handler, even if it was already loaded.
    /// Actions no longer referenced are unloaded. If any action fails to load, the previous
    /// table and handlers stay in effect.
    pub fn load_actions(&self, event_handlers: EventHandlerTable) -> Result<()> {
        let _reload = self.reload_lock.lock();
        let service_config = self.service_config();
        self.swap_state(event_handlers, service_config)
    }

    /// [`load_actions`](Self::load_actions) with a new service config document
    ///
    /// Handlers are rebuilt even when `event_handlers` is unchanged, so both the new document
    /// and any re-registered handler factories take effect. The document is swapped together
    /// with the table; on failure neither changes.
    pub fn reload(
        &self,
        event_handlers: EventHandlerTable,
        service_config: Arc<Value>,
    ) -> Result<()> {
        let _reload = self.reload_lock.lock();
        self.swap_state(event_handlers, service_config)
    }

    /// Caller holds `reload_lock`
    fn swap_state(
        &self,
        event_handlers: EventHandlerTable,
        service_config: Arc<Value>,
    ) -> Result<()> {
        let required = event_handlers.action_names();
        let current = self.snapshot();

        let registry = current
            .registry
            .rebuild(&required, self.loader.as_ref())
            .map_err(|e| {
                error!(source = %self.source, error = %e, "Failed to load actions");
                WatchmanError::Configuration(e.to_string())
            })?;

        let unloaded = current
            .registry
            .names()
            .difference(&required)
            .count();

        *self.state.write() = Arc::new(RoutingState {
            table: event_handlers,
            registry,
            service_config,
        });

        info!(
            source = %self.source,
            loaded = required.len(),
            unloaded = unloaded,
            "Actions loaded"
        );
        Ok(())
    }

    /// Names of the currently loaded actions
    pub fn action_names(&self) -> BTreeSet<String> {
        self.snapshot().registry.names()
    }

    /// The service config document actions currently receive
    pub fn service_config(&self) -> Arc<Value> {
        Arc::clone(&self.snapshot().service_config)
    }

    /// The currently active event handler table
    pub fn event_handlers(&self) -> EventHandlerTable {
        self.snapshot().table.clone()
    }
}
