//! # Action Registry
//!
//! Named action handlers, the loader abstraction that produces them, and the registry snapshot
//! the router dispatches against.
//!
//! Reloading never mutates a registry in place. [`ActionRegistry::rebuild`] asks the loader for a
//! fresh handler for every required name, so configuration or handler changes take effect
//! without a restart, and the previous snapshot stays usable until the new one is swapped in.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while loading or invoking actions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("Action '{action}' failed: {reason}")]
    Failed { action: String, reason: String },

    #[error("Action '{action}' is not loaded")]
    NotLoaded { action: String },

    #[error("Failed to load action '{action}': {reason}")]
    LoadFailed { action: String, reason: String },
}

impl ActionError {
    pub fn action(&self) -> &str {
        match self {
            Self::Failed { action, .. }
            | Self::NotLoaded { action }
            | Self::LoadFailed { action, .. } => action,
        }
    }
}

/// Side-effecting handler invoked with an event's data
///
/// Implementations own their error handling and retries; only success or failure is inspected.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(
        &self,
        data: &Value,
        options: Option<&Value>,
        service_config: &Value,
    ) -> anyhow::Result<()>;
}

/// Source of action handlers, looked up by name
pub trait ActionLoader: Send + Sync {
    /// Build a new handler instance for `name`
    ///
    /// Every call must return a freshly constructed handler, never a cached one.
    fn load(&self, name: &str) -> Result<Arc<dyn ActionHandler>, ActionError>;

    /// Release anything held for `name` after it leaves the registry
    fn unload(&self, name: &str) {
        debug!(action = %name, "Unloaded action");
    }
}

/// Factory producing a new handler for one action name
pub type ActionFactory = Arc<dyn Fn() -> Arc<dyn ActionHandler> + Send + Sync>;

/// In-process [`ActionLoader`] backed by named factories
///
/// Factories can be registered or replaced at any time; the next reload of the router picks up
/// the new factory.
#[derive(Default)]
pub struct ActionCatalog {
    factories: RwLock<HashMap<String, ActionFactory>>,
}

impl std::fmt::Debug for ActionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionCatalog")
            .field("actions", &self.available())
            .finish()
    }
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the factory for `name`
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn ActionHandler> + Send + Sync + 'static,
    {
        let name = name.into();
        let replaced = self
            .factories
            .write()
            .insert(name.clone(), Arc::new(factory))
            .is_some();
        info!(action = %name, replaced = replaced, "Registered action factory");
    }

    pub fn deregister(&self, name: &str) -> bool {
        self.factories.write().remove(name).is_some()
    }

    /// Names that can currently be loaded
    pub fn available(&self) -> BTreeSet<String> {
        self.factories.read().keys().cloned().collect()
    }
}

impl ActionLoader for ActionCatalog {
    fn load(&self, name: &str) -> Result<Arc<dyn ActionHandler>, ActionError> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ActionError::LoadFailed {
                action: name.to_string(),
                reason: "no factory registered under this name".to_string(),
            })?;
        Ok(factory())
    }
}

/// Adapts an async closure into an [`ActionHandler`]
///
/// Arguments are passed by value, so the closure may move them into its future.
pub struct FnAction<F> {
    f: F,
}

impl<F, Fut> FnAction<F>
where
    F: Fn(Value, Option<Value>, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ActionHandler for FnAction<F>
where
    F: Fn(Value, Option<Value>, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn call(
        &self,
        data: &Value,
        options: Option<&Value>,
        service_config: &Value,
    ) -> anyhow::Result<()> {
        (self.f)(data.clone(), options.cloned(), service_config.clone()).await
    }
}

/// Immutable snapshot of loaded handlers keyed by action name
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding a freshly loaded handler for every name in `required`
    ///
    /// Fails without side effects if any name cannot be loaded. On success, every name held by
    /// `self` but absent from `required` is unloaded through `loader`.
    pub fn rebuild(
        &self,
        required: &BTreeSet<String>,
        loader: &dyn ActionLoader,
    ) -> Result<ActionRegistry, ActionError> {
        let mut handlers = HashMap::with_capacity(required.len());
        for name in required {
            let handler = loader.load(name)?;
            let reloaded = self.handlers.contains_key(name);
            debug!(action = %name, reloaded = reloaded, "Loaded action");
            handlers.insert(name.clone(), handler);
        }

        for name in self.handlers.keys().filter(|name| !required.contains(*name)) {
            loader.unload(name);
        }

        Ok(ActionRegistry { handlers })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
