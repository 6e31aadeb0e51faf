//! # Watchman Service
//!
//! Wires configuration, the event router, the reporter manager and per-shard processors
//! together. One service is shared by every shard processor in the process.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::{ConfigManager, EventHandlerTable};
use crate::error::Result;
use crate::metrics::{ReporterFactory, ReporterManager};
use crate::processor::ShardRecordProcessor;
use crate::registry::ActionLoader;
use crate::router::EventRouter;

pub struct WatchmanService {
    service_id: Uuid,
    config: Arc<ConfigManager>,
    router: Arc<EventRouter>,
    reporters: Option<Arc<ReporterManager>>,
}

impl std::fmt::Debug for WatchmanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchmanService")
            .field("service_id", &self.service_id)
            .field("name", &self.config.config().service.name)
            .field("router", &self.router)
            .field("reporters", &self.reporters)
            .finish()
    }
}

impl WatchmanService {
    /// Build the router and reporters described by `config`
    ///
    /// Must be called inside a tokio runtime when metrics auto flush is configured.
    pub fn new(
        config: Arc<ConfigManager>,
        loader: Arc<dyn ActionLoader>,
        reporter_factory: Arc<dyn ReporterFactory>,
    ) -> Result<Self> {
        let settings = config.config();
        let service_id = Uuid::new_v4();

        let reporters = settings
            .metrics
            .enabled
            .then(|| Arc::new(ReporterManager::new(&settings.metrics, reporter_factory)));

        let mut router = EventRouter::new(
            settings.source,
            Arc::new(config.raw().clone()),
            settings.event_handlers.clone(),
            loader,
        )?;
        if let Some(reporters) = &reporters {
            router = router.with_reporters(Arc::clone(reporters));
        }
        let router = Arc::new(router);

        if let Some(reporters) = &reporters {
            reporters.reconcile(&router.action_names());
            if settings.metrics.auto_flush {
                reporters.set_auto_flush(true);
            }
        }

        info!(
            service_id = %service_id,
            name = %settings.service.name,
            environment = %config.environment(),
            source = %settings.source,
            metrics_enabled = reporters.is_some(),
            "Watchman service started"
        );

        Ok(Self {
            service_id,
            config,
            router,
            reporters,
        })
    }

    /// Swap in a new event handler table and bring the reporters in line with it
    ///
    /// On failure nothing changes: the router keeps its previous table and handlers.
    pub fn apply_event_handlers(&self, event_handlers: EventHandlerTable) -> Result<()> {
        self.router.load_actions(event_handlers)?;
        self.reconcile_reporters();
        Ok(())
    }

    /// Apply a reloaded configuration: its event handler table and the document actions receive
    ///
    /// Every referenced action is rebuilt. Sections other than `event_handlers` that the service
    /// itself reads (source, metrics, reload) keep their startup values.
    pub fn apply_config(&self, config: &ConfigManager) -> Result<()> {
        self.router.reload(
            config.config().event_handlers.clone(),
            Arc::new(config.raw().clone()),
        )?;
        self.reconcile_reporters();
        Ok(())
    }

    fn reconcile_reporters(&self) {
        if let Some(reporters) = &self.reporters {
            reporters.reconcile(&self.router.action_names());
        }
    }

    /// A fresh processor for one shard, sharing this service's router
    pub fn shard_processor(&self) -> ShardRecordProcessor {
        ShardRecordProcessor::new(Arc::clone(&self.router))
    }

    /// Stop periodic flushing and flush whatever is still buffered
    pub fn shutdown(&self) {
        if let Some(reporters) = &self.reporters {
            if reporters.is_auto_flush_enabled() {
                reporters.set_auto_flush(false);
            } else {
                reporters.flush_all();
            }
        }
        info!(service_id = %self.service_id, "Watchman service stopped");
    }

    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    /// The configuration the service was started with
    pub fn config(&self) -> &Arc<ConfigManager> {
        &self.config
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn reporters(&self) -> Option<&Arc<ReporterManager>> {
        self.reporters.as_ref()
    }
}
