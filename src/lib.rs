#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Watchman
//!
//! Checkpointed, per-shard stream consumer that turns stream records into application events
//! and runs each event through a configurable list of pluggable actions.
//!
//! ## Architecture
//!
//! ```text
//! shard daemon ──→ kcl::KclDriver ──→ processor::ShardRecordProcessor
//!                                          │ decode base64 → UTF-8 → JSON
//!                                          ▼
//!                                    router::EventRouter ──→ actions (registry::ActionHandler)
//!                                          │
//!                                          ▼ per-action timings
//!                                    metrics::ReporterManager ──→ metrics::Reporter
//! ```
//!
//! Record and action failures are contained where they happen. Each batch is checkpointed at its
//! last record after every record has settled, giving at-least-once delivery without
//! poison-pill loops. The action set can be reloaded at runtime ([`reload::ConfigReloader`]),
//! and the reporter set follows it.
//!
//! ## Module Organization
//!
//! - [`config`] - YAML configuration with environment sections and the event handler table
//! - [`error`] - Crate error type
//! - [`events`] - Event sources and event decoding
//! - [`kcl`] - Line-delimited JSON host protocol adapter
//! - [`logging`] - Structured logging setup
//! - [`metrics`] - Per-action reporter lifecycle and the default tracing backend
//! - [`processor`] - Shard lifecycle, record decoding and checkpointing
//! - [`registry`] - Action handlers, loaders and registry snapshots
//! - [`reload`] - Periodic configuration reload
//! - [`router`] - Event routing and action dispatch
//! - [`service`] - Composition of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use watchman::config::ConfigManager;
//! use watchman::kcl::KclDriver;
//! use watchman::metrics::TracingReporterFactory;
//! use watchman::registry::{ActionCatalog, ActionHandler, FnAction};
//! use watchman::service::WatchmanService;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! watchman::logging::init_structured_logging();
//!
//! let catalog = Arc::new(ActionCatalog::new());
//! catalog.register("log_event", || {
//!     Arc::new(FnAction::new(|data, _options, _config| async move {
//!         tracing::info!(data = %data, "event received");
//!         Ok(())
//!     })) as Arc<dyn ActionHandler>
//! });
//!
//! let service = WatchmanService::new(
//!     ConfigManager::load()?,
//!     catalog,
//!     Arc::new(TracingReporterFactory),
//! )?;
//! KclDriver::stdio(service.shard_processor()).run().await?;
//! service.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod kcl;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod registry;
pub mod reload;
pub mod router;
pub mod service;

pub use config::{ActionSpec, ConfigManager, EventHandlerTable, WatchmanConfig};
pub use error::{Result, WatchmanError};
pub use events::{Event, EventSource};
pub use metrics::{Reporter, ReporterFactory, ReporterManager};
pub use processor::{Checkpointer, Record, ShardRecordProcessor, ShutdownReason};
pub use registry::{ActionCatalog, ActionHandler, ActionLoader, ActionRegistry};
pub use reload::ConfigReloader;
pub use router::EventRouter;
pub use service::WatchmanService;
