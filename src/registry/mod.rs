//! # Action Registry Infrastructure
//!
//! Loading and lookup of the named, pluggable side-effecting handlers that events are routed to.
//!
//! ## Architecture
//!
//! ```text
//! Registry Infrastructure
//! ├── ActionHandler    (the callable contract every action implements)
//! ├── ActionLoader     (builds handlers by name from an external module space)
//! │   └── ActionCatalog  (in-process loader backed by named factories)
//! └── ActionRegistry   (immutable name -> handler snapshot, rebuilt on reload)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use watchman::registry::{ActionCatalog, ActionHandler, ActionLoader, FnAction};
//! use std::sync::Arc;
//!
//! let catalog = ActionCatalog::new();
//! catalog.register("noop", || {
//!     Arc::new(FnAction::new(|_data, _options, _config| async { Ok(()) })) as Arc<dyn ActionHandler>
//! });
//!
//! let handler = catalog.load("noop").unwrap();
//! ```

pub mod action_registry;

pub use action_registry::{
    ActionCatalog, ActionError, ActionFactory, ActionHandler, ActionLoader, ActionRegistry,
    FnAction,
};
