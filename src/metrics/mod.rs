//! # Action Metrics
//!
//! One timing reporter per configured action, kept in step with the action set as it changes.
//!
//! - [`reporter`]: the backend contract (`Reporter`, `ReporterFactory`) and metric identity
//! - [`manager`]: `ReporterManager`, which reconciles reporters against a target action set and
//!   runs the periodic flush
//! - [`backend`]: a reporter that aggregates samples and emits them as structured log entries

pub mod backend;
pub mod manager;
pub mod reporter;

pub use backend::{TracingReporter, TracingReporterFactory};
pub use manager::ReporterManager;
pub use reporter::{MetricDescriptor, MetricDimension, Reporter, ReporterFactory};
