//! # Tracing Reporter Backend
//!
//! Default [`Reporter`] implementation. Samples are aggregated per flush window and emitted as
//! one structured `info!` entry, which a log shipper can forward to the monitoring system.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::reporter::{MetricDescriptor, Reporter, ReporterFactory};

/// Aggregate of the samples recorded since the last flush
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleWindow {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl SampleWindow {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Reporter that emits aggregated samples through `tracing`
#[derive(Debug)]
pub struct TracingReporter {
    namespace: String,
    region: String,
    descriptor: MetricDescriptor,
    window: Mutex<SampleWindow>,
    flushed_samples: AtomicU64,
}

impl TracingReporter {
    pub fn new(namespace: &str, descriptor: &MetricDescriptor, region: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            region: region.to_string(),
            descriptor: descriptor.clone(),
            window: Mutex::new(SampleWindow::default()),
            flushed_samples: AtomicU64::new(0),
        }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Samples recorded since the last flush
    pub fn pending(&self) -> SampleWindow {
        *self.window.lock()
    }

    /// Total samples emitted by all flushes so far
    pub fn flushed_samples(&self) -> u64 {
        self.flushed_samples.load(Ordering::Relaxed)
    }
}

impl Reporter for TracingReporter {
    fn record(&self, value: f64) {
        self.window.lock().push(value);
    }

    fn flush(&self) {
        let window = std::mem::take(&mut *self.window.lock());
        if window.count == 0 {
            return;
        }

        self.flushed_samples
            .fetch_add(window.count, Ordering::Relaxed);

        let dimensions = self
            .descriptor
            .dimensions
            .iter()
            .map(|d| format!("{}={}", d.name, d.value))
            .collect::<Vec<_>>()
            .join(",");

        info!(
            namespace = %self.namespace,
            region = %self.region,
            metric = %self.descriptor.metric_name,
            unit = %self.descriptor.unit,
            dimensions = %dimensions,
            count = window.count,
            sum = window.sum,
            min = window.min,
            max = window.max,
            avg = window.average(),
            "METRIC_FLUSH"
        );
    }
}

/// Factory producing [`TracingReporter`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporterFactory;

impl ReporterFactory for TracingReporterFactory {
    fn create(
        &self,
        namespace: &str,
        descriptor: &MetricDescriptor,
        region: &str,
    ) -> Arc<dyn Reporter> {
        Arc::new(TracingReporter::new(namespace, descriptor, region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_aggregation_and_reset() {
        let descriptor = MetricDescriptor::for_action("ActionDuration", "send_email");
        let reporter = TracingReporter::new("Watchman", &descriptor, "us-east-1");

        reporter.record(10.0);
        reporter.record(30.0);
        reporter.record(20.0);

        let pending = reporter.pending();
        assert_eq!(pending.count, 3);
        assert_eq!(pending.min, 10.0);
        assert_eq!(pending.max, 30.0);
        assert_eq!(pending.average(), 20.0);

        reporter.flush();
        assert_eq!(reporter.pending(), SampleWindow::default());
        assert_eq!(reporter.flushed_samples(), 3);

        // Empty windows are not emitted
        reporter.flush();
        assert_eq!(reporter.flushed_samples(), 3);
    }
}
