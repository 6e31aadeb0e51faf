use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name/value pair qualifying a metric series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDimension {
    pub name: String,
    pub value: String,
}

/// Fixed identity of one metric series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub metric_name: String,
    pub unit: String,
    pub dimensions: Vec<MetricDimension>,
}

impl MetricDescriptor {
    /// Timing series for one action: `<metric_name>` in milliseconds, dimensioned by `Action`
    pub fn for_action(metric_name: &str, action: &str) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            unit: "Milliseconds".to_string(),
            dimensions: vec![MetricDimension {
                name: "Action".to_string(),
                value: action.to_string(),
            }],
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}

/// Accumulates samples for one series and transmits them on flush
pub trait Reporter: Send + Sync {
    fn record(&self, value: f64);

    /// Transmit accumulated samples; must be cheap enough to call under a lock
    fn flush(&self);
}

/// Builds reporters for a metrics backend
pub trait ReporterFactory: Send + Sync {
    fn create(
        &self,
        namespace: &str,
        descriptor: &MetricDescriptor,
        region: &str,
    ) -> Arc<dyn Reporter>;
}
