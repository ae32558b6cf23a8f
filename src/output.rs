//! Line formatting for emitted events

use crate::config::OutputFormat;
use crate::manager::{MetricEvent, RefreshError};
use serde_json::json;

/// Renders events as single output lines
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn metric(&self, metric: &MetricEvent) -> String {
        match self.format {
            OutputFormat::Text => format!(
                "METRIC: {}{{source=\"{}\"}} {} [{}]",
                metric.source,
                metric.series,
                metric.value,
                metric.timestamp.to_rfc3339()
            ),
            OutputFormat::Json => json!({
                "kind": "metric",
                "source": metric.source,
                "series": metric.series,
                "value": metric.value,
                "timestamp": metric.timestamp,
            })
            .to_string(),
        }
    }

    pub fn message(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Text => format!("MSG: {}", message),
            OutputFormat::Json => json!({ "kind": "message", "message": message }).to_string(),
        }
    }

    pub fn error(&self, error: &RefreshError) -> String {
        match self.format {
            OutputFormat::Text => format!("ERROR: {}", error),
            OutputFormat::Json => json!({
                "kind": "error",
                "source": error.source_name,
                "cycle": error.cycle,
                "error": error.error.to_string(),
            })
            .to_string(),
        }
    }
}
