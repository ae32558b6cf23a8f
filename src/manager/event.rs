//! Events published by the manager

use crate::sources::ReaderError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Latest value of one sub-series at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    /// Name of the source the value came from
    pub source: String,
    /// Name of the sub-series within that source
    pub series: String,
    pub value: u64,
    /// When the refresh that produced this value completed
    pub timestamp: DateTime<Utc>,
}

/// Informational lifecycle notice
pub type Message = String;

/// A refresh attempt that failed
///
/// `cycle` 0 is the immediate refresh a poller does on start; every tick
/// after that increments it.
#[derive(Error, Debug)]
#[error("refresh of {source_name} failed (cycle {cycle}): {error}")]
pub struct RefreshError {
    pub source_name: String,
    pub cycle: u64,
    #[source]
    pub error: ReaderError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_error_display() {
        let err = RefreshError {
            source_name: "port1".to_string(),
            cycle: 3,
            error: ReaderError::unavailable("nonexistent.rrd", "no such file"),
        };
        assert_eq!(
            err.to_string(),
            "refresh of port1 failed (cycle 3): couldn't read nonexistent.rrd: no such file"
        );
    }

    #[test]
    fn test_metric_serializes() {
        let event = MetricEvent {
            source: "port1".to_string(),
            series: "traffic_in".to_string(),
            value: 42,
            timestamp: DateTime::from_timestamp(1735589344, 0).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source"], "port1");
        assert_eq!(json["series"], "traffic_in");
        assert_eq!(json["value"], 42);
        assert_eq!(json["timestamp"], "2024-12-30T20:09:04Z");
    }
}
