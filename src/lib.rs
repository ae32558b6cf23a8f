//! rrd2prom - RRD files as a live metric feed
//!
//! Samples a set of RRD files, each at its own step, and republishes the
//! latest value of every data source as timestamped metric events.

pub mod config;
pub mod logging;
pub mod manager;
pub mod output;
pub mod sources;

pub use config::Config;
pub use manager::{Manager, ManagerConfig, MetricEvent, RefreshError, StopHandle, Streams};
pub use sources::{Reader, RrdReader, Source};
