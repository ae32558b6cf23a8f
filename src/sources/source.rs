//! Source model and the Reader trait

use super::ReaderError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Data source type tag as stored in the RRD header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesKind {
    Gauge,
    Counter,
    Derive,
    Absolute,
    DCounter,
    DDerive,
    Compute,
    /// A tag this crate doesn't know, kept verbatim
    Other(String),
}

impl SeriesKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "GAUGE" => Self::Gauge,
            "COUNTER" => Self::Counter,
            "DERIVE" => Self::Derive,
            "ABSOLUTE" => Self::Absolute,
            "DCOUNTER" => Self::DCounter,
            "DDERIVE" => Self::DDerive,
            "COMPUTE" => Self::Compute,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Gauge => "GAUGE",
            Self::Counter => "COUNTER",
            Self::Derive => "DERIVE",
            Self::Absolute => "ABSOLUTE",
            Self::DCounter => "DCOUNTER",
            Self::DDerive => "DDERIVE",
            Self::Compute => "COMPUTE",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named value tracked within a source
#[derive(Debug, Clone, PartialEq)]
pub struct SubSeries {
    pub name: String,
    pub kind: SeriesKind,
    /// Position of the series in the file, stable for the file's lifetime
    pub index: usize,
    pub last_value: u64,
}

/// A monitored RRD file
///
/// Identity (location and name) never changes. The interval and the set of
/// sub-series are fixed when the source is opened; refreshes only touch the
/// latest values and the last update time.
#[derive(Debug, Clone)]
pub struct Source {
    location: String,
    name: String,
    interval: Duration,
    last_update: DateTime<Utc>,
    series: BTreeMap<String, SubSeries>,
}

impl Source {
    /// Create a source with no sub-series
    pub fn new(location: impl Into<String>, name: impl Into<String>, interval: Duration) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
            interval,
            last_update: DateTime::<Utc>::UNIX_EPOCH,
            series: BTreeMap::new(),
        }
    }

    /// Add a sub-series; its index is its insertion position
    pub fn with_series(mut self, name: impl Into<String>, kind: SeriesKind, value: u64) -> Self {
        let name = name.into();
        let index = self.series.len();
        self.series.insert(
            name.clone(),
            SubSeries {
                name,
                kind,
                index,
                last_value: value,
            },
        );
        self
    }

    pub fn with_last_update(mut self, at: DateTime<Utc>) -> Self {
        self.last_update = at;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn series(&self) -> impl Iterator<Item = &SubSeries> {
        self.series.values()
    }

    pub fn get(&self, name: &str) -> Option<&SubSeries> {
        self.series.get(name)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Sub-series ordered by their index in the file
    pub fn series_by_index(&self) -> Vec<&SubSeries> {
        let mut series: Vec<_> = self.series.values().collect();
        series.sort_by_key(|s| s.index);
        series
    }

    pub(crate) fn insert_series(&mut self, series: SubSeries) {
        self.series.insert(series.name.clone(), series);
    }

    /// Record a fresh sample time
    pub fn set_last_update(&mut self, at: DateTime<Utc>) {
        self.last_update = at;
    }

    /// Update the latest value of a known sub-series
    ///
    /// Returns `false` if the sub-series was not established at open; the
    /// value is dropped in that case.
    pub fn set_value(&mut self, name: &str, value: u64) -> bool {
        match self.series.get_mut(name) {
            Some(series) => {
                series.last_value = value;
                true
            }
            None => false,
        }
    }
}

/// Something that can open and refresh sources
///
/// `open` establishes the sampling metadata of a source; `refresh` pulls
/// the latest values into an already opened source in place.
#[trait_variant::make(Reader: Send)]
pub trait LocalReader {
    async fn open(&self, location: &str, name: &str) -> Result<Source, ReaderError>;

    async fn refresh(&self, source: &mut Source) -> Result<(), ReaderError>;
}
