//! Data sources for rrd2prom
//!
//! A [`Source`] is one RRD file together with the latest values of its data
//! sources. Sources are opened and refreshed through a [`Reader`];
//! [`RrdReader`] is the implementation used by the daemon.

mod error;
#[cfg(test)]
pub(crate) mod mock;
mod reader;
mod rrd;
mod source;

pub use error::ReaderError;
pub use reader::{is_url, ReaderConfig, RrdReader};
pub use rrd::{DataSource, Header, HeaderError};
pub use source::{LocalReader, Reader, SeriesKind, Source, SubSeries};
