//! RRD header decoding
//!
//! Only the parts of the file needed to report the latest sample are read:
//! the static header, the data source definitions, the live header and the
//! per-source PDP preparation area. Archive data is never touched.
//!
//! The layout is the one rrdtool writes on 64-bit little-endian hosts:
//!
//! | section    | size            | used fields                        |
//! |------------|-----------------|------------------------------------|
//! | stat_head  | 128             | cookie, version, float cookie, counts, step |
//! | ds_def     | 120 per source  | name, type                         |
//! | rra_def    | 120 per archive | (skipped)                          |
//! | live_head  | 16 (8 for v1/v2)| last update                        |
//! | pdp_prep   | 112 per source  | last_ds                            |

use super::SeriesKind;
use bytes::Buf;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

const COOKIE: &[u8; 4] = b"RRD\0";
const FLOAT_COOKIE: f64 = 8.642135e130;

const STAT_HEAD_LEN: usize = 128;
const DS_DEF_LEN: usize = 120;
const RRA_DEF_LEN: usize = 120;
const PDP_PREP_LEN: usize = 112;

const DS_NAME_LEN: usize = 20;
const DS_TYPE_LEN: usize = 20;
const LAST_DS_LEN: usize = 30;

const MIN_VERSION: u32 = 1;
const MAX_VERSION: u32 = 4;

/// Problems found while decoding a header
#[derive(Error, Debug, PartialEq)]
pub enum HeaderError {
    #[error("file too short: need {needed} bytes, have {len}")]
    Truncated { needed: usize, len: usize },

    #[error("not an RRD file (bad cookie)")]
    BadCookie,

    #[error("float cookie mismatch, file was written on an incompatible architecture")]
    BadFloatCookie,

    #[error("unsupported RRD version {0:?}")]
    UnsupportedVersion(String),

    #[error("step must be non-zero")]
    ZeroStep,

    #[error("last update {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("invalid last_ds value {raw:?} for {name}")]
    InvalidValue { name: String, raw: String },
}

/// One data source definition plus its latest raw value
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub name: String,
    pub kind: SeriesKind,
    pub index: usize,
    /// Raw `last_ds` text, `U` when unknown
    pub last_ds: String,
}

impl DataSource {
    /// Latest value as an unsigned integer
    pub fn value(&self) -> Result<u64, HeaderError> {
        self.last_ds.parse().map_err(|_| HeaderError::InvalidValue {
            name: self.name.clone(),
            raw: self.last_ds.clone(),
        })
    }
}

/// Decoded RRD header
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u32,
    pub step: Duration,
    pub last_update: DateTime<Utc>,
    pub data_sources: Vec<DataSource>,
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        ensure_len(data, STAT_HEAD_LEN)?;
        let mut head = &data[..STAT_HEAD_LEN];

        let mut cookie = [0u8; 4];
        head.copy_to_slice(&mut cookie);
        if &cookie != COOKIE {
            return Err(HeaderError::BadCookie);
        }

        let mut version = [0u8; 5];
        head.copy_to_slice(&mut version);
        let version = parse_version(&version)?;

        // float cookie is 8-byte aligned
        head.advance(7);
        if head.get_f64_le() != FLOAT_COOKIE {
            return Err(HeaderError::BadFloatCookie);
        }

        let ds_cnt = head.get_u64_le() as usize;
        let rra_cnt = head.get_u64_le() as usize;
        let step = head.get_u64_le();
        if step == 0 {
            return Err(HeaderError::ZeroStep);
        }

        let live_head_len = if version >= 3 { 16 } else { 8 };
        let ds_start = STAT_HEAD_LEN;
        let live_start = ds_cnt
            .checked_mul(DS_DEF_LEN)
            .and_then(|ds| rra_cnt.checked_mul(RRA_DEF_LEN).and_then(|rra| ds.checked_add(rra)))
            .and_then(|defs| defs.checked_add(ds_start))
            .ok_or(HeaderError::Truncated {
                needed: usize::MAX,
                len: data.len(),
            })?;
        let pdp_start = live_start
            .checked_add(live_head_len)
            .ok_or(HeaderError::Truncated {
                needed: usize::MAX,
                len: data.len(),
            })?;
        let end = ds_cnt
            .checked_mul(PDP_PREP_LEN)
            .and_then(|pdp| pdp.checked_add(pdp_start))
            .ok_or(HeaderError::Truncated {
                needed: usize::MAX,
                len: data.len(),
            })?;
        ensure_len(data, end)?;

        let mut live = &data[live_start..pdp_start];
        let last_up = live.get_i64_le();
        let last_update =
            DateTime::from_timestamp(last_up, 0).ok_or(HeaderError::InvalidTimestamp(last_up))?;

        let data_sources = (0..ds_cnt)
            .map(|index| {
                let def = &data[ds_start + index * DS_DEF_LEN..][..DS_DEF_LEN];
                let prep = &data[pdp_start + index * PDP_PREP_LEN..][..PDP_PREP_LEN];
                DataSource {
                    name: c_str(&def[..DS_NAME_LEN]),
                    kind: SeriesKind::parse(&c_str(&def[DS_NAME_LEN..DS_NAME_LEN + DS_TYPE_LEN])),
                    index,
                    last_ds: c_str(&prep[..LAST_DS_LEN]),
                }
            })
            .collect();

        Ok(Self {
            version,
            step: Duration::from_secs(step),
            last_update,
            data_sources,
        })
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|ds| ds.name == name)
    }
}

fn ensure_len(data: &[u8], needed: usize) -> Result<(), HeaderError> {
    if data.len() < needed {
        return Err(HeaderError::Truncated {
            needed,
            len: data.len(),
        });
    }
    Ok(())
}

fn parse_version(raw: &[u8; 5]) -> Result<u32, HeaderError> {
    let text = c_str(raw);
    match text.parse::<u32>() {
        Ok(v) if (MIN_VERSION..=MAX_VERSION).contains(&v) => Ok(v),
        _ => Err(HeaderError::UnsupportedVersion(text)),
    }
}

/// Fixed-width, NUL padded field as text
fn c_str(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}

/// Build RRD header bytes for tests
#[cfg(test)]
pub(crate) fn encode(
    version: u32,
    step: u64,
    last_up: i64,
    sources: &[(&str, &str, &str)],
    rra_cnt: usize,
) -> Vec<u8> {
    fn field(out: &mut Vec<u8>, text: &str, width: usize) {
        let mut raw = text.as_bytes().to_vec();
        raw.resize(width, 0);
        out.extend_from_slice(&raw);
    }

    let mut out = Vec::new();
    out.extend_from_slice(COOKIE);
    field(&mut out, &format!("{:04}", version), 5);
    out.extend_from_slice(&[0u8; 7]);
    out.extend_from_slice(&FLOAT_COOKIE.to_le_bytes());
    out.extend_from_slice(&(sources.len() as u64).to_le_bytes());
    out.extend_from_slice(&(rra_cnt as u64).to_le_bytes());
    out.extend_from_slice(&step.to_le_bytes());
    out.resize(STAT_HEAD_LEN, 0);

    for (name, kind, _) in sources {
        let start = out.len();
        field(&mut out, name, DS_NAME_LEN);
        field(&mut out, kind, DS_TYPE_LEN);
        out.resize(start + DS_DEF_LEN, 0);
    }
    for _ in 0..rra_cnt {
        let start = out.len();
        field(&mut out, "AVERAGE", 20);
        out.resize(start + RRA_DEF_LEN, 0);
    }

    out.extend_from_slice(&last_up.to_le_bytes());
    if version >= 3 {
        out.extend_from_slice(&0i64.to_le_bytes());
    }

    for (_, _, last_ds) in sources {
        let start = out.len();
        field(&mut out, last_ds, LAST_DS_LEN);
        out.resize(start + PDP_PREP_LEN, 0);
    }

    // stand-in for the archive rows that follow the header
    out.extend_from_slice(&[0u8; 64]);
    out
}
