//! Errors raised while opening or refreshing a source

use thiserror::Error;

/// Failure to read a source
///
/// Retrieval problems (HTTP status, transport, local I/O) all map to
/// [`ReaderError::Unavailable`]; problems with the bytes once they were read
/// map to [`ReaderError::Format`].
#[derive(Error, Debug)]
pub enum ReaderError {
    /// The source could not be retrieved
    #[error("couldn't read {location}: {reason}")]
    Unavailable { location: String, reason: String },

    /// The source was retrieved but is not a usable RRD file
    #[error("malformed RRD at {location}: {reason}")]
    Format { location: String, reason: String },
}

impl ReaderError {
    pub fn unavailable(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn format(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::Format {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    /// Location the failed read was aimed at
    pub fn location(&self) -> &str {
        match self {
            Self::Unavailable { location, .. } | Self::Format { location, .. } => location,
        }
    }

    /// Whether the failure happened before any bytes could be parsed
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReaderError::unavailable("http://host/a.rrd", "bad status: 500");
        assert_eq!(err.to_string(), "couldn't read http://host/a.rrd: bad status: 500");
        assert!(err.is_unavailable());
        assert_eq!(err.location(), "http://host/a.rrd");

        let err = ReaderError::format("a.rrd", "bad cookie");
        assert!(!err.is_unavailable());
        assert!(err.to_string().contains("bad cookie"));
    }
}
