//! In-memory reader for exercising the manager without files

use super::{Reader, ReaderError, Source};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How a mocked source responds to refreshes
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Behavior {
    /// Every refresh succeeds; each series takes the refresh count as value
    Healthy,
    /// Every refresh fails
    Failing,
    /// The first `n` refreshes succeed, then the location goes away
    FailAfter(usize),
    /// Refreshes never complete
    Hang,
}

struct Entry {
    template: Source,
    behavior: Behavior,
    refreshes: usize,
}

#[derive(Clone, Default)]
pub(crate) struct MockReader {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, template: Source, behavior: Behavior) -> Self {
        self.entries.lock().unwrap().insert(
            template.name().to_string(),
            Entry {
                template,
                behavior,
                refreshes: 0,
            },
        );
        self
    }

    /// Number of refresh attempts made for `name`
    pub fn refreshes(&self, name: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|e| e.refreshes)
            .unwrap_or(0)
    }
}

impl Reader for MockReader {
    async fn open(&self, location: &str, name: &str) -> Result<Source, ReaderError> {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|e| e.template.clone())
            .ok_or_else(|| ReaderError::unavailable(location, "no such file or directory"))
    }

    async fn refresh(&self, source: &mut Source) -> Result<(), ReaderError> {
        let (behavior, count) = {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries
                .get_mut(source.name())
                .ok_or_else(|| ReaderError::unavailable(source.location(), "unknown source"))?;
            entry.refreshes += 1;
            (entry.behavior, entry.refreshes)
        };

        match behavior {
            Behavior::Hang => std::future::pending().await,
            Behavior::Failing => Err(ReaderError::unavailable(
                source.location(),
                "no such file or directory",
            )),
            Behavior::FailAfter(n) if count > n => Err(ReaderError::unavailable(
                source.location(),
                "no such file or directory",
            )),
            _ => {
                let names: Vec<String> = source.series().map(|s| s.name.clone()).collect();
                for name in names {
                    source.set_value(&name, count as u64);
                }
                source.set_last_update(Utc::now());
                Ok(())
            }
        }
    }
}
