//! Secondary delivery
//!
//! A [`Sink`] receives [`LogEntry`] maps. The logger calls one only when the
//! backend failed in production mode; an exporter sink receives batches of
//! every emitted entry through a [`BatchProcessor`].

pub mod batch;
#[cfg(feature = "openobserve")]
pub mod openobserve;

use crate::core::{Context, FieldValue, Level, Result};
use serde::{Deserialize, Serialize};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub use batch::BatchProcessor;
#[cfg(feature = "openobserve")]
pub use openobserve::{OpenObserveConfig, OpenObserveSink};

/// Field name to resolved value, the payload of secondary delivery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntry(serde_json::Map<String, serde_json::Value>);

impl LogEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project a flat key/value sequence into a map. A later duplicate key
    /// replaces an earlier one; a dangling key maps to null. `level` and
    /// `message` are added unless the sequence already sets them.
    pub fn project(level: Level, message: &str, keyvals: &[FieldValue]) -> Self {
        let mut map = serde_json::Map::with_capacity(keyvals.len() / 2 + 2);
        for pair in keyvals.chunks(2) {
            let value = pair
                .get(1)
                .map_or(serde_json::Value::Null, FieldValue::to_json_value);
            map.insert(pair[0].to_key(), value);
        }
        map.entry("level")
            .or_insert_with(|| serde_json::Value::from(level.to_str()));
        map.entry("message")
            .or_insert_with(|| serde_json::Value::from(message));
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    pub fn into_inner(self) -> serde_json::Map<String, serde_json::Value> {
        self.0
    }

    /// String value of `field`, or `"default"` when absent or not a string
    pub fn stream_name(&self, field: &str) -> &str {
        self.0
            .get(field)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("default")
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for LogEntry {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// Best-effort remote delivery
///
/// Implementations must not block the caller for the duration of a network
/// round trip.
pub trait Sink: Send + Sync {
    fn send(&self, ctx: &Context, entry: LogEntry) -> Result<()>;
    fn send_batch(&self, ctx: &Context, entries: Vec<LogEntry>) -> Result<()>;
}

/// Wait for a worker thread with a deadline; `false` if it did not finish
pub(crate) fn join_worker(handle: JoinHandle<()>, timeout: Duration, what: &str) -> bool {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            if let Err(e) = handle.join() {
                eprintln!("[LOGGER ERROR] {} worker panicked during shutdown: {:?}", what, e);
                return false;
            }
            return true;
        }

        if start.elapsed() >= timeout {
            eprintln!(
                "[LOGGER WARNING] {} worker did not finish within {:?}. \
                 Some entries may be lost.",
                what, timeout
            );
            return false;
        }

        thread::sleep(Duration::from_millis(10));
    }
}
