//! Per-cycle telemetry record and its JSON rendering.

use heapless::Vec;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::sensor::Reading;

/// Maximum number of metrics in one record.
pub const MAX_METRICS: usize = 16;

/// Metric name to value, in insertion order.
///
/// Built fresh every cycle from the readings that succeeded, so a channel
/// that failed this cycle is simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryRecord {
    entries: Vec<(&'static str, f32), MAX_METRICS>,
}

impl TelemetryRecord {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a reading. A metric that is already present is overwritten in place.
    ///
    /// Returns the reading back if the record is full.
    pub fn insert(&mut self, reading: Reading) -> Result<(), Reading> {
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| *name == reading.name) {
            entry.1 = reading.value;
            return Ok(());
        }
        self.entries
            .push((reading.name, reading.value))
            .map_err(|_| reading)
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| *value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        self.entries.iter().copied()
    }

    /// Renders the record as a flat JSON object into `buf`, returning the
    /// number of bytes written.
    pub fn to_json(&self, buf: &mut [u8]) -> serde_json_core::ser::Result<usize> {
        serde_json_core::to_slice(self, buf)
    }
}

impl Serialize for TelemetryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
