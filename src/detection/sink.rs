// In-memory result sink

use super::ResultSink;
use serde::Serialize;

/// One `set_value` (with a value) or `clear_value` (without)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEvent {
    pub timestamp: i64,
    pub key: String,
    pub value: Option<f64>,
}

/// Events ordered by timestamp; equal timestamps keep arrival order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTimeline {
    events: Vec<TimelineEvent>,
}

impl ResultTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Value of `key` in effect at `timestamp`, if it was set and not cleared
    pub fn value_at(&self, key: &str, timestamp: i64) -> Option<f64> {
        self.events
            .iter()
            .take_while(|e| e.timestamp <= timestamp)
            .filter(|e| e.key == key)
            .last()
            .and_then(|e| e.value)
    }

    fn insert(&mut self, event: TimelineEvent) {
        let at = self
            .events
            .partition_point(|e| e.timestamp <= event.timestamp);
        self.events.insert(at, event);
    }
}

impl ResultSink for ResultTimeline {
    fn set_value(&mut self, timestamp: i64, value: f64, key: &str) {
        self.insert(TimelineEvent {
            timestamp,
            key: key.to_string(),
            value: Some(value),
        });
    }

    fn clear_value(&mut self, timestamp: i64, key: &str) {
        self.insert(TimelineEvent {
            timestamp,
            key: key.to_string(),
            value: None,
        });
    }
}
