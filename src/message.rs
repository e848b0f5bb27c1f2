use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single entry read from a stream under a consumer group.
///
/// `id` is assigned by the store and monotonic within its stream.
/// `delivery_count` is the store's redelivery counter for this entry under
/// its group: 1 for a fresh read, incremented by every claim. The retry /
/// dead-letter policy is driven entirely by this counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub event: String,
    pub payload: Value,
    pub delivery_count: u64,
}

impl Message {
    pub fn new(id: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            event: event.into(),
            payload,
            delivery_count: 1,
        }
    }
}
