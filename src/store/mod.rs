//! Log store boundary.
//!
//! The delivery engine talks to its backing store exclusively through
//! [`LogStore`]: a thin, typed facade over an ordered, consumer-group-capable
//! log primitive. [`RedisStreamStore`] is the production implementation over
//! Redis Streams; [`MemoryStore`] is an in-process implementation for tests
//! and local development.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStreamStore;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::message::Message;

/// Snapshot of a consumer group's pending entries. Observability only;
/// the delivery engine never branches on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingSummary {
    pub size: u64,
    pub min_id: Option<String>,
    pub max_id: Option<String>,
    /// Pending entry count per consumer
    pub consumers: HashMap<String, u64>,
}

/// Operations the delivery engine needs from the backing log store.
///
/// Implementations own stream-name normalization: every `stream` argument is
/// the logical name, and whatever key scheme the store uses (suffixing,
/// prefixing) is applied uniformly behind this boundary. Group names are
/// always derived as `<stream>-<group>`, never free-form.
#[async_trait]
pub trait LogStore: Send + Sync + 'static {
    /// Whether the consumer group exists on the stream. A missing stream or
    /// group is reported as `false`, never as an error.
    async fn group_exists(&self, stream: &str, group: &str) -> Result<bool>;

    /// Create the consumer group, creating the stream as well if absent.
    /// Only new entries appended after creation are visible to the group.
    /// Callers are expected to check `group_exists` first.
    async fn create_group(&self, stream: &str, group: &str) -> Result<()>;

    async fn delete_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Append an event to the stream, returning the assigned message id.
    async fn publish(&self, stream: &str, event: &str, payload: &Value) -> Result<String>;

    /// Read entries never before delivered to this group. Non-blocking;
    /// may return empty.
    async fn read_next(&self, stream: &str, group: &str, consumer: &str) -> Result<Vec<Message>>;

    /// Atomically reassign pending entries idle for at least `min_idle` to
    /// `consumer`. Returns empty if none qualify. Claimed messages carry
    /// their updated delivery count.
    async fn claim_stuck(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
    ) -> Result<Vec<Message>>;

    /// Peek at the first entry on the stream without a consumer group.
    /// Inspection only: nothing is marked delivered and the returned
    /// message carries a delivery count of 0.
    async fn read_one(&self, stream: &str) -> Result<Option<Message>>;

    /// Remove the entry from the group's pending set. Returns
    /// [`Error::AckMismatch`](crate::Error::AckMismatch) when the store
    /// reports anything other than exactly one entry acknowledged.
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()>;

    /// Pending-entries summary for the group.
    async fn pending(&self, stream: &str, group: &str) -> Result<PendingSummary>;

    /// Drop all entries from the stream, for every reader. Administrative /
    /// test-only. Returns the number of entries removed.
    async fn truncate(&self, stream: &str) -> Result<u64>;
}
