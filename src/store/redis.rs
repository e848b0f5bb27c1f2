// ============================================================================
// Redis Streams store
// ============================================================================
//
// Production `LogStore` implementation over Redis Streams (XADD, XREADGROUP,
// XPENDING, XCLAIM, XACK). Stream keys are the logical name plus the
// configured suffix; group keys are always `<stream_key>-<group>`.
//
// Reclaim is a two-step XPENDING + XCLAIM: the extended XPENDING form
// selects entries idle beyond the caller's threshold (and carries the
// per-entry delivery count), then XCLAIM reassigns them with the
// dead-consumer timeout as its atomic min-idle recheck, so an entry a live
// consumer touched in the meantime is skipped rather than stolen.
//
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamClaimReply, StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::{cmd, AsyncCommands, ErrorKind, RedisResult, Value};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::store::{LogStore, PendingSummary};

/// Max entries returned by one group read
const READ_COUNT: usize = 10;

/// Max pending entries inspected per reclaim attempt
const CLAIM_COUNT: usize = 10;

/// `LogStore` over Redis Streams.
///
/// Cheap to clone; all clones share one multiplexed connection with
/// automatic reconnection.
#[derive(Clone)]
pub struct RedisStreamStore {
    conn: ConnectionManager,
    config: Arc<Config>,
}

impl RedisStreamStore {
    /// Connect to the Redis instance named by `config.redis_url`.
    pub async fn connect(config: Arc<Config>) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, config })
    }

    /// Logical stream name to Redis key, applying the configured suffix.
    fn stream_key(&self, stream: &str) -> String {
        normalize_stream(stream, self.config.suffix.as_deref())
    }

    fn group_key(stream_key: &str, group: &str) -> String {
        format!("{stream_key}-{group}")
    }

    /// Decode one stream entry into a `Message`. Returns `None` for
    /// tombstones: entries whose data was trimmed away but whose pending
    /// record survived.
    fn decode_entry(entry: &StreamId, delivery_count: u64) -> Option<Message> {
        let (event, value) = entry.map.iter().next()?;

        let payload = match value {
            Value::BulkString(bytes) => serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Json::String(String::from_utf8_lossy(bytes).into_owned())),
            Value::SimpleString(s) => serde_json::from_str(s)
                .unwrap_or_else(|_| Json::String(s.clone())),
            Value::Int(i) => Json::from(*i),
            _ => return None,
        };

        Some(Message {
            id: entry.id.clone(),
            event: event.clone(),
            payload,
            delivery_count,
        })
    }
}

/// Apply the optional environment suffix to a logical stream name.
pub(crate) fn normalize_stream(stream: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{stream}-{suffix}"),
        None => stream.to_string(),
    }
}

#[async_trait]
impl LogStore for RedisStreamStore {
    async fn group_exists(&self, stream: &str, group: &str) -> Result<bool> {
        let key = self.stream_key(stream);
        let group_key = Self::group_key(&key, group);
        let mut conn = self.conn.clone();

        let reply: RedisResult<redis::streams::StreamInfoGroupsReply> =
            conn.xinfo_groups(&key).await;

        match reply {
            Ok(info) => Ok(info.groups.iter().any(|g| g.name == group_key)),
            // "ERR no such key" when the stream was never created; the
            // contract is false, not an error.
            Err(err) if err.kind() == ErrorKind::ResponseError => {
                info!(stream = %key, error = %err, "group lookup failed, treating group as absent");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<()> {
        let key = self.stream_key(stream);
        let group_key = Self::group_key(&key, group);
        let mut conn = self.conn.clone();

        // "$": the group only sees entries appended after creation
        let _: () = conn.xgroup_create_mkstream(&key, &group_key, "$").await?;
        debug!(stream = %key, group = %group_key, "created consumer group");
        Ok(())
    }

    async fn delete_group(&self, stream: &str, group: &str) -> Result<()> {
        let key = self.stream_key(stream);
        let group_key = Self::group_key(&key, group);
        let mut conn = self.conn.clone();

        let _: i64 = conn.xgroup_destroy(&key, &group_key).await?;
        debug!(stream = %key, group = %group_key, "destroyed consumer group");
        Ok(())
    }

    async fn publish(&self, stream: &str, event: &str, payload: &Json) -> Result<String> {
        let key = self.stream_key(stream);
        let data = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();

        let id: String = conn.xadd(&key, "*", &[(event, data.as_str())]).await?;
        debug!(stream = %key, event = %event, id = %id, "published event");
        Ok(id)
    }

    async fn read_next(&self, stream: &str, group: &str, consumer: &str) -> Result<Vec<Message>> {
        let key = self.stream_key(stream);
        let group_key = Self::group_key(&key, group);
        let mut conn = self.conn.clone();

        let opts = StreamReadOptions::default()
            .group(&group_key, consumer)
            .count(READ_COUNT);
        let reply: StreamReadReply = conn.xread_options(&[key.as_str()], &[">"], &opts).await?;

        let mut messages = Vec::new();
        for stream_reply in reply.keys {
            for entry in &stream_reply.ids {
                // fresh group reads are always delivery 1
                match Self::decode_entry(entry, 1) {
                    Some(message) => messages.push(message),
                    None => warn!(stream = %key, id = %entry.id, "skipping undecodable entry"),
                }
            }
        }
        Ok(messages)
    }

    async fn claim_stuck(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
    ) -> Result<Vec<Message>> {
        let key = self.stream_key(stream);
        let group_key = Self::group_key(&key, group);
        let mut conn = self.conn.clone();

        // (id, consumer, idle ms, times delivered)
        let pending: Vec<(String, String, u64, u64)> = cmd("XPENDING")
            .arg(&key)
            .arg(&group_key)
            .arg("-")
            .arg("+")
            .arg(CLAIM_COUNT)
            .query_async(&mut conn)
            .await?;

        let min_idle_ms = min_idle.as_millis() as u64;
        let mut deliveries: HashMap<String, u64> = HashMap::new();
        let mut stuck: Vec<String> = Vec::new();
        for (id, _, idle, times) in pending {
            if idle >= min_idle_ms {
                deliveries.insert(id.clone(), times);
                stuck.push(id);
            }
        }
        if stuck.is_empty() {
            return Ok(Vec::new());
        }

        let reply: StreamClaimReply = conn
            .xclaim(
                &key,
                &group_key,
                consumer,
                self.config.dead_consumer_timeout_ms,
                &stuck,
            )
            .await?;

        let mut messages = Vec::new();
        for entry in &reply.ids {
            let count = deliveries.get(&entry.id).copied().unwrap_or(0) + 1;
            match Self::decode_entry(entry, count) {
                Some(message) => messages.push(message),
                None => {
                    // data trimmed away while the entry sat pending; ack it
                    // so it stops resurfacing in future claim cycles
                    warn!(stream = %key, id = %entry.id, "acking tombstone entry with no data");
                    if let Err(err) = self.ack(stream, group, &entry.id).await {
                        // another consumer acked the same tombstone first
                        debug!(stream = %key, id = %entry.id, error = %err, "tombstone ack skipped");
                    }
                }
            }
        }
        if !messages.is_empty() {
            debug!(
                stream = %key,
                group = %group_key,
                consumer = %consumer,
                claimed = messages.len(),
                "reclaimed stuck messages"
            );
        }
        Ok(messages)
    }

    async fn read_one(&self, stream: &str) -> Result<Option<Message>> {
        let key = self.stream_key(stream);
        let mut conn = self.conn.clone();

        let opts = StreamReadOptions::default().count(1);
        let reply: StreamReadReply = conn.xread_options(&[key.as_str()], &["0"], &opts).await?;

        Ok(reply
            .keys
            .first()
            .and_then(|stream_reply| stream_reply.ids.first())
            .and_then(|entry| Self::decode_entry(entry, 0)))
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let key = self.stream_key(stream);
        let group_key = Self::group_key(&key, group);
        let mut conn = self.conn.clone();

        let count: i64 = conn.xack(&key, &group_key, &[id]).await?;
        if count != 1 {
            return Err(Error::AckMismatch {
                stream: key,
                group: group_key,
                id: id.to_string(),
                count,
            });
        }
        debug!(stream = %key, group = %group_key, id = %id, "acknowledged message");
        Ok(())
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<PendingSummary> {
        let key = self.stream_key(stream);
        let group_key = Self::group_key(&key, group);
        let mut conn = self.conn.clone();

        // summary form: (count, min id, max id, [[consumer, count], ...])
        let reply: (u64, Option<String>, Option<String>, Option<Vec<(String, String)>>) =
            cmd("XPENDING")
                .arg(&key)
                .arg(&group_key)
                .query_async(&mut conn)
                .await?;

        Ok(PendingSummary {
            size: reply.0,
            min_id: reply.1,
            max_id: reply.2,
            consumers: reply
                .3
                .unwrap_or_default()
                .into_iter()
                .map(|(name, count)| (name, count.parse().unwrap_or(0)))
                .collect(),
        })
    }

    async fn truncate(&self, stream: &str) -> Result<u64> {
        let key = self.stream_key(stream);
        let mut conn = self.conn.clone();

        let removed: i64 = conn.xtrim(&key, StreamMaxlen::Equals(0)).await?;
        debug!(stream = %key, removed = removed, "truncated stream");
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_key_applies_suffix() {
        assert_eq!(normalize_stream("orders", None), "orders");
        assert_eq!(normalize_stream("orders", Some("staging")), "orders-staging");
    }

    #[test]
    fn group_key_is_derived_from_stream() {
        let key = normalize_stream("orders", Some("prod"));
        assert_eq!(
            RedisStreamStore::group_key(&key, "billing"),
            "orders-prod-billing"
        );
    }
}
