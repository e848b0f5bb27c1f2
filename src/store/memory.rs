//! In-process `LogStore` for tests and local development.
//!
//! Models the store contract faithfully enough to drive the delivery
//! engine end to end: per-group cursors, pending-entry ownership,
//! idle-based reclaim and delivery counting, without a Redis instance.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value as Json;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::store::{LogStore, PendingSummary};

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    event: String,
    payload: Json,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Index into `StreamState::entries` of the next never-delivered entry
    cursor: usize,
    pending: HashMap<String, PendingEntry>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: Vec<Entry>,
    next_seq: u64,
    groups: HashMap<String, GroupState>,
}

/// In-memory `LogStore`. Group names follow the same `<stream>-<group>`
/// derivation as the Redis store; stream names are used as-is.
#[derive(Debug, Default)]
pub struct MemoryStore {
    streams: RwLock<HashMap<String, StreamState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn group_key(stream: &str, group: &str) -> String {
        format!("{stream}-{group}")
    }

    fn seq_of(id: &str) -> u64 {
        id.split('-').next().and_then(|s| s.parse().ok()).unwrap_or(0)
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn group_exists(&self, stream: &str, group: &str) -> Result<bool> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream)
            .is_some_and(|s| s.groups.contains_key(&Self::group_key(stream, group))))
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream.to_string()).or_default();
        let cursor = state.entries.len(); // only entries appended from now on
        state
            .groups
            .entry(Self::group_key(stream, group))
            .or_insert_with(|| GroupState {
                cursor,
                pending: HashMap::new(),
            });
        Ok(())
    }

    async fn delete_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut streams = self.streams.write().await;
        if let Some(state) = streams.get_mut(stream) {
            state.groups.remove(&Self::group_key(stream, group));
        }
        Ok(())
    }

    async fn publish(&self, stream: &str, event: &str, payload: &Json) -> Result<String> {
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream.to_string()).or_default();
        state.next_seq += 1;
        let id = format!("{}-0", state.next_seq);
        state.entries.push(Entry {
            id: id.clone(),
            event: event.to_string(),
            payload: payload.clone(),
        });
        Ok(id)
    }

    async fn read_next(&self, stream: &str, group: &str, consumer: &str) -> Result<Vec<Message>> {
        let mut streams = self.streams.write().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| Error::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let group_key = Self::group_key(stream, group);
        // split borrows: entries are read, the group is mutated
        let StreamState { entries, groups, .. } = &mut *state;
        let group_state = groups
            .get_mut(&group_key)
            .ok_or_else(|| Error::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let mut messages = Vec::new();
        for entry in &entries[group_state.cursor.min(entries.len())..] {
            group_state.pending.insert(
                entry.id.clone(),
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at: Instant::now(),
                    delivery_count: 1,
                },
            );
            messages.push(Message::new(
                entry.id.clone(),
                entry.event.clone(),
                entry.payload.clone(),
            ));
        }
        group_state.cursor = entries.len();
        Ok(messages)
    }

    async fn claim_stuck(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
    ) -> Result<Vec<Message>> {
        let mut streams = self.streams.write().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| Error::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let group_key = Self::group_key(stream, group);
        let StreamState { entries, groups, .. } = &mut *state;
        let group_state = groups
            .get_mut(&group_key)
            .ok_or_else(|| Error::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let mut claimed: Vec<Message> = Vec::new();
        for (id, pending) in group_state.pending.iter_mut() {
            if pending.delivered_at.elapsed() < min_idle {
                continue;
            }
            let Some(entry) = entries.iter().find(|e| &e.id == id) else {
                continue;
            };
            pending.consumer = consumer.to_string();
            pending.delivered_at = Instant::now();
            pending.delivery_count += 1;
            claimed.push(Message {
                id: entry.id.clone(),
                event: entry.event.clone(),
                payload: entry.payload.clone(),
                delivery_count: pending.delivery_count,
            });
        }
        claimed.sort_by_key(|m| Self::seq_of(&m.id));
        Ok(claimed)
    }

    async fn read_one(&self, stream: &str) -> Result<Option<Message>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream)
            .and_then(|s| s.entries.first())
            .map(|entry| Message {
                id: entry.id.clone(),
                event: entry.event.clone(),
                payload: entry.payload.clone(),
                delivery_count: 0,
            }))
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<()> {
        let mut streams = self.streams.write().await;
        let group_key = Self::group_key(stream, group);
        let removed = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(&group_key))
            .and_then(|g| g.pending.remove(id));

        if removed.is_none() {
            return Err(Error::AckMismatch {
                stream: stream.to_string(),
                group: group_key,
                id: id.to_string(),
                count: 0,
            });
        }
        Ok(())
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<PendingSummary> {
        let streams = self.streams.read().await;
        let group_key = Self::group_key(stream, group);
        let group_state = streams
            .get(stream)
            .and_then(|s| s.groups.get(&group_key))
            .ok_or_else(|| Error::NoSuchGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let mut consumers: HashMap<String, u64> = HashMap::new();
        for entry in group_state.pending.values() {
            *consumers.entry(entry.consumer.clone()).or_default() += 1;
        }

        Ok(PendingSummary {
            size: group_state.pending.len() as u64,
            min_id: group_state
                .pending
                .keys()
                .min_by_key(|id| Self::seq_of(id))
                .cloned(),
            max_id: group_state
                .pending
                .keys()
                .max_by_key(|id| Self::seq_of(id))
                .cloned(),
            consumers,
        })
    }

    async fn truncate(&self, stream: &str) -> Result<u64> {
        let mut streams = self.streams.write().await;
        let Some(state) = streams.get_mut(stream) else {
            return Ok(0);
        };
        let removed = state.entries.len() as u64;
        state.entries.clear();
        for group in state.groups.values_mut() {
            group.cursor = 0;
            group.pending.clear();
        }
        Ok(removed)
    }
}
