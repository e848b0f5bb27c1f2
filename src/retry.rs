// ============================================================================
// Retry / dead-letter policy
// ============================================================================
//
// There is no separate retry timer: the scheduler's claim-stuck pass drives
// redelivery, and this module only decides when redelivery ends. A message
// whose delivery count exceeds the retry budget is republished to the
// dead-letter stream with its failure metadata and then acknowledged on the
// original group. Publish first, ack second, so a failed DLQ write leaves
// the original message pending instead of dropping it.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::error::Result;
use crate::message::Message;
use crate::store::LogStore;

/// A message quarantined after exhausting its retry budget, as published to
/// the dead-letter stream (under the original event name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    /// Logical stream the message was consumed from
    pub stream: String,
    /// Logical group that failed to process it
    pub group: String,
    /// Store-assigned id on the original stream
    pub message_id: String,
    pub event: String,
    pub payload: Value,
    /// Deliveries attempted before quarantine
    pub delivery_count: u64,
    /// Last handler error
    pub failure_reason: String,
    /// Unix timestamp of the quarantine
    pub dead_lettered_at: i64,
}

/// Whether a failed delivery has spent its retry budget. The first
/// delivery counts as 1, so a message gets exactly `max_retries`
/// reclaim-driven redeliveries before this trips.
pub(crate) fn retries_exhausted(config: &Config, message: &Message) -> bool {
    message.delivery_count > u64::from(config.max_retries)
}

/// Publish the message to the dead-letter stream, then acknowledge it on
/// its original group. Terminal: a dead-lettered message is never
/// reclaimed again.
pub(crate) async fn dead_letter<S>(
    store: &S,
    config: &Config,
    stream: &str,
    message: &Message,
    failure_reason: &str,
) -> Result<String>
where
    S: LogStore + ?Sized,
{
    let dead = DeadLetterMessage {
        stream: stream.to_string(),
        group: config.group_name.clone(),
        message_id: message.id.clone(),
        event: message.event.clone(),
        payload: message.payload.clone(),
        delivery_count: message.delivery_count,
        failure_reason: failure_reason.to_string(),
        dead_lettered_at: chrono::Utc::now().timestamp(),
    };
    let payload = serde_json::to_value(&dead)?;

    let dlq_id = store.publish(&config.dlq_stream, &message.event, &payload).await?;
    store.ack(stream, &config.group_name, &message.id).await?;

    warn!(
        stream = %stream,
        message_id = %message.id,
        dlq_stream = %config.dlq_stream,
        dlq_id = %dlq_id,
        delivery_count = message.delivery_count,
        reason = failure_reason,
        "message dead-lettered after exhausting retries"
    );
    Ok(dlq_id)
}
