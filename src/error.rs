use thiserror::Error;

/// Result type for rivulet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the store client and the delivery engine.
///
/// Listener handler failures are deliberately *not* part of this enum: they
/// are reported through the configured failure callback at the dispatch
/// boundary and never abort a poll cycle.
#[derive(Error, Debug)]
pub enum Error {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store reported something other than exactly one entry
    /// acknowledged. The core's view and the store's view of the pending
    /// set have diverged; this must never be silently swallowed.
    #[error("message {id} could not be acknowledged on {stream} ({group}): store reported {count}")]
    AckMismatch {
        stream: String,
        group: String,
        id: String,
        count: i64,
    },

    #[error("no such consumer group {group} on stream {stream}")]
    NoSuchGroup { stream: String, group: String },
}
