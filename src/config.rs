// ============================================================================
// Configuration
// ============================================================================
//
// Frozen configuration value object for the delivery engine. Assembled once
// at startup (from the environment or a struct literal), shared as
// `Arc<Config>`, never mutated afterwards.
//
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::message::Message;

pub const DEFAULT_GROUP_NAME: &str = "rivulet";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MIN_IDLE_TIME_MS: u64 = 600_000;
pub const DEFAULT_DEAD_CONSUMER_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_DLQ_STREAM: &str = "dlq";
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Callback invoked once per failing listener with the message and the
/// handler error. Runs inside the poll loop; a callback that panics aborts
/// the worker, so it must not panic.
pub type FailureHandler = Arc<dyn Fn(&Message, &anyhow::Error) + Send + Sync>;

/// Configuration for the store client and the listener pool.
#[derive(Clone)]
pub struct Config {
    /// Store connection address
    pub redis_url: String,

    /// Logical consumer-group name; the store-level group is always
    /// `<stream>-<group_name>`
    pub group_name: String,

    /// Optional stream-name suffix for environment isolation
    /// (stream `orders` with suffix `staging` becomes `orders-staging`)
    pub suffix: Option<String>,

    /// Number of poll workers spawned by `ListenerPool::start`
    pub workers: usize,

    /// Sleep between poll cycles, in milliseconds
    pub poll_interval_ms: u64,

    /// Idle time after which a pending entry becomes eligible for reclaim
    pub min_idle_time_ms: u64,

    /// Window within which a consumer is presumed alive: an entry delivered
    /// more recently than this is never stolen, even if a racing claim
    /// already selected it
    pub dead_consumer_timeout_ms: u64,

    /// Stream that quarantines messages which exhausted their retry budget
    pub dlq_stream: String,

    /// Failed deliveries allowed beyond the first before dead-lettering
    pub max_retries: u32,

    /// Invoked for every failing listener on every failed delivery
    pub on_failure: FailureHandler,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),

            group_name: std::env::var("GROUP_NAME")
                .unwrap_or_else(|_| DEFAULT_GROUP_NAME.to_string()),

            suffix: std::env::var("STREAM_SUFFIX").ok().filter(|s| !s.is_empty()),

            workers: std::env::var("WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WORKERS),

            poll_interval_ms: std::env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),

            min_idle_time_ms: std::env::var("MIN_IDLE_TIME_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MIN_IDLE_TIME_MS),

            dead_consumer_timeout_ms: std::env::var("DEAD_CONSUMER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DEAD_CONSUMER_TIMEOUT_MS),

            dlq_stream: std::env::var("DLQ_STREAM")
                .unwrap_or_else(|_| DEFAULT_DLQ_STREAM.to_string()),

            max_retries: std::env::var("MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),

            on_failure: default_failure_handler(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            group_name: DEFAULT_GROUP_NAME.to_string(),
            suffix: None,
            workers: DEFAULT_WORKERS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            min_idle_time_ms: DEFAULT_MIN_IDLE_TIME_MS,
            dead_consumer_timeout_ms: DEFAULT_DEAD_CONSUMER_TIMEOUT_MS,
            dlq_stream: DEFAULT_DLQ_STREAM.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            on_failure: default_failure_handler(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &self.redis_url)
            .field("group_name", &self.group_name)
            .field("suffix", &self.suffix)
            .field("workers", &self.workers)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("min_idle_time_ms", &self.min_idle_time_ms)
            .field("dead_consumer_timeout_ms", &self.dead_consumer_timeout_ms)
            .field("dlq_stream", &self.dlq_stream)
            .field("max_retries", &self.max_retries)
            .field("on_failure", &"<callback>")
            .finish()
    }
}

/// Default failure callback: logs the message id, event and error.
pub fn default_failure_handler() -> FailureHandler {
    Arc::new(|message, err| {
        error!(
            message_id = %message.id,
            event = %message.event,
            delivery_count = message.delivery_count,
            error = %err,
            "listener failed to process message"
        );
    })
}
