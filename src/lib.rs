//! # Rivulet
//!
//! Durable publish/subscribe over Redis Streams (or any ordered,
//! consumer-group-capable log). Producers append events to named streams;
//! registered listeners receive each event at-least-once, across process
//! restarts and worker crashes.
//!
//! ## Delivery model
//!
//! - Every listener bound to a stream gets every message (fan-out).
//! - Message order is the append order within one stream; there is no
//!   ordering across streams, and reclaimed messages may arrive out of
//!   order relative to fresh ones.
//! - A failed delivery leaves the message pending; after the idle
//!   threshold it is reclaimed and *all* listeners run again, so handlers
//!   must be idempotent. Once the retry budget is spent the message is
//!   quarantined to the dead-letter stream.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rivulet::{Config, Listener, ListenerPool, ListenerRegistry, Message, RedisStreamStore};
//!
//! struct OrderListener;
//!
//! #[async_trait::async_trait]
//! impl Listener for OrderListener {
//!     fn stream(&self) -> &str {
//!         "orders"
//!     }
//!
//!     async fn handle_event(&self, message: &Message) -> anyhow::Result<()> {
//!         println!("{}: {}", message.event, message.payload);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::from_env());
//!     let store = Arc::new(RedisStreamStore::connect(config.clone()).await?);
//!
//!     let mut registry = ListenerRegistry::new();
//!     registry.register(Arc::new(OrderListener));
//!
//!     let handle = ListenerPool::new(config, store, registry).start();
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod message;
pub mod pool;
pub mod publisher;
pub mod registry;
pub mod retry;
pub mod store;

pub use config::{Config, FailureHandler};
pub use error::{Error, Result};
pub use listener::Listener;
pub use message::Message;
pub use pool::{ListenerPool, PoolHandle};
pub use publisher::Publisher;
pub use registry::{Bindings, ListenerRegistry};
pub use retry::DeadLetterMessage;
pub use store::{LogStore, MemoryStore, PendingSummary, RedisStreamStore};
