// ============================================================================
// Listener pool
// ============================================================================
//
// The central control loop. Each worker repeatedly snapshots the registry,
// and for every stream with listeners: reclaims stuck messages first,
// falls back to reading new ones, and dispatches each message to every
// listener bound to the stream. Success acknowledges the message for the
// group; failure leaves it pending so the next claim cycle redelivers it,
// until the retry budget is spent and it moves to the dead-letter stream.
//
// Claim-before-read is a priority policy: recovering work abandoned by a
// dead consumer bounds the staleness of stuck messages even when fresh
// messages keep arriving.
//
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::listener::Listener;
use crate::message::Message;
use crate::registry::ListenerRegistry;
use crate::retry;
use crate::store::LogStore;

/// Polling scheduler that delivers stream messages to registered listeners.
///
/// One pool runs `config.workers` sequential poll loops, each under its own
/// consumer identity. Concurrency across processes is mediated entirely by
/// the store's per-group pending-entry ownership.
pub struct ListenerPool<S> {
    config: Arc<Config>,
    store: Arc<S>,
    registry: Arc<ListenerRegistry>,
    consumer: String,
}

impl<S> Clone for ListenerPool<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            consumer: self.consumer.clone(),
        }
    }
}

/// Handle to a started pool. Dropping it does not stop the workers;
/// call [`PoolHandle::stop`].
pub struct PoolHandle {
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl PoolHandle {
    /// Signal shutdown and wait for every worker to finish its current
    /// cycle. Honored between cycles only: an in-flight dispatch always
    /// completes (ack or leave-pending) before the worker exits.
    pub async fn stop(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

impl<S: LogStore> ListenerPool<S> {
    pub fn new(config: Arc<Config>, store: Arc<S>, registry: ListenerRegistry) -> Self {
        Self {
            config,
            store,
            registry: Arc::new(registry),
            consumer: consumer_name(0),
        }
    }

    /// Consumer identity this pool polls under.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Spawn the poll workers and return a handle for shutdown.
    pub fn start(self) -> PoolHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let count = self.config.workers.max(1);
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let mut pool = self.clone();
            pool.consumer = consumer_name(index);
            workers.push(tokio::spawn(pool.run(Arc::clone(&shutdown))));
        }
        info!(workers = count, "listener pool started");

        PoolHandle { shutdown, workers }
    }

    async fn run(self, shutdown: Arc<AtomicBool>) {
        info!(consumer = %self.consumer, "poll worker started");

        while !shutdown.load(Ordering::SeqCst) {
            match self.poll().await {
                Ok(()) => {}
                Err(err @ Error::AckMismatch { .. }) => {
                    // the core's view and the store's have diverged;
                    // continuing would risk double-processing silently
                    error!(consumer = %self.consumer, error = %err, "unrecoverable ack divergence, stopping worker");
                    break;
                }
                Err(err) => {
                    error!(consumer = %self.consumer, error = %err, "poll cycle failed");
                }
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }

        info!(consumer = %self.consumer, "poll worker stopped");
    }

    /// Run exactly one poll cycle over every stream with listeners.
    /// Public so tests and embedding applications can drive cycles
    /// without the background loop.
    pub async fn poll(&self) -> Result<()> {
        let bindings = self
            .registry
            .current_bindings(self.store.as_ref(), &self.config.group_name)
            .await?;

        for (stream, listeners) in bindings {
            self.poll_stream(&stream, &listeners).await?;
        }
        Ok(())
    }

    async fn poll_stream(&self, stream: &str, listeners: &[Arc<dyn Listener>]) -> Result<()> {
        let group = &self.config.group_name;

        // provisioning race guard
        if !self.store.group_exists(stream, group).await? {
            return Ok(());
        }

        let min_idle = Duration::from_millis(self.config.min_idle_time_ms);
        let mut messages = self
            .store
            .claim_stuck(stream, group, &self.consumer, min_idle)
            .await?;
        if messages.is_empty() {
            messages = self.store.read_next(stream, group, &self.consumer).await?;
        }
        if messages.is_empty() {
            return Ok(());
        }

        debug!(stream = %stream, count = messages.len(), "dispatching messages");
        for message in &messages {
            self.deliver(stream, message, listeners).await?;
        }
        Ok(())
    }

    /// Dispatch one message to every listener on the stream.
    ///
    /// Any listener failure leaves the message pending (all listeners run
    /// again on redelivery, so handlers must be idempotent); once the
    /// retry budget is spent the message moves to the dead-letter stream.
    /// Only ack divergence and a failed dead-letter write propagate.
    async fn deliver(
        &self,
        stream: &str,
        message: &Message,
        listeners: &[Arc<dyn Listener>],
    ) -> Result<()> {
        let mut last_failure: Option<anyhow::Error> = None;

        for listener in listeners {
            if let Err(err) = listener.handle_event(message).await {
                warn!(
                    stream = %stream,
                    message_id = %message.id,
                    delivery_count = message.delivery_count,
                    error = %err,
                    "listener failed"
                );
                (self.config.on_failure)(message, &err);
                last_failure = Some(err);
            }
        }

        match last_failure {
            None => {
                self.store
                    .ack(stream, &self.config.group_name, &message.id)
                    .await
            }
            Some(err) if retry::retries_exhausted(&self.config, message) => {
                retry::dead_letter(
                    self.store.as_ref(),
                    &self.config,
                    stream,
                    message,
                    &err.to_string(),
                )
                .await?;
                Ok(())
            }
            Some(_) => {
                // left pending; the claim-stuck pass is the retry driver
                debug!(
                    stream = %stream,
                    message_id = %message.id,
                    delivery_count = message.delivery_count,
                    "message left pending for redelivery"
                );
                Ok(())
            }
        }
    }
}

/// `<hostname>-<pid>-<worker>`: ephemeral, re-derived every process start.
/// Reclaim depends only on idle time, so no identity continuity is needed
/// across restarts; the pid keeps two pools on one host apart.
fn consumer_name(worker: usize) -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{}-{}-{}", host, std::process::id(), worker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_names_are_distinct_per_worker() {
        let a = consumer_name(0);
        let b = consumer_name(1);
        assert_ne!(a, b);
        assert!(a.ends_with("-0"));
        assert!(b.ends_with("-1"));
    }
}
