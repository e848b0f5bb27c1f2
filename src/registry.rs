use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::listener::Listener;
use crate::store::LogStore;

/// Stream name to the listeners bound to it. Ordered map so iteration
/// order is stable within a process run.
pub type Bindings = BTreeMap<String, Vec<Arc<dyn Listener>>>;

/// Registry of all listeners in the application.
///
/// Listeners register explicitly at startup; there is no runtime discovery.
/// Built once, then handed to the pool and treated as immutable.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a listener binding. Multiple listeners may bind the same
    /// stream; invocation order follows registration order.
    pub fn register(&mut self, listener: Arc<dyn Listener>) {
        debug!(stream = %listener.stream(), "registered listener");
        self.listeners.push(listener);
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Snapshot of the stream-to-listeners map, ensuring the consumer group
    /// exists for every distinct stream. Safe to call every poll cycle:
    /// re-creation is skipped via `group_exists`.
    pub async fn current_bindings<S>(&self, store: &S, group: &str) -> Result<Bindings>
    where
        S: LogStore + ?Sized,
    {
        let mut bindings = Bindings::new();
        for listener in &self.listeners {
            let stream = listener.stream();
            if !bindings.contains_key(stream) {
                self.ensure_group(store, stream, group).await?;
            }
            bindings
                .entry(stream.to_string())
                .or_default()
                .push(Arc::clone(listener));
        }
        Ok(bindings)
    }

    async fn ensure_group<S>(&self, store: &S, stream: &str, group: &str) -> Result<()>
    where
        S: LogStore + ?Sized,
    {
        if !store.group_exists(stream, group).await? {
            info!(stream = %stream, group = %group, "creating consumer group");
            store.create_group(stream, group).await?;
        }
        Ok(())
    }
}
