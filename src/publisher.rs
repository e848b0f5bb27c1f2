use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::store::LogStore;

/// Producer-side handle bound to one stream.
///
/// Thin convenience over [`LogStore::publish`]; listeners on the stream
/// receive the event at-least-once.
pub struct Publisher<S: ?Sized> {
    store: Arc<S>,
    stream: String,
}

impl<S: LogStore + ?Sized> Publisher<S> {
    pub fn new(store: Arc<S>, stream: impl Into<String>) -> Self {
        Self {
            store,
            stream: stream.into(),
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Append an event, returning the store-assigned message id.
    pub async fn publish(&self, event: &str, payload: &Value) -> Result<String> {
        let id = self.store.publish(&self.stream, event, payload).await?;
        debug!(stream = %self.stream, event = %event, id = %id, "event published");
        Ok(id)
    }
}
