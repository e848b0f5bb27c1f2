use async_trait::async_trait;

use crate::message::Message;

/// A handler bound to one stream.
///
/// Every listener registered for a stream is invoked for every message on
/// it (fan-out, not partitioning). Delivery is at-least-once and a retry
/// re-invokes *all* listeners on the stream, including ones that already
/// succeeded, so handlers must be idempotent.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Logical name of the stream this listener consumes.
    fn stream(&self) -> &str;

    /// Handle one message. Returning an error leaves the message pending;
    /// it will be redelivered after the idle threshold elapses and
    /// eventually dead-lettered once the retry budget is spent.
    async fn handle_event(&self, message: &Message) -> anyhow::Result<()>;
}
