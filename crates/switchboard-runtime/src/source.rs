//! Update sources.
//!
//! An [`UpdateSource`] is the ingestion boundary: a long-poll loop, a webhook
//! receiver, or a test fixture that yields decoded [`Update`]s. The runtime
//! pulls from it and reports back the highest update id it has dispatched, so
//! sources that track an acknowledgement offset can advance it.
//!
//! ```rust,ignore
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! tokio::spawn(webhook_server(tx));
//! runtime.run_source(rx).await?;
//! ```

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use switchboard_core::Update;

use crate::error::RuntimeResult;

/// A producer of inbound updates.
#[async_trait]
pub trait UpdateSource: Send {
    /// Waits for the next update; `Ok(None)` means the source is exhausted.
    async fn next_update(&mut self) -> RuntimeResult<Option<Update>>;

    /// Called after `update_id` was dispatched. Long-poll sources use it to
    /// request only newer updates (`offset = update_id + 1`).
    fn acknowledge(&mut self, _update_id: i64) {}
}

#[async_trait]
impl<S: UpdateSource + ?Sized> UpdateSource for &mut S {
    async fn next_update(&mut self) -> RuntimeResult<Option<Update>> {
        (**self).next_update().await
    }

    fn acknowledge(&mut self, update_id: i64) {
        (**self).acknowledge(update_id);
    }
}

#[async_trait]
impl UpdateSource for mpsc::Receiver<Update> {
    async fn next_update(&mut self) -> RuntimeResult<Option<Update>> {
        Ok(self.recv().await)
    }
}

#[async_trait]
impl UpdateSource for mpsc::UnboundedReceiver<Update> {
    async fn next_update(&mut self) -> RuntimeResult<Option<Update>> {
        Ok(self.recv().await)
    }
}

/// Adapts any `Stream` of updates into an [`UpdateSource`].
#[derive(Debug)]
pub struct StreamSource<S> {
    stream: S,
}

impl<S> StreamSource<S>
where
    S: Stream<Item = Update> + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> UpdateSource for StreamSource<S>
where
    S: Stream<Item = Update> + Unpin + Send,
{
    async fn next_update(&mut self) -> RuntimeResult<Option<Update>> {
        Ok(self.stream.next().await)
    }
}
