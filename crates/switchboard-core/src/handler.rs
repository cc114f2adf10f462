//! Handler system for the Switchboard dispatch engine.
//!
//! User callbacks are plain async closures taking the routed [`Update`].
//! They are stored type-erased as [`BoxedHandler`] so that pattern, callback
//! and request registries can hold handlers of different concrete types.
//!
//! ```rust,ignore
//! engine.add_callback_handler("vote:yes", |update: Update| async move {
//!     tracing::info!(update_id = update.update_id, "yes vote");
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::update::Update;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ============================================================================
// Handler Trait
// ============================================================================

/// An async callback invoked with a routed update.
///
/// Implemented for every `Fn(Update) -> impl Future<Output = ()>` closure that
/// is `Clone + Send + Sync + 'static`.
pub trait Handler: Clone + Send + Sync + 'static {
    /// The type of future calling this handler returns.
    type Future: Future<Output = ()> + Send + 'static;

    /// Call the handler with the given update.
    fn call(self, update: Update) -> Self::Future;
}

impl<F, Fut> Handler for F
where
    F: Fn(Update) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    type Future = Fut;

    fn call(self, update: Update) -> Self::Future {
        self(update)
    }
}

// ============================================================================
// Type erasure
// ============================================================================

/// Type-erased handler trait for dynamic dispatch.
pub trait ErasedHandler: Send + Sync {
    /// Execute the handler with the given update.
    fn call(&self, update: Update) -> BoxFuture<'static, ()>;
}

/// A type-erased handler that can be stored in registries.
pub type BoxedHandler = Arc<dyn ErasedHandler>;

/// Wraps a [`Handler`] so it can be stored behind [`ErasedHandler`].
#[derive(Clone)]
pub struct HandlerFn<H> {
    handler: H,
}

impl<H: Handler> ErasedHandler for HandlerFn<H> {
    fn call(&self, update: Update) -> BoxFuture<'static, ()> {
        let handler = self.handler.clone();
        Box::pin(handler.call(update))
    }
}

/// Convert a handler function into a boxed handler.
pub fn into_handler<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(HandlerFn { handler })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_type::ChatType;
    use crate::update::{Chat, Message, UpdateKind};
    use std::sync::atomic::{AtomicI64, Ordering};

    fn text_update(update_id: i64) -> Update {
        Update::new(
            update_id,
            UpdateKind::Message(Message {
                message_id: 1,
                from: None,
                date: 0,
                chat: Chat {
                    id: 1,
                    chat_type: ChatType::Private,
                    title: None,
                    username: None,
                },
                text: Some("hi".into()),
                caption: None,
                user_shared: None,
                chat_shared: None,
            }),
        )
    }

    #[test]
    fn test_erased_handler_receives_update() {
        let seen = Arc::new(AtomicI64::new(0));
        let seen_clone = Arc::clone(&seen);

        let handler = into_handler(move |update: Update| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.store(update.update_id, Ordering::SeqCst);
            }
        });

        tokio_test::block_on(handler.call(text_update(99)));
        assert_eq!(seen.load(Ordering::SeqCst), 99);
    }
}
