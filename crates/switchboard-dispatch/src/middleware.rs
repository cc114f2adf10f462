//! Chain-of-responsibility middleware.
//!
//! Every update passes through the [`MiddlewareChain`] before terminal
//! routing. A link receives the update by value, may inspect or mutate it, and
//! continues the chain by calling [`Next::run`]. A link that returns without
//! calling `next` stops propagation; there is no other cancellation signal.
//!
//! Links are prepended: the most recently added link runs first. The
//! dispatcher installs its own routing logic as the very first link at
//! construction, so every middleware added afterwards runs before it.
//!
//! ```rust,ignore
//! engine.add_middleware(|mut update: Update, next: Next| async move {
//!     if let Some(message) = update.message_mut() {
//!         message.text = message.text.take().map(|t| t.trim().to_string());
//!     }
//!     next.run(update).await
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use switchboard_core::{BoxFuture, Update};

use crate::outcome::Outcome;

/// One link of the middleware chain.
///
/// Implemented for every `Fn(Update, Next) -> impl Future<Output = Outcome>`
/// closure that is `Send + Sync + 'static`.
pub trait Middleware: Send + Sync + 'static {
    /// Process `update`, optionally continuing with `next`.
    fn call(&self, update: Update, next: Next) -> BoxFuture<'static, Outcome>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Update, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call(&self, update: Update, next: Next) -> BoxFuture<'static, Outcome> {
        Box::pin(self(update, next))
    }
}

/// A type-erased middleware link.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The continuation handed to a middleware link.
pub struct Next {
    links: Arc<Vec<BoxedMiddleware>>,
    index: usize,
}

impl Next {
    /// Runs the rest of the chain with `update`.
    ///
    /// Running past the last link yields [`Outcome::Halted`].
    pub async fn run(self, update: Update) -> Outcome {
        let link = self.links.get(self.index).cloned();
        match link {
            Some(link) => {
                trace!(link = self.index, "Running middleware link");
                let next = Next {
                    links: self.links,
                    index: self.index + 1,
                };
                link.call(update, next).await
            }
            None => {
                trace!("Middleware chain exhausted");
                Outcome::Halted
            }
        }
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.links.len().saturating_sub(self.index))
            .finish()
    }
}

/// An ordered, prepend-only list of middleware links.
///
/// Execution works on a snapshot of the chain, so links added while other
/// updates are in flight only affect later executions.
#[derive(Default)]
pub struct MiddlewareChain {
    links: RwLock<Arc<Vec<BoxedMiddleware>>>,
}

impl MiddlewareChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepends a link; it will run before every link added earlier.
    pub fn add_first<M: Middleware>(&self, middleware: M) {
        let mut links = self.links.write();
        Arc::make_mut(&mut *links).insert(0, Arc::new(middleware));
    }

    /// Returns the number of links.
    pub fn len(&self) -> usize {
        self.links.read().len()
    }

    /// Returns `true` if the chain has no links.
    pub fn is_empty(&self) -> bool {
        self.links.read().is_empty()
    }

    /// Runs `update` through the chain, starting at the head link.
    pub async fn execute(&self, update: Update) -> Outcome {
        let links = self.links.read().clone();
        Next { links, index: 0 }.run(update).await
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.len())
            .finish()
    }
}
