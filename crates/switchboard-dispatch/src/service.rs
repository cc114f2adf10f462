//! Tower integration.
//!
//! [`DispatchEngine`] implements `tower::Service<Update>`, so ingestion code
//! can wrap it with standard layers such as timeouts or concurrency limits.
//!
//! ```rust,ignore
//! use tower::{ServiceBuilder, ServiceExt};
//! use tower::limit::ConcurrencyLimitLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(ConcurrencyLimitLayer::new(64))
//!     .service(engine.clone());
//!
//! let outcome = service.oneshot(update).await?;
//! ```

use std::convert::Infallible;
use std::task::{Context, Poll};

use tower::Service;

use switchboard_core::{BoxFuture, Update};

use crate::engine::DispatchEngine;
use crate::outcome::Outcome;

impl Service<Update> for DispatchEngine {
    type Response = Outcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, update: Update) -> Self::Future {
        let engine = self.clone();
        Box::pin(async move { Ok(engine.dispatch(update).await) })
    }
}
