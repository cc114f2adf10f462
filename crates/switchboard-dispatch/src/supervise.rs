//! Supervised handler tasks.
//!
//! Matched handlers never run on the dispatch path. Each one gets its own
//! tokio task; a panic inside the handler is caught and logged with the route
//! and key that selected it instead of vanishing with the task. Poll observers
//! are synchronous and run inline, under the same panic capture.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info_span};

use switchboard_core::{BoxedHandler, Poll, Update};

use crate::outcome::Route;
use crate::poll::PollObserver;

/// Spawns `handler` on its own task with panic capture.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_supervised(
    route: Route,
    key: String,
    handler: BoxedHandler,
    update: Update,
) -> JoinHandle<()> {
    let span = info_span!("handler", route = %route, key = %key, update_id = update.update_id);

    tokio::spawn(
        async move {
            match AssertUnwindSafe(handler.call(update)).catch_unwind().await {
                Ok(()) => debug!("Handler finished"),
                Err(payload) => error!(
                    panic = panic_message(payload.as_ref()),
                    "Handler panicked"
                ),
            }
        }
        .instrument(span),
    )
}

/// Calls `observer` with `poll`, catching a panic.
///
/// Returns `false` if the observer panicked.
pub(crate) fn observe_supervised(observer: &dyn PollObserver, poll: &Poll) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| observer.on_poll(poll))) {
        Ok(()) => true,
        Err(payload) => {
            error!(
                poll_id = %poll.id,
                panic = panic_message(payload.as_ref()),
                "Poll observer panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
