//! # Switchboard Dispatch
//!
//! The update dispatcher. A [`DispatchEngine`] takes one [`Update`] at a time
//! and sends it to exactly one place:
//!
//! - a poll observer,
//! - a targeted handler (callback data, shared-user/chat request, text pattern),
//! - or the most specific registered [`UpdateChannel`].
//!
//! Every update passes the block list and the [`MiddlewareChain`] first.
//!
//! ```text
//!            ┌──────────┐   ┌────────────┐   ┌──────────────────┐
//! Update ──▶ │  block   │──▶│ middleware │──▶│ targeted handler │──▶ task
//!    │       │  check   │   │   chain    │   └──────────────────┘
//!    │       └──────────┘   └────────────┘            │ none
//!    │ poll                                           ▼
//!    ▼                                       [chat][type] → [chat][all]
//! PollObserver                               [global][type] → [global][all]
//! ```
//!
//! [`Update`]: switchboard_core::Update

mod channel;
mod config;
mod engine;
mod middleware;
mod outcome;
mod poll;
mod service;
mod supervise;

pub use channel::{ALL_MEDIA, ChannelRegistry, DeliveryFailure, GLOBAL_SCOPE, UpdateChannel};
pub use config::DispatchConfig;
pub use engine::DispatchEngine;
pub use middleware::{BoxedMiddleware, Middleware, MiddlewareChain, Next};
pub use outcome::{Outcome, Route};
pub use poll::{PollKind, PollObserver, TrackedPoll};
