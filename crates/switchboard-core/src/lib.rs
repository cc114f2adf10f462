//! # Switchboard Core
//!
//! The building blocks of the Switchboard update dispatch engine.
//!
//! This crate provides the data model and the leaf data structures that the
//! dispatcher is assembled from:
//!
//! - **Update model**: the closed [`Update`] sum type and its payloads
//! - **Chat types**: [`ChatType`] and the registration-time [`ChatTypeSet`]
//! - **Handlers**: async callbacks, type-erased as [`BoxedHandler`]
//! - **ConcurrentRegistry**: thread-safe map with atomic one-shot take
//! - **MatchTree**: specificity-ordered binary tree of [`PatternHandler`]s
//!
//! ```text
//! ┌──────────────┐   text + chat type   ┌────────────┐
//! │    Update    │─────────────────────▶│ MatchTree  │──▶ PatternHandler
//! └──────────────┘                      └────────────┘
//!        │  callback data / request id  ┌────────────────────┐
//!        └─────────────────────────────▶│ ConcurrentRegistry │──▶ BoxedHandler
//!                                       └────────────────────┘
//! ```

pub mod chat_type;
pub mod error;
pub mod handler;
pub mod registry;
pub mod tree;
pub mod update;

pub use chat_type::{ALL_CHAT_TYPES, ChatType, ChatTypeSet};
pub use error::{DispatchError, DispatchResult};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, HandlerFn, into_handler};
pub use registry::ConcurrentRegistry;
pub use tree::{MatchTree, PatternHandler};
pub use update::{
    CallbackQuery, Chat, ChatJoinRequest, ChatMemberUpdated, ChatShared, ChosenInlineResult,
    InlineQuery, Message, Poll, PollAnswer, PollOption, PreCheckoutQuery, ShippingQuery, Update,
    UpdateKind, User, UserShared,
};
