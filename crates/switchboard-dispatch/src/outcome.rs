//! Dispatch outcomes.

use std::fmt;

/// The targeted handler tier that claimed an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Callback-button handler, keyed by callback data.
    Callback,
    /// One-shot "user shared" request handler.
    UserShared,
    /// One-shot "chat shared" request handler.
    ChatShared,
    /// Pattern handler from the match tree.
    Pattern,
    /// Registered poll observer.
    Poll,
}

impl Route {
    /// Returns a short name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Callback => "callback",
            Self::UserShared => "user_shared",
            Self::ChatShared => "chat_shared",
            Self::Pattern => "pattern",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a single dispatched update.
///
/// Dispatch performs at most one of these per update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The acting user is on the block list; nothing received the update.
    Blocked,
    /// A middleware link returned without continuing the chain.
    Halted,
    /// A targeted handler or poll observer claimed the update.
    Handled(Route),
    /// The update was sent on the channel registered for `(chat, media)`.
    Delivered {
        /// Chat scope of the receiving channel.
        chat: String,
        /// Media-type scope of the receiving channel.
        media: String,
    },
    /// Even the global channel could not take the update in time.
    Dropped,
}

impl Outcome {
    /// Returns `true` if a handler or channel received the update.
    pub fn is_routed(&self) -> bool {
        matches!(self, Self::Handled(_) | Self::Delivered { .. })
    }
}
