//! Error types for the Switchboard dispatch engine.

use thiserror::Error;

/// Errors reported synchronously by the registration API.
///
/// Routing misses at dispatch time are never errors; they degrade to the
/// next fallback tier and are only logged.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The text pattern of a pattern handler failed to compile.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as passed by the caller.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A chat-type tag is not one of `private`, `group`, `supergroup`, `channel` or `all`.
    #[error("unknown chat type '{0}'")]
    UnknownChatType(String),

    /// A poll kind tag is not one of `regular` or `quiz`.
    #[error("unknown poll kind '{0}'")]
    UnknownPollKind(String),
}

impl DispatchError {
    /// Creates an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }
}

/// Result type for registration operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
