//! Chat types and chat-type scopes for pattern handlers.
//!
//! A pattern handler is registered for a [`ChatTypeSet`]: either a subset of
//! the four concrete [`ChatType`]s or the `all` wildcard. Tags are validated
//! at registration time so a misconfigured handler fails fast at startup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

/// The wildcard tag accepted by [`ChatTypeSet::parse`].
pub const ALL_CHAT_TYPES: &str = "all";

/// The type of a chat as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one chat with a user.
    Private,
    /// Basic group.
    Group,
    /// Supergroup.
    Supergroup,
    /// Broadcast channel.
    Channel,
}

impl ChatType {
    /// All concrete chat types.
    pub const ALL: [ChatType; 4] = [
        ChatType::Private,
        ChatType::Group,
        ChatType::Supergroup,
        ChatType::Channel,
    ];

    /// Returns the wire tag of this chat type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
            Self::Supergroup => "supergroup",
            Self::Channel => "channel",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Private => 1,
            Self::Group => 1 << 1,
            Self::Supergroup => 1 << 2,
            Self::Channel => 1 << 3,
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "group" => Ok(Self::Group),
            "supergroup" => Ok(Self::Supergroup),
            "channel" => Ok(Self::Channel),
            other => Err(DispatchError::UnknownChatType(other.to_string())),
        }
    }
}

/// The set of chat types a pattern handler applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatTypeSet {
    bits: u8,
    wildcard: bool,
}

impl ChatTypeSet {
    /// The wildcard set, covering every chat type.
    pub const fn all() -> Self {
        Self {
            bits: 0,
            wildcard: true,
        }
    }

    /// Parses a list of chat-type tags.
    ///
    /// An empty list means `all`. Any tag outside
    /// `private|group|supergroup|channel|all` is rejected.
    pub fn parse<I, S>(tags: I) -> DispatchResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self {
            bits: 0,
            wildcard: false,
        };
        let mut seen_any = false;

        for tag in tags {
            seen_any = true;
            let tag = tag.as_ref().trim();
            if tag == ALL_CHAT_TYPES {
                set.wildcard = true;
            } else {
                set.bits |= tag.parse::<ChatType>()?.bit();
            }
        }

        if !seen_any {
            return Ok(Self::all());
        }
        Ok(set)
    }

    /// Returns `true` if the set is the `all` wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Returns `true` if a chat of type `chat_type` is covered by this set.
    pub fn contains(&self, chat_type: ChatType) -> bool {
        self.wildcard || self.bits & chat_type.bit() != 0
    }

    /// Returns `true` if the two sets share at least one chat type.
    pub fn overlaps(&self, other: &ChatTypeSet) -> bool {
        self.wildcard || other.wildcard || self.bits & other.bits != 0
    }
}

impl Default for ChatTypeSet {
    fn default() -> Self {
        Self::all()
    }
}

impl From<ChatType> for ChatTypeSet {
    fn from(chat_type: ChatType) -> Self {
        Self {
            bits: chat_type.bit(),
            wildcard: false,
        }
    }
}

impl fmt::Display for ChatTypeSet {
    /// Renders the comma-joined set, e.g. `private,group` or `all`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wildcard {
            return f.write_str(ALL_CHAT_TYPES);
        }
        let tags: Vec<&str> = ChatType::ALL
            .iter()
            .filter(|t| self.contains(**t))
            .map(|t| t.as_str())
            .collect();
        f.write_str(&tags.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subset() {
        let set = ChatTypeSet::parse(["private", "group"]).unwrap();
        assert!(set.contains(ChatType::Private));
        assert!(set.contains(ChatType::Group));
        assert!(!set.contains(ChatType::Channel));
        assert_eq!(set.to_string(), "private,group");
    }

    #[test]
    fn test_empty_means_all() {
        let set = ChatTypeSet::parse(Vec::<String>::new()).unwrap();
        assert!(set.is_wildcard());
        assert_eq!(set.to_string(), "all");
        for t in ChatType::ALL {
            assert!(set.contains(t));
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = ChatTypeSet::parse(["private", "forum"]).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownChatType(tag) if tag == "forum"));
    }

    #[test]
    fn test_overlaps() {
        let a = ChatTypeSet::parse(["private"]).unwrap();
        let b = ChatTypeSet::parse(["group", "private"]).unwrap();
        let c = ChatTypeSet::from(ChatType::Channel);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(ChatTypeSet::all().overlaps(&c));
    }
}
