//! Specificity-ordered binary tree of pattern handlers.
//!
//! [`MatchTree`] picks the single best [`PatternHandler`] for a text message
//! given the chat type it arrived in.
//!
//! # Shape
//!
//! On insertion a new handler `H` is compared against existing nodes starting
//! at the root. If a node's pattern matches the *source text* of `H`'s pattern,
//! `H` is a specialization of that node and descends left; otherwise it is an
//! unrelated sibling and descends right. It is attached at the first empty
//! slot.
//!
//! ```text
//!            "start"
//!           /       \
//!   "start again"   "help"        left  = more specific
//!                                 right = tried after the left spine
//! ```
//!
//! # Lookup
//!
//! 1. Specificity descent: from the root, a matching node sends the walk left
//!    (looking for something more specific) or becomes the candidate when it
//!    has no left child; a non-matching node sends the walk right, or hands the
//!    candidacy back to its parent when it has no right child.
//! 2. Chat-type ascent: from the candidate, walk up through parents until a
//!    node both covers the chat type and still matches the text.
//!
//! Nodes live in an arena addressed by index and are never removed.

use std::fmt;

use regex::Regex;
use tracing::{trace, warn};

use crate::chat_type::{ChatType, ChatTypeSet};
use crate::error::{DispatchError, DispatchResult};
use crate::handler::BoxedHandler;

/// An immutable pattern handler: compiled pattern, chat-type scope and callback.
#[derive(Clone)]
pub struct PatternHandler {
    pattern: Regex,
    chat_types: ChatTypeSet,
    handler: BoxedHandler,
}

impl PatternHandler {
    /// Compiles `pattern` into a new handler.
    pub fn new(
        pattern: &str,
        chat_types: ChatTypeSet,
        handler: BoxedHandler,
    ) -> DispatchResult<Self> {
        let pattern =
            Regex::new(pattern).map_err(|e| DispatchError::invalid_pattern(pattern, e))?;
        Ok(Self {
            pattern,
            chat_types,
            handler,
        })
    }

    /// Returns the pattern source.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns the chat types this handler applies to.
    pub fn chat_types(&self) -> ChatTypeSet {
        self.chat_types
    }

    /// Returns the callback.
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// Returns `true` if the pattern matches `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

impl fmt::Debug for PatternHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternHandler")
            .field("pattern", &self.pattern.as_str())
            .field("chat_types", &self.chat_types.to_string())
            .finish_non_exhaustive()
    }
}

struct TreeNode {
    handler: PatternHandler,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

/// The binary matching tree. The root, when present, is at index 0.
#[derive(Default)]
pub struct MatchTree {
    nodes: Vec<TreeNode>,
}

impl MatchTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over registered handlers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PatternHandler> {
        self.nodes.iter().map(|n| &n.handler)
    }

    /// Attaches `handler` at the slot found by the containment walk.
    pub fn insert(&mut self, handler: PatternHandler) {
        let index = self.nodes.len();

        if self.nodes.is_empty() {
            self.nodes.push(TreeNode {
                handler,
                parent: None,
                left: None,
                right: None,
            });
            return;
        }

        let mut current = 0;
        let (parent, as_left) = loop {
            let node = &self.nodes[current];

            if node.handler.pattern() == handler.pattern()
                && node.handler.chat_types.overlaps(&handler.chat_types)
            {
                warn!(
                    pattern = handler.pattern(),
                    chat_types = %handler.chat_types,
                    "Duplicate pattern handler registered, lookup for this text is ambiguous"
                );
            }

            let contains = node.handler.is_match(handler.pattern());
            let slot = if contains { node.left } else { node.right };
            match slot {
                Some(next) => current = next,
                None => break (current, contains),
            }
        };

        self.nodes.push(TreeNode {
            handler,
            parent: Some(parent),
            left: None,
            right: None,
        });
        if as_left {
            self.nodes[parent].left = Some(index);
        } else {
            self.nodes[parent].right = Some(index);
        }
    }

    /// Finds the most specific handler matching `text` whose scope covers `chat_type`.
    pub fn find(&self, text: &str, chat_type: ChatType) -> Option<&PatternHandler> {
        if text.is_empty() || self.nodes.is_empty() {
            return None;
        }

        let mut current = 0;
        let candidate = loop {
            let node = &self.nodes[current];
            if node.handler.is_match(text) {
                match node.left {
                    Some(left) => current = left,
                    None => break Some(current),
                }
            } else {
                match node.right {
                    Some(right) => current = right,
                    None => break node.parent,
                }
            }
        };

        let mut cursor = candidate;
        while let Some(index) = cursor {
            let node = &self.nodes[index];
            if node.handler.chat_types.contains(chat_type) && node.handler.is_match(text) {
                trace!(pattern = node.handler.pattern(), %chat_type, "Pattern handler matched");
                return Some(&node.handler);
            }
            cursor = node.parent;
        }

        None
    }
}

impl fmt::Debug for MatchTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchTree")
            .field("len", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::into_handler;
    use crate::update::Update;

    fn handler(pattern: &str, chat_types: &[&str]) -> PatternHandler {
        PatternHandler::new(
            pattern,
            ChatTypeSet::parse(chat_types).unwrap(),
            into_handler(|_update: Update| async {}),
        )
        .unwrap()
    }

    fn found<'a>(tree: &'a MatchTree, text: &str, chat_type: ChatType) -> Option<&'a str> {
        tree.find(text, chat_type).map(PatternHandler::pattern)
    }

    #[test]
    fn test_more_specific_pattern_wins() {
        let mut tree = MatchTree::new();
        tree.insert(handler("start", &["all"]));
        tree.insert(handler("start again", &["all"]));

        assert_eq!(
            found(&tree, "start again", ChatType::Private),
            Some("start again")
        );
        assert_eq!(found(&tree, "start", ChatType::Private), Some("start"));
    }

    #[test]
    fn test_specificity_independent_of_insertion_order() {
        let mut tree = MatchTree::new();
        tree.insert(handler("start again", &["all"]));
        tree.insert(handler("start", &["all"]));

        assert_eq!(
            found(&tree, "start again", ChatType::Group),
            Some("start again")
        );
        assert_eq!(found(&tree, "start", ChatType::Group), Some("start"));
    }

    #[test]
    fn test_chat_type_ascent_fallback() {
        let mut tree = MatchTree::new();
        tree.insert(handler("hi", &["all"]));
        tree.insert(handler("hi everyone", &["private", "group"]));

        assert_eq!(
            found(&tree, "hi everyone", ChatType::Channel),
            Some("hi")
        );
        assert_eq!(
            found(&tree, "hi everyone", ChatType::Group),
            Some("hi everyone")
        );
    }

    #[test]
    fn test_no_match() {
        let mut tree = MatchTree::new();
        tree.insert(handler("start", &["all"]));
        tree.insert(handler("help", &["private"]));

        for chat_type in ChatType::ALL {
            assert!(tree.find("goodbye", chat_type).is_none());
            assert!(tree.find("", chat_type).is_none());
        }
        assert!(MatchTree::new().find("start", ChatType::Private).is_none());
    }

    #[test]
    fn test_uncovered_chat_type_yields_none() {
        let mut tree = MatchTree::new();
        tree.insert(handler("help", &["private"]));

        assert_eq!(found(&tree, "help", ChatType::Private), Some("help"));
        assert!(tree.find("help", ChatType::Supergroup).is_none());
    }

    #[test]
    fn test_siblings_on_right_spine() {
        let mut tree = MatchTree::new();
        tree.insert(handler("start", &["all"]));
        tree.insert(handler("help", &["all"]));
        tree.insert(handler("settings", &["all"]));
        tree.insert(handler("help me", &["all"]));

        assert_eq!(found(&tree, "settings", ChatType::Private), Some("settings"));
        assert_eq!(found(&tree, "help", ChatType::Private), Some("help"));
        assert_eq!(found(&tree, "help me", ChatType::Private), Some("help me"));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_same_pattern_scoped_per_chat_type() {
        let mut tree = MatchTree::new();
        tree.insert(handler("report", &["private"]));
        tree.insert(handler("report", &["group", "supergroup"]));

        let private = tree.find("report", ChatType::Private).unwrap();
        let group = tree.find("report", ChatType::Group).unwrap();
        assert!(private.chat_types().contains(ChatType::Private));
        assert!(group.chat_types().contains(ChatType::Group));
        assert!(tree.find("report", ChatType::Channel).is_none());
    }

    #[test]
    fn test_duplicate_registration_is_ambiguous_but_resolves() {
        // Which duplicate wins is unspecified; only assert that one does.
        let mut tree = MatchTree::new();
        tree.insert(handler("ping", &["all"]));
        tree.insert(handler("ping", &["all"]));

        assert_eq!(tree.len(), 2);
        assert_eq!(found(&tree, "ping", ChatType::Private), Some("ping"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = PatternHandler::new(
            "(unclosed",
            ChatTypeSet::all(),
            into_handler(|_update: Update| async {}),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPattern { pattern, .. } if pattern == "(unclosed"));
    }
}
