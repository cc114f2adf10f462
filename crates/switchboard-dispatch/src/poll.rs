//! Poll tracking.
//!
//! Poll updates bypass general dispatch: the engine routes each one to the
//! [`PollObserver`] registered under its poll id. [`TrackedPoll`] is the
//! stock observer that keeps the latest poll snapshot.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use switchboard_core::{DispatchError, DispatchResult, Poll};

/// Receives state updates for one registered poll.
pub trait PollObserver: Send + Sync {
    /// Called with every new state of the poll.
    fn on_poll(&self, poll: &Poll);
}

/// The kind of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    /// Regular poll.
    Regular,
    /// Quiz with one correct answer.
    Quiz,
}

impl PollKind {
    /// Returns the wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Quiz => "quiz",
        }
    }
}

impl fmt::Display for PollKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "quiz" => Ok(Self::Quiz),
            other => Err(DispatchError::UnknownPollKind(other.to_string())),
        }
    }
}

/// A registered poll that remembers its latest state.
#[derive(Debug)]
pub struct TrackedPoll {
    id: String,
    kind: PollKind,
    latest: RwLock<Option<Poll>>,
    updates: AtomicU64,
}

impl TrackedPoll {
    /// Creates a tracker for poll `id`; `kind` must be `regular` or `quiz`.
    pub fn new(id: impl Into<String>, kind: &str) -> DispatchResult<Self> {
        Ok(Self {
            id: id.into(),
            kind: kind.parse()?,
            latest: RwLock::new(None),
            updates: AtomicU64::new(0),
        })
    }

    /// Returns the poll id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the poll kind.
    pub fn kind(&self) -> PollKind {
        self.kind
    }

    /// Returns the most recent snapshot, if any update arrived yet.
    pub fn latest(&self) -> Option<Poll> {
        self.latest.read().clone()
    }

    /// Returns how many poll updates were received.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Returns `true` once a snapshot reported the poll as closed.
    pub fn is_closed(&self) -> bool {
        self.latest.read().as_ref().is_some_and(|p| p.is_closed)
    }

    /// Returns the total voter count of the latest snapshot.
    pub fn total_voters(&self) -> i64 {
        self.latest
            .read()
            .as_ref()
            .map_or(0, |p| p.total_voter_count)
    }
}

impl PollObserver for TrackedPoll {
    fn on_poll(&self, poll: &Poll) {
        *self.latest.write() = Some(poll.clone());
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
}
