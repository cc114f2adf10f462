//! Chat-scoped update channels.
//!
//! The [`ChannelRegistry`] is a two-level map, chat scope → media-type scope →
//! [`UpdateChannel`]. Application code registers channels for the chats and
//! update types it wants to consume; the dispatcher writes every update no
//! handler claimed into the most specific registered channel.
//!
//! ```text
//! "global" ──┬── "all"      ◀── last-resort sink, always present
//!            └── "message"
//! "-100123" ─┬── "all"
//!            └── "callback_query"
//! "@news"   ─── "channel_post"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use switchboard_core::Update;

/// The wildcard chat scope.
pub const GLOBAL_SCOPE: &str = "global";

/// The wildcard media-type scope.
pub const ALL_MEDIA: &str = "all";

/// Why a channel send did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// No receiver made room within the configured send timeout.
    #[error("send timed out")]
    TimedOut,
    /// The consumer closed the channel with [`UpdateChannel::close`].
    #[error("channel closed")]
    Closed,
}

/// A cloneable handle to a registered update channel.
///
/// Every clone shares the same underlying channel; [`same_channel`](Self::same_channel)
/// exposes that identity.
#[derive(Clone)]
pub struct UpdateChannel {
    tx: mpsc::Sender<Update>,
    rx: Arc<Mutex<mpsc::Receiver<Update>>>,
}

impl UpdateChannel {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Waits for the next update.
    ///
    /// Concurrent receivers take turns; each update is received once.
    pub async fn recv(&self) -> Option<Update> {
        self.rx.lock().await.recv().await
    }

    /// Takes an update if one is immediately available.
    ///
    /// Returns `None` while another task is parked in [`recv`](Self::recv),
    /// even if updates are buffered.
    pub fn try_recv(&self) -> Option<Update> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Stops accepting updates.
    ///
    /// Buffered updates can still be received. Later deliveries fail with
    /// [`DeliveryFailure::Closed`] and dispatch moves on to the next tier.
    pub async fn close(&self) {
        self.rx.lock().await.close();
        debug!("Update channel closed");
    }

    /// Returns `true` if the channel was closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Returns `true` if both handles refer to the same channel.
    pub fn same_channel(&self, other: &UpdateChannel) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Sends `update`, waiting for capacity at most `timeout`.
    ///
    /// On failure the update is handed back so the caller can try the next tier.
    pub(crate) async fn deliver(
        &self,
        update: Update,
        timeout: Option<Duration>,
    ) -> Result<(), (Update, DeliveryFailure)> {
        let permit = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.tx.reserve()).await {
                Ok(permit) => permit,
                Err(_) => return Err((update, DeliveryFailure::TimedOut)),
            },
            None => self.tx.reserve().await,
        };

        match permit {
            Ok(permit) => {
                permit.send(update);
                Ok(())
            }
            Err(_) => Err((update, DeliveryFailure::Closed)),
        }
    }
}

impl fmt::Debug for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateChannel")
            .field("capacity", &self.tx.max_capacity())
            .field("available", &self.tx.capacity())
            .finish()
    }
}

/// Normalizes empty scopes to their wildcards.
fn normalize<'a>(chat: &'a str, media: &'a str) -> (&'a str, &'a str) {
    let chat = if chat.is_empty() { GLOBAL_SCOPE } else { chat };
    let media = if media.is_empty() { ALL_MEDIA } else { media };
    (chat, media)
}

/// Two-level registry of update channels.
///
/// Safe for concurrent registration and lookup at any time. The
/// `global`/`all` channel is created with the registry and cannot be removed.
pub struct ChannelRegistry {
    scopes: RwLock<HashMap<String, HashMap<String, UpdateChannel>>>,
    capacity: usize,
}

impl ChannelRegistry {
    /// Creates a registry holding only the `global`/`all` channel.
    pub fn new(capacity: usize) -> Self {
        let registry = Self {
            scopes: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        };
        registry.register(GLOBAL_SCOPE, ALL_MEDIA);
        registry
    }

    /// Returns the channel for `(chat, media)`, creating it on first use.
    ///
    /// An empty `chat` means `global`, an empty `media` means `all`.
    pub fn register(&self, chat: &str, media: &str) -> UpdateChannel {
        let (chat, media) = normalize(chat, media);

        if let Some(channel) = self.get(chat, media) {
            return channel;
        }

        let mut scopes = self.scopes.write();
        scopes
            .entry(chat.to_string())
            .or_default()
            .entry(media.to_string())
            .or_insert_with(|| {
                debug!(chat, media, "Registered update channel");
                UpdateChannel::new(self.capacity)
            })
            .clone()
    }

    /// Removes the channel for `(chat, media)` and prunes an emptied chat scope.
    ///
    /// Returns the removed channel. The `global`/`all` channel is never removed.
    pub fn unregister(&self, chat: &str, media: &str) -> Option<UpdateChannel> {
        let (chat, media) = normalize(chat, media);
        if chat == GLOBAL_SCOPE && media == ALL_MEDIA {
            warn!("Refusing to unregister the global fallback channel");
            return None;
        }

        let mut scopes = self.scopes.write();
        let media_map = scopes.get_mut(chat)?;
        let removed = media_map.remove(media);
        if media_map.is_empty() {
            scopes.remove(chat);
        }
        if removed.is_some() {
            debug!(chat, media, "Unregistered update channel");
        }
        removed
    }

    /// Returns the channel for `(chat, media)` without creating it.
    pub fn get(&self, chat: &str, media: &str) -> Option<UpdateChannel> {
        let (chat, media) = normalize(chat, media);
        self.scopes
            .read()
            .get(chat)
            .and_then(|media_map| media_map.get(media))
            .cloned()
    }

    /// Returns `true` if a channel is registered for `(chat, media)`.
    pub fn contains(&self, chat: &str, media: &str) -> bool {
        self.get(chat, media).is_some()
    }

    /// Returns `true` if any channel is registered under `chat`.
    pub fn has_scope(&self, chat: &str) -> bool {
        let (chat, _) = normalize(chat, ALL_MEDIA);
        self.scopes.read().contains_key(chat)
    }

    /// Returns the `global`/`all` channel.
    pub fn global(&self) -> UpdateChannel {
        self.register(GLOBAL_SCOPE, ALL_MEDIA)
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes = self.scopes.read();
        f.debug_struct("ChannelRegistry")
            .field("scopes", &scopes.len())
            .field("channels", &scopes.values().map(HashMap::len).sum::<usize>())
            .field("capacity", &self.capacity)
            .finish()
    }
}
