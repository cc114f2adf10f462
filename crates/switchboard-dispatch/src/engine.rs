//! The dispatch engine.
//!
//! [`DispatchEngine`] owns every registry of one bot instance and routes each
//! incoming [`Update`] exactly once:
//!
//! 1. **Poll interception**: poll updates go to the observer registered for
//!    their poll id, or straight to the global channel if there is none.
//! 2. **Block check**: updates whose acting user is blocked are dropped.
//! 3. **Middleware**: the update runs through the [`MiddlewareChain`]; the
//!    engine's own routing is the chain's innermost link.
//! 4. **Targeted handlers**, first hit wins: callback data (peeked), user
//!    shared request (one-shot), chat shared request (one-shot), text pattern.
//! 5. **Chat channels**: `[chat][type]`, then `[chat]["all"]`.
//! 6. **Global channels**: `["global"][type]`, then `["global"]["all"]`.
//!
//! Matched handlers run on their own supervised task. Channel sends apply
//! backpressure to the caller, bounded by the configured send timeout.
//!
//! ```rust,ignore
//! let engine = DispatchEngine::new();
//! engine.add_pattern_handler("^/start", on_start, ["private"])?;
//! let updates = engine.global_channel();
//!
//! tokio::spawn(async move {
//!     while let Some(update) = updates.recv().await {
//!         tracing::info!(update_id = update.update_id, "unclaimed update");
//!     }
//! });
//!
//! engine.dispatch(update).await;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use switchboard_core::{
    BoxedHandler, ChatTypeSet, ConcurrentRegistry, DispatchResult, Handler, MatchTree, Message,
    PatternHandler, Update, UpdateKind, into_handler,
};

use crate::channel::{ALL_MEDIA, ChannelRegistry, GLOBAL_SCOPE, UpdateChannel};
use crate::config::DispatchConfig;
use crate::middleware::{Middleware, MiddlewareChain, Next};
use crate::outcome::{Outcome, Route};
use crate::poll::PollObserver;
use crate::supervise::{observe_supervised, spawn_supervised};

/// The update dispatcher of one bot instance.
///
/// Cloning is cheap; every clone shares the same registries.
#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: DispatchConfig,
    blocked: RwLock<HashSet<i64>>,
    callbacks: ConcurrentRegistry<String, BoxedHandler>,
    user_shared: ConcurrentRegistry<i64, BoxedHandler>,
    chat_shared: ConcurrentRegistry<i64, BoxedHandler>,
    polls: ConcurrentRegistry<String, Arc<dyn PollObserver>>,
    // Populated at startup; lookups only take the read side.
    patterns: RwLock<MatchTree>,
    middleware: MiddlewareChain,
    channels: ChannelRegistry,
}

impl Default for DispatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchEngine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    /// Creates an engine from `config`.
    ///
    /// The `global`/`all` channel and the terminal routing link exist as soon
    /// as this returns.
    pub fn with_config(config: DispatchConfig) -> Self {
        let inner = Arc::new_cyclic(|engine: &Weak<EngineInner>| {
            let middleware = MiddlewareChain::new();
            middleware.add_first(routing_link(engine.clone()));

            EngineInner {
                blocked: RwLock::new(config.blocked_users.iter().copied().collect()),
                callbacks: ConcurrentRegistry::new(),
                user_shared: ConcurrentRegistry::new(),
                chat_shared: ConcurrentRegistry::new(),
                polls: ConcurrentRegistry::new(),
                patterns: RwLock::new(MatchTree::new()),
                middleware,
                channels: ChannelRegistry::new(config.channel_capacity),
                config,
            }
        });

        debug!(
            blocked_users = inner.config.blocked_users.len(),
            send_timeout = ?inner.config.send_timeout,
            channel_capacity = inner.config.channel_capacity,
            "Dispatch engine created"
        );

        Self { inner }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    // ─── Registration ─────────────────────────────────────────────────────────

    /// Registers a handler for text matching `pattern` in the given chat types.
    ///
    /// Chat-type tags are `private`, `group`, `supergroup`, `channel` or `all`;
    /// an empty list means `all`. Nothing is registered if the pattern fails to
    /// compile or a tag is unknown.
    pub fn add_pattern_handler<H, I, S>(
        &self,
        pattern: &str,
        handler: H,
        chat_types: I,
    ) -> DispatchResult<()>
    where
        H: Handler,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chat_types = ChatTypeSet::parse(chat_types)?;
        let handler = PatternHandler::new(pattern, chat_types, into_handler(handler))?;
        self.inner.patterns.write().insert(handler);
        debug!(pattern, chat_types = %chat_types, "Registered pattern handler");
        Ok(())
    }

    /// Registers a handler for callback queries carrying `data`.
    ///
    /// Replaces any handler already registered for the same data. The handler
    /// stays registered until [`remove_callback_handler`](Self::remove_callback_handler).
    pub fn add_callback_handler<H: Handler>(&self, data: impl Into<String>, handler: H) {
        let data = data.into();
        debug!(data = %data, "Registered callback handler");
        self.inner.callbacks.add(data, into_handler(handler));
    }

    /// Removes the callback handler for `data`.
    pub fn remove_callback_handler(&self, data: &str) {
        self.inner.callbacks.remove(data);
    }

    /// Registers a one-shot handler for the "user shared" reply to request `request_id`.
    pub fn add_user_shared_handler<H: Handler>(&self, request_id: i64, handler: H) {
        debug!(request_id, "Registered user shared handler");
        self.inner.user_shared.add(request_id, into_handler(handler));
    }

    /// Registers a one-shot handler for the "chat shared" reply to request `request_id`.
    pub fn add_chat_shared_handler<H: Handler>(&self, request_id: i64, handler: H) {
        debug!(request_id, "Registered chat shared handler");
        self.inner.chat_shared.add(request_id, into_handler(handler));
    }

    /// Prepends a middleware link; it runs before all links added earlier.
    ///
    /// Add middleware before ingestion starts for a deterministic order.
    pub fn add_middleware<M: Middleware>(&self, middleware: M) {
        self.inner.middleware.add_first(middleware);
    }

    /// Returns the channel for `(chat, media)`, creating it on first use.
    pub fn register_channel(&self, chat: &str, media: &str) -> UpdateChannel {
        self.inner.channels.register(chat, media)
    }

    /// Removes the channel for `(chat, media)`.
    pub fn unregister_channel(&self, chat: &str, media: &str) -> Option<UpdateChannel> {
        self.inner.channels.unregister(chat, media)
    }

    /// Returns the `global`/`all` fallback channel.
    ///
    /// Integrators must drain it; a full global channel stalls dispatch.
    pub fn global_channel(&self) -> UpdateChannel {
        self.inner.channels.global()
    }

    /// Routes poll updates for `poll_id` to `observer`.
    pub fn register_poll(&self, poll_id: impl Into<String>, observer: Arc<dyn PollObserver>) {
        let poll_id = poll_id.into();
        debug!(poll_id = %poll_id, "Registered poll observer");
        self.inner.polls.add(poll_id, observer);
    }

    /// Stops routing poll updates for `poll_id`.
    pub fn unregister_poll(&self, poll_id: &str) {
        self.inner.polls.remove(poll_id);
    }

    // ─── Block list ───────────────────────────────────────────────────────────

    /// Adds `user_id` to the block list.
    pub fn block_user(&self, user_id: i64) {
        if self.inner.blocked.write().insert(user_id) {
            info!(user_id, "User blocked");
        }
    }

    /// Removes `user_id` from the block list.
    pub fn unblock_user(&self, user_id: i64) {
        if self.inner.blocked.write().remove(&user_id) {
            info!(user_id, "User unblocked");
        }
    }

    /// Returns `true` if `user_id` is blocked.
    pub fn is_blocked(&self, user_id: i64) -> bool {
        self.inner.is_blocked(user_id)
    }

    // ─── Dispatch ─────────────────────────────────────────────────────────────

    /// Routes one update.
    ///
    /// Must be called from within a tokio runtime. Resolves once the update
    /// was handed to a handler task or a channel; waits for channel capacity
    /// up to the configured send timeout.
    pub async fn dispatch(&self, update: Update) -> Outcome {
        let span = debug_span!(
            "dispatch",
            update_id = update.update_id,
            update_type = update.type_tag()
        );
        self.inner.dispatch(update).instrument(span).await
    }
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("config", &self.inner.config)
            .field("patterns", &self.inner.patterns.read().len())
            .field("callbacks", &self.inner.callbacks.len())
            .field("middleware", &self.inner.middleware.len())
            .field("channels", &self.inner.channels)
            .finish_non_exhaustive()
    }
}

/// The terminal middleware link, installed first so it always runs last.
fn routing_link(engine: Weak<EngineInner>) -> impl Middleware {
    move |update: Update, _next: Next| {
        let engine = engine.clone();
        async move {
            match engine.upgrade() {
                Some(engine) => engine.route(update).await,
                None => {
                    warn!("Dispatch engine dropped while routing");
                    Outcome::Dropped
                }
            }
        }
    }
}

/// Chat scopes an update can be delivered to, most specific first.
fn chat_scopes(update: &Update) -> Vec<String> {
    let Some(chat) = update.chat() else {
        return Vec::new();
    };

    let mut scopes = vec![chat.id.to_string()];
    if let Some(username) = &chat.username {
        scopes.push(format!("@{username}"));
    }
    scopes
}

impl EngineInner {
    fn is_blocked(&self, user_id: i64) -> bool {
        self.blocked.read().contains(&user_id)
    }

    async fn dispatch(&self, update: Update) -> Outcome {
        if let UpdateKind::Poll(poll) = &update.kind {
            if let Some(observer) = self.polls.peek(poll.id.as_str()) {
                if observe_supervised(observer.as_ref(), poll) {
                    debug!(poll_id = %poll.id, "Poll update routed to observer");
                }
                return Outcome::Handled(Route::Poll);
            }
            error!(poll_id = %poll.id, "No poll registered for this id, forwarding to global channel");
            return self.deliver(update).await;
        }

        if let Some(user) = update.sender()
            && self.is_blocked(user.id)
        {
            info!(user_id = user.id, "Dropping update from blocked user");
            return Outcome::Blocked;
        }

        self.middleware.execute(update).await
    }

    async fn route(&self, update: Update) -> Outcome {
        if let Some((route, key, handler)) = self.targeted_handler(&update) {
            debug!(route = %route, key = %key, "Update claimed by handler");
            spawn_supervised(route, key, handler, update);
            return Outcome::Handled(route);
        }

        self.deliver(update).await
    }

    fn targeted_handler(&self, update: &Update) -> Option<(Route, String, BoxedHandler)> {
        match &update.kind {
            UpdateKind::CallbackQuery(query) => {
                let data = query.data.as_deref()?;
                let handler = self.callbacks.peek(data)?;
                Some((Route::Callback, data.to_string(), handler))
            }
            UpdateKind::Message(message) | UpdateKind::ChannelPost(message) => {
                self.message_handler(message)
            }
            UpdateKind::EditedMessage(_)
            | UpdateKind::EditedChannelPost(_)
            | UpdateKind::InlineQuery(_)
            | UpdateKind::ChosenInlineResult(_)
            | UpdateKind::ShippingQuery(_)
            | UpdateKind::PreCheckoutQuery(_)
            | UpdateKind::Poll(_)
            | UpdateKind::PollAnswer(_)
            | UpdateKind::MyChatMember(_)
            | UpdateKind::ChatMember(_)
            | UpdateKind::ChatJoinRequest(_) => None,
        }
    }

    fn message_handler(&self, message: &Message) -> Option<(Route, String, BoxedHandler)> {
        if let Some(shared) = &message.user_shared
            && let Some(handler) = self.user_shared.take_and_remove(&shared.request_id)
        {
            return Some((Route::UserShared, shared.request_id.to_string(), handler));
        }

        if let Some(shared) = &message.chat_shared
            && let Some(handler) = self.chat_shared.take_and_remove(&shared.request_id)
        {
            return Some((Route::ChatShared, shared.request_id.to_string(), handler));
        }

        let text = message.text_or_caption()?;
        let patterns = self.patterns.read();
        let matched = patterns.find(text, message.chat.chat_type)?;
        Some((
            Route::Pattern,
            matched.pattern().to_string(),
            Arc::clone(matched.handler()),
        ))
    }

    /// Sends `update` down the channel tiers until one accepts it.
    async fn deliver(&self, mut update: Update) -> Outcome {
        let media = update.type_tag();

        let mut targets: Vec<(String, &'static str)> = chat_scopes(&update)
            .into_iter()
            .flat_map(|chat| [(chat.clone(), media), (chat, ALL_MEDIA)])
            .collect();
        targets.push((GLOBAL_SCOPE.to_string(), media));
        targets.push((GLOBAL_SCOPE.to_string(), ALL_MEDIA));

        for (chat, scope_media) in targets {
            let Some(channel) = self.channels.get(&chat, scope_media) else {
                continue;
            };

            match channel.deliver(update, self.config.send_timeout).await {
                Ok(()) => {
                    debug!(chat = %chat, media = scope_media, "Update delivered to channel");
                    return Outcome::Delivered {
                        chat,
                        media: scope_media.to_string(),
                    };
                }
                Err((returned, failure)) => {
                    warn!(
                        chat = %chat,
                        media = scope_media,
                        %failure,
                        "Channel did not accept update, trying next tier"
                    );
                    update = returned;
                }
            }
        }

        error!(
            update_id = update.update_id,
            "Update dropped, global channel did not accept it"
        );
        Outcome::Dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::TrackedPoll;
    use serde_json::{Value, json};
    use std::time::Duration;
    use switchboard_core::{DispatchError, Poll};
    use tokio::sync::mpsc;

    fn update(value: Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    fn text_message(update_id: i64, user_id: i64, chat_id: i64, chat_type: &str, text: &str) -> Update {
        update(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "from": { "id": user_id, "first_name": "Test" },
                "chat": { "id": chat_id, "type": chat_type },
                "text": text
            }
        }))
    }

    fn callback(update_id: i64, user_id: i64, data: &str) -> Update {
        update(json!({
            "update_id": update_id,
            "callback_query": {
                "id": format!("cb{update_id}"),
                "from": { "id": user_id },
                "message": {
                    "message_id": 1,
                    "chat": { "id": 100, "type": "private" }
                },
                "data": data
            }
        }))
    }

    fn user_shared(update_id: i64, request_id: i64) -> Update {
        update(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "from": { "id": 1 },
                "chat": { "id": 1, "type": "private" },
                "user_shared": { "request_id": request_id, "user_id": 77 }
            }
        }))
    }

    fn poll(update_id: i64, poll_id: &str, voters: i64) -> Update {
        update(json!({
            "update_id": update_id,
            "poll": {
                "id": poll_id,
                "question": "Lunch?",
                "options": [{ "text": "yes", "voter_count": voters }],
                "total_voter_count": voters,
                "type": "regular"
            }
        }))
    }

    fn sample(tag: &str, update_id: i64) -> Update {
        let user = json!({ "id": 9, "first_name": "Sam" });
        let chat = json!({ "id": 555, "type": "group", "title": "G" });
        let message = json!({ "message_id": 1, "from": user, "chat": chat, "text": "unmatched" });
        let member = json!({ "chat": chat, "from": user, "date": 0 });
        let payload = match tag {
            "message" | "edited_message" | "channel_post" | "edited_channel_post" => message,
            "callback_query" => json!({ "id": "c", "from": user, "data": "nobody" }),
            "inline_query" => json!({ "id": "i", "from": user, "query": "q" }),
            "chosen_inline_result" => json!({ "result_id": "r", "from": user, "query": "q" }),
            "shipping_query" => json!({ "id": "s", "from": user, "invoice_payload": "p" }),
            "pre_checkout_query" => {
                json!({ "id": "p", "from": user, "currency": "EUR", "total_amount": 100 })
            }
            "poll" => json!({ "id": "unregistered", "question": "?", "options": [] }),
            "poll_answer" => json!({ "poll_id": "x", "user": user, "option_ids": [0] }),
            "my_chat_member" | "chat_member" => member,
            "chat_join_request" => json!({ "chat": chat, "from": user, "date": 0 }),
            other => panic!("no sample for {other}"),
        };
        let mut value = json!({ "update_id": update_id });
        value[tag] = payload;
        update(value)
    }

    async fn received(rx: &mut mpsc::UnboundedReceiver<i64>) -> Option<i64> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    fn recording_handler(
        tx: mpsc::UnboundedSender<i64>,
    ) -> impl Fn(Update) -> futures::future::Ready<()> + Clone + Send + Sync + 'static {
        move |update: Update| {
            let _ = tx.send(update.update_id);
            futures::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_pattern_handler_claims_text() {
        let engine = DispatchEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine
            .add_pattern_handler("^start", recording_handler(tx), ["all"])
            .unwrap();

        let outcome = engine.dispatch(text_message(1, 5, 5, "private", "start")).await;
        assert_eq!(outcome, Outcome::Handled(Route::Pattern));
        assert_eq!(received(&mut rx).await, Some(1));
        assert!(engine.global_channel().try_recv().is_none());
    }

    #[tokio::test]
    async fn test_caption_matches_when_text_is_empty() {
        let engine = DispatchEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine
            .add_pattern_handler("caption$", recording_handler(tx), ["channel"])
            .unwrap();

        let post = update(json!({
            "update_id": 7,
            "channel_post": {
                "message_id": 7,
                "chat": { "id": -200, "type": "channel" },
                "text": "",
                "caption": "photo caption"
            }
        }));
        assert_eq!(engine.dispatch(post).await, Outcome::Handled(Route::Pattern));
        assert_eq!(received(&mut rx).await, Some(7));
    }

    #[tokio::test]
    async fn test_specific_pattern_preferred_through_engine() {
        let engine = DispatchEngine::new();
        let (general_tx, mut general_rx) = mpsc::unbounded_channel();
        let (specific_tx, mut specific_rx) = mpsc::unbounded_channel();
        engine
            .add_pattern_handler("hi", recording_handler(general_tx), Vec::<&str>::new())
            .unwrap();
        engine
            .add_pattern_handler("hi everyone", recording_handler(specific_tx), ["private", "group"])
            .unwrap();

        engine.dispatch(text_message(1, 5, 5, "group", "hi everyone")).await;
        assert_eq!(received(&mut specific_rx).await, Some(1));

        let channel_post = update(json!({
            "update_id": 2,
            "channel_post": {
                "message_id": 2,
                "chat": { "id": -300, "type": "channel" },
                "text": "hi everyone"
            }
        }));
        engine.dispatch(channel_post).await;
        assert_eq!(received(&mut general_rx).await, Some(2));
    }

    #[tokio::test]
    async fn test_pattern_scoped_to_other_chat_type_falls_through() {
        let engine = DispatchEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine
            .add_pattern_handler("help", recording_handler(tx), ["private"])
            .unwrap();

        let outcome = engine.dispatch(text_message(1, 5, -10, "supergroup", "help")).await;
        assert_eq!(
            outcome,
            Outcome::Delivered {
                chat: GLOBAL_SCOPE.into(),
                media: ALL_MEDIA.into()
            }
        );
        assert_eq!(engine.global_channel().try_recv().map(|u| u.update_id), Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_registration_errors_register_nothing() {
        let engine = DispatchEngine::new();

        let err = engine
            .add_pattern_handler("(", |_u: Update| async {}, ["all"])
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPattern { .. }));

        let err = engine
            .add_pattern_handler("ok", |_u: Update| async {}, ["private", "forum"])
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownChatType(_)));

        assert_eq!(engine.inner.patterns.read().len(), 0);
    }

    #[tokio::test]
    async fn test_callback_handler_is_not_consumed() {
        let engine = DispatchEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.add_callback_handler("vote:yes", recording_handler(tx));

        assert_eq!(
            engine.dispatch(callback(1, 5, "vote:yes")).await,
            Outcome::Handled(Route::Callback)
        );
        assert_eq!(
            engine.dispatch(callback(2, 5, "vote:yes")).await,
            Outcome::Handled(Route::Callback)
        );
        let mut seen = vec![received(&mut rx).await, received(&mut rx).await];
        seen.sort();
        assert_eq!(seen, vec![Some(1), Some(2)]);

        engine.remove_callback_handler("vote:yes");
        let outcome = engine.dispatch(callback(3, 5, "vote:yes")).await;
        assert!(matches!(outcome, Outcome::Delivered { .. }));
    }

    #[tokio::test]
    async fn test_user_shared_handler_fires_once() {
        let engine = DispatchEngine::new();
        let global = engine.global_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.add_user_shared_handler(42, recording_handler(tx));

        assert_eq!(
            engine.dispatch(user_shared(1, 42)).await,
            Outcome::Handled(Route::UserShared)
        );
        assert_eq!(
            engine.dispatch(user_shared(2, 42)).await,
            Outcome::Delivered {
                chat: GLOBAL_SCOPE.into(),
                media: ALL_MEDIA.into()
            }
        );

        assert_eq!(received(&mut rx).await, Some(1));
        assert_eq!(global.try_recv().map(|u| u.update_id), Some(2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_chat_shared_handler_fires_once() {
        let engine = DispatchEngine::new();
        let global = engine.global_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.add_chat_shared_handler(7, recording_handler(tx));

        let shared = |update_id: i64| {
            update(json!({
                "update_id": update_id,
                "message": {
                    "message_id": 1,
                    "from": { "id": 1 },
                    "chat": { "id": 1, "type": "private" },
                    "chat_shared": { "request_id": 7, "chat_id": -100 }
                }
            }))
        };

        assert_eq!(
            engine.dispatch(shared(1)).await,
            Outcome::Handled(Route::ChatShared)
        );
        assert!(matches!(engine.dispatch(shared(2)).await, Outcome::Delivered { .. }));
        assert_eq!(received(&mut rx).await, Some(1));
        assert_eq!(global.try_recv().map(|u| u.update_id), Some(2));
    }

    #[tokio::test]
    async fn test_register_channel_is_idempotent() {
        let engine = DispatchEngine::new();
        let first = engine.register_channel("123", "message");
        let second = engine.register_channel("123", "message");
        assert!(first.same_channel(&second));
    }

    #[tokio::test]
    async fn test_chat_channel_tiers() {
        let engine = DispatchEngine::new();
        let messages = engine.register_channel("100", "message");
        let everything = engine.register_channel("100", "");

        assert_eq!(
            engine.dispatch(text_message(1, 5, 100, "private", "hello")).await,
            Outcome::Delivered {
                chat: "100".into(),
                media: "message".into()
            }
        );
        assert_eq!(messages.try_recv().map(|u| u.update_id), Some(1));

        assert_eq!(
            engine.dispatch(callback(2, 5, "unknown")).await,
            Outcome::Delivered {
                chat: "100".into(),
                media: ALL_MEDIA.into()
            }
        );
        assert_eq!(everything.try_recv().map(|u| u.update_id), Some(2));

        assert_eq!(
            engine.dispatch(text_message(3, 5, 200, "private", "hello")).await,
            Outcome::Delivered {
                chat: GLOBAL_SCOPE.into(),
                media: ALL_MEDIA.into()
            }
        );
    }

    #[tokio::test]
    async fn test_channel_username_scope() {
        let engine = DispatchEngine::new();
        let news = engine.register_channel("@news", "channel_post");

        let post = update(json!({
            "update_id": 1,
            "channel_post": {
                "message_id": 1,
                "chat": { "id": -300, "type": "channel", "username": "news" },
                "text": "breaking"
            }
        }));

        assert_eq!(
            engine.dispatch(post).await,
            Outcome::Delivered {
                chat: "@news".into(),
                media: "channel_post".into()
            }
        );
        assert!(news.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_unregistered_channel_no_longer_receives() {
        let engine = DispatchEngine::new();
        engine.register_channel("100", "message");
        assert!(engine.unregister_channel("100", "message").is_some());

        let outcome = engine.dispatch(text_message(1, 5, 100, "private", "x")).await;
        assert_eq!(
            outcome,
            Outcome::Delivered {
                chat: GLOBAL_SCOPE.into(),
                media: ALL_MEDIA.into()
            }
        );
    }

    #[tokio::test]
    async fn test_every_update_type_reaches_global_channel() {
        let engine = DispatchEngine::new();
        let global = engine.global_channel();

        for (i, tag) in UpdateKind::ALL_TAGS.iter().enumerate() {
            let update_id = i as i64 + 1;
            let outcome = engine.dispatch(sample(tag, update_id)).await;
            assert_eq!(
                outcome,
                Outcome::Delivered {
                    chat: GLOBAL_SCOPE.into(),
                    media: ALL_MEDIA.into()
                },
                "update type {tag}"
            );

            let delivered = global.try_recv().unwrap();
            assert_eq!(delivered.update_id, update_id);
            assert_eq!(delivered.type_tag(), *tag);
        }
    }

    #[tokio::test]
    async fn test_global_media_channel_preferred_over_global_all() {
        let engine = DispatchEngine::new();
        let queries = engine.register_channel("", "inline_query");

        let outcome = engine.dispatch(sample("inline_query", 1)).await;
        assert_eq!(
            outcome,
            Outcome::Delivered {
                chat: GLOBAL_SCOPE.into(),
                media: "inline_query".into()
            }
        );
        assert!(queries.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_blocked_user_short_circuits() {
        let engine = DispatchEngine::with_config(DispatchConfig::new().with_blocked_users([666]));
        let global = engine.global_channel();
        let chat = engine.register_channel("666", "");
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine
            .add_pattern_handler("hi", recording_handler(tx.clone()), ["all"])
            .unwrap();
        engine.add_callback_handler("go", recording_handler(tx));

        assert_eq!(
            engine.dispatch(text_message(1, 666, 666, "private", "hi")).await,
            Outcome::Blocked
        );
        assert_eq!(engine.dispatch(callback(2, 666, "go")).await, Outcome::Blocked);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        assert!(global.try_recv().is_none());
        assert!(chat.try_recv().is_none());

        engine.unblock_user(666);
        assert_eq!(
            engine.dispatch(text_message(3, 666, 666, "private", "hi")).await,
            Outcome::Handled(Route::Pattern)
        );
    }

    #[tokio::test]
    async fn test_middleware_runs_last_added_first() {
        let engine = DispatchEngine::new();
        let global = engine.global_channel();

        fn fields_set(message: &Message) -> i64 {
            i64::from(message.date != 0)
                + i64::from(message.message_id != 0)
                + i64::from(message.text.is_some())
        }

        engine.add_middleware(|mut update: Update, next: Next| async move {
            if let Some(message) = update.message_mut() {
                message.date = fields_set(message) + 1;
            }
            next.run(update).await
        });
        engine.add_middleware(|mut update: Update, next: Next| async move {
            if let Some(message) = update.message_mut() {
                message.message_id = fields_set(message) + 1;
            }
            next.run(update).await
        });
        engine.add_middleware(|mut update: Update, next: Next| async move {
            if let Some(message) = update.message_mut() {
                message.caption = Some((fields_set(message) + 1).to_string());
                message.text = Some(String::new());
            }
            next.run(update).await
        });

        let blank = update(json!({
            "update_id": 1,
            "message": { "message_id": 0, "chat": { "id": 1, "type": "private" } }
        }));
        engine.dispatch(blank).await;

        let seen = global.try_recv().unwrap();
        let message = seen.message().unwrap();
        assert_eq!(message.caption.as_deref(), Some("1"));
        assert_eq!(message.message_id, 2);
        assert_eq!(message.date, 3);
    }

    #[tokio::test]
    async fn test_middleware_can_halt() {
        let engine = DispatchEngine::new();
        let global = engine.global_channel();
        engine.add_middleware(|update: Update, next: Next| async move {
            if update.text() == Some("spam") {
                return Outcome::Halted;
            }
            next.run(update).await
        });

        assert_eq!(
            engine.dispatch(text_message(1, 5, 5, "private", "spam")).await,
            Outcome::Halted
        );
        assert!(global.try_recv().is_none());
        assert!(engine.dispatch(text_message(2, 5, 5, "private", "ham")).await.is_routed());
    }

    #[tokio::test]
    async fn test_registered_poll_observes_updates() {
        let engine = DispatchEngine::new();
        let tracked = Arc::new(TrackedPoll::new("p1", "regular").unwrap());
        engine.register_poll("p1", tracked.clone());

        assert_eq!(
            engine.dispatch(poll(1, "p1", 4)).await,
            Outcome::Handled(Route::Poll)
        );
        assert_eq!(tracked.total_voters(), 4);
        assert_eq!(tracked.update_count(), 1);

        engine.unregister_poll("p1");
        assert!(matches!(
            engine.dispatch(poll(2, "p1", 5)).await,
            Outcome::Delivered { .. }
        ));
        assert_eq!(tracked.update_count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_poll_observer_is_contained() {
        struct Exploding;

        impl PollObserver for Exploding {
            fn on_poll(&self, poll: &Poll) {
                assert_ne!(poll.id, "p1", "observer exploded");
            }
        }

        let engine = DispatchEngine::new();
        engine.register_poll("p1", Arc::new(Exploding));
        let tracked = Arc::new(TrackedPoll::new("p2", "regular").unwrap());
        engine.register_poll("p2", tracked.clone());

        let outcome = tokio::spawn({
            let engine = engine.clone();
            async move { engine.dispatch(poll(1, "p1", 1)).await }
        })
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::Handled(Route::Poll));

        assert_eq!(
            engine.dispatch(poll(2, "p2", 3)).await,
            Outcome::Handled(Route::Poll)
        );
        assert_eq!(tracked.total_voters(), 3);
    }

    #[tokio::test]
    async fn test_unknown_poll_goes_to_global() {
        let engine = DispatchEngine::new();
        let global = engine.global_channel();

        let outcome = engine.dispatch(poll(1, "missing", 1)).await;
        assert_eq!(
            outcome,
            Outcome::Delivered {
                chat: GLOBAL_SCOPE.into(),
                media: ALL_MEDIA.into()
            }
        );
        assert_eq!(global.try_recv().map(|u| u.type_tag()), Some("poll"));
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_break_dispatch() {
        let engine = DispatchEngine::new();
        engine.add_callback_handler("boom", |update: Update| async move {
            assert_eq!(update.update_id, 0, "handler exploded");
        });

        assert_eq!(
            engine.dispatch(callback(1, 5, "boom")).await,
            Outcome::Handled(Route::Callback)
        );
        tokio::task::yield_now().await;
        assert_eq!(
            engine.dispatch(callback(2, 5, "boom")).await,
            Outcome::Handled(Route::Callback)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_degrades_to_global() {
        let engine = DispatchEngine::with_config(
            DispatchConfig::new().with_send_timeout(Duration::from_millis(50)),
        );
        let stalled = engine.register_channel("100", "");
        let global = engine.global_channel();

        assert_eq!(
            engine.dispatch(text_message(1, 5, 100, "private", "a")).await,
            Outcome::Delivered {
                chat: "100".into(),
                media: ALL_MEDIA.into()
            }
        );
        assert_eq!(
            engine.dispatch(text_message(2, 5, 100, "private", "b")).await,
            Outcome::Delivered {
                chat: GLOBAL_SCOPE.into(),
                media: ALL_MEDIA.into()
            }
        );
        assert_eq!(
            engine.dispatch(text_message(3, 5, 100, "private", "c")).await,
            Outcome::Dropped
        );

        assert_eq!(stalled.try_recv().map(|u| u.update_id), Some(1));
        assert_eq!(global.try_recv().map(|u| u.update_id), Some(2));
    }

    #[tokio::test]
    async fn test_closed_chat_channel_degrades_to_global() {
        let engine = DispatchEngine::new();
        let retired = engine.register_channel("100", "");
        let global = engine.global_channel();
        retired.close().await;

        assert_eq!(
            engine.dispatch(text_message(1, 5, 100, "private", "a")).await,
            Outcome::Delivered {
                chat: GLOBAL_SCOPE.into(),
                media: ALL_MEDIA.into()
            }
        );
        assert_eq!(global.try_recv().map(|u| u.update_id), Some(1));
        assert!(retired.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_engines_are_independent() {
        let first = DispatchEngine::new();
        let second = DispatchEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        first.add_callback_handler("x", recording_handler(tx));

        assert!(matches!(
            second.dispatch(callback(1, 5, "x")).await,
            Outcome::Delivered { .. }
        ));
        assert_eq!(
            first.dispatch(callback(2, 5, "x")).await,
            Outcome::Handled(Route::Callback)
        );
        assert_eq!(received(&mut rx).await, Some(2));
    }
}
