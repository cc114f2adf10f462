//! # Switchboard
//!
//! An update dispatch engine for bot messaging platforms.
//!
//! ## Overview
//!
//! Switchboard takes the stream of inbound updates a bot receives and routes
//! each one to exactly one consumer: a text-pattern handler, a callback-button
//! handler, a one-shot request handler, a poll observer, a per-chat channel, or
//! the global fallback channel. User middleware runs first and a block list
//! drops updates from unwanted users before anything else happens.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────┐     ┌─────────────────────────┐
//! │ UpdateSource │────▶│  SwitchboardRuntime  │────▶│     DispatchEngine      │──▶ handler tasks
//! │ (poll/hook)  │     │ sequential/concurrent│     │ block → middleware →    │──▶ chat channels
//! └──────────────┘     └──────────────────────┘     │ handlers → channels     │──▶ global channel
//!                                                   └─────────────────────────┘
//! ```
//!
//! - **Core**: the `Update` model, chat types, the match tree and registries
//! - **Dispatch**: the engine, middleware chain and channel registry
//! - **Runtime**: configuration, logging and the ingestion driver
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = SwitchboardRuntime::new();
//!     let engine = runtime.engine();
//!
//!     engine.add_pattern_handler("^/start", |update: Update| async move {
//!         info!(update_id = update.update_id, "start command");
//!     }, ["private"])?;
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     tokio::spawn(long_poll(tx));
//!     runtime.run_source(rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use switchboard_core as core;
pub use switchboard_dispatch as dispatch;
pub use switchboard_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use switchboard::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use switchboard_runtime::{
        ConfigLoader, IngestMode, RuntimeStats, StreamSource, SwitchboardConfig,
        SwitchboardRuntime, UpdateSource,
    };

    // Dispatch
    pub use switchboard_dispatch::{
        DispatchConfig, DispatchEngine, Middleware, Next, Outcome, PollObserver, Route,
        TrackedPoll, UpdateChannel,
    };

    // Update model
    pub use switchboard_core::{
        CallbackQuery, Chat, ChatType, DispatchError, DispatchResult, Handler, Message, Poll,
        Update, UpdateKind, User,
    };

    // Logging
    pub use switchboard_runtime::prelude::*;
}
