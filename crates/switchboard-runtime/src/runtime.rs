//! The ingestion driver.
//!
//! [`SwitchboardRuntime`] owns a [`DispatchEngine`] built from configuration
//! and drives an [`UpdateSource`] into it. Two ingestion modes exist:
//!
//! - **sequential**: one update at a time on the driving task, so dispatch
//!   order matches arrival order (long polling);
//! - **concurrent**: one task per update, bounded by `max_in_flight`, with no
//!   ordering between updates (webhooks).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! let runtime = SwitchboardRuntime::builder()
//!     .config_file("config/switchboard.toml")
//!     .build()?;
//!
//! runtime.engine().add_pattern_handler("^/start", on_start, ["private"])?;
//!
//! // Runs until the source ends or Ctrl+C
//! runtime.run_source(updates_rx).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchboard_dispatch::{DispatchEngine, Outcome};

use crate::config::{ConfigLoader, ConfigResult, IngestMode, SwitchboardConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::source::UpdateSource;

/// Drives update sources into a [`DispatchEngine`].
pub struct SwitchboardRuntime {
    config: SwitchboardConfig,
    engine: DispatchEngine,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl SwitchboardRuntime {
    /// Creates a runtime from the configuration found in the current directory.
    ///
    /// Falls back to defaults if no configuration can be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                SwitchboardConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration.
    ///
    /// Initializes logging from `config.logging` unless a subscriber is
    /// already installed.
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        logging::init_from_config(&config.logging);

        let engine = DispatchEngine::with_config(config.dispatch.to_dispatch_config());

        info!(
            log_level = %config.logging.level,
            ingest_mode = %config.dispatch.ingest_mode,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            engine,
            counters: Arc::new(Counters::new()),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    /// Returns the dispatch engine; register handlers and channels here.
    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// Returns whether a source is currently being driven.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the dispatch counters.
    pub fn stats(&self) -> RuntimeStats {
        self.counters.snapshot()
    }

    /// Returns the highest update id dispatched so far.
    pub fn last_update_id(&self) -> Option<i64> {
        self.counters.last_update_id()
    }

    /// Returns the long-poll offset that acknowledges every dispatched update.
    pub fn next_offset(&self) -> i64 {
        self.last_update_id().map_or(0, |id| id + 1)
    }

    /// Returns the token that stops the runtime when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops the runtime. A stopped runtime does not start again.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Drives `source` until it is exhausted, [`shutdown`](Self::shutdown) is
    /// called, or the process receives Ctrl+C / SIGTERM.
    pub async fn run_source<S: UpdateSource>(&self, source: S) -> RuntimeResult<()> {
        info!("Switchboard runtime is running. Press Ctrl+C to stop.");
        self.run_until(source, wait_for_shutdown()).await
    }

    /// Drives `source` until it is exhausted, `shutdown` resolves, or
    /// [`shutdown`](Self::shutdown) is called.
    ///
    /// In concurrent mode, updates already in flight are awaited before this
    /// returns.
    pub async fn run_until<S, F>(&self, mut source: S, shutdown: F) -> RuntimeResult<()>
    where
        S: UpdateSource,
        F: Future<Output = ()>,
    {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Runtime is already running");
            return Err(RuntimeError::AlreadyRunning);
        }

        let mode = self.config.dispatch.ingest_mode;
        info!(mode = %mode, "Starting update ingestion");

        let result = self.drive(&mut source, mode, shutdown).await;

        self.running.store(false, Ordering::Release);
        info!(stats = %self.stats(), "Update ingestion stopped");
        result
    }

    async fn drive<S, F>(&self, source: &mut S, mode: IngestMode, shutdown: F) -> RuntimeResult<()>
    where
        S: UpdateSource,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let limit = Arc::new(Semaphore::new(self.config.dispatch.max_in_flight.max(1)));
        let mut in_flight = JoinSet::new();

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
                next = source.next_update() => next,
            };

            let update = match next {
                Ok(Some(update)) => update,
                Ok(None) => {
                    debug!("Update source exhausted");
                    break Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Update source failed");
                    break Err(e);
                }
            };
            let update_id = update.update_id;

            match mode {
                IngestMode::Sequential => {
                    let outcome = self.engine.dispatch(update).await;
                    self.counters.record(update_id, &outcome);
                }
                IngestMode::Concurrent => {
                    let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
                        break Ok(());
                    };
                    let engine = self.engine.clone();
                    let counters = Arc::clone(&self.counters);
                    in_flight.spawn(async move {
                        let outcome = engine.dispatch(update).await;
                        counters.record(update_id, &outcome);
                        drop(permit);
                    });

                    while let Some(finished) = in_flight.try_join_next() {
                        log_join_error(finished);
                    }
                }
            }

            source.acknowledge(update_id);
        };

        if !in_flight.is_empty() {
            debug!(remaining = in_flight.len(), "Waiting for in-flight dispatches");
        }
        while let Some(finished) = in_flight.join_next().await {
            log_join_error(finished);
        }

        result
    }
}

impl Default for SwitchboardRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SwitchboardRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchboardRuntime")
            .field("engine", &self.engine)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Dispatch task failed");
    }
}

/// Waits for Ctrl+C or, on unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = wait_for_ctrl_c() => {}
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

const NO_UPDATE: i64 = i64::MIN;

struct Counters {
    received: AtomicU64,
    handled: AtomicU64,
    delivered: AtomicU64,
    blocked: AtomicU64,
    halted: AtomicU64,
    dropped: AtomicU64,
    last_update_id: AtomicI64,
}

impl Counters {
    fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            handled: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            halted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_update_id: AtomicI64::new(NO_UPDATE),
        }
    }

    fn record(&self, update_id: i64, outcome: &Outcome) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.last_update_id.fetch_max(update_id, Ordering::AcqRel);

        let counter = match outcome {
            Outcome::Handled(_) => &self.handled,
            Outcome::Delivered { .. } => &self.delivered,
            Outcome::Blocked => &self.blocked,
            Outcome::Halted => &self.halted,
            Outcome::Dropped => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn last_update_id(&self) -> Option<i64> {
        match self.last_update_id.load(Ordering::Acquire) {
            NO_UPDATE => None,
            id => Some(id),
        }
    }

    fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            halted: self.halted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Dispatch counters, one per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Updates dispatched.
    pub received: u64,
    /// Claimed by a handler or poll observer.
    pub handled: u64,
    /// Delivered to a channel.
    pub delivered: u64,
    /// From blocked users.
    pub blocked: u64,
    /// Stopped by middleware.
    pub halted: u64,
    /// No channel accepted them.
    pub dropped: u64,
}

impl fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} handled={} delivered={} blocked={} halted={} dropped={}",
            self.received, self.handled, self.delivered, self.blocked, self.halted, self.dropped
        )
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`SwitchboardRuntime`] with custom configuration.
///
/// ```rust,ignore
/// let runtime = SwitchboardRuntime::builder()
///     .config_file("config/switchboard.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> ConfigResult<SwitchboardRuntime> {
        let config = self.config_loader.load()?;
        Ok(SwitchboardRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
