//! Switchboard Runtime - ingestion and ambient setup for the dispatch engine.
//!
//! This crate provides:
//! - Layered configuration loading (`config`)
//! - Logging initialization (`logging`)
//! - The ingestion boundary ([`UpdateSource`]) and the driver that feeds a
//!   [`DispatchEngine`](switchboard_dispatch::DispatchEngine) from it
//!   ([`SwitchboardRuntime`])
//!
//! ```ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = SwitchboardRuntime::new();
//!     let unclaimed = runtime.engine().global_channel();
//!
//!     tokio::spawn(async move {
//!         while let Some(update) = unclaimed.recv().await {
//!             tracing::info!(update_id = update.update_id, "unclaimed");
//!         }
//!     });
//!
//!     let (tx, rx) = tokio::sync::mpsc::channel(64);
//!     tokio::spawn(long_poll(tx));
//!
//!     // Run until the poller stops or Ctrl+C
//!     runtime.run_source(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod source;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, IngestMode, SwitchboardConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, RuntimeStats, SwitchboardRuntime};
pub use source::{StreamSource, UpdateSource};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
