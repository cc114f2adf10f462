//! Configuration module for the Switchboard runtime.
//!
//! Layered figment-based loading and validation of the dispatch and logging
//! settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchSection, IngestMode, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig, SwitchboardConfig,
};
pub use validation::validate_config;
