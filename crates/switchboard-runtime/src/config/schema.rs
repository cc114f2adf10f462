//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use switchboard_dispatch::DispatchConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitchboardConfig {
    /// Dispatch engine and ingestion settings.
    #[serde(default)]
    pub dispatch: DispatchSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Dispatch
// =============================================================================

/// How the ingestion driver hands updates to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// One update at a time, in arrival order (long polling).
    #[default]
    Sequential,
    /// One task per update, no ordering between updates (webhooks).
    Concurrent,
}

impl IngestMode {
    /// Returns the mode name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `[dispatch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    /// Users whose updates are dropped before routing.
    #[serde(default)]
    pub blocked_users: Vec<i64>,

    /// Upper bound for one channel send in milliseconds; unset waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,

    /// Capacity of every update channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Sequential or concurrent ingestion.
    #[serde(default)]
    pub ingest_mode: IngestMode,

    /// Upper bound on updates dispatched at once in concurrent mode.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            blocked_users: Vec::new(),
            send_timeout_ms: None,
            channel_capacity: default_channel_capacity(),
            ingest_mode: IngestMode::default(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl DispatchSection {
    /// Converts this section to the engine configuration.
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        let config = DispatchConfig::new()
            .with_blocked_users(self.blocked_users.iter().copied())
            .with_channel_capacity(self.channel_capacity);

        match self.send_timeout_ms {
            Some(ms) => config.with_send_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

fn default_channel_capacity() -> usize {
    1
}

fn default_max_in_flight() -> usize {
    256
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level name as used in filter directives.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Single-line with all fields.
    Full,
    /// Multi-line, human oriented.
    Pretty,
    /// Newline-delimited JSON.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// The file at `logging.file_path`.
    File,
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// The `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Base level for every module without a filter.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required when `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-module levels, e.g. `switchboard_dispatch = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_section_defaults() {
        let section = DispatchSection::default();
        assert_eq!(section.channel_capacity, 1);
        assert_eq!(section.ingest_mode, IngestMode::Sequential);

        let config = section.to_dispatch_config();
        assert!(config.send_timeout.is_none());
        assert!(config.blocked_users.is_empty());
    }

    #[test]
    fn test_dispatch_section_conversion() {
        let section = DispatchSection {
            blocked_users: vec![7, 8],
            send_timeout_ms: Some(1500),
            channel_capacity: 16,
            ..Default::default()
        };

        let config = section.to_dispatch_config();
        assert_eq!(config.blocked_users, vec![7, 8]);
        assert_eq!(config.send_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.channel_capacity, 16);
    }

    #[test]
    fn test_partial_sections_deserialize() {
        let config: SwitchboardConfig = serde_json::from_value(serde_json::json!({
            "dispatch": { "ingest_mode": "concurrent" },
            "logging": { "level": "debug", "filters": { "switchboard_dispatch": "trace" } }
        }))
        .unwrap();

        assert_eq!(config.dispatch.ingest_mode, IngestMode::Concurrent);
        assert_eq!(config.dispatch.channel_capacity, 1);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.logging.filters.get("switchboard_dispatch"),
            Some(&LogLevel::Trace)
        );
    }
}
