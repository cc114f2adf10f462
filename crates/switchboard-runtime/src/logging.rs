//! Logging setup for Switchboard.
//!
//! Every crate in the workspace logs through `tracing`; this module installs
//! the subscriber. The dispatcher opens a `dispatch` span per update and a
//! `handler` span per spawned handler task, so span events are the easiest way
//! to follow one update through the pipeline.
//!
//! From a loaded configuration:
//!
//! ```rust,ignore
//! let config = switchboard_runtime::config::load_config()?;
//! switchboard_runtime::logging::init_from_config(&config.logging);
//! ```
//!
//! Or by hand, e.g. to trace routing decisions:
//!
//! ```rust,ignore
//! use switchboard_runtime::logging::{LoggingBuilder, SpanEvents};
//! LoggingBuilder::new()
//!     .directive("switchboard_dispatch=debug")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    /// Also reports the span's busy and idle time.
    pub close: bool,
}

impl SpanEvents {
    /// Spans are silent.
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Span creation and close; shows how long each dispatch and handler took.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    /// All span events.
    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    /// Enter and exit only.
    pub const ACTIVE: Self = Self {
        new: false,
        enter: true,
        exit: true,
        close: false,
    };

    fn to_fmt_span(self) -> fmt::format::FmtSpan {
        let mut span = fmt::format::FmtSpan::NONE;
        if self.new {
            span |= fmt::format::FmtSpan::NEW;
        }
        if self.enter {
            span |= fmt::format::FmtSpan::ENTER;
        }
        if self.exit {
            span |= fmt::format::FmtSpan::EXIT;
        }
        if self.close {
            span |= fmt::format::FmtSpan::CLOSE;
        }
        span
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

/// Installs the subscriber described by `config`, unless one is already set.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Subscriber settings, applied by [`init`](Self::init) or [`try_init`](Self::try_init).
#[derive(Debug)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: tracing::Level,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    with_target: bool,
    with_thread_ids: bool,
    with_file: bool,
    with_line_number: bool,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Compact stdout output at `INFO`, no span events.
    pub fn new() -> Self {
        Self {
            directives: Vec::new(),
            level: tracing::Level::INFO,
            span_events: SpanEvents::NONE,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            file_path: None,
            rotation: LogRotation::Never,
        }
    }

    /// Mirrors `config`; per-module filters become directives.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new();

        builder.level = config.level.to_tracing_level();
        builder.format = config.format;
        builder.output = config.output;
        builder.span_events = SpanEvents::from(&config.span_events);
        builder.with_thread_ids = config.thread_ids;
        builder.with_file = config.file_location;
        builder.with_line_number = config.file_location;
        builder.file_path.clone_from(&config.file_path);
        builder.rotation = config.rotation;

        // Sorted so the resulting filter does not depend on map order.
        let mut filters: Vec<_> = config.filters.iter().collect();
        filters.sort_by(|a, b| a.0.cmp(b.0));
        for (module, level) in filters {
            builder
                .directives
                .push(format!("{}={}", module, level.as_str()));
        }

        builder
    }

    /// Base level for targets without a directive.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Add a filter directive, e.g. `switchboard_dispatch=trace`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Configure span events.
    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Prints the module path of each event.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Prints file and line of each event.
    pub fn with_file_location(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self.with_line_number = enabled;
        self
    }

    /// Log to `path` instead of a standard stream.
    pub fn file_path(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self.output = LogOutput::File;
        self
    }

    /// Set the log file rotation period.
    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Build the filter; `RUST_LOG` replaces the configured base level.
    fn build_filter(&self) -> EnvFilter {
        let base_filter = self.level.to_string().to_lowercase();

        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base_filter));

        for directive in &self.directives {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => warn!(directive = %directive, error = %e, "Ignoring invalid log directive"),
            }
        }

        filter
    }

    fn file_appender(&self, path: &Path) -> RollingFileAppender {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .unwrap_or_else(|| OsStr::new("switchboard.log"));

        match self.rotation {
            LogRotation::Never => rolling::never(dir, name),
            LogRotation::Hourly => rolling::hourly(dir, name),
            LogRotation::Daily => rolling::daily(dir, name),
        }
    }

    /// Like [`try_init`](Self::try_init), ignoring an existing subscriber.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber globally.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.build_filter();
        let span_events = self.span_events.to_fmt_span();

        macro_rules! configure_layer {
            ($layer:expr) => {
                $layer
                    .with_span_events(span_events)
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
            };
        }

        macro_rules! init_with_writer {
            ($writer:expr) => {
                match self.format {
                    #[cfg(feature = "json-log")]
                    LogFormat::Json => {
                        let layer = fmt::layer()
                            .json()
                            .with_span_events(span_events)
                            .with_writer($writer);
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Compact => {
                        let layer = configure_layer!(fmt::layer().compact().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Full => {
                        let layer = configure_layer!(fmt::layer().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Pretty => {
                        let layer = configure_layer!(fmt::layer().pretty().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(filter)
                            .try_init()
                    }
                }
            };
        }

        match (self.output, self.file_path.as_deref()) {
            (LogOutput::Stdout, _) => init_with_writer!(std::io::stdout),
            (LogOutput::Stderr, _) => init_with_writer!(std::io::stderr),
            (LogOutput::File, Some(path)) => {
                let appender = self.file_appender(path);
                init_with_writer!(appender)
            }
            (LogOutput::File, None) => {
                eprintln!("File log output requested without a file path, using stdout");
                init_with_writer!(std::io::stdout)
            }
        }
    }
}
