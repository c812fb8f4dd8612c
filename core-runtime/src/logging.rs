//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with the `tracing` crate, supporting:
//! - JSON, pretty and compact output formats
//! - Module-level filtering
//! - Integration with host logging via `LoggerSink`
//! - Span contexts (streaming sessions run inside a `stream_session` span)
//!
//! ## Overview
//!
//! This module configures the `tracing-subscriber` infrastructure and forwards
//! events to an optional host [`LoggerSink`]. When a sink is configured, every
//! event that survives filtering is mirrored to the host logger while still
//! flowing through the standard `tracing` layers.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::{ConsoleLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use std::sync::Arc;
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Pretty)
//!     .with_level(LogLevel::Debug)
//!     .with_logger_sink(Arc::new(ConsoleLogger::default()));
//!
//! init_logging(config)?;
//! tracing::info!("Engine started");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{LogEntry, LogLevel, LoggerSink};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, Layered, SubscriberExt},
    registry::{LookupSpan, Registry},
    util::SubscriberInitExt,
    Layer,
};

/// Crates whose level follows [`LoggingConfig::level`] under the default filter.
const WORKSPACE_TARGETS: &[&str] = &[
    "playful_workspace",
    "core_runtime",
    "core_playback",
    "core_library",
    "core_service",
    "bridge_desktop",
];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable output
    Pretty,
    /// One JSON object per event
    Json,
    /// Single-line output
    Compact,
}

impl Default for LogFormat {
    /// `Pretty` in debug builds, `Json` in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Logging configuration
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for the workspace crates when no `filter` is set
    pub level: LogLevel,
    /// `EnvFilter` directives replacing the default filter,
    /// e.g. `"core_playback=trace,core_service=debug"`
    pub filter: Option<String>,
    /// Host logger that receives a copy of every enabled event
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Report span activity (`stream_session`, `run`, ...)
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            logger_sink: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("has_logger_sink", &self.logger_sink.is_some())
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }

    /// Filter directives in effect: the custom filter, or the workspace
    /// crates at `level` and everything else at `warn`.
    fn directives(&self) -> String {
        if let Some(custom) = &self.filter {
            return custom.clone();
        }
        std::iter::once("warn".to_string())
            .chain(
                WORKSPACE_TARGETS
                    .iter()
                    .map(|target| format!("{}={}", target, self.level.as_str())),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install the global subscriber.
///
/// Call once at startup; a second call fails because a global subscriber
/// is already set.
///
/// # Errors
///
/// - `Config` if the filter directives do not parse
/// - `Config` if logging was already initialised
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let output = output_layer(&config);

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .with(LoggerSinkLayer::new(config.logger_sink))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    EnvFilter::try_new(config.directives())
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

type Filtered = Layered<EnvFilter, Registry>;

/// stdout layer in the configured format.
fn output_layer(config: &LoggingConfig) -> Box<dyn Layer<Filtered> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_thread_ids(config.display_thread_info)
        .with_thread_names(config.display_thread_info)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Pretty => layer
            .pretty()
            .with_span_events(if config.enable_spans {
                FmtSpan::ACTIVE
            } else {
                FmtSpan::NONE
            })
            .boxed(),
        LogFormat::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

// ============================================================================
// Host Sink Forwarding
// ============================================================================

/// Mirrors enabled events into a [`LoggerSink`].
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };

        let metadata = event.metadata();
        let level = log_level(metadata.level());
        if level < sink.min_level() {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = fields.values;
        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_span(span.name());
        }

        deliver(Arc::clone(sink), entry);
    }
}

/// Hand `entry` to the sink without blocking a runtime worker.
fn deliver(sink: Arc<dyn LoggerSink>, entry: LogEntry) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if let Err(err) = sink.log(entry).await {
                    eprintln!("LoggerSink error: {}", err);
                }
            });
        }
        Err(_) => {
            if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                eprintln!("LoggerSink error: {}", err);
            }
        }
    }
}

fn log_level(level: &tracing::Level) -> LogLevel {
    match *level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: BTreeMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

/// Strip a path or URI to its last segment.
///
/// Song loaders log the file they are probing without the user's
/// directory layout:
///
/// ```
/// use core_runtime::logging::strip_path;
///
/// assert_eq!(strip_path("/Users/jo/Music/theme.mid"), "theme.mid");
/// ```
pub fn strip_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::Mutex;

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_filter("core_playback=trace")
            .with_spans(false)
            .with_target(true)
            .with_thread_info(true);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.filter, Some("core_playback=trace".to_string()));
        assert!(!config.enable_spans);
        assert!(config.display_target);
        assert!(config.display_thread_info);
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(strip_path("/home/user/music/song.mod"), "song.mod");
        assert_eq!(strip_path("C:\\Users\\Jo\\Music\\song.mid"), "song.mid");
        assert_eq!(strip_path("song.mid"), "song.mid");
        assert_eq!(strip_path("file:///var/music/"), "");
    }

    #[test]
    fn test_default_format() {
        #[cfg(debug_assertions)]
        assert_eq!(LogFormat::default(), LogFormat::Pretty);

        #[cfg(not(debug_assertions))]
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }

    #[test]
    fn test_default_filter_covers_workspace_crates() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("core_playback=debug"));
        assert!(filter.contains("core_service=debug"));
    }

    #[test]
    fn test_build_custom_filter() {
        let config = LoggingConfig::default().with_filter("core_playback=trace,core_service=debug");
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("core_playback=trace"));
    }

    #[test]
    fn test_logger_sink_layer_forwards_event() {
        let sink = Arc::new(TestLoggerSink::default());
        let trait_sink: Arc<dyn LoggerSink> = sink.clone();
        let layer = LoggerSinkLayer::new(Some(trait_sink));
        let subscriber = tracing_subscriber::registry().with(layer);
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: "test.target", track = "overworld", "hello world");

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.target, "test.target");
        assert_eq!(entry.message, "hello world");
        assert_eq!(entry.fields.get("track"), Some(&"overworld".to_string()));
    }

    #[test]
    fn test_logger_sink_respects_min_level() {
        let sink = Arc::new(TestLoggerSink {
            min_level: LogLevel::Warn,
            ..Default::default()
        });
        let trait_sink: Arc<dyn LoggerSink> = sink.clone();
        let subscriber = tracing_subscriber::registry().with(LoggerSinkLayer::new(Some(trait_sink)));
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!("dropped");
        tracing::warn!("kept");

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "kept");
    }

    struct TestLoggerSink {
        entries: Mutex<Vec<LogEntry>>,
        min_level: LogLevel,
    }

    impl Default for TestLoggerSink {
        fn default() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
                min_level: LogLevel::Trace,
            }
        }
    }

    #[async_trait]
    impl LoggerSink for TestLoggerSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            self.min_level
        }
    }
}
