//! Integration tests for the logging bootstrap

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, strip_path, LogFormat, LoggingConfig};
use mockall::mock;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Sink {}

    #[async_trait]
    impl LoggerSink for Sink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()>;
        fn min_level(&self) -> LogLevel;
    }
}

#[test]
fn test_init_logging_forwards_to_sink_once() {
    let (tx, rx) = mpsc::channel();
    let mut sink = MockSink::new();
    sink.expect_min_level().return_const(LogLevel::Info);
    sink.expect_log().returning(move |entry| {
        tx.send(entry).ok();
        Ok(())
    });

    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Info)
        .with_logger_sink(Arc::new(sink));
    init_logging(config.clone()).unwrap();

    tracing::debug!(target: "core_playback", "below the configured level");
    tracing::warn!(target: "core_playback", voice = 3, "engine ready");

    let entry = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(entry.message, "engine ready");
    assert_eq!(entry.level, LogLevel::Warn);
    assert_eq!(entry.fields.get("voice"), Some(&"3".to_string()));
    assert!(rx.try_recv().is_err());

    // A global subscriber can only be installed once.
    assert!(init_logging(config).is_err());
}

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();
    assert_eq!(config.level, LogLevel::Info);
    assert!(config.filter.is_none());
    assert!(config.logger_sink.is_none());
    assert!(config.enable_spans);
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/music/chiptune/stage1.mod"), "stage1.mod");
    assert_eq!(strip_path("D:\\Games\\Music\\title.mid"), "title.mid");
}
