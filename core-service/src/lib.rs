//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host-provided voice device and logger from a
//! [`CoreConfig`] into the playback engine: it owns the event bus, the song
//! loader registry, and builds [`PlaylistSequencer`]s that share them.
//! Desktop apps typically enable the `desktop-shims` feature, which injects
//! the software `ClockedVoiceDevice` when no device is configured.

pub mod display;
pub mod error;
pub mod sequencer;

pub use display::{DisplayState, DisplayStateReader, DisplayStateWriter};
pub use error::{CoreError, Result};
pub use sequencer::{next_index, skip_offset, PlaylistSequencer, SequencerConfig};

use core_library::{LoaderRegistry, Playlist, ReadSeek, SongLoader, Track};
use core_runtime::events::{CoreEvent, EventBus, EventSeverity};
use core_runtime::logging::{init_logging, LoggingConfig};
use core_runtime::CoreConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Primary façade exposed to host applications.
pub struct CoreService {
    config: CoreConfig,
    event_bus: EventBus,
    loaders: RwLock<LoaderRegistry>,
    sequencer_defaults: SequencerConfig,
    event_log: Option<JoinHandle<()>>,
}

impl CoreService {
    /// Create a new service from a validated configuration.
    ///
    /// With `enable_event_log` set, a task mirroring every bus event into
    /// `tracing` is spawned on the current tokio runtime.
    pub fn new(config: CoreConfig) -> Self {
        let event_bus = EventBus::new(config.event_capacity);
        let event_log = config
            .features
            .enable_event_log
            .then(|| spawn_event_log(&event_bus))
            .flatten();
        let sequencer_defaults =
            SequencerConfig::default().with_chunk_cache(config.features.enable_chunk_cache);

        info!(
            device = config.voice_device.name(),
            chunk_cache = config.features.enable_chunk_cache,
            "Core service ready"
        );

        Self {
            config,
            event_bus,
            loaders: RwLock::new(LoaderRegistry::new()),
            sequencer_defaults,
            event_log,
        }
    }

    /// Initialise logging, then create the service.
    ///
    /// The configured logger sink, if any, is attached to the logging
    /// pipeline unless `logging` already names one.
    pub fn bootstrap(config: CoreConfig, mut logging: LoggingConfig) -> Result<Self> {
        if logging.logger_sink.is_none() {
            if let Some(sink) = &config.logger_sink {
                logging = logging.with_logger_sink(sink.clone());
            }
        }
        init_logging(logging).map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Replace the settings used by [`sequencer`](Self::sequencer).
    pub fn with_sequencer_config(mut self, config: SequencerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CoreError::Runtime(core_runtime::Error::Config(e)))?;
        self.sequencer_defaults = config;
        Ok(self)
    }

    // ========================================================================
    // Songs
    // ========================================================================

    pub fn register_loader(&self, loader: Arc<dyn SongLoader>) {
        self.loaders.write().register(loader);
    }

    /// Load every song any registered loader finds in `reader`.
    pub fn load_songs(&self, reader: &mut dyn ReadSeek, uri: &str) -> Result<Vec<Arc<dyn Track>>> {
        let loaders = self.loaders.read().clone();
        Ok(loaders.load(reader, uri)?)
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Build a sequencer for `playlist` on the configured device and bus.
    pub fn sequencer(&self, playlist: Playlist) -> Arc<PlaylistSequencer> {
        debug!(tracks = playlist.len(), "Creating sequencer");
        Arc::new(
            PlaylistSequencer::new(
                self.config.voice_device.clone(),
                playlist,
                self.sequencer_defaults.clone(),
            )
            .with_event_bus(self.event_bus.clone()),
        )
    }
}

impl Drop for CoreService {
    fn drop(&mut self) {
        if let Some(handle) = self.event_log.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("loaders", &*self.loaders.read())
            .field("event_log", &self.event_log.is_some())
            .finish()
    }
}

fn spawn_event_log(bus: &EventBus) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("Event log requested outside a tokio runtime; disabled");
        return None;
    };
    let mut events = bus.subscribe();

    Some(runtime.spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }))
}

fn log_event(event: &CoreEvent) {
    let description = event.description();
    match event.severity() {
        EventSeverity::Error => error!(?event, "{}", description),
        EventSeverity::Warning => warn!(?event, "{}", description),
        EventSeverity::Info => info!(?event, "{}", description),
        EventSeverity::Debug => debug!(?event, "{}", description),
    }
}
