//! Playlist sequencer tests
//!
//! Run real playlists through `StreamingVoice`s on the sped-up software
//! voice device and observe navigation through display snapshots and bus
//! events.

use bridge_desktop::ClockedVoiceDevice;
use bridge_traits::VoiceDevice;
use core_library::{FactoryTrack, Playlist, Track, TrackInfo};
use core_playback::{
    PcmChunk, PcmFormat, PlayState, PlaybackError, Result, SampleSource, StreamingConfig,
};
use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent, PlaylistEvent};
use core_service::{CoreError, PlaylistSequencer, SequencerConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RATE: u32 = 8000;

// ============================================================================
// Test Fixtures
// ============================================================================

/// Forward-only 16-bit mono ramp.
struct RampSource {
    total: u64,
    cursor: u64,
}

impl SampleSource for RampSource {
    fn format(&self) -> PcmFormat {
        PcmFormat::Pcm16X1
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn total_samples(&self) -> u64 {
        self.total
    }

    fn reset(&mut self, sample: u64) -> Result<()> {
        self.cursor = sample.min(self.total);
        Ok(())
    }

    fn fill_buffer(&mut self, wanted: usize) -> Result<PcmChunk> {
        let n = (wanted as u64).min(self.total - self.cursor);
        let values = (self.cursor..self.cursor + n)
            .map(|i| (i % 1000) as i16)
            .collect();
        self.cursor += n;
        PcmChunk::from_i16(PcmFormat::Pcm16X1, values)
    }
}

fn track(name: &str, seconds: f64) -> Arc<dyn Track> {
    let total = (seconds * f64::from(RATE)) as u64;
    Arc::new(FactoryTrack::new(
        TrackInfo::new(name)
            .with_album("Test Album")
            .with_artist("Test Artist")
            .with_duration(Duration::from_secs_f64(seconds)),
        move || Ok(Box::new(RampSource { total, cursor: 0 }) as Box<dyn SampleSource>),
    ))
}

fn broken_track(name: &str) -> Arc<dyn Track> {
    Arc::new(FactoryTrack::new(TrackInfo::new(name), || {
        Err(PlaybackError::SourceError("song table corrupt".to_string()))
    }))
}

fn playlist(tracks: &[(&str, f64)]) -> Playlist {
    tracks
        .iter()
        .map(|(name, seconds)| track(name, *seconds))
        .collect()
}

fn test_config() -> SequencerConfig {
    SequencerConfig::default()
        .with_poll_interval(Duration::from_millis(2))
        .with_streaming(
            StreamingConfig::default()
                .with_chunk_samples(1600)
                .with_prebuffer(Duration::from_millis(400))
                .with_poll_interval(Duration::from_millis(2)),
        )
}

struct Harness {
    device: Arc<ClockedVoiceDevice>,
    sequencer: Arc<PlaylistSequencer>,
    events: EventStream,
}

fn harness(playlist: Playlist, speed: f64, config: SequencerConfig) -> Harness {
    let device = Arc::new(ClockedVoiceDevice::with_speed(speed));
    let bus = EventBus::new(1024);
    let events = EventStream::new(bus.subscribe());
    let voice_device: Arc<dyn VoiceDevice> = device.clone();
    let sequencer =
        Arc::new(PlaylistSequencer::new(voice_device, playlist, config).with_event_bus(bus));
    Harness {
        device,
        sequencer,
        events,
    }
}

fn spawn_run(
    sequencer: &Arc<PlaylistSequencer>,
) -> tokio::task::JoinHandle<core_service::Result<()>> {
    let sequencer = sequencer.clone();
    tokio::spawn(async move { sequencer.run().await })
}

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    false
}

async fn wait_for_index(sequencer: &PlaylistSequencer, index: i32) -> bool {
    wait_until(Duration::from_secs(5), || {
        sequencer
            .display_state()
            .is_some_and(|state| state.track_index == index)
    })
    .await
}

/// Titles of `TrackChanged` events, in order.
fn track_changes(events: &mut EventStream) -> Vec<String> {
    events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            CoreEvent::Playlist(PlaylistEvent::TrackChanged { title, .. }) => Some(title),
            _ => None,
        })
        .collect()
}

/// Title of the next `TrackChanged` event, waiting up to five seconds.
async fn next_track_change(events: &mut EventStream) -> Option<String> {
    let wait = async {
        while let Ok(event) = events.recv().await {
            if let CoreEvent::Playlist(PlaylistEvent::TrackChanged { title, .. }) = event {
                return Some(title);
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .ok()
        .flatten()
}

// ============================================================================
// Run Loop
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plays_every_track_to_the_end() {
    let mut h = harness(
        playlist(&[("one", 1.5), ("two", 1.5), ("three", 1.5)]),
        20.0,
        test_config(),
    );

    tokio::time::timeout(Duration::from_secs(10), h.sequencer.run())
        .await
        .expect("playlist should finish")
        .unwrap();

    assert!(h.sequencer.ended());
    assert!(h.sequencer.display_state().is_none());
    assert_eq!(track_changes(&mut h.events), ["one", "two", "three"]);

    let stats = h.device.stats();
    assert_eq!(stats.voices_opened, 3);
    assert_eq!(stats.voices_released, 3);
    assert_eq!(stats.buffers_created, stats.buffers_deleted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finished_event_counts_tracks() {
    let mut h = harness(playlist(&[("only", 1.2)]), 20.0, test_config());
    h.sequencer.run().await.unwrap();

    let mut finished = None;
    for event in h.events.drain() {
        if let CoreEvent::Playlist(PlaylistEvent::Finished { tracks_played }) = event {
            finished = Some(tracks_played);
        }
    }
    assert_eq!(finished, Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_starts_once() {
    let h = harness(playlist(&[("long", 30.0)]), 4.0, test_config());
    let runner = spawn_run(&h.sequencer);
    assert!(wait_for_index(&h.sequencer, 0).await);

    assert!(matches!(
        h.sequencer.run().await,
        Err(CoreError::AlreadyRunning)
    ));

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
    assert!(h.sequencer.ended());
    assert!(!h.sequencer.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_playlist_finishes_immediately() {
    let h = harness(Playlist::new(), 4.0, test_config());
    h.sequencer.run().await.unwrap();
    assert!(h.sequencer.ended());
    assert_eq!(h.device.stats().voices_opened, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_stop_disposes_current_voice() {
    let h = harness(playlist(&[("long", 30.0), ("next", 30.0)]), 4.0, test_config());
    let runner = spawn_run(&h.sequencer);
    assert!(wait_for_index(&h.sequencer, 0).await);

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();

    let stats = h.device.stats();
    assert_eq!(stats.voices_opened, 1);
    assert_eq!(stats.voices_released, 1);
    assert_eq!(stats.buffers_created, stats.buffers_deleted);
}

// ============================================================================
// Navigation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_skip_forward_through_playlist() {
    let mut h = harness(
        playlist(&[("a", 30.0), ("b", 30.0), ("c", 30.0)]),
        4.0,
        test_config(),
    );
    let runner = spawn_run(&h.sequencer);

    assert!(wait_for_index(&h.sequencer, 0).await);
    h.sequencer.skip(1);
    assert!(wait_for_index(&h.sequencer, 1).await);
    h.sequencer.skip(1);
    assert!(wait_for_index(&h.sequencer, 2).await);

    // Skipping past the last track ends the run.
    h.sequencer.skip(1);
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("run should end")
        .unwrap()
        .unwrap();
    assert_eq!(track_changes(&mut h.events), ["a", "b", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_early_skip_back_goes_to_previous_track() {
    let tracks = [("t0", 30.0), ("t1", 30.0), ("t2", 30.0), ("t3", 30.0), ("t4", 30.0)];
    let config = test_config().with_double_back_threshold(Duration::from_secs(3600));
    let h = harness(playlist(&tracks), 4.0, config);
    let runner = spawn_run(&h.sequencer);

    assert!(wait_for_index(&h.sequencer, 0).await);
    h.sequencer.skip(2);
    assert!(wait_for_index(&h.sequencer, 2).await);

    h.sequencer.skip(-1);
    assert!(wait_for_index(&h.sequencer, 0).await);

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_skip_back_restarts_previous_track() {
    let tracks = [("t0", 30.0), ("t1", 30.0), ("t2", 30.0), ("t3", 30.0), ("t4", 30.0)];
    let config = test_config().with_double_back_threshold(Duration::ZERO);
    let h = harness(playlist(&tracks), 4.0, config);
    let runner = spawn_run(&h.sequencer);

    assert!(wait_for_index(&h.sequencer, 0).await);
    h.sequencer.skip(2);
    assert!(wait_for_index(&h.sequencer, 2).await);

    h.sequencer.skip(-1);
    assert!(wait_for_index(&h.sequencer, 1).await);

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_skip_back_from_first_track_restarts_it() {
    let config = test_config().with_double_back_threshold(Duration::ZERO);
    let mut h = harness(playlist(&[("first", 30.0), ("second", 30.0)]), 4.0, config);
    let runner = spawn_run(&h.sequencer);

    assert!(wait_for_index(&h.sequencer, 0).await);
    h.events.drain();
    h.sequencer.skip(-1);

    assert_eq!(next_track_change(&mut h.events).await.as_deref(), Some("first"));
    assert!(!runner.is_finished());
    assert!(wait_for_index(&h.sequencer, 0).await);

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_early_skip_back_on_second_track_restarts_first() {
    let mut h = harness(
        playlist(&[("a", 0.6), ("b", 20.0), ("c", 20.0)]),
        4.0,
        test_config(),
    );
    let runner = spawn_run(&h.sequencer);

    assert!(wait_for_index(&h.sequencer, 1).await);
    h.events.drain();
    h.sequencer.skip(-1);

    assert_eq!(next_track_change(&mut h.events).await.as_deref(), Some("a"));
    assert!(!runner.is_finished());

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_latest_skip_intent_wins() {
    let h = harness(playlist(&[("a", 30.0)]), 4.0, test_config());
    h.sequencer.skip(1);
    h.sequencer.skip(-3);
    h.sequencer.skip(0);
    assert_eq!(h.sequencer.pending_skip(), -3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_insert_before_current_keeps_navigation_on_ids() {
    let mut h = harness(playlist(&[("a", 30.0), ("b", 30.0)]), 4.0, test_config());
    let runner = spawn_run(&h.sequencer);
    assert!(wait_for_index(&h.sequencer, 0).await);

    h.sequencer
        .edit_playlist(|playlist| playlist.insert(0, track("intro", 30.0)))
        .unwrap();
    assert!(wait_for_index(&h.sequencer, 1).await);

    h.sequencer.skip(1);
    assert!(
        wait_until(Duration::from_secs(5), || {
            h.sequencer
                .display_state()
                .is_some_and(|state| state.name == "b" && state.track_index == 2)
        })
        .await
    );

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
    assert_eq!(track_changes(&mut h.events), ["a", "b"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_current_track_restarts_from_top() {
    let h = harness(playlist(&[("a", 30.0), ("b", 30.0)]), 4.0, test_config());
    let runner = spawn_run(&h.sequencer);
    assert!(wait_for_index(&h.sequencer, 0).await);

    let current = h.sequencer.current_id().unwrap();
    assert!(h.sequencer.edit_playlist(|playlist| playlist.remove_id(current)));
    assert!(wait_for_index(&h.sequencer, -1).await);

    h.sequencer.skip(1);
    assert!(
        wait_until(Duration::from_secs(5), || {
            h.sequencer
                .display_state()
                .is_some_and(|state| state.name == "b" && state.track_index == 0)
        })
        .await
    );

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unopenable_track_is_skipped() {
    let mut list = Playlist::new();
    list.push(broken_track("broken"));
    list.push(track("fine", 1.2));
    let mut h = harness(list, 20.0, test_config());

    h.sequencer.run().await.unwrap();

    let mut saw_error = false;
    let mut titles = Vec::new();
    for event in h.events.drain() {
        match event {
            CoreEvent::Playback(PlaybackEvent::Error {
                message,
                recoverable,
                ..
            }) => {
                assert!(recoverable);
                assert!(message.contains("song table corrupt"));
                saw_error = true;
            }
            CoreEvent::Playlist(PlaylistEvent::TrackChanged { title, .. }) => titles.push(title),
            _ => {}
        }
    }
    assert!(saw_error);
    assert_eq!(titles, ["broken", "fine"]);
}

// ============================================================================
// Transport Controls and Display
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_display_state_describes_current_track() {
    let h = harness(playlist(&[("a", 30.0), ("b", 30.0), ("c", 30.0)]), 4.0, test_config());
    assert!(h.sequencer.display_state().is_none());

    let runner = spawn_run(&h.sequencer);
    assert!(wait_for_index(&h.sequencer, 0).await);
    h.sequencer.set_message(Some("now streaming".to_string()));

    let state = h.sequencer.display_state().unwrap();
    assert_eq!(state.track_count, 3);
    assert_eq!(state.name, "a");
    assert_eq!(state.album, "Test Album");
    assert_eq!(state.artist, "Test Artist");
    assert_eq!(state.duration_seconds, 30.0);
    assert!(state.elapsed_seconds < 30.0);
    assert_eq!(state.message.as_deref(), Some("now streaming"));

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_toggle_and_stop_keep_the_track() {
    let h = harness(playlist(&[("a", 30.0), ("b", 30.0)]), 4.0, test_config());
    let runner = spawn_run(&h.sequencer);
    assert!(wait_for_index(&h.sequencer, 0).await);
    let playing = h.sequencer.current_id();

    h.sequencer.toggle().await.unwrap();
    let state = h.sequencer.display_state().unwrap();
    assert_eq!(state.play_state, PlayState::Stopped);
    let stopped_at = state.elapsed_seconds;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.sequencer.current_id(), playing);

    h.sequencer.toggle().await.unwrap();
    let state = h.sequencer.display_state().unwrap();
    assert_ne!(state.play_state, PlayState::Stopped);
    assert!(state.elapsed_seconds >= stopped_at);

    h.sequencer.stop_current().await.unwrap();
    assert_eq!(
        h.sequencer.display_state().unwrap().play_state,
        PlayState::Stopped
    );

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_seek_moves_within_track() {
    let h = harness(playlist(&[("a", 30.0)]), 4.0, test_config());
    let runner = spawn_run(&h.sequencer);
    assert!(wait_for_index(&h.sequencer, 0).await);

    h.sequencer.seek(10.0).await.unwrap();
    let state = h.sequencer.display_state().unwrap();
    assert!(state.elapsed_seconds >= 10.0, "at {}", state.elapsed_seconds);

    h.sequencer.request_stop();
    runner.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_controls_without_a_track_are_no_ops() {
    let h = harness(playlist(&[("a", 30.0)]), 4.0, test_config());
    h.sequencer.stop_current().await.unwrap();
    h.sequencer.seek(5.0).await.unwrap();
    h.sequencer.toggle().await.unwrap();
    assert!(h.sequencer.current_id().is_none());
}
