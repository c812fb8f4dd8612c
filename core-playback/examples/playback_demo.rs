//! # Streaming Playback Example
//!
//! Plays a synthesized chord through the software voice device, seeking
//! backwards and forwards to show the chunk cache replaying a forward-only
//! source.
//!
//! Run with: `cargo run --example playback_demo --package core-playback`

use bridge_desktop::ClockedVoiceDevice;
use bridge_traits::VoiceDevice;
use core_playback::cache::{CacheConfig, ChunkCache};
use core_playback::{
    PcmChunk, PcmFormat, PlayState, Result, SampleSource, StreamingConfig, StreamingVoice,
};
use core_runtime::events::{CoreEvent, EventBus};
use core_runtime::logging::{init_logging, LoggingConfig};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Forward-only Chord Synth
// ============================================================================

/// Renders three detuned square waves. Can only restart from the beginning.
struct ChordSynth {
    rate: u32,
    total: u64,
    cursor: u64,
}

impl ChordSynth {
    fn new(seconds: u64) -> Self {
        let rate = 22_050;
        Self {
            rate,
            total: u64::from(rate) * seconds,
            cursor: 0,
        }
    }

    fn frame(&self, n: u64) -> i16 {
        [262u64, 330, 392]
            .iter()
            .map(|hz| {
                let period = u64::from(self.rate) / hz;
                if (n % period) < period / 2 {
                    3_000i16
                } else {
                    -3_000
                }
            })
            .sum()
    }
}

impl SampleSource for ChordSynth {
    fn format(&self) -> PcmFormat {
        PcmFormat::Pcm16X1
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn total_samples(&self) -> u64 {
        self.total
    }

    fn reset(&mut self, _sample: u64) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn fill_buffer(&mut self, wanted: usize) -> Result<PcmChunk> {
        let n = (wanted as u64).min(self.total - self.cursor);
        let values = (self.cursor..self.cursor + n)
            .map(|i| self.frame(i))
            .collect();
        self.cursor += n;
        PcmChunk::from_i16(PcmFormat::Pcm16X1, values)
    }
}

// ============================================================================
// Main Example
// ============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::default().with_filter("core_playback=debug"))?;

    println!("=== Streaming Playback Demo ===\n");

    // Run the software clock at 4x so the demo finishes quickly.
    let device: Arc<dyn VoiceDevice> = Arc::new(ClockedVoiceDevice::with_speed(4.0));
    let source = ChunkCache::with_config(ChordSynth::new(12), CacheConfig::default())?;

    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let voice = StreamingVoice::new(device, Box::new(source), StreamingConfig::default())?
        .with_event_bus(bus, "chord");

    println!("Song length: {:?}", voice.duration());

    voice.play(Duration::from_secs(2)).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("After play:    {} at {:?}", voice.play_state(), voice.time_approx());

    voice.seek(-1.5).await?;
    println!("After rewind:  {} at {:?}", voice.play_state(), voice.time_approx());

    voice.pause().await?;
    println!("Paused:        {} at {:?}", voice.play_state(), voice.time_approx());
    voice.resume().await?;

    voice.seek(8.0).await?;
    while voice.play_state() != PlayState::Ended {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    println!("Ended:         position {} of {}", voice.position(), voice.total_samples());

    let stats = voice.stats();
    println!(
        "\nSessions: {}, buffers queued: {}, underrun restarts: {}",
        stats.sessions, stats.buffers_queued, stats.underrun_restarts
    );

    voice.dispose().await?;

    println!("\nEvents:");
    while let Ok(CoreEvent::Playback(event)) = events.try_recv() {
        println!("  {:?}", event);
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
