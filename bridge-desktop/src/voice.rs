//! Software voice device
//!
//! A [`VoiceDevice`] that needs no audio hardware: each voice "plays" its
//! queued buffers against the monotonic clock, optionally sped up. Useful for
//! headless hosts and for exercising the streaming engine in tests.
//!
//! Queue semantics follow the buffer-queue model described in
//! [`bridge_traits::voice`]:
//! - `play` consumes from the first unprocessed buffer
//! - running out of unprocessed buffers switches the voice to `Stopped`
//! - `stop` marks every queued buffer processed
//! - `sample_offset` is zero unless the voice is playing or paused

use bridge_traits::{
    error::{BridgeError, Result},
    AudioVoice, BufferId, PcmFormat, VoiceDevice, VoiceState,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Resource counters shared by a device and all of its voices.
#[derive(Debug, Default)]
struct DeviceCounters {
    voices_opened: AtomicU64,
    voices_released: AtomicU64,
    buffers_created: AtomicU64,
    buffers_deleted: AtomicU64,
    buffers_leaked: AtomicU64,
}

/// Snapshot of [`ClockedVoiceDevice`] resource usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    pub voices_opened: u64,
    pub voices_released: u64,
    pub buffers_created: u64,
    pub buffers_deleted: u64,
    /// Buffers still allocated when their voice was released.
    pub buffers_leaked: u64,
}

impl DeviceStats {
    /// Buffers created and not yet deleted.
    pub fn buffers_live(&self) -> u64 {
        self.buffers_created.saturating_sub(self.buffers_deleted)
    }
}

/// Voice device driven by the wall clock.
pub struct ClockedVoiceDevice {
    speed: f64,
    counters: Arc<DeviceCounters>,
    next_voice: AtomicU32,
}

impl ClockedVoiceDevice {
    /// Device playing in real time.
    pub fn new() -> Self {
        Self::with_speed(1.0)
    }

    /// Device consuming audio `speed` times faster than real time.
    ///
    /// Non-positive or non-finite factors fall back to real time.
    pub fn with_speed(speed: f64) -> Self {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        Self {
            speed,
            counters: Arc::new(DeviceCounters::default()),
            next_voice: AtomicU32::new(1),
        }
    }

    /// Playback speed factor.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Current resource counters.
    pub fn stats(&self) -> DeviceStats {
        let c = &self.counters;
        DeviceStats {
            voices_opened: c.voices_opened.load(Ordering::SeqCst),
            voices_released: c.voices_released.load(Ordering::SeqCst),
            buffers_created: c.buffers_created.load(Ordering::SeqCst),
            buffers_deleted: c.buffers_deleted.load(Ordering::SeqCst),
            buffers_leaked: c.buffers_leaked.load(Ordering::SeqCst),
        }
    }
}

impl Default for ClockedVoiceDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceDevice for ClockedVoiceDevice {
    fn name(&self) -> &str {
        "clocked-software"
    }

    fn open_voice(&self) -> Result<Arc<dyn AudioVoice>> {
        let id = self.next_voice.fetch_add(1, Ordering::SeqCst);
        self.counters.voices_opened.fetch_add(1, Ordering::SeqCst);
        debug!(voice = id, "Opened software voice");
        Ok(Arc::new(ClockedVoice {
            id,
            speed: self.speed,
            counters: Arc::clone(&self.counters),
            inner: Mutex::new(VoiceInner::default()),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct BufferInfo {
    frames: u64,
    sample_rate: u32,
}

#[derive(Debug)]
struct VoiceInner {
    buffers: HashMap<BufferId, BufferInfo>,
    queue: VecDeque<BufferId>,
    /// Leading queue entries already played.
    processed: usize,
    /// Frames played within the first unprocessed buffer.
    cursor: f64,
    state: VoiceState,
    last_tick: Option<Instant>,
    next_buffer: u32,
    released: bool,
}

impl Default for VoiceInner {
    fn default() -> Self {
        Self {
            buffers: HashMap::new(),
            queue: VecDeque::new(),
            processed: 0,
            cursor: 0.0,
            state: VoiceState::Initial,
            last_tick: None,
            next_buffer: 1,
            released: false,
        }
    }
}

impl VoiceInner {
    fn ensure_live(&self) -> Result<()> {
        if self.released {
            Err(BridgeError::VoiceReleased)
        } else {
            Ok(())
        }
    }

    /// Consume wall-clock time elapsed since the last tick.
    fn advance(&mut self, speed: f64) {
        let now = Instant::now();
        let Some(last) = self.last_tick.replace(now) else {
            return;
        };
        if self.state != VoiceState::Playing {
            return;
        }

        let mut budget = now.duration_since(last).as_secs_f64() * speed;
        while budget > 0.0 {
            let Some(id) = self.queue.get(self.processed) else {
                break;
            };
            let Some(info) = self.buffers.get(id).copied() else {
                break;
            };
            let rate = f64::from(info.sample_rate.max(1));
            let remaining = (info.frames as f64 - self.cursor).max(0.0) / rate;
            if budget >= remaining {
                budget -= remaining;
                self.processed += 1;
                self.cursor = 0.0;
            } else {
                self.cursor += budget * rate;
                budget = 0.0;
            }
        }

        if self.processed >= self.queue.len() {
            trace!("Software voice ran out of queued buffers");
            self.state = VoiceState::Stopped;
            self.cursor = 0.0;
        }
    }

    fn offset(&self) -> u64 {
        if !matches!(self.state, VoiceState::Playing | VoiceState::Paused) {
            return 0;
        }
        let played: u64 = self
            .queue
            .iter()
            .take(self.processed)
            .filter_map(|id| self.buffers.get(id))
            .map(|info| info.frames)
            .sum();
        played + self.cursor as u64
    }
}

/// Voice allocated by [`ClockedVoiceDevice`].
pub struct ClockedVoice {
    id: u32,
    speed: f64,
    counters: Arc<DeviceCounters>,
    inner: Mutex<VoiceInner>,
}

impl ClockedVoice {
    fn with_live<T>(&self, f: impl FnOnce(&mut VoiceInner) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.lock();
        inner.ensure_live()?;
        inner.advance(self.speed);
        f(&mut inner)
    }
}

impl AudioVoice for ClockedVoice {
    fn create_buffer(&self, format: PcmFormat, sample_rate: u32, data: Bytes) -> Result<BufferId> {
        if sample_rate == 0 {
            return Err(BridgeError::OperationFailed(
                "sample rate must be positive".to_string(),
            ));
        }
        let id = self.with_live(|inner| {
            let id = BufferId(inner.next_buffer);
            inner.next_buffer += 1;
            let frames = (data.len() / format.frame_bytes()) as u64;
            inner.buffers.insert(
                id,
                BufferInfo {
                    frames,
                    sample_rate,
                },
            );
            Ok(id)
        })?;
        self.counters.buffers_created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) -> Result<()> {
        self.with_live(|inner| {
            if inner.queue.contains(&buffer) {
                return Err(BridgeError::OperationFailed(format!(
                    "{} is still queued",
                    buffer
                )));
            }
            inner
                .buffers
                .remove(&buffer)
                .map(|_| ())
                .ok_or(BridgeError::UnknownBuffer(buffer.0))
        })?;
        self.counters.buffers_deleted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn queue_buffer(&self, buffer: BufferId) -> Result<()> {
        self.with_live(|inner| {
            if !inner.buffers.contains_key(&buffer) {
                return Err(BridgeError::UnknownBuffer(buffer.0));
            }
            if inner.queue.contains(&buffer) {
                return Err(BridgeError::OperationFailed(format!(
                    "{} is already queued",
                    buffer
                )));
            }
            inner.queue.push_back(buffer);
            Ok(())
        })
    }

    fn unqueue_buffer(&self) -> Result<BufferId> {
        self.with_live(|inner| {
            if inner.processed == 0 {
                return Err(BridgeError::NothingProcessed);
            }
            let id = inner.queue.pop_front().ok_or(BridgeError::NothingProcessed)?;
            inner.processed -= 1;
            Ok(id)
        })
    }

    fn queued_buffers(&self) -> Result<usize> {
        self.with_live(|inner| Ok(inner.queue.len()))
    }

    fn processed_buffers(&self) -> Result<usize> {
        self.with_live(|inner| Ok(inner.processed))
    }

    fn sample_offset(&self) -> Result<u64> {
        self.with_live(|inner| Ok(inner.offset()))
    }

    fn state(&self) -> Result<VoiceState> {
        self.with_live(|inner| Ok(inner.state))
    }

    fn play(&self) -> Result<()> {
        self.with_live(|inner| {
            if inner.processed < inner.queue.len() {
                inner.state = VoiceState::Playing;
            } else {
                // Nothing left to consume: the voice immediately runs dry.
                inner.state = VoiceState::Stopped;
            }
            Ok(())
        })
    }

    fn pause(&self) -> Result<()> {
        self.with_live(|inner| {
            if inner.state == VoiceState::Playing {
                inner.state = VoiceState::Paused;
            }
            Ok(())
        })
    }

    fn stop(&self) -> Result<()> {
        self.with_live(|inner| {
            inner.state = VoiceState::Stopped;
            inner.processed = inner.queue.len();
            inner.cursor = 0.0;
            Ok(())
        })
    }

    fn release(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.released {
            return Ok(());
        }
        inner.released = true;
        inner.state = VoiceState::Stopped;
        inner.queue.clear();
        let leaked = inner.buffers.len() as u64;
        inner.buffers.clear();
        drop(inner);

        if leaked > 0 {
            warn!(voice = self.id, leaked, "Software voice released with live buffers");
            self.counters
                .buffers_leaked
                .fetch_add(leaked, Ordering::SeqCst);
        }
        self.counters.voices_released.fetch_add(1, Ordering::SeqCst);
        debug!(voice = self.id, "Released software voice");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pcm16_stereo(frames: usize) -> Bytes {
        Bytes::from(vec![0u8; frames * 4])
    }

    #[test]
    fn test_buffer_lifecycle_counts() {
        let device = ClockedVoiceDevice::new();
        let voice = device.open_voice().unwrap();

        let a = voice.create_buffer(PcmFormat::Pcm16X2, 22050, pcm16_stereo(100)).unwrap();
        let b = voice.create_buffer(PcmFormat::Pcm16X2, 22050, pcm16_stereo(100)).unwrap();
        voice.queue_buffer(a).unwrap();
        voice.queue_buffer(b).unwrap();
        assert_eq!(voice.queued_buffers().unwrap(), 2);
        assert_eq!(voice.processed_buffers().unwrap(), 0);

        // Queued buffers cannot be deleted.
        assert!(voice.delete_buffer(a).is_err());

        voice.stop().unwrap();
        assert_eq!(voice.processed_buffers().unwrap(), 2);
        assert_eq!(voice.unqueue_buffer().unwrap(), a);
        assert_eq!(voice.unqueue_buffer().unwrap(), b);
        assert!(matches!(
            voice.unqueue_buffer(),
            Err(BridgeError::NothingProcessed)
        ));
        voice.delete_buffer(a).unwrap();
        voice.delete_buffer(b).unwrap();
        voice.release().unwrap();

        let stats = device.stats();
        assert_eq!(stats.buffers_created, 2);
        assert_eq!(stats.buffers_deleted, 2);
        assert_eq!(stats.buffers_leaked, 0);
        assert_eq!(stats.buffers_live(), 0);
        assert_eq!(stats.voices_opened, 1);
        assert_eq!(stats.voices_released, 1);
    }

    #[test]
    fn test_playback_consumes_buffers_over_time() {
        let device = ClockedVoiceDevice::with_speed(10.0);
        let voice = device.open_voice().unwrap();

        // 0.1 s of audio, consumed in ~10 ms at 10x.
        let id = voice.create_buffer(PcmFormat::Pcm8X1, 1000, Bytes::from(vec![128u8; 100])).unwrap();
        voice.queue_buffer(id).unwrap();
        assert_eq!(voice.state().unwrap(), VoiceState::Initial);

        voice.play().unwrap();
        assert_eq!(voice.state().unwrap(), VoiceState::Playing);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(voice.processed_buffers().unwrap(), 1);
        assert_eq!(voice.state().unwrap(), VoiceState::Stopped);
        assert_eq!(voice.sample_offset().unwrap(), 0);
    }

    #[test]
    fn test_pause_freezes_offset() {
        let device = ClockedVoiceDevice::new();
        let voice = device.open_voice().unwrap();
        let id = voice.create_buffer(PcmFormat::Pcm16X1, 1000, Bytes::from(vec![0u8; 20_000])).unwrap();
        voice.queue_buffer(id).unwrap();
        voice.play().unwrap();

        std::thread::sleep(Duration::from_millis(30));
        voice.pause().unwrap();
        let paused_at = voice.sample_offset().unwrap();
        assert!(paused_at > 0);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(voice.state().unwrap(), VoiceState::Paused);
        assert_eq!(voice.sample_offset().unwrap(), paused_at);
    }

    #[test]
    fn test_release_is_idempotent_and_reports_leaks() {
        let device = ClockedVoiceDevice::new();
        let voice = device.open_voice().unwrap();
        voice.create_buffer(PcmFormat::Pcm8X2, 8000, Bytes::from(vec![0u8; 16])).unwrap();

        voice.release().unwrap();
        voice.release().unwrap();

        assert!(matches!(voice.state(), Err(BridgeError::VoiceReleased)));
        assert!(matches!(voice.play(), Err(BridgeError::VoiceReleased)));

        let stats = device.stats();
        assert_eq!(stats.buffers_leaked, 1);
        assert_eq!(stats.voices_released, 1);
    }

    #[test]
    fn test_play_with_empty_queue_runs_dry() {
        let device = ClockedVoiceDevice::new();
        let voice = device.open_voice().unwrap();
        voice.play().unwrap();
        assert_eq!(voice.state().unwrap(), VoiceState::Stopped);
    }

    #[test]
    fn test_invalid_speed_falls_back_to_real_time() {
        assert_eq!(ClockedVoiceDevice::with_speed(0.0).speed(), 1.0);
        assert_eq!(ClockedVoiceDevice::with_speed(f64::NAN).speed(), 1.0);
        assert_eq!(ClockedVoiceDevice::with_speed(4.0).speed(), 4.0);
    }
}
