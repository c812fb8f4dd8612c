//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - [`ClockedVoiceDevice`]: a software [`VoiceDevice`](bridge_traits::VoiceDevice)
//!   that consumes queued PCM against the monotonic clock. It produces no
//!   sound; hosts with a real audio API inject their own device and use this
//!   one for headless runs and tests.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ClockedVoiceDevice;
//! use std::sync::Arc;
//!
//! let device = Arc::new(ClockedVoiceDevice::new());
//! let config = CoreConfig::builder().voice_device(device).build()?;
//! ```

mod voice;

pub use voice::{ClockedVoice, ClockedVoiceDevice, DeviceStats};
