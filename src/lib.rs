//! Workspace facade crate.
//!
//! Exposes feature flags that map to the individual workspace crates
//! (`core-service`, `core-playback`, `core-library`). Host applications can
//! depend on `playful-workspace` and enable the documented features without
//! wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;

#[cfg(feature = "playback-only")]
pub use core_playback as playback;

#[cfg(feature = "library")]
pub use core_library as library;
