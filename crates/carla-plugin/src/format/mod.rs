//! Concrete plugin variants. Real per-format bindings (LADSPA, DSSI, LV2,
//! VST, SoundFont) are deliberately out of scope (§1): the engine only ever
//! sees the [`crate::wrapper::PluginWrapper`] trait object a loader hands
//! back. This module provides the two variants that *are* in scope: the
//! built-in internal plugin used for tests and the `Internal` `PluginKind`,
//! and the bridge-backed variant that drives a sub-process (§4.B, §9).

pub mod internal;

#[cfg(feature = "bridge")]
pub mod bridge;

pub use internal::{failing_loader, GainPlugin, PassthroughPlugin};

#[cfg(feature = "bridge")]
pub use bridge::BridgePlugin;
