//! The plugin wrapper contract (§4.D) and its concrete variants.

pub mod format;
pub mod wrapper;

pub use format::{failing_loader, GainPlugin, PassthroughPlugin};
#[cfg(feature = "bridge")]
pub use format::BridgePlugin;
pub use wrapper::{
    MidiProgramEntry, PluginHints, PluginKind, PluginMetadata, PluginState, PluginWrapper,
    PostProc, WriteFlags,
};
