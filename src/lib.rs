//! # Carla — modular real-time audio plugin host
//!
//! An umbrella crate over the workspace's subsystems:
//! - **carla-core** — shared data model (ports, events, parameters, time, errors)
//! - **carla-engine** — driver abstraction, plugin registry, RT queues, rack/patchbay processors
//! - **carla-plugin** — the plugin wrapper contract and its internal/bridge variants
//! - **carla-bridge** *(feature `bridge`)* — the sub-process wire protocol and shared memory transport
//!
//! ## Quick start
//!
//! ```ignore
//! use carla::prelude::*;
//!
//! let mut engine = Carla::builder()
//!     .sample_rate(48_000.0)
//!     .buffer_size(256)
//!     .rack()
//!     .build()?;
//!
//! engine.set_about_to_close();
//! engine.init()?;
//! let id = engine.add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp"))))?;
//! ```

pub use carla_core as core;
pub use carla_engine as engine;
pub use carla_plugin as plugin;

#[cfg(feature = "bridge")]
pub use carla_bridge as bridge;

pub use carla_core::{
    AudioPort, Bbt, ControlSubKind, CustomData, DiscoveryManifest, EngineCallback,
    EngineCallbackAction, EngineEvent, EngineOptions, Error, EventKind, EventPort, LoadStage,
    Parameter, ParameterRanges, ParameterScale, PortDirection, PortKind, ProcessMode, Result,
    SkipList, TimeInfo, TransportMode,
};
pub use carla_engine::{
    ClientPort, ClientState, Engine, EngineClient, EngineDriver, PatchbayProcessor,
    PluginRegistry, ProcessOutcome, RackPeaks, RackProcessor,
};
pub use carla_plugin::{
    failing_loader, GainPlugin, PassthroughPlugin, PluginKind, PluginMetadata, PluginState,
    PluginWrapper, PostProc, WriteFlags,
};

#[cfg(feature = "bridge")]
pub use carla_plugin::BridgePlugin;

mod builder;

pub use builder::CarlaEngineBuilder;

/// Convenience re-export so callers can write `Carla::builder()`.
pub struct Carla;

impl Carla {
    pub fn builder() -> CarlaEngineBuilder {
        CarlaEngineBuilder::default()
    }
}

/// Common imports for constructing and driving an engine.
pub mod prelude {
    pub use crate::{Carla, CarlaEngineBuilder};
    pub use crate::{Engine, EngineOptions, ProcessMode, TransportMode};
    pub use crate::{GainPlugin, PassthroughPlugin, PluginWrapper};
    pub use crate::{Error, Result};
}
