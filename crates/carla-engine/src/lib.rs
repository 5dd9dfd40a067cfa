//! The Carla engine: driver abstraction, per-plugin clients, the plugin
//! registry, RT-safe command/event queues, and the rack/patchbay
//! processors, tied together by [`engine::Engine`].

pub mod client;
pub mod driver;
pub mod engine;
pub mod patchbay;
pub mod queues;
pub mod rack;
pub mod registry;

pub use client::{ClientPort, ClientState, EngineClient};
pub use driver::{
    BridgeDriver, DeviceDriver, DriverCapabilities, DriverKind, EngineDriver, ExternalGraphDriver,
    ExternalGraphMode, HostedAsPluginDriver,
};
pub use engine::{Engine, ProcessOutcome};
pub use patchbay::{PatchbayProcessor, PluginBuffers};
pub use queues::{
    build_queues, PostRtEvent, PostRtEventKind, PostRtEventReceiver, PostRtEventSender, RtCommand,
    RtCommandReceiver, RtCommandSender, RING_CAPACITY,
};
pub use rack::{ingest_midi, RackPeaks, RackProcessor};
pub use registry::PluginRegistry;
