//! Shared data model for the Carla engine: ports, events, parameters, time
//! and the error kinds every other crate in the workspace returns.
//!
//! This crate carries no real-time logic of its own; it is the vocabulary
//! the engine, the plugin wrapper and the bridge speak to each other.

pub mod callback;
pub mod discovery;
pub mod error;
pub mod event;
pub mod lockfree;
pub mod options;
pub mod parameter;
pub mod port;
pub mod time;

pub use callback::{EngineCallback, EngineCallbackAction};
pub use discovery::{DiscoveryManifest, SkipList};
pub use error::{Error, LoadStage, Result};
pub use event::{
    engine_event_to_midi, midi_to_engine_event, ControlSubKind, EngineEvent, EventKind,
    MAX_EVENTS_PER_BLOCK,
};
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicFloat};
pub use options::{EngineOptions, ProcessMode, TransportMode};
pub use parameter::{CustomData, Parameter, ParameterFlags, ParameterRanges, ParameterScale};
pub use port::{AudioPort, CvPort, EventPort, PortDirection, PortKind};
pub use time::{Bbt, InternalTransport, TimeInfo};
