//! Wire protocol and shared-memory audio transport for the bridge engine
//! driver (§4.B, §6): one plugin hosted in a sub-process, communicating
//! parameter/audio state with the parent over a shared-memory audio page
//! plus a message channel.

pub mod protocol;
pub mod shared_memory;

pub use protocol::{
    read_frame, write_frame, BridgeConfig, BridgeMessage, HostMessage, MidiEventVec,
    MidiProgramInfo, ParameterInfo, ProgramInfo,
};
pub use shared_memory::{path_for, unique_shm_name, SharedAudioBuffer};
