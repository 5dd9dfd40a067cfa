//! The patchbay processor (§4.H): every plugin owns its own ports; the
//! driver performs actual routing. Grounded on `CarlaEnginePatchbay` in the
//! original's `CarlaEngineInternal.hpp`, rebuilt against
//! [`carla_plugin::PluginWrapper`] and [`crate::driver::EngineDriver`].

use carla_core::{EventPort, Result};
use carla_plugin::PluginWrapper;

use crate::driver::{DriverCapabilities, EngineDriver};

/// A plugin's per-port audio buffers in patchbay mode; owned by the
/// processor rather than the driver since this crate doesn't bind to a
/// real graph backend (§1 Non-goals: no real-device I/O).
pub struct PluginBuffers {
    pub inputs: Vec<Vec<f32>>,
    pub outputs: Vec<Vec<f32>>,
}

impl PluginBuffers {
    pub fn new(audio_in: usize, audio_out: usize, block_size: usize) -> Self {
        Self {
            inputs: vec![vec![0.0; block_size]; audio_in],
            outputs: vec![vec![0.0; block_size]; audio_out],
        }
    }

    pub fn resize(&mut self, block_size: usize) {
        for buf in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            buf.resize(block_size, 0.0);
        }
    }
}

/// Drives one plugin per block through its own ports and propagates latency
/// (§4.H).
pub struct PatchbayProcessor {
    block_size: usize,
    /// A running estimate of the graph's reported latency range, in frames;
    /// incremented by each plugin's capture-side latency, decremented by
    /// its playback-side latency, as the original's callback-driven
    /// accounting does.
    latency_frames: i64,
}

impl PatchbayProcessor {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            latency_frames: 0,
        }
    }

    pub fn resize(&mut self, block_size: usize) {
        self.block_size = block_size;
    }

    /// Invokes `process` for one plugin against its own buffers and ports,
    /// toggling `activate`/`deactivate` as the plugin's enabled state
    /// crosses an edge (§5: this is what a bounded `wait_for_rt_drain` polls
    /// for).
    pub fn process_plugin(
        &self,
        plugin: &mut dyn PluginWrapper,
        buffers: &mut PluginBuffers,
        events: &EventPort,
    ) {
        if !plugin.is_enabled() {
            if plugin.state().active {
                plugin.deactivate();
            }
            return;
        }
        if !plugin.state().active {
            plugin.activate();
        }
        let frames = self.block_size;
        let inputs: Vec<&[f32]> = buffers.inputs.iter().map(|b| &b[..frames]).collect();
        let mut outputs: Vec<&mut [f32]> = buffers.outputs.iter_mut().map(|b| &mut b[..frames]).collect();
        plugin.process(&inputs, &mut outputs, frames, events);
    }

    /// Adds latency on a capture-side callback (§4.H).
    pub fn on_capture_latency(&mut self, frames: u32) {
        self.latency_frames += frames as i64;
    }

    /// Subtracts latency on a playback-side callback (§4.H).
    pub fn on_playback_latency(&mut self, frames: u32) {
        self.latency_frames -= frames as i64;
    }

    pub fn latency_frames(&self) -> i64 {
        self.latency_frames
    }

    pub fn connect(&self, driver: &mut EngineDriver, port_a: &str, port_b: &str) -> Result<()> {
        match driver {
            EngineDriver::ExternalGraph(d) => d.patchbay_connect(port_a, port_b),
            EngineDriver::Device(_) | EngineDriver::HostedAsPlugin(_) | EngineDriver::Bridge(_) => {
                Err(carla_core::Error::UnsupportedFormat(
                    "this driver does not support patchbay routing".into(),
                ))
            }
        }
    }

    pub fn disconnect(&self, driver: &mut EngineDriver, port_a: &str, port_b: &str) -> Result<()> {
        match driver {
            EngineDriver::ExternalGraph(d) => d.patchbay_disconnect(port_a, port_b),
            EngineDriver::Device(_) | EngineDriver::HostedAsPlugin(_) | EngineDriver::Bridge(_) => {
                Err(carla_core::Error::UnsupportedFormat(
                    "this driver does not support patchbay routing".into(),
                ))
            }
        }
    }
}
