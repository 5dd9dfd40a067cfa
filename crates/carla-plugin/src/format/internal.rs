//! Built-in, in-process plugin variants. These exist for two reasons: they
//! give the engine something to drive in tests without a real plugin file,
//! and they are the `Internal` `PluginKind` the registry can always resolve
//! without going through a (deliberately out of scope) per-format loader.

use carla_core::{EventPort, ParameterRanges, Result};

use crate::wrapper::{PluginHints, PluginKind, PluginMetadata, PluginState, PluginWrapper};

/// A single-parameter gain plugin: one audio in, one audio out. Used as the
/// "amp" plugin in the load/play/remove scenario (§8 end-to-end #1).
pub struct GainPlugin {
    state: PluginState,
}

impl GainPlugin {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        let mut state = PluginState::new(
            id,
            PluginMetadata {
                kind: PluginKind::Internal,
                category: "utility".into(),
                hints: PluginHints::CAN_RUN_RACK,
                name: name.into(),
                filename: String::new(),
                label: "gain".into(),
                unique_id: 1,
            },
        );
        state.audio_in_count = 1;
        state.audio_out_count = 1;
        state
            .parameters
            .push(carla_core::Parameter::new("gain", ParameterRanges::new(0.0, 2.0, 1.0)));
        Self { state }
    }
}

impl PluginWrapper for GainPlugin {
    fn state(&self) -> &PluginState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PluginState {
        &mut self.state
    }

    fn init_buffers(&mut self, _block_size: usize) {}

    fn clone_wrapper(&self, new_id: u32) -> Result<Box<dyn PluginWrapper>> {
        let mut state = self.state.clone();
        state.id = new_id;
        Ok(Box::new(GainPlugin { state }))
    }

    fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        _events: &EventPort,
    ) {
        let gain = self.state.parameters[0].value();
        let input = inputs.first().copied().unwrap_or(&[]);
        if let Some(output) = outputs.first_mut() {
            for i in 0..frames {
                output[i] = input.get(i).copied().unwrap_or(0.0) * gain;
            }
        }
    }
}

/// A stereo passthrough with no parameters; used where tests need a
/// plugin that is not the one under test.
pub struct PassthroughPlugin {
    state: PluginState,
}

impl PassthroughPlugin {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        let mut state = PluginState::new(
            id,
            PluginMetadata {
                kind: PluginKind::Internal,
                category: "utility".into(),
                hints: PluginHints::CAN_RUN_RACK,
                name: name.into(),
                filename: String::new(),
                label: "passthrough".into(),
                unique_id: 2,
            },
        );
        state.audio_in_count = 2;
        state.audio_out_count = 2;
        Self { state }
    }
}

impl PluginWrapper for PassthroughPlugin {
    fn state(&self) -> &PluginState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PluginState {
        &mut self.state
    }

    fn init_buffers(&mut self, _block_size: usize) {}

    fn clone_wrapper(&self, new_id: u32) -> Result<Box<dyn PluginWrapper>> {
        let mut state = self.state.clone();
        state.id = new_id;
        Ok(Box::new(PassthroughPlugin { state }))
    }

    fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        _events: &EventPort,
    ) {
        for (ch, output) in outputs.iter_mut().enumerate() {
            let input = inputs.get(ch).copied().unwrap_or(&[]);
            for i in 0..frames {
                output[i] = input.get(i).copied().unwrap_or(0.0);
            }
        }
    }
}

/// A plugin that always fails to load, used to exercise the registry
/// density-after-failure scenario (§8 end-to-end #5).
pub fn failing_loader(reason: &str) -> Result<Box<dyn PluginWrapper>> {
    Err(carla_core::Error::PluginLoadError {
        path: "<failing>".into(),
        stage: carla_core::LoadStage::Instantiation,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_plugin_scales_input() {
        let mut plugin = GainPlugin::new(0, "amp");
        plugin.set_param(0, 0.5, crate::wrapper::WriteFlags::CONTROL_THREAD).unwrap();
        let input = [1.0f32; 4];
        let mut out_buf = [0.0f32; 4];
        {
            let inputs: [&[f32]; 1] = [&input];
            let mut outputs: [&mut [f32]; 1] = [&mut out_buf];
            let events = EventPort::new(carla_core::PortDirection::Input);
            plugin.process(&inputs, &mut outputs, 4, &events);
        }
        assert_eq!(out_buf, [0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn failing_loader_returns_plugin_load_error() {
        let err = failing_loader("corrupt header").unwrap_err();
        assert!(matches!(err, carla_core::Error::PluginLoadError { .. }));
    }
}
