//! The rack processor (§4.G): a fixed 2-audio-in/2-audio-out/1-event-bus
//! topology with plugins serially chained. Grounded on `CarlaEngineRack` in
//! the original's `CarlaEngineInternal.hpp`; the shared-bus mix-down and
//! post-process chain is the load-bearing piece carried over, rebuilt on
//! top of [`carla_plugin::PluginWrapper`] instead of the original's
//! `CarlaPlugin*` array.

use carla_core::{ControlSubKind, EngineEvent, EventKind, EventPort, PortDirection};
use carla_plugin::{PluginWrapper, WriteFlags};

/// Peak levels published after a block, one pair per side (§4.G, §8).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RackPeaks {
    pub input_left: f32,
    pub input_right: f32,
    pub output_left: f32,
    pub output_right: f32,
}

fn peak(buf: &[f32]) -> f32 {
    buf.iter().fold(0.0f32, |acc, v| acc.max(v.abs()))
}

/// Applies a plugin's `PostProc` chain to its raw output, producing both bus
/// channels even when the plugin itself is mono-out (the "balance law",
/// §4.G / §8 scenario 1): the raw signal is panned across `[balance_left,
/// balance_right]` and mixed back with the dry signal by `dry_wet`, then
/// scaled by `volume`.
fn apply_post_proc(
    post: &carla_plugin::PostProc,
    dry_left: f32,
    dry_right: f32,
    wet_mono: f32,
) -> (f32, f32) {
    // balance_left/right range [-1, 1]; panning in the same range. The
    // default (-1, 1, pan=0) centres the mono source evenly on both
    // channels, which is the balance law §8 scenario 1 asserts against.
    let pan = (post.panning + 1.0) / 2.0; // 0 = full left, 1 = full right
    let wet_left = wet_mono * (1.0 - pan);
    let wet_right = wet_mono * pan;

    let mixed_left = dry_left * (1.0 - post.dry_wet) + wet_left * post.dry_wet;
    let mixed_right = dry_right * (1.0 - post.dry_wet) + wet_right * post.dry_wet;

    (mixed_left * post.volume, mixed_right * post.volume)
}

/// Owns the fixed rack bus buffers and drives the plugin chain (§4.G).
pub struct RackProcessor {
    block_size: usize,
    bus_left: Vec<f32>,
    bus_right: Vec<f32>,
    plugin_in: Vec<f32>,
    plugin_out_left: Vec<f32>,
    plugin_out_right: Vec<f32>,
    /// Reused scratch input-event port, cleared and refilled per plugin per
    /// block rather than allocated fresh (§4.A, §4.G).
    event_scratch: EventPort,
}

impl RackProcessor {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            bus_left: vec![0.0; block_size],
            bus_right: vec![0.0; block_size],
            plugin_in: vec![0.0; block_size],
            plugin_out_left: vec![0.0; block_size],
            plugin_out_right: vec![0.0; block_size],
            event_scratch: EventPort::new(PortDirection::Input),
        }
    }

    pub fn resize(&mut self, block_size: usize) {
        self.block_size = block_size;
        self.bus_left.resize(block_size, 0.0);
        self.bus_right.resize(block_size, 0.0);
        self.plugin_in.resize(block_size, 0.0);
        self.plugin_out_left.resize(block_size, 0.0);
        self.plugin_out_right.resize(block_size, 0.0);
    }

    /// Runs one block. `events_in` are already normalised `EngineEvent`s
    /// (§4.A); events to emit downstream accumulate into `events_out`, and
    /// any bank+program composition that resolves to a known MIDI program
    /// this block is reported as `(plugin_id, new_index)` in
    /// `midi_program_changes` for the caller to turn into a post-RT
    /// callback (§4.F). Returns the peaks published for this block.
    pub fn process(
        &mut self,
        input_left: &[f32],
        input_right: &[f32],
        plugins: &mut [Box<dyn PluginWrapper>],
        events_in: &[EngineEvent],
        events_out: &mut Vec<EngineEvent>,
        midi_program_changes: &mut Vec<(u32, i32)>,
    ) -> RackPeaks {
        let frames = self.block_size;
        self.bus_left[..frames].copy_from_slice(&input_left[..frames]);
        self.bus_right[..frames].copy_from_slice(&input_right[..frames]);

        let input_peak_left = peak(&self.bus_left);
        let input_peak_right = peak(&self.bus_right);

        for plugin in plugins.iter_mut() {
            if !plugin.is_enabled() {
                if plugin.state().active {
                    plugin.deactivate();
                }
                continue;
            }
            if !plugin.state().active {
                plugin.activate();
            }

            self.event_scratch.clear();
            for event in events_in.iter() {
                let ctrl_in_channel = plugin.state().ctrl_in_channel;
                if ctrl_in_channel >= 0 && event.channel as i8 != ctrl_in_channel {
                    continue;
                }
                match event.kind {
                    EventKind::Control {
                        subkind: ControlSubKind::MidiBank,
                        param_id,
                        ..
                    } => {
                        plugin.state_mut().pending_midi_bank = Some(param_id as u32);
                    }
                    EventKind::Control {
                        subkind: ControlSubKind::MidiProgram,
                        param_id,
                        ..
                    } => {
                        let bank = plugin.state_mut().pending_midi_bank.take().unwrap_or(0);
                        if let Some(index) = plugin.find_midi_program(bank, param_id as u32) {
                            if plugin.set_midi_program(index, WriteFlags::RT_THREAD).is_ok() {
                                midi_program_changes.push((plugin.id(), index));
                            }
                        }
                    }
                    _ => self.event_scratch.push_input(*event),
                }
            }

            let mono_in = plugin.audio_in_count() == 1;
            let in_slices: Vec<&[f32]> = if mono_in {
                for i in 0..frames {
                    self.plugin_in[i] = (self.bus_left[i] + self.bus_right[i]) * 0.5;
                }
                vec![&self.plugin_in[..frames]]
            } else {
                vec![&self.bus_left[..frames], &self.bus_right[..frames]]
            };

            self.plugin_out_left[..frames].fill(0.0);
            self.plugin_out_right[..frames].fill(0.0);

            let mono_out = plugin.audio_out_count() <= 1;
            if mono_out {
                let mut out_buf = vec![0.0f32; frames];
                {
                    let mut outputs: [&mut [f32]; 1] = [&mut out_buf];
                    plugin.process(&in_slices, &mut outputs, frames, &self.event_scratch);
                }
                self.plugin_out_left[..frames].copy_from_slice(&out_buf);
                self.plugin_out_right[..frames].copy_from_slice(&out_buf);
            } else {
                let mut left_buf = vec![0.0f32; frames];
                let mut right_buf = vec![0.0f32; frames];
                {
                    let mut outputs: [&mut [f32]; 2] = [&mut left_buf, &mut right_buf];
                    plugin.process(&in_slices, &mut outputs, frames, &self.event_scratch);
                }
                self.plugin_out_left[..frames].copy_from_slice(&left_buf);
                self.plugin_out_right[..frames].copy_from_slice(&right_buf);
            }

            let post = plugin.state().post_proc;
            for i in 0..frames {
                let wet_mono = if mono_out {
                    self.plugin_out_left[i]
                } else {
                    (self.plugin_out_left[i] + self.plugin_out_right[i]) * 0.5
                };
                let (mixed_left, mixed_right) = if mono_out {
                    apply_post_proc(&post, self.bus_left[i], self.bus_right[i], wet_mono)
                } else {
                    // stereo plugins keep their own left/right placement;
                    // only dry/wet and volume apply, panning/balance are a
                    // mono-source concept (§4.G balance law).
                    let mixed_left = self.bus_left[i] * (1.0 - post.dry_wet)
                        + self.plugin_out_left[i] * post.dry_wet;
                    let mixed_right = self.bus_right[i] * (1.0 - post.dry_wet)
                        + self.plugin_out_right[i] * post.dry_wet;
                    (mixed_left * post.volume, mixed_right * post.volume)
                };
                self.bus_left[i] = mixed_left;
                self.bus_right[i] = mixed_right;
            }
        }

        events_out.extend_from_slice(events_in);

        let output_peak_left = peak(&self.bus_left[..frames]);
        let output_peak_right = peak(&self.bus_right[..frames]);

        RackPeaks {
            input_left: input_peak_left,
            input_right: input_peak_right,
            output_left: output_peak_left,
            output_right: output_peak_right,
        }
    }

    pub fn output_left(&self) -> &[f32] {
        &self.bus_left[..self.block_size]
    }

    pub fn output_right(&self) -> &[f32] {
        &self.bus_right[..self.block_size]
    }
}

/// Builds the single normalised `Control`/`Midi` event stream that a driver
/// delivers into the rack's event input (§4.A, §4.G step 1-2); exists as a
/// thin, testable seam over `carla_core::midi_to_engine_event`.
pub fn ingest_midi(raw: &[(u32, u8, Vec<u8>)]) -> Vec<EngineEvent> {
    raw.iter()
        .filter_map(|(time, port_offset, bytes)| {
            carla_core::midi_to_engine_event(*time, *port_offset, bytes)
        })
        .collect()
}

#[allow(dead_code)]
fn event_is_parameter(event: &EngineEvent) -> bool {
    matches!(
        event.kind,
        EventKind::Control {
            subkind: ControlSubKind::Parameter,
            ..
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use carla_plugin::{GainPlugin, PassthroughPlugin, WriteFlags};

    #[test]
    fn mono_plugin_drives_both_bus_channels_per_balance_law() {
        let mut rack = RackProcessor::new(256);
        let mut gain = GainPlugin::new(0, "amp");
        gain.set_param(0, 0.5, WriteFlags::CONTROL_THREAD).unwrap();
        let mut plugins: Vec<Box<dyn PluginWrapper>> = vec![Box::new(gain)];

        let input = vec![1.0f32; 256];
        let silence = vec![0.0f32; 256];
        let mut events_out = Vec::new();
        let mut changes = Vec::new();
        let peaks = rack.process(&input, &silence, &mut plugins, &[], &mut events_out, &mut changes);

        assert!(peaks.output_left > 0.49 && peaks.output_left < 0.51);
        assert_eq!(peaks.output_left, peaks.output_right);
        assert!(plugins[0].state().active);
    }

    #[test]
    fn disabled_plugin_is_bypassed() {
        let mut rack = RackProcessor::new(64);
        let mut gain = GainPlugin::new(0, "amp");
        gain.set_param(0, 0.1, WriteFlags::CONTROL_THREAD).unwrap();
        gain.set_enabled(false);
        let mut plugins: Vec<Box<dyn PluginWrapper>> = vec![Box::new(gain)];

        let input = vec![1.0f32; 64];
        let mut events_out = Vec::new();
        let mut changes = Vec::new();
        let peaks = rack.process(&input, &input, &mut plugins, &[], &mut events_out, &mut changes);
        // bypassed: bus passes through untouched, peak stays at the input level
        assert!((peaks.output_left - 1.0).abs() < 1e-6);
        assert!(!plugins[0].state().active);
    }

    #[test]
    fn stereo_passthrough_preserves_channels() {
        let mut rack = RackProcessor::new(32);
        let mut plugins: Vec<Box<dyn PluginWrapper>> = vec![Box::new(PassthroughPlugin::new(0, "pass"))];
        let left = vec![0.3f32; 32];
        let right = vec![0.6f32; 32];
        let mut events_out = Vec::new();
        let mut changes = Vec::new();
        let peaks = rack.process(&left, &right, &mut plugins, &[], &mut events_out, &mut changes);
        assert!((peaks.output_left - 0.3).abs() < 1e-6);
        assert!((peaks.output_right - 0.6).abs() < 1e-6);
    }

    #[test]
    fn events_propagate_to_output_unchanged() {
        let mut rack = RackProcessor::new(16);
        let mut plugins: Vec<Box<dyn PluginWrapper>> = vec![];
        let silence = vec![0.0f32; 16];
        let events_in = vec![EngineEvent::control(0, 0, ControlSubKind::Parameter, 7, 0.5)];
        let mut events_out = Vec::new();
        let mut changes = Vec::new();
        rack.process(&silence, &silence, &mut plugins, &events_in, &mut events_out, &mut changes);
        assert_eq!(events_out, events_in);
    }

    /// A minimal test-only plugin carrying a populated MIDI-program table,
    /// used to exercise the bank-select + program-change composition that
    /// `GainPlugin`/`PassthroughPlugin` have no programs to demonstrate.
    struct ProgrammablePlugin {
        state: carla_plugin::PluginState,
    }

    impl ProgrammablePlugin {
        fn new(id: u32) -> Self {
            let mut state = carla_plugin::PluginState::new(
                id,
                carla_plugin::PluginMetadata {
                    kind: carla_plugin::PluginKind::Internal,
                    category: "utility".into(),
                    hints: carla_plugin::PluginHints::empty(),
                    name: "programmable".into(),
                    filename: String::new(),
                    label: "programmable".into(),
                    unique_id: 0,
                },
            );
            state.audio_in_count = 1;
            state.audio_out_count = 1;
            state.midi_programs = vec![
                carla_plugin::MidiProgramEntry { bank: 0, program: 0, name: "init".into() },
                carla_plugin::MidiProgramEntry { bank: 2, program: 3, name: "lead".into() },
            ];
            Self { state }
        }
    }

    impl PluginWrapper for ProgrammablePlugin {
        fn state(&self) -> &carla_plugin::PluginState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut carla_plugin::PluginState {
            &mut self.state
        }
        fn init_buffers(&mut self, _block_size: usize) {}
        fn process(
            &mut self,
            inputs: &[&[f32]],
            outputs: &mut [&mut [f32]],
            frames: usize,
            _events: &carla_core::EventPort,
        ) {
            let input = inputs.first().copied().unwrap_or(&[]);
            if let Some(output) = outputs.first_mut() {
                output[..frames].copy_from_slice(&input[..frames]);
            }
        }
    }

    #[test]
    fn bank_select_then_program_change_resolves_midi_program() {
        let mut rack = RackProcessor::new(8);
        let mut plugins: Vec<Box<dyn PluginWrapper>> = vec![Box::new(ProgrammablePlugin::new(0))];
        let silence = vec![0.0f32; 8];

        // CC 0x00 (bank select MSB) = 2, then program change = 3.
        let events_in = vec![
            carla_core::midi_to_engine_event(0, 0, &[0xB0, 0x00, 0x02]).unwrap(),
            carla_core::midi_to_engine_event(1, 0, &[0xC0, 0x03]).unwrap(),
        ];
        let mut events_out = Vec::new();
        let mut changes = Vec::new();
        rack.process(&silence, &silence, &mut plugins, &events_in, &mut events_out, &mut changes);

        assert_eq!(changes, vec![(0, 1)]);
        assert_eq!(plugins[0].current_midi_program(), 1);
        assert_eq!(plugins[0].state().pending_midi_bank, None);
    }
}
