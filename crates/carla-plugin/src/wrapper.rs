//! The plugin wrapper contract (§4.D): the uniform interface every loaded
//! plugin format exposes to the engine. [`PluginState`] is the shared data
//! every variant embeds, grounded on `CarlaPluginProtectedData` in
//! `carla_plugin_internal.hpp`; [`PluginWrapper`] is the trait-object
//! interface the engine drives (§9: "a trait-like interface for the plugin
//! wrapper").

use carla_core::{CustomData, EventPort, Parameter, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Internal,
    Ladspa,
    Dssi,
    Lv2,
    Vst2,
    Vst3,
    SoundFont,
    Bridge,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PluginHints: u32 {
        const IS_SYNTH        = 1 << 0;
        const HAS_GUI         = 1 << 1;
        const IS_BRIDGED      = 1 << 2;
        const CAN_RUN_RACK    = 1 << 3;
        const FIXED_BUFFERS   = 1 << 4;
    }
}

/// Read-only identity a plugin is loaded with; stable for its lifetime.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub kind: PluginKind,
    pub category: String,
    pub hints: PluginHints,
    pub name: String,
    pub filename: String,
    pub label: String,
    pub unique_id: i64,
}

#[derive(Debug, Clone)]
pub struct MidiProgramEntry {
    pub bank: u32,
    pub program: u32,
    pub name: String,
}

/// `{dry_wet, volume, balance_left, balance_right, panning}` (§3). Defaults
/// carried over exactly from the original's `PostProc`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProc {
    pub dry_wet: f32,
    pub volume: f32,
    pub balance_left: f32,
    pub balance_right: f32,
    pub panning: f32,
}

impl Default for PostProc {
    fn default() -> Self {
        Self {
            dry_wet: 1.0,
            volume: 1.0,
            balance_left: -1.0,
            balance_right: 1.0,
            panning: 0.0,
        }
    }
}

/// Shared per-plugin data every [`PluginWrapper`] variant embeds, grounded
/// on `CarlaPluginProtectedData`.
#[derive(Clone)]
pub struct PluginState {
    pub id: u32,
    pub metadata: PluginMetadata,
    pub audio_in_count: u32,
    pub audio_out_count: u32,
    pub midi_in_count: u32,
    pub midi_out_count: u32,
    pub parameters: Vec<Parameter>,
    pub programs: Vec<String>,
    pub current_program: i32,
    pub midi_programs: Vec<MidiProgramEntry>,
    pub current_midi_program: i32,
    pub custom_data: Vec<CustomData>,
    pub post_proc: PostProc,
    /// `-1` means omni (receives events on every channel).
    pub ctrl_in_channel: i8,
    pub enabled: bool,
    pub active: bool,
    pub latency: u32,
    /// Bank selected by the most recent `MidiBank` control event that has
    /// not yet been followed by a `MidiProgram` event (§4.A step 3); reset
    /// to `None` once a program change consumes it.
    pub pending_midi_bank: Option<u32>,
}

impl PluginState {
    pub fn new(id: u32, metadata: PluginMetadata) -> Self {
        Self {
            id,
            metadata,
            audio_in_count: 0,
            audio_out_count: 0,
            midi_in_count: 0,
            midi_out_count: 0,
            parameters: Vec::new(),
            programs: Vec::new(),
            current_program: -1,
            midi_programs: Vec::new(),
            current_midi_program: -1,
            custom_data: Vec::new(),
            post_proc: PostProc::default(),
            ctrl_in_channel: -1,
            enabled: true,
            active: false,
            latency: 0,
            pending_midi_bank: None,
        }
    }
}

/// Side-effect gates for parameter/program writes (§4.D): `from_rt = true`
/// is the only form callable from inside `process`.
#[derive(Debug, Clone, Copy)]
pub struct WriteFlags {
    pub send_osc: bool,
    pub send_callback: bool,
    pub from_rt: bool,
}

impl WriteFlags {
    pub const CONTROL_THREAD: Self = Self {
        send_osc: true,
        send_callback: true,
        from_rt: false,
    };
    pub const RT_THREAD: Self = Self {
        send_osc: false,
        send_callback: false,
        from_rt: true,
    };
}

/// The uniform contract every plugin format variant honours (§4.D).
pub trait PluginWrapper: Send {
    fn state(&self) -> &PluginState;
    fn state_mut(&mut self) -> &mut PluginState;

    fn id(&self) -> u32 {
        self.state().id
    }

    fn set_id(&mut self, id: u32) {
        self.state_mut().id = id;
    }

    /// Creates a new, independent plugin instance at `new_id` with the same
    /// metadata, parameter values, program and custom data (§4.E `clone`).
    /// Variants backed by external resources (a bridge sub-process) reload
    /// from the same source rather than duplicating the live connection.
    fn clone_wrapper(&self, _new_id: u32) -> Result<Box<dyn PluginWrapper>> {
        Err(carla_core::Error::UnsupportedFormat(
            "this plugin variant does not support cloning".into(),
        ))
    }

    /// Whether this variant can absorb an engine-wide sample-rate change in
    /// place (§4.D, §9). Formats backed by an external process that was
    /// opened at a fixed rate (the bridge) answer `false` and are rebuilt by
    /// [`Self::reinit_for_sample_rate`] instead.
    fn supports_sample_rate_change(&self) -> bool {
        true
    }

    /// Rebuilds this plugin at `new_id` for `sample_rate`, carrying over
    /// program/parameter/custom-data state the way [`Self::clone_wrapper`]
    /// does (§4.D). The default is adequate for formats that don't actually
    /// depend on the host's sample rate; formats that do (the bridge)
    /// override both this and [`Self::supports_sample_rate_change`].
    fn reinit_for_sample_rate(&self, new_id: u32, _sample_rate: f64) -> Result<Box<dyn PluginWrapper>> {
        self.clone_wrapper(new_id)
    }

    fn kind(&self) -> PluginKind {
        self.state().metadata.kind
    }

    fn name(&self) -> &str {
        &self.state().metadata.name
    }

    fn filename(&self) -> &str {
        &self.state().metadata.filename
    }

    fn label(&self) -> &str {
        &self.state().metadata.label
    }

    fn unique_id(&self) -> i64 {
        self.state().metadata.unique_id
    }

    fn audio_in_count(&self) -> u32 {
        self.state().audio_in_count
    }

    fn audio_out_count(&self) -> u32 {
        self.state().audio_out_count
    }

    fn midi_in_count(&self) -> u32 {
        self.state().midi_in_count
    }

    fn midi_out_count(&self) -> u32 {
        self.state().midi_out_count
    }

    fn parameter_count(&self) -> u32 {
        self.state().parameters.len() as u32
    }

    fn param_value(&self, index: u32) -> Option<f32> {
        self.state().parameters.get(index as usize).map(Parameter::value)
    }

    fn param_name(&self, index: u32) -> Option<&str> {
        self.state().parameters.get(index as usize).map(|p| p.name.as_str())
    }

    fn param_unit(&self, index: u32) -> Option<&str> {
        self.state().parameters.get(index as usize).map(|p| p.unit.as_str())
    }

    /// Sets a parameter. The control-thread path (`!from_rt`) is expected to
    /// have already gone through the command ring by the time this is
    /// called; both paths clamp into range (§8 invariant) and return the
    /// clamped value for post-RT feedback.
    fn set_param(&mut self, index: u32, value: f32, _flags: WriteFlags) -> Result<f32> {
        let state = self.state_mut();
        let param = state
            .parameters
            .get(index as usize)
            .ok_or_else(|| carla_core::Error::InvalidArgument(format!("parameter {index} out of range")))?;
        Ok(param.set_value(value))
    }

    fn program_count(&self) -> u32 {
        self.state().programs.len() as u32
    }

    fn current_program(&self) -> i32 {
        self.state().current_program
    }

    fn set_program(&mut self, index: i32, _flags: WriteFlags) -> Result<()> {
        let state = self.state_mut();
        if index >= 0 && index as usize >= state.programs.len() {
            return Err(carla_core::Error::InvalidArgument(format!(
                "program {index} out of range"
            )));
        }
        state.current_program = index;
        Ok(())
    }

    fn midi_program_count(&self) -> u32 {
        self.state().midi_programs.len() as u32
    }

    fn current_midi_program(&self) -> i32 {
        self.state().current_midi_program
    }

    fn set_midi_program(&mut self, index: i32, _flags: WriteFlags) -> Result<()> {
        let state = self.state_mut();
        if index >= 0 && index as usize >= state.midi_programs.len() {
            return Err(carla_core::Error::InvalidArgument(format!(
                "midi program {index} out of range"
            )));
        }
        state.current_midi_program = index;
        Ok(())
    }

    /// Finds the midi program index matching `(bank, program)`, if any.
    fn find_midi_program(&self, bank: u32, program: u32) -> Option<i32> {
        self.state()
            .midi_programs
            .iter()
            .position(|p| p.bank == bank && p.program == program)
            .map(|i| i as i32)
    }

    fn custom_data(&self) -> &[CustomData] {
        &self.state().custom_data
    }

    fn set_custom_data(&mut self, ty: String, key: String, value: String, _send_gui: bool) {
        let state = self.state_mut();
        if let Some(existing) = state.custom_data.iter_mut().find(|c| c.key == key) {
            existing.ty = ty;
            existing.value = value;
        } else {
            state.custom_data.push(CustomData { ty, key, value });
        }
    }

    /// Optional raw-state I/O; formats without chunk support return `None`.
    fn get_chunk(&self) -> Option<Vec<u8>> {
        None
    }

    fn set_chunk(&mut self, _data: &[u8]) -> Result<()> {
        Err(carla_core::Error::UnsupportedFormat(
            "this plugin variant has no chunk state".into(),
        ))
    }

    /// Rebinds port buffers; called by the RT thread just before `process`.
    fn init_buffers(&mut self, block_size: usize);

    fn activate(&mut self) {
        self.state_mut().active = true;
    }

    fn deactivate(&mut self) {
        self.state_mut().active = false;
    }

    fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.state_mut().enabled = enabled;
    }

    fn latency(&self) -> u32 {
        self.state().latency
    }

    /// Runs one block. `inputs`/`outputs` are per-channel slices sized to
    /// `frames`; `events` holds the note/CC traffic already filtered by the
    /// caller per `ctrl_in_channel` (§4.G) — formats with no event channel
    /// of their own (internal plugins today) are free to ignore it.
    fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        events: &EventPort,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        state: PluginState,
    }

    impl PluginWrapper for Dummy {
        fn state(&self) -> &PluginState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut PluginState {
            &mut self.state
        }
        fn init_buffers(&mut self, _block_size: usize) {}
        fn process(
            &mut self,
            _inputs: &[&[f32]],
            _outputs: &mut [&mut [f32]],
            _frames: usize,
            _events: &EventPort,
        ) {
        }
    }

    fn dummy() -> Dummy {
        Dummy {
            state: PluginState::new(
                0,
                PluginMetadata {
                    kind: PluginKind::Internal,
                    category: "utility".into(),
                    hints: PluginHints::empty(),
                    name: "Dummy".into(),
                    filename: String::new(),
                    label: "dummy".into(),
                    unique_id: 0,
                },
            ),
        }
    }

    #[test]
    fn set_param_out_of_range_is_invalid_argument() {
        let mut plugin = dummy();
        assert!(matches!(
            plugin.set_param(0, 0.5, WriteFlags::CONTROL_THREAD),
            Err(carla_core::Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn set_custom_data_overwrites_existing_key() {
        let mut plugin = dummy();
        plugin.set_custom_data("string".into(), "preset".into(), "a".into(), false);
        plugin.set_custom_data("string".into(), "preset".into(), "b".into(), false);
        assert_eq!(plugin.custom_data().len(), 1);
        assert_eq!(plugin.custom_data()[0].value, "b");
    }

    #[test]
    fn set_program_rejects_out_of_range() {
        let mut plugin = dummy();
        plugin.state_mut().programs = vec!["Init".into()];
        assert!(plugin.set_program(0, WriteFlags::CONTROL_THREAD).is_ok());
        assert!(plugin.set_program(5, WriteFlags::CONTROL_THREAD).is_err());
    }
}
