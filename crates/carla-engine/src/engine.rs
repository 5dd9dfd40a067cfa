//! The engine façade (§4, §6): ties the driver, plugin registry, RT queues
//! and rack/patchbay processor together behind the public `init/close/
//! idle/process` surface. Grounded on `CarlaEngine` in
//! `CarlaEngineInternal.hpp`, reimplemented per §9 without the inheritance
//! hierarchy it used for process-mode specialisation.

use std::time::{Duration, Instant};

use carla_core::{
    EngineCallback, EngineCallbackAction, EngineEvent, EngineOptions, Error, InternalTransport,
    ProcessMode, Result, TimeInfo,
};
use carla_plugin::PluginWrapper;

use crate::driver::{DriverCapabilities, EngineDriver};
use crate::patchbay::PatchbayProcessor;
use crate::queues::{build_queues, PostRtEvent, PostRtEventKind, PostRtEventReceiver, PostRtEventSender, RtCommand, RtCommandReceiver, RtCommandSender, RING_CAPACITY};
use crate::rack::{RackPeaks, RackProcessor};
use crate::registry::PluginRegistry;

/// Whichever shape `process_mode` picked (§4.G / §4.H); `Engine::process`
/// matches on this, mirroring the driver's own tagged-enum dispatch.
enum Processor {
    Rack(RackProcessor),
    Patchbay(PatchbayProcessor),
}

/// Aggregate result of one `process` call, surfaced to the caller for tests
/// and for driving a real audio callback (§4.G, §8).
pub struct ProcessOutcome {
    pub time: TimeInfo,
    pub peaks: Option<RackPeaks>,
    pub events_out: Vec<EngineEvent>,
}

pub struct Engine {
    options: EngineOptions,
    driver: EngineDriver,
    registry: PluginRegistry,
    transport: InternalTransport,
    processor: Processor,
    cmd_tx: RtCommandSender,
    cmd_rx: RtCommandReceiver,
    evt_tx: PostRtEventSender,
    evt_rx: PostRtEventReceiver,
    callback: Option<EngineCallback>,
    last_error: Option<String>,
    initialized: bool,
    about_to_close: bool,
    /// Bound on [`Self::wait_for_rt_drain`] (§5): at least four blocks' worth
    /// of processing time, floored at 200ms so a tiny buffer size doesn't
    /// make the bound unrealistically tight.
    rt_drain_timeout: Duration,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Result<Self> {
        options.validate()?;

        let driver = EngineDriver::from_process_mode(options.process_mode, options.transport_mode);
        let processor = match options.process_mode {
            ProcessMode::Patchbay => Processor::Patchbay(PatchbayProcessor::new(options.buffer_size as usize)),
            _ => Processor::Rack(RackProcessor::new(options.buffer_size as usize)),
        };
        let transport = InternalTransport::new(options.sample_rate, true);
        let (cmd_tx, cmd_rx, evt_tx, evt_rx) = build_queues(RING_CAPACITY);
        let block_period =
            Duration::from_secs_f64(options.buffer_size as f64 / options.sample_rate);
        let rt_drain_timeout = (block_period * 4).max(Duration::from_millis(200));

        let fixed_topology = !matches!(options.process_mode, ProcessMode::Patchbay);

        Ok(Self {
            registry: PluginRegistry::new(options.max_parameters as usize, fixed_topology),
            options,
            driver,
            transport,
            processor,
            cmd_tx,
            cmd_rx,
            evt_tx,
            evt_rx,
            callback: None,
            last_error: None,
            initialized: false,
            about_to_close: false,
            rt_drain_timeout,
        })
    }

    pub fn set_callback(&mut self, callback: EngineCallback) {
        self.callback = Some(callback);
    }

    fn fire(&self, action: EngineCallbackAction, plugin_id: u32, v1: i32, v2: i32, v3: f32, message: Option<&str>) {
        if let Some(cb) = &self.callback {
            cb(action, plugin_id, v1, v2, v3, message);
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.last_error = Some(err.to_string());
        tracing::error!(error = %err, "engine operation failed");
        err
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Opens the driver (§6). Idempotent: calling `init` twice without an
    /// intervening `close` is an `InvalidState` error.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            let err = Error::InvalidState("engine is already initialized".into());
            return Err(self.fail(err));
        }
        self.driver
            .open(self.options.sample_rate, self.options.buffer_size)
            .map_err(|e| self.fail(e))?;
        self.initialized = true;
        self.about_to_close = false;
        tracing::info!(process_mode = ?self.options.process_mode, "engine initialized");
        Ok(())
    }

    /// Quiesces worker threads ahead of `close()` (§5); in this
    /// single-threaded façade that is simply a flag `close()` checks, but it
    /// keeps the two-step shutdown contract explicit for callers that do run
    /// a real idle thread.
    pub fn set_about_to_close(&mut self) {
        self.about_to_close = true;
    }

    /// Closes the driver and releases every plugin (§5: "per-plugin clients
    /// are released by the registry on engine close"). Requires
    /// `set_about_to_close()` to have been called first, matching the
    /// documented quiesce-then-close contract (§8 scenario 6).
    pub fn close(&mut self) -> Result<()> {
        if !self.about_to_close {
            let err = Error::InvalidState("call set_about_to_close() before close()".into());
            return Err(self.fail(err));
        }
        self.driver.close().map_err(|e| self.fail(e))?;
        self.registry.remove_all();
        self.initialized = false;
        self.about_to_close = false;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.initialized && self.driver.is_running()
    }

    pub fn plugin_count(&self) -> usize {
        self.registry.count()
    }

    pub fn get_plugin(&self, id: u32) -> Option<&dyn PluginWrapper> {
        self.registry.get(id)
    }

    pub fn get_plugin_mut(&mut self, id: u32) -> Option<&mut dyn PluginWrapper> {
        self.registry.get_mut(id).map(|b| b.as_mut())
    }

    /// The per-plugin port/activation handle (§4.C), mirrored to `id`'s
    /// `PluginState::active` after every block this façade drives.
    pub fn client(&self, id: u32) -> Option<&crate::client::EngineClient> {
        self.registry.client(id)
    }

    /// Loads a plugin via `loader` and installs it in the registry (§4.E).
    pub fn add_plugin(
        &mut self,
        requested_name: &str,
        loader: impl FnOnce(u32) -> Result<Box<dyn PluginWrapper>>,
    ) -> Result<u32> {
        match self.registry.add(requested_name, loader) {
            Ok(id) => {
                self.fire(EngineCallbackAction::AddedPlugin, id, 0, 0, 0.0, None);
                Ok(id)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Disables `id`, waits (bounded) for the RT thread to have observed the
    /// disablement, then removes it from the registry (§4.E, §5). Returns
    /// `Error::RtDrainTimeout` if the bound elapses first, leaving the
    /// plugin disabled but still installed so the caller can retry.
    pub fn remove_plugin(&mut self, id: u32) -> Result<()> {
        let plugin = self
            .registry
            .get_mut(id)
            .ok_or_else(|| Error::InvalidArgument(format!("no plugin at id {id}")))
            .map_err(|e| self.fail(e))?;
        plugin.set_enabled(false);
        self.wait_for_rt_drain(id, "remove_plugin")?;
        self.registry.remove(id).map_err(|e| self.fail(e))?;
        self.fire(EngineCallbackAction::RemovedPlugin, id, 0, 0, 0.0, None);
        Ok(())
    }

    /// Polls `plugin.state().active` until it goes false or
    /// `rt_drain_timeout` elapses (§5). In rack mode this drives the rack
    /// forward with a silent block between polls so a quiesced façade
    /// without a concurrent RT thread still converges; in patchbay mode
    /// draining is owned by whoever calls `PatchbayProcessor::process_plugin`
    /// so this only polls the clock.
    fn wait_for_rt_drain(&mut self, id: u32, operation: &str) -> Result<()> {
        let deadline = Instant::now() + self.rt_drain_timeout;
        loop {
            let drained = self
                .registry
                .get(id)
                .map(|p| !p.state().active)
                .unwrap_or(true);
            if drained {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let err = Error::RtDrainTimeout {
                    operation: operation.into(),
                    duration_ms: self.rt_drain_timeout.as_millis() as u64,
                };
                return Err(self.fail(err));
            }
            self.pump_rack_block_for_drain();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// One silent rack block, run only to give a disabled plugin the
    /// chance to be observed and deactivated by [`RackProcessor::process`];
    /// a no-op in patchbay mode.
    fn pump_rack_block_for_drain(&mut self) {
        let Processor::Rack(rack) = &mut self.processor else {
            return;
        };
        let frames = self.options.buffer_size as usize;
        let silence = vec![0.0f32; frames];
        let mut events_out = Vec::new();
        let mut midi_program_changes = Vec::new();
        rack.process(
            &silence,
            &silence,
            self.registry.slots_mut(),
            &[],
            &mut events_out,
            &mut midi_program_changes,
        );
        self.registry.sync_client_states();
    }

    pub fn clone_plugin(&mut self, id: u32) -> Result<u32> {
        self.registry.clone_plugin(id).map_err(|e| self.fail(e))
    }

    pub fn replace_plugin(&mut self, id: u32) -> Result<()> {
        self.registry.replace(id).map_err(|e| self.fail(e))
    }

    pub fn rename_plugin(&mut self, id: u32, new_name: &str) -> Result<String> {
        let name = self.registry.rename(id, new_name).map_err(|e| self.fail(e))?;
        self.fire(EngineCallbackAction::RenamedPlugin, id, 0, 0, 0.0, Some(&name));
        Ok(name)
    }

    /// Waits for both plugins to have drained (§5) before exchanging their
    /// slots; `registry.swap` itself still rejects the call if either is
    /// still enabled, `wait_for_rt_drain` only covers the "disabled but not
    /// yet observed inactive" gap.
    pub fn swap_plugins(&mut self, a: u32, b: u32) -> Result<()> {
        self.wait_for_rt_drain(a, "swap_plugins")?;
        self.wait_for_rt_drain(b, "swap_plugins")?;
        self.registry.swap(a, b).map_err(|e| self.fail(e))
    }

    /// Enqueues a control-thread command for the RT thread to apply at the
    /// top of its next `process` (§4.F). Returns `RtDrainTimeout`-adjacent
    /// `Capacity` if the ring is momentarily full — callers should retry,
    /// never treat it as a permanent failure.
    pub fn send_command(&mut self, command: RtCommand) -> Result<()> {
        if self.cmd_tx.send(command) {
            Ok(())
        } else {
            Err(self.fail(Error::Capacity("RT command ring is full".into())))
        }
    }

    fn drain_commands(&mut self) {
        let mut commands = Vec::new();
        for command in self.cmd_rx.drain() {
            commands.push(command);
        }
        for command in commands {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: RtCommand) {
        match command {
            RtCommand::PluginEnable { plugin_id, enabled } => {
                if let Some(plugin) = self.registry.get_mut(plugin_id) {
                    plugin.set_enabled(enabled);
                }
            }
            RtCommand::SetParam { plugin_id, index, value } => {
                if let Some(plugin) = self.registry.get_mut(plugin_id) {
                    if let Ok(clamped) = plugin.set_param(index, value, carla_plugin::WriteFlags::RT_THREAD) {
                        self.evt_tx.send(PostRtEvent {
                            plugin_id,
                            kind: PostRtEventKind::ParameterChanged,
                            v1: index as i32,
                            v2: 0,
                            v3: clamped,
                        });
                    }
                }
            }
            RtCommand::SetProgram { plugin_id, index } => {
                if let Some(plugin) = self.registry.get_mut(plugin_id) {
                    if plugin.set_program(index, carla_plugin::WriteFlags::RT_THREAD).is_ok() {
                        self.evt_tx.send(PostRtEvent {
                            plugin_id,
                            kind: PostRtEventKind::ProgramChanged,
                            v1: index,
                            v2: 0,
                            v3: 0.0,
                        });
                    }
                }
            }
            RtCommand::SetMidiProgram { plugin_id, index } => {
                if let Some(plugin) = self.registry.get_mut(plugin_id) {
                    if plugin.set_midi_program(index, carla_plugin::WriteFlags::RT_THREAD).is_ok() {
                        self.evt_tx.send(PostRtEvent {
                            plugin_id,
                            kind: PostRtEventKind::MidiProgramChanged,
                            v1: index,
                            v2: 0,
                            v3: 0.0,
                        });
                    }
                }
            }
            RtCommand::NoteOn { plugin_id, channel, note, velocity } => {
                self.evt_tx.send(PostRtEvent {
                    plugin_id,
                    kind: PostRtEventKind::NoteOn,
                    v1: channel as i32,
                    v2: note as i32,
                    v3: velocity as f32,
                });
            }
            RtCommand::NoteOff { plugin_id, channel, note } => {
                self.evt_tx.send(PostRtEvent {
                    plugin_id,
                    kind: PostRtEventKind::NoteOff,
                    v1: channel as i32,
                    v2: note as i32,
                    v3: 0.0,
                });
            }
            RtCommand::PanicAll => {
                for plugin in self.registry.iter_mut() {
                    plugin.set_enabled(false);
                }
            }
        }
    }

    /// Drains the post-RT event ring and routes to the installed callback
    /// (§4.F, §5: "auxiliary idle thread"). Call periodically from a
    /// non-RT context.
    pub fn idle(&mut self) {
        self.driver.idle_noop();
        let events: Vec<_> = self.evt_rx.drain().collect();
        for event in events {
            let action = match event.kind {
                PostRtEventKind::ParameterChanged => EngineCallbackAction::ParameterValueChanged,
                PostRtEventKind::ProgramChanged => EngineCallbackAction::ProgramChanged,
                PostRtEventKind::MidiProgramChanged => EngineCallbackAction::MidiProgramChanged,
                PostRtEventKind::NoteOn => EngineCallbackAction::NoteOn,
                PostRtEventKind::NoteOff => EngineCallbackAction::NoteOff,
                PostRtEventKind::PluginCrashed => EngineCallbackAction::Error,
            };
            self.fire(action, event.plugin_id, event.v1, event.v2, event.v3, None);
        }
    }

    /// Runs one block (§4.G / §4.H / §4.I). Only valid in rack mode for now;
    /// patchbay callers should drive [`PatchbayProcessor::process_plugin`]
    /// directly per plugin, since patchbay ports are per-plugin rather than
    /// a shared bus this façade can generalize over.
    pub fn process_rack(
        &mut self,
        input_left: &[f32],
        input_right: &[f32],
        events_in: &[EngineEvent],
    ) -> Result<ProcessOutcome> {
        if !matches!(self.processor, Processor::Rack(_)) {
            return Err(self.fail(Error::InvalidState(
                "process_rack called while the engine is configured for patchbay mode".into(),
            )));
        }

        let time = self.transport.tick(self.options.buffer_size);
        self.drain_commands();

        let Processor::Rack(rack) = &mut self.processor else {
            unreachable!("checked above");
        };

        let mut events_out = Vec::new();
        let mut midi_program_changes = Vec::new();
        let peaks = rack.process(
            input_left,
            input_right,
            self.registry.slots_mut(),
            events_in,
            &mut events_out,
            &mut midi_program_changes,
        );

        for (plugin_id, index) in midi_program_changes {
            self.evt_tx.send(PostRtEvent {
                plugin_id,
                kind: PostRtEventKind::MidiProgramChanged,
                v1: index,
                v2: 0,
                v3: 0.0,
            });
        }
        self.registry.sync_client_states();

        Ok(ProcessOutcome {
            time,
            peaks: Some(peaks),
            events_out,
        })
    }

    /// Reconfigures the block size (§4.D, §9): resizes the processor's
    /// buffers, reopens the driver at the new size, reinits every plugin
    /// in place via [`PluginRegistry::reinit_for_sample_rate`] (unchanged
    /// sample rate, new block size), recomputes [`Self::rt_drain_timeout`]
    /// and fires `BufferSizeChanged`.
    pub fn set_buffer_size(&mut self, buffer_size: u32) -> Result<()> {
        self.options.buffer_size = buffer_size;
        match &mut self.processor {
            Processor::Rack(rack) => rack.resize(buffer_size as usize),
            Processor::Patchbay(patchbay) => patchbay.resize(buffer_size as usize),
        }
        if self.initialized {
            self.driver
                .open(self.options.sample_rate, buffer_size)
                .map_err(|e| self.fail(e))?;
        }
        self.reinit_all_plugins()?;
        self.recompute_rt_drain_timeout();
        self.fire(EngineCallbackAction::BufferSizeChanged, 0, buffer_size as i32, 0, 0.0, None);
        Ok(())
    }

    /// Reconfigures the sample rate (§4.D, §9): reopens the driver, updates
    /// the internal transport, reinits every plugin (formats that can't
    /// absorb the change in place are rebuilt, per
    /// [`PluginWrapper::supports_sample_rate_change`]), recomputes
    /// [`Self::rt_drain_timeout`] and fires `SampleRateChanged`.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.options.sample_rate = sample_rate;
        self.transport.set_sample_rate(sample_rate);
        if self.initialized {
            self.driver
                .open(sample_rate, self.options.buffer_size)
                .map_err(|e| self.fail(e))?;
        }
        self.reinit_all_plugins()?;
        self.recompute_rt_drain_timeout();
        self.fire(EngineCallbackAction::SampleRateChanged, 0, 0, 0, sample_rate as f32, None);
        Ok(())
    }

    /// Reinits every plugin for the engine's current sample rate/block size
    /// (§4.D, §9). A plugin that was enabled is disabled and drained (§5)
    /// before its reinit so a rebuild never races the RT thread, then
    /// re-enabled once the new instance is installed.
    fn reinit_all_plugins(&mut self) -> Result<()> {
        let sample_rate = self.options.sample_rate;
        let block_size = self.options.buffer_size as usize;
        for id in 0..self.registry.count() as u32 {
            let was_enabled = self
                .registry
                .get(id)
                .map(|p| p.is_enabled())
                .unwrap_or(false);
            if was_enabled {
                self.registry.get_mut(id).unwrap().set_enabled(false);
                self.wait_for_rt_drain(id, "reinit_for_sample_rate")?;
            }
            self.registry
                .reinit_for_sample_rate(id, sample_rate, block_size)
                .map_err(|e| self.fail(e))?;
            if was_enabled {
                if let Some(plugin) = self.registry.get_mut(id) {
                    plugin.set_enabled(true);
                }
            }
        }
        Ok(())
    }

    fn recompute_rt_drain_timeout(&mut self) {
        let block_period =
            Duration::from_secs_f64(self.options.buffer_size as f64 / self.options.sample_rate);
        self.rt_drain_timeout = (block_period * 4).max(Duration::from_millis(200));
    }

    /// Mirrors every plugin's `PluginState::active` onto its `EngineClient`
    /// (§4.C). `process_rack` and `process_patchbay_plugin` call this
    /// themselves.
    pub fn sync_client_states(&mut self) {
        self.registry.sync_client_states();
    }

    /// Runs one plugin's patchbay block (§4.H) and syncs its `EngineClient`
    /// afterwards, the patchbay analogue of `process_rack`. `buffers` and
    /// `events` are per-plugin, owned by the caller since patchbay ports
    /// don't share a bus the way rack mode's do.
    pub fn process_patchbay_plugin(
        &mut self,
        id: u32,
        buffers: &mut crate::patchbay::PluginBuffers,
        events: &carla_core::EventPort,
    ) -> Result<()> {
        if !matches!(self.processor, Processor::Patchbay(_)) {
            return Err(self.fail(Error::InvalidState(
                "process_patchbay_plugin called while the engine is configured for rack mode".into(),
            )));
        }
        if self.registry.get(id).is_none() {
            return Err(self.fail(Error::InvalidArgument(format!("no plugin at id {id}"))));
        }
        let Processor::Patchbay(patchbay) = &self.processor else {
            unreachable!("checked above");
        };
        let plugin = self.registry.get_mut(id).unwrap();
        patchbay.process_plugin(plugin.as_mut(), buffers, events);
        self.registry.sync_client_states();
        Ok(())
    }

    pub fn patchbay_processor_mut(&mut self) -> Option<&mut PatchbayProcessor> {
        match &mut self.processor {
            Processor::Patchbay(p) => Some(p),
            Processor::Rack(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carla_core::{ProcessMode, TransportMode};
    use carla_plugin::GainPlugin;

    fn rack_options() -> EngineOptions {
        let mut opts = EngineOptions::default();
        opts.process_mode = ProcessMode::ContinuousRack;
        opts.transport_mode = TransportMode::Internal;
        opts.buffer_size = 256;
        opts
    }

    #[test]
    fn load_play_remove_scenario() {
        let mut engine = Engine::new(rack_options()).unwrap();
        engine.set_about_to_close();
        engine.init().unwrap();

        let id = engine
            .add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp")) as Box<dyn PluginWrapper>))
            .unwrap();
        assert_eq!(id, 0);

        engine.send_command(RtCommand::SetParam { plugin_id: 0, index: 0, value: 0.5 }).unwrap();

        let input = vec![1.0f32; 256];
        let silence = vec![0.0f32; 256];
        let outcome = engine.process_rack(&input, &silence, &[]).unwrap();
        let peaks = outcome.peaks.unwrap();
        assert!(peaks.output_left > 0.49 && peaks.output_left < 0.51);
        assert_eq!(peaks.output_left, peaks.output_right);

        engine.remove_plugin(0).unwrap();
        assert_eq!(engine.plugin_count(), 0);
    }

    #[test]
    fn init_twice_is_invalid_state() {
        let mut engine = Engine::new(rack_options()).unwrap();
        engine.init().unwrap();
        assert!(matches!(engine.init(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn close_without_about_to_close_is_rejected() {
        let mut engine = Engine::new(rack_options()).unwrap();
        engine.init().unwrap();
        assert!(matches!(engine.close(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn quiesce_then_close_releases_all_plugins() {
        let mut engine = Engine::new(rack_options()).unwrap();
        engine.init().unwrap();
        engine
            .add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp")) as Box<dyn PluginWrapper>))
            .unwrap();
        engine.set_about_to_close();
        engine.close().unwrap();
        assert_eq!(engine.plugin_count(), 0);
        assert!(!engine.is_running());
    }

    #[test]
    fn panic_all_disables_every_plugin() {
        let mut engine = Engine::new(rack_options()).unwrap();
        engine.set_about_to_close();
        engine.init().unwrap();
        engine
            .add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp")) as Box<dyn PluginWrapper>))
            .unwrap();
        engine.send_command(RtCommand::PanicAll).unwrap();
        let silence = vec![0.0f32; 256];
        engine.process_rack(&silence, &silence, &[]).unwrap();
        assert!(!engine.get_plugin(0).unwrap().is_enabled());
    }

    #[test]
    fn remove_plugin_succeeds_immediately_when_never_processed() {
        let mut engine = Engine::new(rack_options()).unwrap();
        engine.set_about_to_close();
        engine.init().unwrap();
        let id = engine
            .add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp")) as Box<dyn PluginWrapper>))
            .unwrap();
        // never processed: `active` is still false, so the drain wait
        // resolves on its very first check.
        engine.remove_plugin(id).unwrap();
        assert_eq!(engine.plugin_count(), 0);
    }

    #[test]
    fn remove_plugin_drains_an_active_plugin_in_rack_mode() {
        let mut engine = Engine::new(rack_options()).unwrap();
        engine.set_about_to_close();
        engine.init().unwrap();
        let id = engine
            .add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp")) as Box<dyn PluginWrapper>))
            .unwrap();

        let silence = vec![0.0f32; 256];
        engine.process_rack(&silence, &silence, &[]).unwrap();
        assert!(engine.get_plugin(id).unwrap().state().active);

        // remove_plugin disables it and pumps the rack itself until the
        // block loop observes the disablement and deactivates it.
        engine.remove_plugin(id).unwrap();
        assert_eq!(engine.plugin_count(), 0);
    }

    #[test]
    fn remove_plugin_times_out_when_nothing_drives_patchbay_forward() {
        let mut opts = EngineOptions::default();
        opts.process_mode = ProcessMode::Patchbay;
        opts.transport_mode = TransportMode::Internal;
        opts.buffer_size = 64;
        let mut engine = Engine::new(opts).unwrap();
        engine.set_about_to_close();
        engine.init().unwrap();
        let id = engine
            .add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp")) as Box<dyn PluginWrapper>))
            .unwrap();

        // simulate the RT thread having processed this plugin at least once
        engine.get_plugin_mut(id).unwrap().activate();

        // patchbay mode has no shared bus for the engine to pump on its own;
        // draining is the patchbay caller's job, so nobody ever deactivates
        // this plugin and the bounded wait must time out.
        let err = engine.remove_plugin(id).unwrap_err();
        assert!(matches!(err, Error::RtDrainTimeout { .. }));
        // the plugin is left disabled but still installed for a retry.
        assert_eq!(engine.plugin_count(), 1);
        assert!(!engine.get_plugin(id).unwrap().is_enabled());
    }

    #[test]
    fn patchbay_processing_syncs_engine_client_activation() {
        use crate::patchbay::PluginBuffers;

        let mut opts = EngineOptions::default();
        opts.process_mode = ProcessMode::Patchbay;
        opts.transport_mode = TransportMode::Internal;
        opts.buffer_size = 64;
        let mut engine = Engine::new(opts).unwrap();
        engine.set_about_to_close();
        engine.init().unwrap();
        let id = engine
            .add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp")) as Box<dyn PluginWrapper>))
            .unwrap();

        assert!(!engine.client(id).unwrap().is_active());

        let events = carla_core::EventPort::new(carla_core::PortDirection::Input);
        let mut buffers = PluginBuffers::new(1, 1, 64);
        engine.process_patchbay_plugin(id, &mut buffers, &events).unwrap();

        assert!(engine.client(id).unwrap().is_active());
    }

    #[test]
    fn set_buffer_size_reinits_internal_plugin_in_place_and_fires_callback() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let mut engine = Engine::new(rack_options()).unwrap();
        engine.set_about_to_close();
        engine.init().unwrap();
        let id = engine
            .add_plugin("amp", |id| Ok(Box::new(GainPlugin::new(id, "amp")) as Box<dyn PluginWrapper>))
            .unwrap();
        engine
            .get_plugin_mut(id)
            .unwrap()
            .set_param(0, 0.75, carla_plugin::WriteFlags::CONTROL_THREAD)
            .unwrap();

        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        engine.set_callback(std::sync::Arc::new(move |action, _id, v1, _v2, _v3, _msg| {
            if action == EngineCallbackAction::BufferSizeChanged {
                assert_eq!(v1, 512);
                fired_clone.store(true, Ordering::SeqCst);
            }
        }));

        engine.set_buffer_size(512).unwrap();

        assert_eq!(engine.options().buffer_size, 512);
        assert_eq!(engine.get_plugin(id).unwrap().param_value(0), Some(0.75));
        assert!(fired.load(Ordering::SeqCst));
    }

    /// A plugin that can't absorb a sample-rate change in place, modelling
    /// the bridge format without spawning a real sub-process.
    struct FixedRatePlugin {
        state: carla_plugin::PluginState,
    }

    impl FixedRatePlugin {
        fn new(id: u32) -> Self {
            let state = carla_plugin::PluginState::new(
                id,
                carla_plugin::PluginMetadata {
                    kind: carla_plugin::PluginKind::Bridge,
                    category: "bridge".into(),
                    hints: carla_plugin::PluginHints::empty(),
                    name: "fixed-rate".into(),
                    filename: String::new(),
                    label: "fixed-rate".into(),
                    unique_id: 0,
                },
            );
            Self { state }
        }
    }

    impl PluginWrapper for FixedRatePlugin {
        fn state(&self) -> &carla_plugin::PluginState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut carla_plugin::PluginState {
            &mut self.state
        }
        fn init_buffers(&mut self, _block_size: usize) {}
        fn supports_sample_rate_change(&self) -> bool {
            false
        }
        fn reinit_for_sample_rate(&self, new_id: u32, _sample_rate: f64) -> Result<Box<dyn PluginWrapper>> {
            Ok(Box::new(FixedRatePlugin::new(new_id)))
        }
        fn process(
            &mut self,
            _inputs: &[&[f32]],
            _outputs: &mut [&mut [f32]],
            _frames: usize,
            _events: &carla_core::EventPort,
        ) {
        }
    }

    #[test]
    fn set_sample_rate_rebuilds_a_plugin_that_cannot_adapt_in_place() {
        let mut engine = Engine::new(rack_options()).unwrap();
        engine.set_about_to_close();
        engine.init().unwrap();
        let id = engine
            .add_plugin("fixed", |id| Ok(Box::new(FixedRatePlugin::new(id)) as Box<dyn PluginWrapper>))
            .unwrap();

        engine.set_sample_rate(96_000.0).unwrap();

        assert_eq!(engine.options().sample_rate, 96_000.0);
        assert_eq!(engine.get_plugin(id).unwrap().id(), id);
        assert_eq!(engine.get_plugin(id).unwrap().name(), "fixed-rate");
    }
}
