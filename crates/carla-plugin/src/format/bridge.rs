//! The bridge plugin variant (§4.B, §9): hosts exactly one plugin in a
//! sub-process and drives it over `carla_bridge`'s wire protocol. Grounded
//! on `PluginClient` in the teacher's `tutti-plugin/src/client.rs` — the
//! spawn/handshake/process/crash-detection shape is the same, adapted to
//! this spec's synchronous, RT-callable `process()` contract instead of the
//! teacher's async `AudioUnit` trait.

use std::io::{BufReader, BufWriter};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use carla_bridge::{
    read_frame, unique_shm_name, write_frame, BridgeConfig, BridgeMessage, HostMessage,
    MidiEventVec, SharedAudioBuffer,
};
use carla_core::{engine_event_to_midi, Error, EventPort, LoadStage, Result};

use crate::wrapper::{PluginHints, PluginKind, PluginMetadata, PluginState, PluginWrapper};

/// Owns the child process and the two shared-memory pages; dropping it
/// kills the child and removes the socket and shared-memory files, mirroring
/// the teacher's `PluginClientHandle`.
struct BridgeProcess {
    child: Child,
    socket_path: PathBuf,
    control: BufReader<UnixStream>,
    control_writer: BufWriter<UnixStream>,
    input_shm: SharedAudioBuffer,
    output_shm: SharedAudioBuffer,
    crashed: AtomicBool,
}

impl BridgeProcess {
    fn spawn(server_binary: &PathBuf, config: &BridgeConfig, channels: usize) -> Result<Self> {
        let listener = UnixListener::bind(&config.socket_path).map_err(|e| {
            Error::PluginLoadError {
                path: server_binary.clone(),
                stage: LoadStage::Opening,
                reason: format!("failed to bind bridge socket: {e}"),
            }
        })?;

        let child = Command::new(server_binary)
            .arg(&config.socket_path)
            .spawn()
            .map_err(|e| Error::PluginLoadError {
                path: server_binary.clone(),
                stage: LoadStage::Opening,
                reason: format!("failed to spawn bridge process: {e}"),
            })?;

        let stream = Self::accept_with_timeout(&listener, server_binary, BRIDGE_HANDSHAKE_TIMEOUT)?;
        stream.set_nonblocking(false).map_err(Error::Io)?;

        let write_stream = stream.try_clone().map_err(Error::Io)?;

        let in_name = unique_shm_name(&config.shm_prefix, "in");
        let out_name = unique_shm_name(&config.shm_prefix, "out");
        let input_shm = SharedAudioBuffer::create(&in_name, channels, config.max_buffer_size)
            .map_err(Error::Io)?;
        let output_shm = SharedAudioBuffer::create(&out_name, channels, config.max_buffer_size)
            .map_err(Error::Io)?;

        Ok(Self {
            child,
            socket_path: config.socket_path.clone(),
            control: BufReader::new(stream),
            control_writer: BufWriter::new(write_stream),
            input_shm,
            output_shm,
            crashed: AtomicBool::new(false),
        })
    }

    /// Polls `listener` non-blockingly until the bridge process connects or
    /// `timeout` elapses. `UnixListener` has no native accept-timeout, so the
    /// bound is enforced with a short sleep between poll attempts rather than
    /// a single blocking `accept()` call.
    fn accept_with_timeout(
        listener: &UnixListener,
        server_binary: &PathBuf,
        timeout: Duration,
    ) -> Result<UnixStream> {
        listener.set_nonblocking(true).map_err(Error::Io)?;
        let deadline = Instant::now() + timeout;
        loop {
            match listener.accept() {
                Ok((stream, _)) => return Ok(stream),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::PluginLoadError {
                            path: server_binary.clone(),
                            stage: LoadStage::Opening,
                            reason: format!(
                                "bridge process did not connect within {timeout:?}"
                            ),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    return Err(Error::PluginLoadError {
                        path: server_binary.clone(),
                        stage: LoadStage::Opening,
                        reason: format!("bridge process did not connect: {e}"),
                    })
                }
            }
        }
    }

    fn request(&mut self, msg: HostMessage) -> Result<BridgeMessage> {
        if self.crashed.load(Ordering::Acquire) {
            return Err(Error::DriverError("bridge process has crashed".into()));
        }
        if write_frame(&mut self.control_writer, &msg).is_err() {
            self.crashed.store(true, Ordering::Release);
            return Err(Error::DriverError("bridge write failed".into()));
        }
        match read_frame(&mut self.control) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.crashed.store(true, Ordering::Release);
                Err(Error::Io(e))
            }
        }
    }

    fn is_crashed(&self) -> bool {
        self.crashed.load(Ordering::Acquire)
    }
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        let _ = self.request(HostMessage::Shutdown);
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// A plugin hosted in a bridge sub-process.
pub struct BridgePlugin {
    state: PluginState,
    process: BridgeProcess,
    server_binary: PathBuf,
    path: PathBuf,
    sample_rate: f64,
    buffer_size: u32,
}

impl BridgePlugin {
    /// Spawns the bridge server, loads `path` inside it, and negotiates
    /// port/parameter counts via the `Ready` handshake.
    pub fn load(
        id: u32,
        server_binary: PathBuf,
        path: PathBuf,
        sample_rate: f64,
        buffer_size: u32,
    ) -> Result<Self> {
        let config = BridgeConfig::default();
        let mut process = BridgeProcess::spawn(&server_binary, &config, 2)?;

        let reply = process.request(HostMessage::LoadPlugin {
            path: path.clone(),
            sample_rate,
            buffer_size,
        })?;

        let (audio_in, audio_out, param_count) = match reply {
            BridgeMessage::Ready {
                audio_in_count,
                audio_out_count,
                parameter_count,
                ..
            } => (audio_in_count, audio_out_count, parameter_count),
            BridgeMessage::PluginLoadFailed { reason } => {
                return Err(Error::PluginLoadError {
                    path,
                    stage: LoadStage::Instantiation,
                    reason,
                })
            }
            other => {
                return Err(Error::PluginLoadError {
                    path,
                    stage: LoadStage::Instantiation,
                    reason: format!("unexpected reply: {other:?}"),
                })
            }
        };

        let mut state = PluginState::new(
            id,
            PluginMetadata {
                kind: PluginKind::Bridge,
                category: "bridge".into(),
                hints: PluginHints::IS_BRIDGED,
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                filename: path.to_string_lossy().into_owned(),
                label: String::new(),
                unique_id: 0,
            },
        );
        state.audio_in_count = audio_in;
        state.audio_out_count = audio_out;
        for i in 0..param_count {
            state
                .parameters
                .push(carla_core::Parameter::new(format!("param{i}"), carla_core::ParameterRanges::new(0.0, 1.0, 0.0)));
        }

        Ok(Self {
            state,
            process,
            server_binary,
            path,
            sample_rate,
            buffer_size,
        })
    }

    pub fn is_crashed(&self) -> bool {
        self.process.is_crashed()
    }
}

impl BridgePlugin {
    fn reload_at(&self, new_id: u32) -> Result<Self> {
        self.reload_at_sample_rate(new_id, self.sample_rate)
    }

    /// Spawns a fresh bridge process for `new_id` at `sample_rate` and
    /// copies over the program/parameter/custom-data state this instance
    /// carries (§4.D `clone`/§9 sample-rate reinit, both routed through
    /// here).
    fn reload_at_sample_rate(&self, new_id: u32, sample_rate: f64) -> Result<Self> {
        let mut reloaded = Self::load(
            new_id,
            self.server_binary.clone(),
            self.path.clone(),
            sample_rate,
            self.buffer_size,
        )?;
        reloaded.state.current_program = self.state.current_program;
        reloaded.state.current_midi_program = self.state.current_midi_program;
        reloaded.state.custom_data = self.state.custom_data.clone();
        for (i, param) in self.state.parameters.iter().enumerate() {
            if let Some(target) = reloaded.state.parameters.get_mut(i) {
                target.set_value(param.value());
            }
        }
        Ok(reloaded)
    }
}

impl PluginWrapper for BridgePlugin {
    fn state(&self) -> &PluginState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut PluginState {
        &mut self.state
    }

    fn set_param(&mut self, index: u32, value: f32, flags: crate::wrapper::WriteFlags) -> Result<f32> {
        let clamped = self
            .state
            .parameters
            .get(index as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("parameter {index} out of range")))?
            .set_value(value);
        if !flags.from_rt {
            let _ = self.process.request(HostMessage::SetParameter { index, value: clamped });
        }
        Ok(clamped)
    }

    fn init_buffers(&mut self, _block_size: usize) {}

    fn clone_wrapper(&self, new_id: u32) -> Result<Box<dyn PluginWrapper>> {
        Ok(Box::new(self.reload_at(new_id)?))
    }

    /// The bridge opens its child at a fixed rate (`LoadPlugin { sample_rate, .. }`),
    /// so an in-place rate change isn't possible; the engine rebuilds it instead.
    fn supports_sample_rate_change(&self) -> bool {
        false
    }

    fn reinit_for_sample_rate(&self, new_id: u32, sample_rate: f64) -> Result<Box<dyn PluginWrapper>> {
        Ok(Box::new(self.reload_at_sample_rate(new_id, sample_rate)?))
    }

    /// Fills silence on any bridge failure instead of panicking, matching
    /// the teacher's crash-tolerant `process_impl`. Events are forwarded to
    /// the child as raw wire MIDI via `engine_event_to_midi`; a `None`
    /// conversion (a bank-select `Parameter` event, which cannot happen once
    /// ingestion is correct) is simply skipped.
    fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
        events: &EventPort,
    ) {
        for (ch, input) in inputs.iter().enumerate() {
            self.process.input_shm.write_channel(ch, &input[..frames.min(input.len())]);
        }

        let midi_events: MidiEventVec = events
            .iter()
            .filter_map(|event| {
                let (data, size) = engine_event_to_midi(event)?;
                Some((event.time, event.channel, data, size as u8))
            })
            .collect();

        let reply = self.process.request(HostMessage::ProcessAudio {
            input_shm: self.process.input_shm.name(),
            output_shm: self.process.output_shm.name(),
            num_samples: frames as u32,
            midi_events,
        });

        match reply {
            Ok(BridgeMessage::AudioProcessed { .. }) => {
                for (ch, output) in outputs.iter_mut().enumerate() {
                    let samples = self.process.output_shm.read_channel(ch, frames);
                    output[..samples.len()].copy_from_slice(&samples);
                }
            }
            _ => {
                for output in outputs.iter_mut() {
                    output[..frames].fill(0.0);
                }
            }
        }
    }
}

/// How long `BridgeProcess::spawn` will poll for the child's initial
/// connection before giving up (`accept_with_timeout`); not a per-block
/// timeout (the RT path blocks on the IPC round trip by design, per §9's
/// "reimplement as an explicit IPC component").
pub const BRIDGE_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(5000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_with_timeout_gives_up_when_nobody_connects() {
        let dir = std::env::temp_dir().join(format!("carla-bridge-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let socket_path = dir.join("never-connected.sock");
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path).unwrap();

        let started = Instant::now();
        let err = BridgeProcess::accept_with_timeout(
            &listener,
            &PathBuf::from("unused"),
            Duration::from_millis(20),
        )
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(matches!(err, Error::PluginLoadError { .. }));

        let _ = std::fs::remove_file(&socket_path);
    }
}
