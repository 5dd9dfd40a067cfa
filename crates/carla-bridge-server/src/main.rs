//! The bridge sub-process binary (§4.B, §6): connects back to the engine
//! over the Unix socket path passed as its only argument, loads one plugin,
//! and serves the `carla_bridge` wire protocol until told to shut down.
//! Grounded on the teacher's `PluginServer` bridge-process entry point in
//! `tutti-plugin/src/server.rs`.
//!
//! Real per-format plugin loading (LADSPA/VST/LV2/...) is out of scope
//! (§1 Non-goals); this process hosts one of `carla_plugin`'s internal
//! variants chosen by the requested path's file stem, which is enough to
//! exercise the full bridge round trip end to end.

use std::os::unix::net::UnixStream;

use carla_bridge::{read_frame, write_frame, BridgeConfig, BridgeMessage, HostMessage, SharedAudioBuffer};
use carla_core::{midi_to_engine_event, Error, EventPort, PortDirection};
use carla_plugin::{GainPlugin, PassthroughPlugin, PluginWrapper, WriteFlags};

/// Chooses which internal plugin variant to host based on the requested
/// path's file stem; "gain"/"amp" loads [`GainPlugin`], anything else falls
/// back to [`PassthroughPlugin`] (§4.J: discovery/loading of real formats is
/// an external collaborator this workspace does not implement).
fn load_plugin(path: &std::path::Path) -> Box<dyn PluginWrapper> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bridged".into());

    if stem.contains("gain") || stem.contains("amp") {
        Box::new(GainPlugin::new(0, name))
    } else {
        Box::new(PassthroughPlugin::new(0, name))
    }
}

fn run(socket_path: &str) -> Result<(), Error> {
    let stream = UnixStream::connect(socket_path)?;
    let mut reader = stream.try_clone()?;
    let mut writer = stream;

    let mut plugin: Option<Box<dyn PluginWrapper>> = None;
    let max_buffer_size = BridgeConfig::default().max_buffer_size;

    loop {
        let message: HostMessage = match read_frame(&mut reader) {
            Ok(m) => m,
            Err(_) => {
                tracing::warn!("control channel closed, exiting");
                return Ok(());
            }
        };

        let reply = match message {
            HostMessage::LoadPlugin { path, .. } => {
                let loaded = load_plugin(&path);
                let reply = BridgeMessage::Ready {
                    audio_in_count: loaded.audio_in_count(),
                    audio_out_count: loaded.audio_out_count(),
                    parameter_count: loaded.parameter_count(),
                    program_count: loaded.program_count(),
                    midi_program_count: loaded.midi_program_count(),
                };
                plugin = Some(loaded);
                reply
            }
            HostMessage::UnloadPlugin => {
                plugin = None;
                BridgeMessage::Unloaded
            }
            HostMessage::ProcessAudio { input_shm, output_shm, num_samples, midi_events } => {
                match &mut plugin {
                    Some(p) => {
                        let channels = 2usize;
                        let frames = num_samples as usize;
                        let input_buf = SharedAudioBuffer::open(&input_shm, channels, max_buffer_size)?;
                        let mut output_buf = SharedAudioBuffer::open(&output_shm, channels, max_buffer_size)?;

                        let in_channels: Vec<Vec<f32>> = (0..p.audio_in_count().max(1) as usize)
                            .map(|ch| input_buf.read_channel(ch.min(channels - 1), frames))
                            .collect();
                        let in_slices: Vec<&[f32]> = in_channels.iter().map(|v| v.as_slice()).collect();

                        let mut events = EventPort::new(PortDirection::Input);
                        for (time, channel, data, size) in midi_events.iter() {
                            if let Some(event) =
                                midi_to_engine_event(*time, 0, &data[..*size as usize])
                            {
                                let mut event = event;
                                event.channel = *channel;
                                events.push_input(event);
                            }
                        }

                        let mut out_channels: Vec<Vec<f32>> =
                            vec![vec![0.0f32; frames]; p.audio_out_count().max(1) as usize];
                        {
                            let mut out_slices: Vec<&mut [f32]> =
                                out_channels.iter_mut().map(|v| v.as_mut_slice()).collect();
                            p.process(&in_slices, &mut out_slices, frames, &events);
                        }
                        for (ch, buf) in out_channels.iter().enumerate() {
                            output_buf.write_channel(ch.min(channels - 1), buf);
                        }

                        BridgeMessage::AudioProcessed {
                            latency_us: 0,
                            midi_output: Default::default(),
                        }
                    }
                    None => BridgeMessage::Error {
                        message: "no plugin loaded".into(),
                    },
                }
            }
            HostMessage::SetParameter { index, value } => match &mut plugin {
                Some(p) => match p.set_param(index, value, WriteFlags::CONTROL_THREAD) {
                    Ok(clamped) => BridgeMessage::ParameterValue { value: clamped },
                    Err(e) => BridgeMessage::Error { message: e.to_string() },
                },
                None => BridgeMessage::Error { message: "no plugin loaded".into() },
            },
            HostMessage::GetParameter { index } => match &plugin {
                Some(p) => BridgeMessage::ParameterValue {
                    value: p.param_value(index).unwrap_or(0.0),
                },
                None => BridgeMessage::Error { message: "no plugin loaded".into() },
            },
            HostMessage::GetParameterInfo { index } => match &plugin {
                Some(p) => BridgeMessage::ParameterInfo(carla_bridge::ParameterInfo {
                    index,
                    name: p.param_name(index).unwrap_or("").to_string(),
                    unit: p.param_unit(index).unwrap_or("").to_string(),
                    min: 0.0,
                    max: 1.0,
                    def: 0.0,
                }),
                None => BridgeMessage::Error { message: "no plugin loaded".into() },
            },
            HostMessage::SetProgram { index } => match &mut plugin {
                Some(p) => match p.set_program(index as i32, WriteFlags::CONTROL_THREAD) {
                    Ok(()) => BridgeMessage::PluginSaved,
                    Err(e) => BridgeMessage::Error { message: e.to_string() },
                },
                None => BridgeMessage::Error { message: "no plugin loaded".into() },
            },
            HostMessage::SetMidiProgram { index } => match &mut plugin {
                Some(p) => match p.set_midi_program(index as i32, WriteFlags::CONTROL_THREAD) {
                    Ok(()) => BridgeMessage::PluginSaved,
                    Err(e) => BridgeMessage::Error { message: e.to_string() },
                },
                None => BridgeMessage::Error { message: "no plugin loaded".into() },
            },
            HostMessage::SetCustomData(data) => {
                if let Some(p) = &mut plugin {
                    p.set_custom_data(data.ty, data.key, data.value, false);
                }
                BridgeMessage::PluginSaved
            }
            HostMessage::GetChunk => match &plugin {
                Some(p) => match p.get_chunk() {
                    Some(bytes) => BridgeMessage::ChunkData(bytes),
                    None => BridgeMessage::Error {
                        message: "plugin has no chunk state".into(),
                    },
                },
                None => BridgeMessage::Error { message: "no plugin loaded".into() },
            },
            HostMessage::SetChunk(bytes) => match &mut plugin {
                Some(p) => match p.set_chunk(&bytes) {
                    Ok(()) => BridgeMessage::PluginSaved,
                    Err(e) => BridgeMessage::Error { message: e.to_string() },
                },
                None => BridgeMessage::Error { message: "no plugin loaded".into() },
            },
            HostMessage::Shutdown => {
                write_frame(&mut writer, &BridgeMessage::ShuttingDown)?;
                return Ok(());
            }
        };

        write_frame(&mut writer, &reply)?;
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let socket_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: carla-bridge-server <socket-path>");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(&socket_path) {
        tracing::error!(%err, "bridge server exiting on error");
        std::process::exit(1);
    }
}
