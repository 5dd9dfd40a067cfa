//! Discovery sub-process (§6): introspects a plugin file and writes a
//! line-oriented manifest to stdout, or `carla-discovery::error::<message>`
//! and a non-zero exit on fatal failure. Grounded on the teacher's
//! `tutti-plugin-server` discovery binary, adapted to this workspace's
//! line-protocol output instead of OSC.
//!
//! Real per-format introspection (LADSPA/VST/LV2/...) is out of scope
//! (§1 Non-goals); this binary instantiates one of `carla_plugin`'s internal
//! variants by the same file-stem heuristic the bridge server uses, which is
//! enough to exercise the full discovery protocol end to end.

use std::path::Path;

use carla_core::ParameterFlags;
use carla_plugin::{GainPlugin, PassthroughPlugin, PluginWrapper};

fn load_plugin(path: &Path) -> Box<dyn PluginWrapper> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".into());

    if stem.contains("gain") || stem.contains("amp") {
        Box::new(GainPlugin::new(0, name))
    } else {
        Box::new(PassthroughPlugin::new(0, name))
    }
}

fn emit(key: &str, value: impl std::fmt::Display) {
    println!("carla-discovery::{key}::{value}");
}

fn run(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("no such file: {}", path.display()));
    }

    let plugin = load_plugin(path);

    let audio_ins = plugin.audio_in_count();
    let audio_outs = plugin.audio_out_count();
    let midi_ins = plugin.midi_in_count();
    let midi_outs = plugin.midi_out_count();

    let param_outs = plugin
        .state()
        .parameters
        .iter()
        .filter(|p| p.flags.contains(ParameterFlags::IS_READ_ONLY))
        .count() as u32;
    let param_total = plugin.parameter_count();
    let param_ins = param_total - param_outs;

    emit("init", "-----------");
    emit("name", plugin.name());
    emit("label", plugin.label());
    emit("maker", "");
    emit("copyright", "");
    emit("unique_id", plugin.unique_id());
    emit("hints", plugin.state().metadata.hints.bits());
    emit("audio.ins", audio_ins);
    emit("audio.outs", audio_outs);
    emit("audio.total", audio_ins + audio_outs);
    emit("midi.ins", midi_ins);
    emit("midi.outs", midi_outs);
    emit("midi.total", midi_ins + midi_outs);
    emit("parameters.ins", param_ins);
    emit("parameters.outs", param_outs);
    emit("parameters.total", param_total);
    emit("programs.total", plugin.program_count());
    emit("build", std::env::consts::ARCH);
    emit("end", "------------");

    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: carla-discovery <plugin-path>");
            std::process::exit(2);
        }
    };

    if let Err(message) = run(Path::new(&path)) {
        println!("carla-discovery::error::{message}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_error_result() {
        let result = run(Path::new("/nonexistent/gain.so"));
        assert!(result.is_err());
    }
}
