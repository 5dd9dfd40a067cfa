//! Typed counterpart to the discovery sub-process's line protocol (§4.J,
//! §6): lets the engine-side loader parse a child process's stdout into a
//! struct once, instead of re-parsing `carla-discovery::<key>::<value>`
//! strings at each call site.

use std::collections::HashSet;

/// One plugin's introspected metadata, assembled from a discovery child
/// process's `init`..`end` line block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryManifest {
    pub name: String,
    pub label: String,
    pub maker: String,
    pub copyright: String,
    pub unique_id: i64,
    pub hints: u32,
    pub audio_ins: u32,
    pub audio_outs: u32,
    pub audio_total: u32,
    pub midi_ins: u32,
    pub midi_outs: u32,
    pub midi_total: u32,
    pub parameters_ins: u32,
    pub parameters_outs: u32,
    pub parameters_total: u32,
    pub programs_total: u32,
    pub build: String,
}

impl DiscoveryManifest {
    /// Parses the `carla-discovery::<key>::<value>` lines between (and
    /// excluding) the `init`/`end` markers. Unknown keys are ignored, missing
    /// numeric keys default to `0`, so a manifest from an older discovery
    /// binary still parses.
    pub fn parse(output: &str) -> Option<Self> {
        if output.lines().any(|line| line.starts_with("carla-discovery::error::")) {
            return None;
        }

        let mut manifest = DiscoveryManifest::default();
        let mut saw_init = false;

        for line in output.lines() {
            let Some(rest) = line.strip_prefix("carla-discovery::") else {
                continue;
            };
            let Some((key, value)) = rest.split_once("::") else {
                continue;
            };

            match key {
                "init" => saw_init = true,
                "end" => break,
                "name" => manifest.name = value.to_string(),
                "label" => manifest.label = value.to_string(),
                "maker" => manifest.maker = value.to_string(),
                "copyright" => manifest.copyright = value.to_string(),
                "unique_id" => manifest.unique_id = value.parse().unwrap_or(0),
                "hints" => manifest.hints = value.parse().unwrap_or(0),
                "audio.ins" => manifest.audio_ins = value.parse().unwrap_or(0),
                "audio.outs" => manifest.audio_outs = value.parse().unwrap_or(0),
                "audio.total" => manifest.audio_total = value.parse().unwrap_or(0),
                "midi.ins" => manifest.midi_ins = value.parse().unwrap_or(0),
                "midi.outs" => manifest.midi_outs = value.parse().unwrap_or(0),
                "midi.total" => manifest.midi_total = value.parse().unwrap_or(0),
                "parameters.ins" => manifest.parameters_ins = value.parse().unwrap_or(0),
                "parameters.outs" => manifest.parameters_outs = value.parse().unwrap_or(0),
                "parameters.total" => manifest.parameters_total = value.parse().unwrap_or(0),
                "programs.total" => manifest.programs_total = value.parse().unwrap_or(0),
                "build" => manifest.build = value.to_string(),
                _ => {}
            }
        }

        saw_init.then_some(manifest)
    }
}

/// Formats excluded from the discovery init-probe (§9 open question ii):
/// an explicit allow/deny list instead of the original's memory-stomp
/// workaround for vendors whose plugins misbehave under probing.
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    skipped: HashSet<String>,
}

impl SkipList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(&mut self, format_label: impl Into<String>) {
        self.skipped.insert(format_label.into());
    }

    pub fn should_skip(&self, format_label: &str) -> bool {
        self.skipped.contains(format_label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_manifest() {
        let output = "carla-discovery::init::-----------\n\
                       carla-discovery::name::Gain\n\
                       carla-discovery::label::gain\n\
                       carla-discovery::unique_id::0\n\
                       carla-discovery::audio.ins::2\n\
                       carla-discovery::audio.outs::2\n\
                       carla-discovery::parameters.total::1\n\
                       carla-discovery::end::------------\n";
        let manifest = DiscoveryManifest::parse(output).unwrap();
        assert_eq!(manifest.name, "Gain");
        assert_eq!(manifest.audio_ins, 2);
        assert_eq!(manifest.parameters_total, 1);
    }

    #[test]
    fn error_line_yields_no_manifest() {
        let output = "carla-discovery::error::failed to open library\n";
        assert!(DiscoveryManifest::parse(output).is_none());
    }

    #[test]
    fn missing_init_marker_yields_no_manifest() {
        let output = "carla-discovery::name::Gain\ncarla-discovery::end::------------\n";
        assert!(DiscoveryManifest::parse(output).is_none());
    }

    #[test]
    fn skip_list_tracks_excluded_formats() {
        let mut skip = SkipList::new();
        skip.skip("vst2-waves");
        assert!(skip.should_skip("vst2-waves"));
        assert!(!skip.should_skip("lv2"));
    }
}
