//! Builder for configuring and constructing a [`carla_engine::Engine`].

use std::path::PathBuf;

use carla_core::{EngineOptions, ProcessMode, Result, TransportMode};
use carla_engine::Engine;

/// Defaults follow [`EngineOptions::default`]'s platform-conditional choice
/// (§6); every setter is optional.
pub struct CarlaEngineBuilder {
    options: EngineOptions,
}

impl Default for CarlaEngineBuilder {
    fn default() -> Self {
        Self {
            options: EngineOptions::default(),
        }
    }
}

impl CarlaEngineBuilder {
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.options.sample_rate = sample_rate;
        self
    }

    pub fn buffer_size(mut self, buffer_size: u32) -> Self {
        self.options.buffer_size = buffer_size;
        self
    }

    pub fn process_mode(mut self, process_mode: ProcessMode) -> Self {
        self.options.process_mode = process_mode;
        self
    }

    pub fn transport_mode(mut self, transport_mode: TransportMode) -> Self {
        self.options.transport_mode = transport_mode;
        self
    }

    /// Shorthand for `process_mode(ContinuousRack).transport_mode(Internal)`.
    pub fn rack(mut self) -> Self {
        self.options.process_mode = ProcessMode::ContinuousRack;
        self.options.transport_mode = TransportMode::Internal;
        self
    }

    /// Shorthand for `process_mode(Patchbay)`.
    pub fn patchbay(mut self) -> Self {
        self.options.process_mode = ProcessMode::Patchbay;
        self
    }

    pub fn max_parameters(mut self, count: u32) -> Self {
        self.options.max_parameters = count;
        self
    }

    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.options.auto_connect = auto_connect;
        self
    }

    pub fn prefer_plugin_bridges(mut self, prefer: bool) -> Self {
        self.options.prefer_plugin_bridges = prefer;
        self
    }

    pub fn resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.resource_dir = dir.into();
        self
    }

    pub fn bridge_binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.bridge_binary_paths.push(path.into());
        self
    }

    pub fn build(self) -> Result<Engine> {
        Engine::new(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rack_shorthand_matches_explicit_setters() {
        let engine = CarlaEngineBuilder::default()
            .rack()
            .sample_rate(44_100.0)
            .buffer_size(128)
            .build()
            .unwrap();
        assert_eq!(engine.options().process_mode, ProcessMode::ContinuousRack);
        assert_eq!(engine.options().transport_mode, TransportMode::Internal);
        assert_eq!(engine.options().buffer_size, 128);
    }

    #[test]
    fn invalid_options_reject_at_build() {
        let result = CarlaEngineBuilder::default().buffer_size(0).build();
        assert!(result.is_err());
    }
}
