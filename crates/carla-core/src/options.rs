//! Engine configuration (§6), grounded on `EngineOptions` in
//! `CarlaEngine.hpp`, including its platform-conditional defaults.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    SingleClient,
    MultipleClients,
    ContinuousRack,
    Patchbay,
    Bridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Internal,
    ExternalGraph,
}

/// Recognised engine options, settable at any time before `init` (§6).
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub process_mode: ProcessMode,
    pub transport_mode: TransportMode,
    pub force_stereo: bool,
    pub prefer_plugin_bridges: bool,
    pub prefer_ui_bridges: bool,
    pub uis_always_on_top: bool,
    pub max_parameters: u32,
    pub osc_ui_timeout_ms: u32,
    pub auto_connect: bool,
    pub time_master: bool,
    pub buffer_size: u32,
    pub sample_rate: f64,
    pub device: Option<String>,
    pub resource_dir: PathBuf,
    pub bridge_binary_paths: Vec<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        // The original constructor defaults Windows and macOS to a
        // continuous-rack, internal-transport setup (no system-wide JACK to
        // rely on); every other target defaults to a JACK-style external
        // graph with multiple clients.
        #[cfg(any(target_os = "windows", target_os = "macos"))]
        let (process_mode, transport_mode) = (ProcessMode::ContinuousRack, TransportMode::Internal);
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let (process_mode, transport_mode) =
            (ProcessMode::MultipleClients, TransportMode::ExternalGraph);

        Self {
            process_mode,
            transport_mode,
            force_stereo: false,
            prefer_plugin_bridges: false,
            prefer_ui_bridges: true,
            uis_always_on_top: false,
            max_parameters: 200,
            osc_ui_timeout_ms: 4000,
            auto_connect: true,
            time_master: false,
            buffer_size: 512,
            sample_rate: 48_000.0,
            device: None,
            resource_dir: PathBuf::new(),
            bridge_binary_paths: Vec::new(),
        }
    }
}

impl EngineOptions {
    /// Validates options that would otherwise surface as a confusing
    /// `DriverError` deep inside `init`.
    pub fn validate(&self) -> crate::Result<()> {
        if self.buffer_size == 0 {
            return Err(crate::Error::InvalidArgument(
                "buffer_size must be non-zero".into(),
            ));
        }
        if self.sample_rate <= 0.0 {
            return Err(crate::Error::InvalidArgument(
                "sample_rate must be positive".into(),
            ));
        }
        if self.max_parameters == 0 {
            return Err(crate::Error::InvalidArgument(
                "max_parameters must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(EngineOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let mut opts = EngineOptions::default();
        opts.buffer_size = 0;
        assert!(opts.validate().is_err());
    }
}
