//! Engine driver abstraction (§4.B), reimplemented per §9 as a tagged enum
//! over the four variants instead of the original's single-inheritance
//! `CarlaEngine` hierarchy. Static dispatch on the RT path: `Engine::process`
//! matches on `EngineDriverKind` directly rather than calling through a
//! trait object.

use carla_core::{Error, ProcessMode, Result, TimeInfo, TransportMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalGraphMode {
    SingleClient,
    MultipleClients,
    ContinuousRack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    ExternalGraph,
    Device,
    HostedAsPlugin,
    Bridge,
}

/// What every driver variant exposes (§4.B's capability set), minus the
/// parts that are naturally per-variant data (process mode, device name).
pub trait DriverCapabilities {
    fn open(&mut self, sample_rate: f64, buffer_size: u32) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn idle(&mut self) {}
    fn is_running(&self) -> bool;
    fn is_offline(&self) -> bool {
        false
    }
    fn kind(&self) -> DriverKind;

    fn transport_play(&mut self) {}
    fn transport_pause(&mut self) {}
    fn transport_relocate(&mut self, _frame: u64) {}

    fn patchbay_connect(&mut self, _port_a: &str, _port_b: &str) -> Result<()> {
        Err(Error::UnsupportedFormat(
            "this driver does not support patchbay routing".into(),
        ))
    }
    fn patchbay_disconnect(&mut self, _port_a: &str, _port_b: &str) -> Result<()> {
        Err(Error::UnsupportedFormat(
            "this driver does not support patchbay routing".into(),
        ))
    }
    fn patchbay_refresh(&mut self) {}

    /// Samples the driver's own transport, if it has one; `None` means the
    /// engine should maintain the internal transport instead (§4.I).
    fn sample_transport(&mut self, _block_size: u32) -> Option<TimeInfo> {
        None
    }
}

/// The JACK-style external graph driver (§4.B). Process modes are a
/// sub-variant; `Single client`/`Multiple clients` expose real graph ports
/// per plugin, `ContinuousRack` is a single node with the fixed rack ports.
pub struct ExternalGraphDriver {
    pub mode: ExternalGraphMode,
    pub auto_connect: bool,
    pub time_master: bool,
    running: bool,
}

impl ExternalGraphDriver {
    pub fn new(mode: ExternalGraphMode, auto_connect: bool, time_master: bool) -> Self {
        Self {
            mode,
            auto_connect,
            time_master,
            running: false,
        }
    }
}

impl DriverCapabilities for ExternalGraphDriver {
    fn open(&mut self, _sample_rate: f64, _buffer_size: u32) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn kind(&self) -> DriverKind {
        DriverKind::ExternalGraph
    }

    fn patchbay_connect(&mut self, _port_a: &str, _port_b: &str) -> Result<()> {
        if self.mode == ExternalGraphMode::ContinuousRack {
            return Err(Error::UnsupportedFormat(
                "continuous rack mode has a fixed topology".into(),
            ));
        }
        Ok(())
    }

    fn patchbay_disconnect(&mut self, _port_a: &str, _port_b: &str) -> Result<()> {
        Ok(())
    }
}

/// The device driver: the engine owns the audio device and pumps its own
/// callback. Always runs rack or patchbay, never single-/multiple-clients
/// (§4.B).
pub struct DeviceDriver {
    pub device_name: String,
    pub buffer_size: u32,
    pub sample_rate: f64,
    running: bool,
}

impl DeviceDriver {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            buffer_size: 0,
            sample_rate: 0.0,
            running: false,
        }
    }
}

impl DriverCapabilities for DeviceDriver {
    fn open(&mut self, sample_rate: f64, buffer_size: u32) -> Result<()> {
        self.sample_rate = sample_rate;
        self.buffer_size = buffer_size;
        self.running = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Device
    }
}

/// The engine hosted as a plugin inside a bigger host; processing is driven
/// from outside, so `open`/`close` only flip bookkeeping state.
pub struct HostedAsPluginDriver {
    active: bool,
}

impl HostedAsPluginDriver {
    pub fn new() -> Self {
        Self { active: false }
    }
}

impl Default for HostedAsPluginDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverCapabilities for HostedAsPluginDriver {
    fn open(&mut self, _sample_rate: f64, _buffer_size: u32) -> Result<()> {
        self.active = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.active
    }

    fn kind(&self) -> DriverKind {
        DriverKind::HostedAsPlugin
    }
}

/// The bridge driver: hosts exactly one plugin in a sub-process (§4.B, §9).
/// Its per-block coordination is owned by `carla_plugin::BridgePlugin`; this
/// struct is only the engine-facing open/close bookkeeping.
pub struct BridgeDriver {
    running: bool,
}

impl BridgeDriver {
    pub fn new() -> Self {
        Self { running: false }
    }
}

impl Default for BridgeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverCapabilities for BridgeDriver {
    fn open(&mut self, _sample_rate: f64, _buffer_size: u32) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Bridge
    }
}

/// The sum type over driver variants (§9).
pub enum EngineDriver {
    ExternalGraph(ExternalGraphDriver),
    Device(DeviceDriver),
    HostedAsPlugin(HostedAsPluginDriver),
    Bridge(BridgeDriver),
}

impl EngineDriver {
    pub fn from_process_mode(mode: ProcessMode, transport_mode: TransportMode) -> Self {
        match mode {
            ProcessMode::SingleClient => EngineDriver::ExternalGraph(ExternalGraphDriver::new(
                ExternalGraphMode::SingleClient,
                transport_mode == TransportMode::ExternalGraph,
                false,
            )),
            ProcessMode::MultipleClients => EngineDriver::ExternalGraph(ExternalGraphDriver::new(
                ExternalGraphMode::MultipleClients,
                transport_mode == TransportMode::ExternalGraph,
                false,
            )),
            ProcessMode::ContinuousRack => EngineDriver::ExternalGraph(ExternalGraphDriver::new(
                ExternalGraphMode::ContinuousRack,
                transport_mode == TransportMode::ExternalGraph,
                false,
            )),
            ProcessMode::Patchbay => EngineDriver::Device(DeviceDriver::new("default")),
            ProcessMode::Bridge => EngineDriver::Bridge(BridgeDriver::new()),
        }
    }

    pub fn open(&mut self, sample_rate: f64, buffer_size: u32) -> Result<()> {
        match self {
            EngineDriver::ExternalGraph(d) => d.open(sample_rate, buffer_size),
            EngineDriver::Device(d) => d.open(sample_rate, buffer_size),
            EngineDriver::HostedAsPlugin(d) => d.open(sample_rate, buffer_size),
            EngineDriver::Bridge(d) => d.open(sample_rate, buffer_size),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            EngineDriver::ExternalGraph(d) => d.close(),
            EngineDriver::Device(d) => d.close(),
            EngineDriver::HostedAsPlugin(d) => d.close(),
            EngineDriver::Bridge(d) => d.close(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            EngineDriver::ExternalGraph(d) => d.is_running(),
            EngineDriver::Device(d) => d.is_running(),
            EngineDriver::HostedAsPlugin(d) => d.is_running(),
            EngineDriver::Bridge(d) => d.is_running(),
        }
    }

    pub fn kind(&self) -> DriverKind {
        match self {
            EngineDriver::ExternalGraph(d) => d.kind(),
            EngineDriver::Device(d) => d.kind(),
            EngineDriver::HostedAsPlugin(d) => d.kind(),
            EngineDriver::Bridge(d) => d.kind(),
        }
    }

    pub fn transport_play(&mut self) {
        match self {
            EngineDriver::ExternalGraph(d) => d.transport_play(),
            EngineDriver::Device(d) => d.transport_play(),
            EngineDriver::HostedAsPlugin(d) => d.transport_play(),
            EngineDriver::Bridge(d) => d.transport_play(),
        }
    }

    pub fn transport_pause(&mut self) {
        match self {
            EngineDriver::ExternalGraph(d) => d.transport_pause(),
            EngineDriver::Device(d) => d.transport_pause(),
            EngineDriver::HostedAsPlugin(d) => d.transport_pause(),
            EngineDriver::Bridge(d) => d.transport_pause(),
        }
    }

    pub fn transport_relocate(&mut self, frame: u64) {
        match self {
            EngineDriver::ExternalGraph(d) => d.transport_relocate(frame),
            EngineDriver::Device(d) => d.transport_relocate(frame),
            EngineDriver::HostedAsPlugin(d) => d.transport_relocate(frame),
            EngineDriver::Bridge(d) => d.transport_relocate(frame),
        }
    }

    /// Forwards to the driver's own idle hook (§5: "auxiliary idle thread");
    /// every variant defaults to a no-op except ones that poll external
    /// state (none do today).
    pub fn idle_noop(&mut self) {
        match self {
            EngineDriver::ExternalGraph(d) => d.idle(),
            EngineDriver::Device(d) => d.idle(),
            EngineDriver::HostedAsPlugin(d) => d.idle(),
            EngineDriver::Bridge(d) => d.idle(),
        }
    }

    /// Whether this driver owns real, per-plugin graph ports (single-/
    /// multiple-clients external graph) versus a fixed rack bus.
    pub fn uses_patchbay_ports(&self, process_mode: ProcessMode) -> bool {
        matches!(process_mode, ProcessMode::SingleClient | ProcessMode::MultipleClients | ProcessMode::Patchbay)
            && self.kind() != DriverKind::Bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_rack_external_graph_rejects_patchbay_connect() {
        let mut driver = ExternalGraphDriver::new(ExternalGraphMode::ContinuousRack, true, false);
        driver.open(48_000.0, 256).unwrap();
        assert!(driver.patchbay_connect("a", "b").is_err());
    }

    #[test]
    fn single_client_external_graph_allows_patchbay_connect() {
        let mut driver = ExternalGraphDriver::new(ExternalGraphMode::SingleClient, true, false);
        driver.open(48_000.0, 256).unwrap();
        assert!(driver.patchbay_connect("a", "b").is_ok());
    }

    #[test]
    fn device_driver_rejects_patchbay_by_default() {
        let driver = DeviceDriver::new("default");
        assert!(!driver.is_running());
        assert_eq!(driver.kind(), DriverKind::Device);
    }

    #[test]
    fn from_process_mode_selects_bridge_driver() {
        let driver = EngineDriver::from_process_mode(ProcessMode::Bridge, TransportMode::Internal);
        assert_eq!(driver.kind(), DriverKind::Bridge);
    }
}
