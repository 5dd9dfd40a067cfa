//! Per-plugin engine client (§4.C): owns that plugin's ports, can be
//! activated/deactivated, reports latency.

use carla_core::{AudioPort, CvPort, Error, EventPort, PortDirection, PortKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Deactivated,
    Active,
}

pub enum ClientPort {
    Audio(AudioPort),
    Cv(CvPort),
    Event(EventPort),
}

/// Issued by the driver, bound to one plugin (§4.C).
pub struct EngineClient {
    state: ClientState,
    latency: u32,
    ports: Vec<ClientPort>,
    /// Rack mode fixes ports up front; `add_port` is then a no-op per §4.C.
    fixed_topology: bool,
}

impl EngineClient {
    pub fn new(fixed_topology: bool) -> Self {
        Self {
            state: ClientState::Deactivated,
            latency: 0,
            ports: Vec::new(),
            fixed_topology,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ClientState::Active
    }

    /// `activate` requires `!is_active`; violating this is an `InvalidState`
    /// error without side effects (§4.C).
    pub fn activate(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(Error::InvalidState("client is already active".into()));
        }
        self.state = ClientState::Active;
        Ok(())
    }

    /// `deactivate` requires `is_active`; same contract as `activate`.
    pub fn deactivate(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::InvalidState("client is not active".into()));
        }
        self.state = ClientState::Deactivated;
        Ok(())
    }

    /// In rack mode, ports are fixed and this is a no-op that returns the
    /// index of an already-existing port of the requested kind/direction if
    /// one exists, per §4.C.
    pub fn add_port(&mut self, kind: PortKind, direction: PortDirection, block_size: usize) -> usize {
        if self.fixed_topology {
            return 0;
        }
        let port = match kind {
            PortKind::Audio => ClientPort::Audio(AudioPort::new(direction, block_size)),
            PortKind::Cv => ClientPort::Cv(CvPort::new(direction, block_size)),
            PortKind::Event => ClientPort::Event(EventPort::new(direction)),
        };
        self.ports.push(port);
        self.ports.len() - 1
    }

    pub fn ports(&self) -> &[ClientPort] {
        &self.ports
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    pub fn set_latency(&mut self, frames: u32) {
        self.latency = frames;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_then_activate_again_is_invalid_state() {
        let mut client = EngineClient::new(true);
        client.activate().unwrap();
        assert!(matches!(client.activate(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn deactivate_without_activate_is_invalid_state() {
        let mut client = EngineClient::new(true);
        assert!(matches!(client.deactivate(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn failed_transition_has_no_side_effects() {
        let mut client = EngineClient::new(true);
        client.activate().unwrap();
        let _ = client.activate();
        assert!(client.is_active());
    }

    #[test]
    fn add_port_is_noop_in_fixed_topology() {
        let mut client = EngineClient::new(true);
        let idx = client.add_port(PortKind::Audio, PortDirection::Input, 256);
        assert_eq!(idx, 0);
        assert!(client.ports().is_empty());
    }

    #[test]
    fn add_port_allocates_in_patchbay_mode() {
        let mut client = EngineClient::new(false);
        client.add_port(PortKind::Audio, PortDirection::Input, 256);
        client.add_port(PortKind::Event, PortDirection::Output, 256);
        assert_eq!(client.ports().len(), 2);
    }
}
