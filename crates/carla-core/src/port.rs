//! Typed ports (§3, §4.A). A port's buffer is re-bound every block; the port
//! itself is stable for the plugin's lifetime.

use std::collections::VecDeque;

use crate::event::{ControlSubKind, EngineEvent, EventKind, MAX_EVENTS_PER_BLOCK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Audio,
    Cv,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// An audio port's `f32` buffer. Invariant (§3): its length always equals
/// the engine's current block size.
#[derive(Debug)]
pub struct AudioPort {
    pub direction: PortDirection,
    buffer: Vec<f32>,
}

impl AudioPort {
    pub fn new(direction: PortDirection, block_size: usize) -> Self {
        Self {
            direction,
            buffer: vec![0.0; block_size],
        }
    }

    pub fn resize(&mut self, block_size: usize) {
        self.buffer.resize(block_size, 0.0);
    }

    /// Zeros the buffer; called at block start for internal-mode output
    /// ports before the plugin writes into them.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.buffer
    }
}

/// A CV port: an audio port whose semantics are control-rate. Output CV
/// ports need an explicit commit hook for drivers that require one.
#[derive(Debug)]
pub struct CvPort {
    inner: AudioPort,
    dirty: bool,
}

impl CvPort {
    pub fn new(direction: PortDirection, block_size: usize) -> Self {
        Self {
            inner: AudioPort::new(direction, block_size),
            dirty: false,
        }
    }

    pub fn resize(&mut self, block_size: usize) {
        self.inner.resize(block_size);
    }

    pub fn get_buffer(&self) -> &[f32] {
        self.inner.as_slice()
    }

    pub fn get_buffer_mut(&mut self) -> &mut [f32] {
        self.inner.as_mut_slice()
    }

    /// Explicit commit for drivers that need it; marks the buffer as having
    /// been flushed for this block.
    pub fn write_buffer(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// An event port: a bounded ring of [`EngineEvent`] for internal drivers.
/// Writes to an output port from the input side (and vice versa) are a
/// contract violation and are silently dropped, per §4.A.
#[derive(Debug)]
pub struct EventPort {
    pub direction: PortDirection,
    events: VecDeque<EngineEvent>,
}

impl EventPort {
    pub fn new(direction: PortDirection) -> Self {
        Self {
            direction,
            events: VecDeque::with_capacity(MAX_EVENTS_PER_BLOCK),
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn count(&self) -> u32 {
        if self.direction == PortDirection::Output {
            return 0;
        }
        self.events.len() as u32
    }

    pub fn get(&self, index: u32) -> Option<EngineEvent> {
        if self.direction == PortDirection::Output {
            return None;
        }
        self.events.get(index as usize).copied()
    }

    pub fn push_input(&mut self, event: EngineEvent) {
        if self.direction != PortDirection::Input {
            return;
        }
        if self.events.len() >= MAX_EVENTS_PER_BLOCK {
            return;
        }
        self.events.push_back(event);
    }

    pub fn write_control(
        &mut self,
        time: u32,
        channel: u8,
        subkind: ControlSubKind,
        param: u16,
        value: f32,
    ) {
        if self.direction != PortDirection::Output {
            return;
        }
        if self.events.len() >= MAX_EVENTS_PER_BLOCK {
            return;
        }
        self.events
            .push_back(EngineEvent::control(time, channel, subkind, param, value));
    }

    pub fn write_midi(&mut self, time: u32, channel: u8, port_offset: u8, data: &[u8]) {
        if self.direction != PortDirection::Output {
            return;
        }
        if data.is_empty() || data.len() > 3 || self.events.len() >= MAX_EVENTS_PER_BLOCK {
            return;
        }
        self.events
            .push_back(EngineEvent::midi(time, channel, port_offset, data));
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineEvent> {
        self.events.iter()
    }
}

impl Default for EventPort {
    fn default() -> Self {
        Self::new(PortDirection::Input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_port_buffer_matches_block_size() {
        let mut port = AudioPort::new(PortDirection::Output, 64);
        assert_eq!(port.as_slice().len(), 64);
        port.resize(256);
        assert_eq!(port.as_slice().len(), 256);
    }

    #[test]
    fn audio_port_clear_zeroes_buffer() {
        let mut port = AudioPort::new(PortDirection::Output, 4);
        port.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        port.clear();
        assert_eq!(port.as_slice(), &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn event_port_write_to_input_is_dropped() {
        let mut port = EventPort::new(PortDirection::Input);
        port.write_control(0, 0, ControlSubKind::Parameter, 1, 0.5);
        assert_eq!(port.count(), 0);
    }

    #[test]
    fn event_port_read_from_output_returns_neutral() {
        let mut port = EventPort::new(PortDirection::Output);
        port.push_input(EngineEvent::control(0, 0, ControlSubKind::Parameter, 1, 0.5));
        assert_eq!(port.count(), 0);
        assert!(port.get(0).is_none());
    }

    #[test]
    fn event_port_caps_at_max_events_per_block() {
        let mut port = EventPort::new(PortDirection::Input);
        for i in 0..MAX_EVENTS_PER_BLOCK + 10 {
            port.push_input(EngineEvent::midi(0, 0, 0, &[0x90, (i % 128) as u8, 100]));
        }
        assert_eq!(port.count() as usize, MAX_EVENTS_PER_BLOCK);
    }
}
