//! The normalised event representation (§3, §4.A): raw MIDI and parameter
//! automation collapse into a single tagged record so the RT graph never has
//! to special-case MIDI bytes.

use serde::{Deserialize, Serialize};

/// Events ports are bounded; this is the ring capacity for an internal event
/// port and the clip point for `time`.
pub const MAX_EVENTS_PER_BLOCK: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlSubKind {
    Parameter,
    MidiBank,
    MidiProgram,
    AllSoundOff,
    AllNotesOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Control {
        subkind: ControlSubKind,
        param_id: u16,
        value: f32,
    },
    Midi {
        port_offset: u8,
        data: [u8; 3],
        size: u8,
    },
}

/// `{time, channel, kind}` (§3). `time` is frames-into-block; `channel` is
/// `0..15`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub time: u32,
    pub channel: u8,
    pub kind: EventKind,
}

impl EngineEvent {
    pub fn control(
        time: u32,
        channel: u8,
        subkind: ControlSubKind,
        param_id: u16,
        value: f32,
    ) -> Self {
        debug_assert!(channel < 16);
        Self {
            time,
            channel: channel & 0x0f,
            kind: EventKind::Control {
                subkind,
                param_id,
                value: value.clamp(0.0, 1.0),
            },
        }
    }

    pub fn midi(time: u32, channel: u8, port_offset: u8, data: &[u8]) -> Self {
        debug_assert!(channel < 16);
        debug_assert!(!data.is_empty() && data.len() <= 3);
        let mut buf = [0u8; 3];
        buf[..data.len()].copy_from_slice(data);
        Self {
            time,
            channel: channel & 0x0f,
            kind: EventKind::Midi {
                port_offset,
                data: buf,
                size: data.len() as u8,
            },
        }
    }

    /// Clips `time` into `[0, block_size)`, per the boundary rule in §8.
    pub fn clip_time(mut self, block_size: u32) -> Self {
        if block_size > 0 && self.time >= block_size {
            self.time = block_size - 1;
        }
        self
    }
}

const CC_BANK_SELECT_MSB: u8 = 0;
const CC_BANK_SELECT_LSB: u8 = 32;
const CC_ALL_SOUND_OFF: u8 = 120;
const CC_ALL_NOTES_OFF: u8 = 123;

const STATUS_NOTE_OFF: u8 = 0x80;
const STATUS_NOTE_ON: u8 = 0x90;
const STATUS_CC: u8 = 0xB0;
const STATUS_PROGRAM_CHANGE: u8 = 0xC0;

/// Driver-native MIDI → `EngineEvent`, per the ingestion rules in §4.A.
pub fn midi_to_engine_event(time: u32, port_offset: u8, bytes: &[u8]) -> Option<EngineEvent> {
    if bytes.is_empty() {
        return None;
    }
    let status = bytes[0] & 0xf0;
    let channel = bytes[0] & 0x0f;

    match status {
        STATUS_CC if bytes.len() >= 3 => {
            let controller = bytes[1];
            let value = bytes[2];
            let kind = match controller {
                CC_BANK_SELECT_MSB | CC_BANK_SELECT_LSB => ControlSubKind::MidiBank,
                CC_ALL_SOUND_OFF => ControlSubKind::AllSoundOff,
                CC_ALL_NOTES_OFF => ControlSubKind::AllNotesOff,
                _ => ControlSubKind::Parameter,
            };
            let (param_id, norm) = match kind {
                ControlSubKind::Parameter => (controller as u16, value as f32 / 127.0),
                _ => (value as u16, 0.0),
            };
            Some(EngineEvent::control(time, channel, kind, param_id, norm))
        }
        STATUS_PROGRAM_CHANGE if bytes.len() >= 2 => Some(EngineEvent::control(
            time,
            channel,
            ControlSubKind::MidiProgram,
            bytes[1] as u16,
            0.0,
        )),
        _ => Some(EngineEvent::midi(time, channel, port_offset, bytes)),
    }
}

/// Inverse of [`midi_to_engine_event`]: `EngineEvent` → raw MIDI bytes.
/// Returns `None` for a `Parameter` control event whose `param_id` is a
/// bank-select controller (that must have been represented as `MidiBank`,
/// never re-emitted as a raw CC per §4.A).
pub fn engine_event_to_midi(event: &EngineEvent) -> Option<([u8; 3], usize)> {
    match event.kind {
        EventKind::Midi { data, size, .. } => {
            let mut out = data;
            out[0] |= event.channel;
            Some((out, size as usize))
        }
        EventKind::Control {
            subkind: ControlSubKind::Parameter,
            param_id,
            value,
        } => {
            if param_id == CC_BANK_SELECT_MSB as u16 || param_id == CC_BANK_SELECT_LSB as u16 {
                return None;
            }
            let value_byte = (value.clamp(0.0, 1.0) * 127.0).round() as u8;
            Some((
                [STATUS_CC | event.channel, param_id as u8, value_byte],
                3,
            ))
        }
        EventKind::Control {
            subkind: ControlSubKind::MidiBank,
            param_id,
            ..
        } => Some((
            [STATUS_CC | event.channel, CC_BANK_SELECT_MSB, param_id as u8],
            3,
        )),
        EventKind::Control {
            subkind: ControlSubKind::MidiProgram,
            param_id,
            ..
        } => Some(([STATUS_PROGRAM_CHANGE | event.channel, param_id as u8, 0], 2)),
        EventKind::Control {
            subkind: ControlSubKind::AllSoundOff,
            ..
        } => Some(([STATUS_CC | event.channel, CC_ALL_SOUND_OFF, 0], 3)),
        EventKind::Control {
            subkind: ControlSubKind::AllNotesOff,
            ..
        } => Some(([STATUS_CC | event.channel, CC_ALL_NOTES_OFF, 0], 3)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cc_bank_select_becomes_midi_bank() {
        let ev = midi_to_engine_event(0, 0, &[0xB0, 0x00, 0x05]).unwrap();
        assert_eq!(
            ev.kind,
            EventKind::Control {
                subkind: ControlSubKind::MidiBank,
                param_id: 5,
                value: 0.0,
            }
        );
        assert_eq!(ev.channel, 0);
        assert_eq!(ev.time, 0);
    }

    #[test]
    fn cc_all_sound_off_and_all_notes_off() {
        let ev = midi_to_engine_event(0, 0, &[0xB1, 120, 0]).unwrap();
        assert!(matches!(
            ev.kind,
            EventKind::Control {
                subkind: ControlSubKind::AllSoundOff,
                ..
            }
        ));
        assert_eq!(ev.channel, 1);

        let ev = midi_to_engine_event(0, 0, &[0xB0, 123, 0]).unwrap();
        assert!(matches!(
            ev.kind,
            EventKind::Control {
                subkind: ControlSubKind::AllNotesOff,
                ..
            }
        ));
    }

    #[test]
    fn other_cc_becomes_parameter() {
        let ev = midi_to_engine_event(10, 0, &[0xB0, 7, 127]).unwrap();
        assert_eq!(
            ev.kind,
            EventKind::Control {
                subkind: ControlSubKind::Parameter,
                param_id: 7,
                value: 1.0,
            }
        );
    }

    #[test]
    fn program_change_becomes_midi_program() {
        let ev = midi_to_engine_event(0, 0, &[0xC3, 9]).unwrap();
        assert_eq!(
            ev.kind,
            EventKind::Control {
                subkind: ControlSubKind::MidiProgram,
                param_id: 9,
                value: 0.0,
            }
        );
        assert_eq!(ev.channel, 3);
    }

    #[test]
    fn note_on_roundtrips_identity() {
        let bytes = [0x92, 60, 100];
        let ev = midi_to_engine_event(5, 0, &bytes).unwrap();
        let (out, size) = engine_event_to_midi(&ev).unwrap();
        assert_eq!(&out[..size], &bytes[..]);
    }

    #[test]
    fn program_change_roundtrips_identity() {
        let bytes = [0xC3, 9];
        let ev = midi_to_engine_event(0, 0, &bytes).unwrap();
        let (out, size) = engine_event_to_midi(&ev).unwrap();
        assert_eq!(&out[..size], &bytes[..]);
    }

    #[test]
    fn non_bank_select_cc_roundtrips_identity() {
        let bytes = [0xB2, 7, 64];
        let ev = midi_to_engine_event(0, 0, &bytes).unwrap();
        let (out, size) = engine_event_to_midi(&ev).unwrap();
        assert_eq!(&out[..size], &bytes[..]);
    }

    #[test]
    fn bank_select_parameter_event_is_never_reemitted_as_raw_cc() {
        // A Parameter control event whose param_id happens to be 0 (the
        // bank-select MSB controller number) must not round-trip: that
        // controller is only ever representable as MidiBank.
        let ev = EngineEvent::control(0, 0, ControlSubKind::Parameter, 0, 0.5);
        assert!(engine_event_to_midi(&ev).is_none());
    }

    #[test]
    fn time_beyond_block_size_is_clipped() {
        let ev = EngineEvent::midi(1000, 0, 0, &[0x90, 60, 100]).clip_time(256);
        assert_eq!(ev.time, 255);
    }
}
