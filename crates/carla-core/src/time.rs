//! Transport state (§3, §4.I), grounded on the original `EngineTimeInfo`
//! and `EngineTimeInfoBBT` structs in `CarlaEngine.hpp`.

/// Bars/beats/ticks musical position, optional on [`TimeInfo`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbt {
    pub bar: i32,
    pub beat: i32,
    pub tick: f64,
    pub bar_start_tick: f64,
    pub beats_per_bar: f32,
    pub beat_type: f32,
    pub ticks_per_beat: f64,
    pub bpm: f64,
}

impl Default for Bbt {
    fn default() -> Self {
        Self {
            bar: 1,
            beat: 1,
            tick: 0.0,
            bar_start_tick: 0.0,
            beats_per_bar: 4.0,
            beat_type: 4.0,
            ticks_per_beat: 960.0,
            bpm: 120.0,
        }
    }
}

/// `{playing, frame, usecs, bbt}`, sampled at block start and constant for
/// the duration of the block (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeInfo {
    pub playing: bool,
    pub frame: u64,
    pub usecs: u64,
    pub bbt: Option<Bbt>,
}

impl Default for TimeInfo {
    fn default() -> Self {
        Self {
            playing: false,
            frame: 0,
            usecs: 0,
            bbt: None,
        }
    }
}

impl TimeInfo {
    /// The original's "quick" equality only compares `playing`, `frame`, BBT
    /// validity and `bpm` — not the full BBT breakdown.
    pub fn quick_eq(&self, other: &Self) -> bool {
        self.playing == other.playing
            && self.frame == other.frame
            && self.bbt.is_some() == other.bbt.is_some()
            && self.bbt.map(|b| b.bpm) == other.bbt.map(|b| b.bpm)
    }
}

/// Maintains transport state when the driver has none of its own (§4.I).
#[derive(Debug)]
pub struct InternalTransport {
    playing: bool,
    frame: u64,
    sample_rate: f64,
    bbt: Option<Bbt>,
}

impl InternalTransport {
    pub fn new(sample_rate: f64, with_bbt: bool) -> Self {
        Self {
            playing: false,
            frame: 0,
            sample_rate,
            bbt: with_bbt.then(Bbt::default),
        }
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn relocate(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Reconfigures the rate used to derive `usecs` from `frame`, without
    /// disturbing playback state or position (§4.D, §9: an engine-wide
    /// sample-rate change carries the transport across it unchanged).
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Samples the current state into an immutable [`TimeInfo`] and, if
    /// playing, advances `frame` by `block_size` for the next block.
    pub fn tick(&mut self, block_size: u32) -> TimeInfo {
        let usecs = if self.sample_rate > 0.0 {
            (self.frame as f64 / self.sample_rate * 1_000_000.0) as u64
        } else {
            0
        };
        let info = TimeInfo {
            playing: self.playing,
            frame: self.frame,
            usecs,
            bbt: self.bbt,
        };
        if self.playing {
            self.frame += block_size as u64;
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_advances_only_while_playing() {
        let mut transport = InternalTransport::new(48_000.0, false);
        let info = transport.tick(256);
        assert!(!info.playing);
        assert_eq!(info.frame, 0);
        assert_eq!(transport.frame, 0);

        transport.play();
        let info = transport.tick(256);
        assert!(info.playing);
        assert_eq!(info.frame, 0);
        assert_eq!(transport.frame, 256);
    }

    #[test]
    fn relocate_sets_frame() {
        let mut transport = InternalTransport::new(48_000.0, false);
        transport.relocate(48_000);
        let info = transport.tick(256);
        assert_eq!(info.frame, 48_000);
    }

    #[test]
    fn quick_eq_ignores_bbt_breakdown() {
        let a = TimeInfo {
            playing: true,
            frame: 10,
            usecs: 0,
            bbt: Some(Bbt { bar: 1, ..Bbt::default() }),
        };
        let b = TimeInfo {
            playing: true,
            frame: 10,
            usecs: 999,
            bbt: Some(Bbt { bar: 2, ..Bbt::default() }),
        };
        assert!(a.quick_eq(&b));
    }
}
