//! Envelope and length-counter units shared by the synthesis channels.

use famicore_core::{StateReader, StateTruncated, StateWriter};

/// Length counter load values, indexed by the top 5 bits of the length
/// register write.
pub const DURATION_TABLE: [u8; 32] = [
    0x0A, 0xFE, 0x14, 0x02, 0x28, 0x04, 0x50, 0x06, 0xA0, 0x08, 0x3C, 0x0A, 0x0E, 0x0C, 0x1A,
    0x0E, 0x0C, 0x10, 0x18, 0x12, 0x30, 0x14, 0x60, 0x16, 0xC0, 0x18, 0x48, 0x1A, 0x10, 0x1C,
    0x20, 0x1E,
];

/// Decay envelope, clocked at quarter-frame rate.
///
/// Counts down from 15; wraps back to 15 when the loop flag (shared with
/// the length-counter halt) is set.
pub struct Envelope {
    start_flag: bool,
    counter: u8,
    divider: u8,
    constant_volume: bool,
    decay_time: u8,
    /// Current output level (0-15).
    pub output: u8,
}

impl Envelope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_flag: false,
            counter: 0,
            divider: 0,
            constant_volume: false,
            decay_time: 0,
            output: 0,
        }
    }

    pub fn hard_reset(&mut self) {
        *self = Self::new();
    }

    /// Volume/control register write (bits 0-4).
    pub fn write_control(&mut self, value: u8) {
        self.decay_time = value & 0x0F;
        self.constant_volume = value & 0x10 != 0;
        self.output = if self.constant_volume {
            self.decay_time
        } else {
            self.counter
        };
    }

    /// Restart the envelope (length register write).
    pub fn start(&mut self) {
        self.start_flag = true;
    }

    /// Quarter-frame clock. `loop_flag` is the channel's effective
    /// length-counter halt flag.
    pub fn clock(&mut self, loop_flag: bool) {
        if self.start_flag {
            self.start_flag = false;
            self.counter = 0x0F;
            self.divider = self.decay_time + 1;
        } else if self.divider > 0 {
            self.divider -= 1;
        } else {
            self.divider = self.decay_time + 1;
            if self.counter > 0 {
                self.counter -= 1;
            } else if loop_flag {
                self.counter = 0x0F;
            }
        }
        self.output = if self.constant_volume {
            self.decay_time
        } else {
            self.counter
        };
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.write_bool(self.start_flag);
        w.write_u8(self.counter);
        w.write_u8(self.divider);
        w.write_bool(self.constant_volume);
        w.write_u8(self.decay_time);
        w.write_u8(self.output);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.start_flag = r.read_bool()?;
        self.counter = r.read_u8()?;
        self.divider = r.read_u8()?;
        self.constant_volume = r.read_bool()?;
        self.decay_time = r.read_u8()?;
        self.output = r.read_u8()?;
        Ok(())
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Length ("duration") counter — silences a channel when it reaches zero.
///
/// Register writes only *request* a reload; the request is applied on the
/// next CPU cycle, and cancelled if a half-frame clock fires first while
/// the counter is still running. Disabling the channel through $4015
/// clears the counter immediately. The counter never goes below zero.
pub struct DurationCounter {
    /// Current count. Public so $4015 status reads can test it.
    pub counter: u8,
    /// Channel enabled via $4015.
    pub reload_enabled: bool,
    halt_request: bool,
    halt: bool,
    reload_value: u8,
    reload_request: bool,
}

impl DurationCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: 0,
            reload_enabled: false,
            halt_request: false,
            halt: false,
            reload_value: 0,
            reload_request: false,
        }
    }

    pub fn hard_reset(&mut self) {
        *self = Self::new();
    }

    /// Effective halt flag (doubles as the envelope loop flag).
    #[must_use]
    pub fn halted(&self) -> bool {
        self.halt
    }

    /// Register write: halt request bit.
    pub fn write_halt(&mut self, halt: bool) {
        self.halt_request = halt;
    }

    /// Register write: reload from the duration table.
    pub fn write_reload(&mut self, length_index: u8) {
        self.reload_value = DURATION_TABLE[usize::from(length_index & 0x1F)];
        self.reload_request = true;
    }

    /// $4015 enable bit. Disabling zeroes the counter at once.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.reload_enabled = enabled;
        if !enabled {
            self.counter = 0;
        }
    }

    /// Half-frame clock.
    pub fn clock(&mut self) {
        if !self.halt && self.counter > 0 {
            self.counter -= 1;
        }
    }

    /// Per-CPU-cycle bookkeeping: latch the halt request and apply or
    /// cancel a pending reload. `is_clocking_duration` is true on the
    /// cycle the frame sequencer clocked the length counters.
    pub fn clock_single(&mut self, is_clocking_duration: bool) {
        self.halt = self.halt_request;
        if is_clocking_duration && self.counter > 0 {
            self.reload_request = false;
        }
        if self.reload_request {
            if self.reload_enabled {
                self.counter = self.reload_value;
            }
            self.reload_request = false;
        }
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.write_u8(self.counter);
        w.write_bool(self.reload_enabled);
        w.write_bool(self.halt_request);
        w.write_bool(self.halt);
        w.write_u8(self.reload_value);
        w.write_bool(self.reload_request);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.counter = r.read_u8()?;
        self.reload_enabled = r.read_bool()?;
        self.halt_request = r.read_bool()?;
        self.halt = r.read_bool()?;
        self.reload_value = r.read_u8()?;
        self.reload_request = r.read_bool()?;
        Ok(())
    }
}

impl Default for DurationCounter {
    fn default() -> Self {
        Self::new()
    }
}
