//! Pulse wave channel.

use famicore_core::{StateReader, StateTruncated, StateWriter};

use crate::apu::counters::{DurationCounter, Envelope};

/// Duty cycle waveforms: 4 forms × 8 steps.
const DUTY_FORMS: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0], // 12.5%
    [0, 1, 1, 0, 0, 0, 0, 0], // 25.0%
    [0, 1, 1, 1, 1, 0, 0, 0], // 50.0%
    [1, 0, 0, 1, 1, 1, 1, 1], // 75.0% (25% negated)
];

/// How the sweep unit negates its delta. The two pulse channels differ:
/// pulse 1's adder is missing the carry-in, so it subtracts one extra.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepNegate {
    /// Pulse 1: `period - delta - 1`.
    OnesComplement,
    /// Pulse 2: `period - delta`.
    TwosComplement,
}

/// Pulse channel (two instances). Every piece of state is per-instance.
pub struct Pulse {
    negate_mode: SweepNegate,
    pub envelope: Envelope,
    pub duration: DurationCounter,
    duty_form: u8,
    duty_step: i8,
    sweep_divider_period: i32,
    sweep_shift: u8,
    sweep_counter: i32,
    sweep_enable: bool,
    sweep_reload: bool,
    sweep_negate: bool,
    frequency: i32,
    cycles: i32,
    /// Current sample (0-15).
    pub output: u8,
}

impl Pulse {
    #[must_use]
    pub fn new(negate_mode: SweepNegate) -> Self {
        Self {
            negate_mode,
            envelope: Envelope::new(),
            duration: DurationCounter::new(),
            duty_form: 0,
            duty_step: 0,
            sweep_divider_period: 0,
            sweep_shift: 0,
            sweep_counter: 0,
            sweep_enable: false,
            sweep_reload: false,
            sweep_negate: false,
            frequency: 0,
            cycles: 0,
            output: 0,
        }
    }

    pub fn hard_reset(&mut self) {
        self.envelope.hard_reset();
        self.duration.hard_reset();
        self.duty_form = 0;
        self.duty_step = 0;
        self.sweep_divider_period = 0;
        self.sweep_shift = 0;
        self.sweep_counter = 0;
        self.sweep_enable = false;
        self.sweep_reload = false;
        self.sweep_negate = false;
        self.frequency = 0;
        self.cycles = 0;
        self.output = 0;
    }

    /// A period is playable when it is at least 8 and the sweep's target
    /// does not overflow 11 bits (negating sweeps never overflow).
    fn is_valid_frequency(&self) -> bool {
        self.frequency >= 0x8
            && (self.sweep_negate
                || (self.frequency + (self.frequency >> self.sweep_shift)) & 0x800 == 0)
    }

    /// Quarter-frame clock.
    pub fn clock_envelope(&mut self) {
        self.envelope.clock(self.duration.halted());
    }

    /// Half-frame clock: length counter and sweep.
    pub fn clock_duration(&mut self) {
        self.duration.clock();

        self.sweep_counter -= 1;
        if self.sweep_counter == 0 {
            self.sweep_counter = self.sweep_divider_period + 1;
            if self.sweep_enable && self.sweep_shift > 0 && self.is_valid_frequency() {
                let delta = self.frequency >> self.sweep_shift;
                if self.sweep_negate {
                    self.frequency += match self.negate_mode {
                        SweepNegate::OnesComplement => !delta,
                        SweepNegate::TwosComplement => -delta,
                    };
                } else {
                    self.frequency += delta;
                }
            }
        }
        if self.sweep_reload {
            self.sweep_reload = false;
            self.sweep_counter = self.sweep_divider_period + 1;
        }
    }

    /// Per-CPU-cycle clock.
    pub fn clock_single(&mut self, is_clocking_duration: bool) {
        self.duration.clock_single(is_clocking_duration);

        if self.cycles > 0 {
            self.cycles -= 1;
        } else {
            self.cycles = (self.frequency << 1) + 2;
            self.duty_step -= 1;
            if self.duty_step < 0 {
                self.duty_step = 7;
            }
            self.output = if self.duration.counter > 0 && self.is_valid_frequency() {
                DUTY_FORMS[usize::from(self.duty_form)][self.duty_step as usize]
                    * self.envelope.output
            } else {
                0
            };
        }
    }

    /// Register write ($4000-$4003 / $4004-$4007, offset 0-3).
    pub fn write_register(&mut self, offset: u16, value: u8) {
        match offset {
            0 => {
                self.envelope.write_control(value);
                self.duration.write_halt(value & 0x20 != 0);
                self.duty_form = (value & 0xC0) >> 6;
            }
            1 => {
                self.sweep_enable = value & 0x80 != 0;
                self.sweep_divider_period = i32::from((value >> 4) & 7);
                self.sweep_negate = value & 0x08 != 0;
                self.sweep_shift = value & 7;
                self.sweep_reload = true;
            }
            2 => {
                self.frequency = (self.frequency & 0x0700) | i32::from(value);
            }
            3 => {
                self.duration.write_reload(value >> 3);
                self.frequency = (self.frequency & 0x00FF) | (i32::from(value & 7) << 8);
                self.duty_step = 0;
                self.envelope.start();
            }
            _ => unreachable!("pulse register offset out of range"),
        }
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        self.envelope.save_state(w);
        self.duration.save_state(w);
        w.write_u8(self.duty_form);
        w.write_u8(self.duty_step as u8);
        w.write_i32(self.sweep_divider_period);
        w.write_u8(self.sweep_shift);
        w.write_i32(self.sweep_counter);
        w.write_bool(self.sweep_enable);
        w.write_bool(self.sweep_reload);
        w.write_bool(self.sweep_negate);
        w.write_i32(self.frequency);
        w.write_i32(self.cycles);
        w.write_u8(self.output);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.envelope.load_state(r)?;
        self.duration.load_state(r)?;
        self.duty_form = r.read_u8()?;
        self.duty_step = r.read_u8()? as i8;
        self.sweep_divider_period = r.read_i32()?;
        self.sweep_shift = r.read_u8()?;
        self.sweep_counter = r.read_i32()?;
        self.sweep_enable = r.read_bool()?;
        self.sweep_reload = r.read_bool()?;
        self.sweep_negate = r.read_bool()?;
        self.frequency = r.read_i32()?;
        self.cycles = r.read_i32()?;
        self.output = r.read_u8()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playable_pulse(mode: SweepNegate) -> Pulse {
        let mut p = Pulse::new(mode);
        p.duration.set_enabled(true);
        p.write_register(0, 0x3F); // halt + constant volume 15
        p.write_register(2, 0xFD); // period low
        p.write_register(3, 0x08); // period high 0, length index 1
        p.clock_single(false);
        p
    }

    #[test]
    fn produces_duty_output_when_running() {
        let mut p = playable_pulse(SweepNegate::TwosComplement);
        let mut seen_high = false;
        let mut seen_low = false;
        for _ in 0..20_000 {
            p.clock_single(false);
            if p.output == 15 {
                seen_high = true;
            }
            if p.output == 0 {
                seen_low = true;
            }
        }
        assert!(seen_high && seen_low, "duty cycle should toggle output");
    }

    #[test]
    fn sub_minimum_period_is_muted() {
        let mut p = playable_pulse(SweepNegate::TwosComplement);
        p.write_register(2, 0x04); // period 4 < 8
        p.write_register(3, 0x08);
        // Long enough to drain the old timer period and reload
        for _ in 0..1200 {
            p.clock_single(false);
        }
        assert_eq!(p.output, 0);
    }

    #[test]
    fn sweep_negation_modes_differ_by_one() {
        // Same register writes, same number of half-frame clocks: the
        // one's-complement channel ends one step lower per sweep tick.
        let mut ones = playable_pulse(SweepNegate::OnesComplement);
        let mut twos = playable_pulse(SweepNegate::TwosComplement);
        for p in [&mut ones, &mut twos] {
            p.write_register(2, 0x00);
            p.write_register(3, 0x09); // period = 0x100
            p.write_register(1, 0x89); // enable, period 0, negate, shift 1
            p.clock_single(false);
            p.clock_duration(); // reload sweep divider
            p.clock_duration(); // sweep applies
        }
        assert_eq!(twos.frequency, 0x100 - (0x100 >> 1));
        assert_eq!(ones.frequency, 0x100 - (0x100 >> 1) - 1);
    }

    #[test]
    fn sweep_overflow_mutes_channel() {
        let mut p = playable_pulse(SweepNegate::TwosComplement);
        p.write_register(1, 0x81); // enable, shift 1, no negate
        p.write_register(2, 0xFF);
        p.write_register(3, 0x0F); // period = 0x7FF → target overflows
        for _ in 0..6000 {
            p.clock_single(false);
        }
        assert_eq!(p.output, 0);
    }
}
