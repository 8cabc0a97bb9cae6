//! Sound unit: frame sequencer, five channels, mixer.
//!
//! The frame sequencer is a countdown over per-system cycle tables; each
//! expiry fires envelope clocks, duration (length/sweep) clocks, or the
//! frame IRQ, per the 4-step or 5-step pattern selected through $4017.
//! Every channel is also clocked once per CPU cycle for its own timer,
//! and one mixed sample is produced whenever the downsampling counter
//! rolls over.

mod counters;
mod dmc;
mod mixer;
mod noise;
mod pulse;
mod triangle;

pub use dmc::Dmc;
pub use mixer::Mixer;
pub use noise::Noise;
pub use pulse::{Pulse, SweepNegate};
pub use triangle::Triangle;

use famicore_core::{StateReader, StateTruncated, StateWriter};

use crate::cartridge::Board;
use crate::config::TvSystem;
use crate::interrupts::{Interrupts, IRQ_APU};
use crate::io::AudioSink;

/// 4-step sequencer cycle tables (NTSC, PAL-B, Dendy). The trailing
/// entries wrap the sequence back to its start.
const SEQUENCE_MODE_0: [[i32; 7]; 3] = [
    [7459, 7456, 7458, 7457, 1, 1, 7457],
    [8315, 8314, 8312, 8313, 1, 1, 8313],
    [7459, 7456, 7458, 7457, 1, 1, 7457],
];

/// 5-step sequencer cycle tables.
const SEQUENCE_MODE_1: [[i32; 5]; 3] = [
    [1, 7458, 7456, 7458, 14910],
    [1, 8314, 8314, 8312, 16626],
    [1, 7458, 7456, 7458, 14910],
];

/// The 2A03 sound unit.
pub struct Apu {
    pub(crate) pulse1: Pulse,
    pub(crate) pulse2: Pulse,
    pub(crate) triangle: Triangle,
    pub(crate) noise: Noise,
    pub(crate) dmc: Dmc,
    pub(crate) mixer: Mixer,

    system_index: usize,
    cpu_hz: f64,
    cycles: i32,
    sequencing_mode: bool,
    current_seq: u8,
    is_clocking_duration: bool,
    frame_irq_enabled: bool,
    frame_irq_flag: bool,
    /// CPU cycle parity, exposed to the DMA arbiter's wait-cycle logic.
    pub(crate) odd_cycle: bool,

    audio: Box<dyn AudioSink>,
    sound_enabled: bool,
}

impl Apu {
    #[must_use]
    pub fn new(system: TvSystem) -> Self {
        let system_index = system.table_index();
        Self {
            pulse1: Pulse::new(SweepNegate::OnesComplement),
            pulse2: Pulse::new(SweepNegate::TwosComplement),
            triangle: Triangle::new(),
            noise: Noise::new(),
            dmc: Dmc::new(system_index),
            mixer: Mixer::new(system.cpu_hz()),
            system_index,
            cpu_hz: system.cpu_hz(),
            cycles: SEQUENCE_MODE_0[system_index][0] - 10,
            sequencing_mode: false,
            current_seq: 0,
            is_clocking_duration: false,
            frame_irq_enabled: true,
            frame_irq_flag: false,
            odd_cycle: false,
            audio: Box::new(crate::io::NullAudio),
            sound_enabled: false,
        }
    }

    /// Install the audio backend and playback parameters.
    pub fn setup_playback(
        &mut self,
        audio: Box<dyn AudioSink>,
        enabled: bool,
        sample_rate: u32,
        buffer_size: usize,
        latency_bytes: usize,
    ) {
        self.audio = audio;
        self.sound_enabled = enabled;
        self.mixer
            .set_playback(self.cpu_hz, sample_rate, buffer_size, latency_bytes);
    }

    pub fn hard_reset(&mut self, system: TvSystem) {
        self.system_index = system.table_index();
        self.cpu_hz = system.cpu_hz();
        self.cycles = SEQUENCE_MODE_0[self.system_index][0] - 10;
        self.frame_irq_flag = false;
        self.frame_irq_enabled = true;
        self.sequencing_mode = false;
        self.current_seq = 0;
        self.odd_cycle = false;
        self.is_clocking_duration = false;

        self.pulse1.hard_reset();
        self.pulse2.hard_reset();
        self.triangle.hard_reset();
        self.noise.hard_reset();
        self.dmc.hard_reset(self.system_index);
    }

    pub fn soft_reset(&mut self) {
        self.cycles = SEQUENCE_MODE_0[self.system_index][0] - 10;
        self.frame_irq_flag = false;
        self.frame_irq_enabled = true;
        self.sequencing_mode = false;
        self.current_seq = 0;
        self.odd_cycle = false;
        self.is_clocking_duration = false;

        self.pulse1.hard_reset();
        self.pulse2.hard_reset();
        self.triangle.hard_reset();
        self.noise.hard_reset();
        self.dmc.hard_reset(self.system_index);
    }

    /// One CPU cycle. Returns true when the DMC consumed its buffer and
    /// a DMA fetch must be asserted.
    pub fn clock(&mut self, interrupts: &mut Interrupts, board: &mut dyn Board) -> bool {
        self.is_clocking_duration = false;
        self.cycles -= 1;
        self.odd_cycle = !self.odd_cycle;

        if self.cycles == 0 {
            if self.sequencing_mode {
                match self.current_seq {
                    0 | 2 => {
                        self.clock_duration(board);
                        self.is_clocking_duration = true;
                    }
                    1 | 3 => self.clock_envelope(board),
                    _ => unreachable!("5-step sequencer index out of range"),
                }
                self.current_seq += 1;
                self.cycles = SEQUENCE_MODE_1[self.system_index][usize::from(self.current_seq)];
                if self.current_seq == 4 {
                    self.current_seq = 0;
                }
            } else {
                match self.current_seq {
                    0 | 2 => self.clock_envelope(board),
                    1 => {
                        self.clock_duration(board);
                        self.is_clocking_duration = true;
                    }
                    3 | 5 => self.check_irq(interrupts),
                    4 => {
                        self.check_irq(interrupts);
                        self.clock_duration(board);
                        self.is_clocking_duration = true;
                    }
                    _ => unreachable!("4-step sequencer index out of range"),
                }
                self.current_seq += 1;
                self.cycles += SEQUENCE_MODE_0[self.system_index][usize::from(self.current_seq)];
                if self.current_seq == 6 {
                    self.current_seq = 0;
                }
            }
        }

        let icd = self.is_clocking_duration;
        self.pulse1.clock_single(icd);
        self.pulse2.clock_single(icd);
        self.triangle.clock_single(icd);
        self.noise.clock_single(icd, self.system_index);
        let dmc_dma_request = self.dmc.clock_single(self.system_index);
        let external = if board.external_audio_enabled() {
            board.clock_external_single(icd);
            board.external_audio_sample()
        } else {
            0.0
        };

        self.mixer.clock(
            (
                self.pulse1.output,
                self.pulse2.output,
                self.triangle.output,
                self.noise.output,
                self.dmc.output,
            ),
            external,
            &mut *self.audio,
        );

        dmc_dma_request
    }

    /// Quarter-frame event.
    fn clock_envelope(&mut self, board: &mut dyn Board) {
        self.pulse1.clock_envelope();
        self.pulse2.clock_envelope();
        self.triangle.clock_envelope();
        self.noise.clock_envelope();
        if board.external_audio_enabled() {
            board.clock_external_envelope();
        }
    }

    /// Half-frame event (always includes the quarter-frame clocks).
    fn clock_duration(&mut self, board: &mut dyn Board) {
        self.clock_envelope(board);
        self.pulse1.clock_duration();
        self.pulse2.clock_duration();
        self.triangle.clock_duration();
        self.noise.clock_duration();
        if board.external_audio_enabled() {
            board.clock_external_duration();
        }
    }

    fn check_irq(&mut self, interrupts: &mut Interrupts) {
        if self.frame_irq_enabled {
            self.frame_irq_flag = true;
        }
        if self.frame_irq_flag {
            interrupts.assert_irq(IRQ_APU);
        }
    }

    /// $4015 read: channel activity and IRQ flags. Reading clears the
    /// frame IRQ (side effect happens exactly once, here).
    pub fn read_status(&mut self, interrupts: &mut Interrupts) -> u8 {
        let mut status = 0u8;
        if self.pulse1.duration.counter > 0 {
            status |= 0x01;
        }
        if self.pulse2.duration.counter > 0 {
            status |= 0x02;
        }
        if self.triangle.duration.counter > 0 {
            status |= 0x04;
        }
        if self.noise.duration.counter > 0 {
            status |= 0x08;
        }
        if self.dmc.dma_size > 0 {
            status |= 0x10;
        }
        if self.frame_irq_flag {
            status |= 0x40;
        }
        if self.dmc.irq_occurred {
            status |= 0x80;
        }

        self.frame_irq_flag = false;
        interrupts.clear_irq(IRQ_APU);

        status
    }

    /// Channel/DMC register write ($4000-$4013, $4015, $4017). Returns
    /// true when the write requires a DMC DMA assert ($4015 enable with
    /// an empty buffer).
    pub fn write_register(&mut self, address: u16, value: u8, interrupts: &mut Interrupts) -> bool {
        match address {
            0x4000..=0x4003 => self.pulse1.write_register(address & 3, value),
            0x4004..=0x4007 => self.pulse2.write_register(address & 3, value),
            0x4008 | 0x400A | 0x400B => self.triangle.write_register(address, value),
            0x400C | 0x400E | 0x400F => self.noise.write_register(address, value),
            0x4009 | 0x400D => {} // Unused
            0x4010 => self.dmc.write_control(value, interrupts),
            0x4011 => self.dmc.write_output(value),
            0x4012 => self.dmc.write_address(value),
            0x4013 => self.dmc.write_length(value),
            0x4015 => {
                self.pulse1.duration.set_enabled(value & 0x01 != 0);
                self.pulse2.duration.set_enabled(value & 0x02 != 0);
                self.triangle.duration.set_enabled(value & 0x04 != 0);
                self.noise.duration.set_enabled(value & 0x08 != 0);
                return self.dmc.set_enabled(value & 0x10 != 0, interrupts);
            }
            0x4017 => {
                self.sequencing_mode = value & 0x80 != 0;
                self.frame_irq_enabled = value & 0x40 == 0;
                self.current_seq = 0;

                self.cycles = if self.sequencing_mode {
                    SEQUENCE_MODE_1[self.system_index][0]
                } else {
                    SEQUENCE_MODE_0[self.system_index][0]
                };
                // Phase adjustment from CPU cycle parity
                if self.odd_cycle {
                    self.cycles += 2;
                } else {
                    self.cycles += 1;
                }

                if !self.frame_irq_enabled {
                    self.frame_irq_flag = false;
                    interrupts.clear_irq(IRQ_APU);
                }
            }
            _ => unreachable!("address {address:#06X} is not an APU register"),
        }
        false
    }

    /// Frame boundary: hand the circular buffer to the audio backend.
    pub fn on_frame_completed(&mut self) {
        if !self.sound_enabled {
            return;
        }
        if !self.audio.is_playing() {
            self.audio.play();
            let pos = self.audio.current_write_position() + self.mixer.latency();
            self.mixer.realign(pos);
        }
        self.audio.submit_buffer(self.mixer.buffer());
    }

    /// Re-align the write cursor after a host stall.
    pub fn realign_playback(&mut self) {
        let pos = self.audio.current_write_position() + self.mixer.latency();
        self.mixer.realign(pos);
    }

    pub fn pause_playback(&mut self) {
        self.audio.pause();
        let pos = self.audio.current_write_position();
        self.mixer.realign(pos);
    }

    pub fn shutdown(&mut self) {
        self.audio.shutdown();
    }

    /// Sequencer state (channel state is serialized separately, in the
    /// snapshot's fixed component order).
    pub fn save_state(&self, w: &mut StateWriter) {
        w.write_i32(self.cycles);
        w.write_bool(self.sequencing_mode);
        w.write_u8(self.current_seq);
        w.write_bool(self.is_clocking_duration);
        w.write_bool(self.frame_irq_enabled);
        w.write_bool(self.frame_irq_flag);
        w.write_bool(self.odd_cycle);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.cycles = r.read_i32()?;
        self.sequencing_mode = r.read_bool()?;
        self.current_seq = r.read_u8()?;
        self.is_clocking_duration = r.read_bool()?;
        self.frame_irq_enabled = r.read_bool()?;
        self.frame_irq_flag = r.read_bool()?;
        self.odd_cycle = r.read_bool()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::{load_board, Board};

    fn test_board() -> Box<dyn Board> {
        let data = crate::cartridge::tests::make_ines(1, 1, 0, 0);
        load_board(&data).expect("board")
    }

    fn run(apu: &mut Apu, ints: &mut Interrupts, board: &mut dyn Board, cycles: u32) {
        for _ in 0..cycles {
            apu.clock(ints, board);
        }
    }

    #[test]
    fn frame_irq_fires_in_four_step_mode() {
        let mut apu = Apu::new(TvSystem::Ntsc);
        let mut ints = Interrupts::new();
        let mut board = test_board();
        apu.write_register(0x4017, 0x00, &mut ints);

        run(&mut apu, &mut ints, board.as_mut(), 29_835);
        assert!(apu.frame_irq_flag, "4-step mode raises the frame IRQ");
        assert_ne!(ints.irq_flags & IRQ_APU, 0);
    }

    #[test]
    fn no_frame_irq_in_five_step_mode() {
        let mut apu = Apu::new(TvSystem::Ntsc);
        let mut ints = Interrupts::new();
        let mut board = test_board();
        apu.write_register(0x4017, 0x80, &mut ints);

        run(&mut apu, &mut ints, board.as_mut(), 40_000);
        assert!(!apu.frame_irq_flag);
        assert_eq!(ints.irq_flags & IRQ_APU, 0);
    }

    #[test]
    fn irq_inhibit_clears_pending_flag() {
        let mut apu = Apu::new(TvSystem::Ntsc);
        let mut ints = Interrupts::new();
        let mut board = test_board();
        apu.write_register(0x4017, 0x00, &mut ints);
        run(&mut apu, &mut ints, board.as_mut(), 29_835);
        assert!(apu.frame_irq_flag);

        apu.write_register(0x4017, 0x40, &mut ints);
        assert!(!apu.frame_irq_flag);
        assert_eq!(ints.irq_flags & IRQ_APU, 0);
    }

    #[test]
    fn status_read_clears_frame_irq_once() {
        let mut apu = Apu::new(TvSystem::Ntsc);
        let mut ints = Interrupts::new();
        let mut board = test_board();
        apu.write_register(0x4017, 0x00, &mut ints);
        run(&mut apu, &mut ints, board.as_mut(), 29_835);

        let status = apu.read_status(&mut ints);
        assert_ne!(status & 0x40, 0);
        assert_eq!(ints.irq_flags & IRQ_APU, 0);
        let status = apu.read_status(&mut ints);
        assert_eq!(status & 0x40, 0, "flag reads clear after the first");
    }

    #[test]
    fn disabling_channel_silences_only_that_channel() {
        let mut apu = Apu::new(TvSystem::Ntsc);
        let mut ints = Interrupts::new();
        let mut board = test_board();

        // Start pulse 1 and triangle
        apu.write_register(0x4015, 0x05, &mut ints);
        apu.write_register(0x4003, 0x08, &mut ints);
        apu.write_register(0x4008, 0xFF, &mut ints);
        apu.write_register(0x400B, 0x08, &mut ints);
        apu.clock(&mut ints, board.as_mut());

        let status = apu.read_status(&mut ints);
        assert_eq!(status & 0x05, 0x05);

        // Disable pulse 1 only
        apu.write_register(0x4015, 0x04, &mut ints);
        apu.clock(&mut ints, board.as_mut());
        let status = apu.read_status(&mut ints);
        assert_eq!(status & 0x01, 0, "pulse 1 length cleared");
        assert_ne!(status & 0x04, 0, "triangle unaffected");
    }

    #[test]
    fn five_step_sequence_is_longer() {
        // The 5-step sequence spans ~37282 cycles before repeating; the
        // 4-step spans ~29830. Check the first duration clock timing
        // differs between modes.
        let mut apu4 = Apu::new(TvSystem::Ntsc);
        let mut apu5 = Apu::new(TvSystem::Ntsc);
        let mut ints = Interrupts::new();
        let mut board = test_board();

        for (apu, mode) in [(&mut apu4, 0x00u8), (&mut apu5, 0x80u8)] {
            apu.write_register(0x4015, 0x01, &mut ints);
            apu.write_register(0x4003, 0x08, &mut ints); // length 254
            apu.write_register(0x4017, mode, &mut ints);
        }

        // In 5-step mode the first event (cycle 1) is a duration clock
        run(&mut apu5, &mut ints, board.as_mut(), 4);
        assert_eq!(apu5.pulse1.duration.counter, 253);
        run(&mut apu4, &mut ints, board.as_mut(), 4);
        assert_eq!(apu4.pulse1.duration.counter, 254);
    }
}
