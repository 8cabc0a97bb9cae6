//! The console: CPU plus bus, driven one instruction at a time.
//!
//! The CPU is the only component with its own run loop; everything else
//! advances from inside its bus accesses. A frame completes when the PPU
//! wraps its scanline counter, at which point the finished framebuffer
//! goes to the video sink, the audio buffer goes to the audio sink, and
//! the input devices are polled — all between instructions, never inside
//! one.

use famicore_6502::Mos6502;
use famicore_core::{Tickable, Ticks};

use crate::bus::NesBus;
use crate::cartridge::{self, CartridgeError};
use crate::config::TvSystem;
use crate::input::{Joypad, VsDip, Zapper};
use crate::io::{AudioSink, NullVideo, VideoSink};
use crate::ppu::{FB_HEIGHT, FB_WIDTH};

/// A complete console with a loaded cartridge.
pub struct Nes {
    pub(crate) cpu: Mos6502,
    pub(crate) bus: NesBus,
    video: Box<dyn VideoSink>,
    pub(crate) frame_count: u64,
}

impl core::fmt::Debug for Nes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Nes")
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

impl Nes {
    /// Build a console from an iNES image.
    ///
    /// # Errors
    ///
    /// Fails without side effects when the image is structurally invalid
    /// or the mapper is unsupported.
    pub fn new(rom_data: &[u8], system: TvSystem) -> Result<Self, CartridgeError> {
        let board = cartridge::load_board(rom_data)?;
        let bus = NesBus::new(board, system);
        let mut nes = Self {
            cpu: Mos6502::new(),
            bus,
            video: Box::new(NullVideo),
            frame_count: 0,
        };
        nes.load_reset_vector();
        Ok(nes)
    }

    /// The reset vector is fetched directly from the board at power-on,
    /// before normal (clocked) bus traffic begins.
    fn load_reset_vector(&mut self) {
        let lo = self.bus.board.read_prg(0xFFFC);
        let hi = self.bus.board.read_prg(0xFFFD);
        self.cpu.regs.pc = u16::from(lo) | (u16::from(hi) << 8);
    }

    /// Power cycle.
    pub fn hard_reset(&mut self) {
        self.bus.hard_reset();
        self.cpu.hard_reset();
        self.load_reset_vector();
        self.frame_count = 0;
    }

    /// Reset button.
    pub fn soft_reset(&mut self) {
        self.bus.soft_reset();
        self.cpu.soft_reset(&mut self.bus);
    }

    /// Execute one instruction. Returns true when that instruction
    /// crossed a frame boundary.
    pub fn clock_instruction(&mut self) -> bool {
        self.cpu.clock(&mut self.bus);
        if self.bus.ppu.take_frame_ready() {
            self.finish_frame();
            true
        } else {
            false
        }
    }

    /// Run until the current frame completes.
    pub fn run_frame(&mut self) {
        while !self.clock_instruction() {}
    }

    fn finish_frame(&mut self) {
        self.video.submit_frame(self.bus.ppu.screen());
        self.bus.input.finish_frame();
        self.bus.apu.on_frame_completed();
        self.frame_count += 1;
    }

    // === Host wiring ===

    pub fn set_video_sink(&mut self, video: Box<dyn VideoSink>) {
        self.video = video;
    }

    /// Install the audio backend (see [`crate::apu::Apu`] playback docs).
    pub fn setup_audio(
        &mut self,
        audio: Box<dyn AudioSink>,
        enabled: bool,
        sample_rate: u32,
        buffer_size: usize,
        latency_bytes: usize,
    ) {
        self.bus
            .apu
            .setup_playback(audio, enabled, sample_rate, buffer_size, latency_bytes);
    }

    pub fn setup_joypads(&mut self, joypads: [Box<dyn Joypad>; 4], four_players: bool) {
        self.bus.input.setup_joypads(joypads, four_players);
    }

    pub fn setup_zapper(&mut self, zapper: Option<Box<dyn Zapper>>) {
        self.bus.input.setup_zapper(zapper);
    }

    pub fn setup_vs_dip(&mut self, vs_dip: Option<Box<dyn VsDip>>) {
        self.bus.input.setup_vs_dip(vs_dip);
    }

    /// Mutable access to the video sink (snapshot requests).
    pub fn video_sink_mut(&mut self) -> &mut dyn VideoSink {
        self.video.as_mut()
    }

    // === Observation ===

    /// The last completed framebuffer (ARGB32, 256×240).
    #[must_use]
    pub fn screen(&self) -> &[u32] {
        self.bus.ppu.screen()
    }

    #[must_use]
    pub fn framebuffer_width(&self) -> usize {
        FB_WIDTH
    }

    #[must_use]
    pub fn framebuffer_height(&self) -> usize {
        FB_HEIGHT
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Bus cycles since power-on.
    #[must_use]
    pub fn cycles(&self) -> Ticks {
        Ticks::new(self.bus.cycles)
    }

    #[must_use]
    pub fn system(&self) -> TvSystem {
        self.bus.system()
    }

    /// Content hash of the loaded cartridge.
    #[must_use]
    pub fn cartridge_crc(&self) -> u32 {
        self.bus.board.crc()
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Mos6502 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &NesBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut NesBus {
        &mut self.bus
    }

    /// Whether the board wants its save RAM persisted.
    #[must_use]
    pub fn sram_save_required(&self) -> bool {
        self.bus.board.sram_save_required()
    }

    pub fn shutdown(&mut self) {
        self.bus.apu.shutdown();
        self.video.shutdown();
    }
}

impl Tickable for Nes {
    /// One tick = one CPU instruction (a handful of bus cycles).
    fn tick(&mut self) {
        self.clock_instruction();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 32K NOP-filled PRG with vectors pointing at $8000.
    fn nop_rom() -> Vec<u8> {
        let mut rom = crate::cartridge::tests::make_ines(2, 1, 0, 0);
        for byte in &mut rom[16..16 + 32 * 1024] {
            *byte = 0xEA;
        }
        // Reset/NMI/IRQ vectors at the top of PRG
        rom[16 + 0x7FFA] = 0x00;
        rom[16 + 0x7FFB] = 0x80;
        rom[16 + 0x7FFC] = 0x00;
        rom[16 + 0x7FFD] = 0x80;
        rom[16 + 0x7FFE] = 0x00;
        rom[16 + 0x7FFF] = 0x80;
        rom
    }

    #[test]
    fn reset_vector_loads_pc() {
        let nes = Nes::new(&nop_rom(), TvSystem::Ntsc).expect("load");
        assert_eq!(nes.cpu().regs.pc, 0x8000);
    }

    #[test]
    fn run_frame_advances_frame_count() {
        let mut nes = Nes::new(&nop_rom(), TvSystem::Ntsc).expect("load");
        nes.run_frame();
        assert_eq!(nes.frame_count(), 1);
        nes.run_frame();
        assert_eq!(nes.frame_count(), 2);
    }

    #[test]
    fn ntsc_frame_cadence_matches_hardware() {
        let mut nes = Nes::new(&nop_rom(), TvSystem::Ntsc).expect("load");
        nes.run_frame();
        let start = nes.cycles().get();
        let frames = 4u64;
        for _ in 0..frames {
            nes.run_frame();
        }
        let per_frame = (nes.cycles().get() - start) as f64 / frames as f64;
        // 341 × 262 / 3 = 29780.67 CPU cycles per frame (rendering off,
        // no odd-frame skip), sampled at instruction granularity
        assert!(
            (per_frame - 29_780.67).abs() < 4.0,
            "cycles per frame: {per_frame}"
        );
    }

    #[test]
    fn pal_frames_are_longer() {
        let mut nes = Nes::new(&nop_rom(), TvSystem::PalB).expect("load");
        nes.run_frame();
        let start = nes.cycles().get();
        nes.run_frame();
        let per_frame = nes.cycles().get() - start;
        // 341 × 312 / 3.2 = 33247.5 CPU cycles per frame
        assert!(
            (per_frame as f64 - 33_247.5).abs() < 8.0,
            "cycles per frame: {per_frame}"
        );
    }

    #[test]
    fn hard_reset_restores_power_on_state() {
        let mut nes = Nes::new(&nop_rom(), TvSystem::Ntsc).expect("load");
        nes.run_frame();
        nes.bus_mut().wram[0x10] = 0x55;
        nes.hard_reset();
        assert_eq!(nes.frame_count(), 0);
        assert_eq!(nes.cycles(), Ticks::ZERO);
        assert_eq!(nes.bus().wram[0x10], 0);
        assert_eq!(nes.cpu().regs.pc, 0x8000);
    }
}
