//! The cartridge board abstraction.
//!
//! A board owns everything on the cartridge side of the bus: PRG ROM
//! banking, CHR ROM/RAM banking, the nametable memory (mirroring is a
//! property of the board's wiring, and four-screen boards carry their own
//! VRAM), optional save RAM, and optional IRQ/audio hardware. One
//! concrete board is selected per cartridge at load time and replaced
//! wholesale on the next load.

use famicore_core::{StateReader, StateTruncated, StateWriter};

use crate::cartridge::Cartridge;
use crate::interrupts::Interrupts;

/// Nametable mirroring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
    SingleScreenLower,
    SingleScreenUpper,
}

impl Mirroring {
    const fn to_byte(self) -> u8 {
        match self {
            Self::Horizontal => 0,
            Self::Vertical => 1,
            Self::FourScreen => 2,
            Self::SingleScreenLower => 3,
            Self::SingleScreenUpper => 4,
        }
    }

    const fn from_byte(v: u8) -> Self {
        match v {
            1 => Self::Vertical,
            2 => Self::FourScreen,
            3 => Self::SingleScreenLower,
            4 => Self::SingleScreenUpper,
            _ => Self::Horizontal,
        }
    }
}

/// Common board state: ROM payloads, bank windows, nametable RAM and save
/// RAM. Concrete boards embed one of these and express their bank
/// switching through the `switch_*` helpers.
///
/// PRG is windowed as four 8 KB slots covering $8000-$FFFF; CHR as eight
/// 1 KB slots covering PPU $0000-$1FFF. Coarser switches are composed
/// from these, with out-of-range banks wrapping modulo the ROM size.
pub struct BoardBase {
    prg_rom: Vec<u8>,
    prg_offsets: [usize; 4],
    chr: Vec<u8>,
    chr_is_ram: bool,
    chr_offsets: [usize; 8],
    /// 4 KB so four-screen boards get all four tables; mirrored boards
    /// use the first 2 KB.
    nametable_ram: [u8; 4096],
    nt_map: [usize; 4],
    mirroring: Mirroring,
    sram: Vec<u8>,
    sram_dirty: bool,
    battery: bool,
    crc: u32,
}

impl BoardBase {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        let chr_is_ram = cart.chr_rom.is_empty();
        let chr = if chr_is_ram {
            vec![0u8; 8 * 1024]
        } else {
            cart.chr_rom.clone()
        };
        let mut base = Self {
            prg_rom: cart.prg_rom.clone(),
            prg_offsets: [0; 4],
            chr,
            chr_is_ram,
            chr_offsets: [0; 8],
            nametable_ram: [0; 4096],
            nt_map: [0; 4],
            mirroring: cart.header.mirroring,
            sram: vec![0u8; 8 * 1024],
            sram_dirty: false,
            battery: cart.header.battery,
            crc: cart.crc,
        };
        base.set_mirroring(cart.header.mirroring);
        base.switch_prg_32k(0);
        base.switch_chr_8k(0);
        base
    }

    /// Reset bank windows and clear RAM (power cycle). Save RAM survives.
    pub fn hard_reset(&mut self) {
        self.nametable_ram = [0; 4096];
        self.switch_prg_32k(0);
        self.switch_chr_8k(0);
    }

    // === PRG banking ===

    #[must_use]
    pub fn prg_8k_count(&self) -> usize {
        (self.prg_rom.len() / 0x2000).max(1)
    }

    #[must_use]
    pub fn prg_16k_count(&self) -> usize {
        (self.prg_rom.len() / 0x4000).max(1)
    }

    pub fn switch_prg_8k(&mut self, slot: usize, bank: usize) {
        self.prg_offsets[slot] = (bank % self.prg_8k_count()) * 0x2000;
    }

    pub fn switch_prg_16k(&mut self, slot: usize, bank: usize) {
        let base = (bank % self.prg_16k_count()) * 2;
        self.switch_prg_8k(slot * 2, base);
        self.switch_prg_8k(slot * 2 + 1, base + 1);
    }

    pub fn switch_prg_32k(&mut self, bank: usize) {
        for i in 0..4 {
            self.switch_prg_8k(i, bank * 4 + i);
        }
    }

    #[must_use]
    pub fn prg_read(&self, addr: u16) -> u8 {
        if self.prg_rom.is_empty() {
            return 0;
        }
        let slot = usize::from((addr - 0x8000) >> 13) & 3;
        self.prg_rom[self.prg_offsets[slot] + usize::from(addr & 0x1FFF)]
    }

    // === CHR banking ===

    #[must_use]
    pub fn chr_1k_count(&self) -> usize {
        (self.chr.len() / 0x0400).max(1)
    }

    #[must_use]
    pub fn chr_is_ram(&self) -> bool {
        self.chr_is_ram
    }

    pub fn switch_chr_1k(&mut self, slot: usize, bank: usize) {
        self.chr_offsets[slot] = (bank % self.chr_1k_count()) * 0x0400;
    }

    pub fn switch_chr_2k(&mut self, slot: usize, bank: usize) {
        self.switch_chr_1k(slot * 2, bank * 2);
        self.switch_chr_1k(slot * 2 + 1, bank * 2 + 1);
    }

    pub fn switch_chr_4k(&mut self, slot: usize, bank: usize) {
        for i in 0..4 {
            self.switch_chr_1k(slot * 4 + i, bank * 4 + i);
        }
    }

    pub fn switch_chr_8k(&mut self, bank: usize) {
        for i in 0..8 {
            self.switch_chr_1k(i, bank * 8 + i);
        }
    }

    #[must_use]
    pub fn chr_read(&self, addr: u16) -> u8 {
        let slot = usize::from(addr >> 10) & 7;
        self.chr[self.chr_offsets[slot] + usize::from(addr & 0x03FF)]
    }

    pub fn chr_write(&mut self, addr: u16, value: u8) {
        if !self.chr_is_ram {
            return;
        }
        let slot = usize::from(addr >> 10) & 7;
        self.chr[self.chr_offsets[slot] + usize::from(addr & 0x03FF)] = value;
    }

    // === Nametables ===

    #[must_use]
    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.mirroring = mirroring;
        self.nt_map = match mirroring {
            Mirroring::Horizontal => [0, 0, 1, 1],
            Mirroring::Vertical => [0, 1, 0, 1],
            Mirroring::FourScreen => [0, 1, 2, 3],
            Mirroring::SingleScreenLower => [0, 0, 0, 0],
            Mirroring::SingleScreenUpper => [1, 1, 1, 1],
        };
    }

    #[must_use]
    pub fn nt_read(&self, addr: u16) -> u8 {
        let table = self.nt_map[usize::from(addr >> 10) & 3];
        self.nametable_ram[table * 0x0400 + usize::from(addr & 0x03FF)]
    }

    pub fn nt_write(&mut self, addr: u16, value: u8) {
        let table = self.nt_map[usize::from(addr >> 10) & 3];
        self.nametable_ram[table * 0x0400 + usize::from(addr & 0x03FF)] = value;
    }

    // === Save RAM ===

    #[must_use]
    pub fn sram_read(&self, addr: u16) -> u8 {
        self.sram[usize::from(addr) & (self.sram.len() - 1)]
    }

    pub fn sram_write(&mut self, addr: u16, value: u8) {
        let index = usize::from(addr) & (self.sram.len() - 1);
        self.sram[index] = value;
        if self.battery {
            self.sram_dirty = true;
        }
    }

    #[must_use]
    pub fn sram(&self) -> &[u8] {
        &self.sram
    }

    #[must_use]
    pub fn has_battery(&self) -> bool {
        self.battery
    }

    #[must_use]
    pub fn sram_dirty(&self) -> bool {
        self.sram_dirty
    }

    pub fn mark_sram_clean(&mut self) {
        self.sram_dirty = false;
    }

    pub fn load_sram(&mut self, data: &[u8]) {
        let len = self.sram.len().min(data.len());
        self.sram[..len].copy_from_slice(&data[..len]);
        self.sram_dirty = false;
    }

    #[must_use]
    pub fn crc(&self) -> u32 {
        self.crc
    }

    // === Snapshot ===

    pub fn save_state(&self, w: &mut StateWriter) {
        for offset in self.prg_offsets {
            w.write_u32(offset as u32);
        }
        for offset in self.chr_offsets {
            w.write_u32(offset as u32);
        }
        w.write_bytes(&self.nametable_ram);
        w.write_u8(self.mirroring.to_byte());
        if self.chr_is_ram {
            w.write_bytes(&self.chr);
        }
        w.write_bytes(&self.sram);
        w.write_bool(self.sram_dirty);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        for offset in &mut self.prg_offsets {
            *offset = r.read_u32()? as usize;
        }
        for offset in &mut self.chr_offsets {
            *offset = r.read_u32()? as usize;
        }
        r.read_exact(&mut self.nametable_ram)?;
        self.set_mirroring(Mirroring::from_byte(r.read_u8()?));
        if self.chr_is_ram {
            r.read_exact(&mut self.chr)?;
        }
        r.read_exact(&mut self.sram)?;
        self.sram_dirty = r.read_bool()?;
        Ok(())
    }
}

/// Cartridge board capability surface.
///
/// Defaults cover the common wiring (linear PRG, base-windowed CHR,
/// header mirroring, 8 KB save RAM, no IRQ, no extra audio); boards
/// override only what their hardware actually does. Register writes that
/// acknowledge board IRQs get the interrupt controller passed in.
pub trait Board {
    fn base(&self) -> &BoardBase;
    fn base_mut(&mut self) -> &mut BoardBase;

    /// Power cycle: restore power-on banking.
    fn hard_reset(&mut self);

    /// Reset button. Most boards do nothing.
    fn soft_reset(&mut self) {}

    fn read_prg(&mut self, addr: u16) -> u8 {
        self.base().prg_read(addr)
    }

    fn write_prg(&mut self, _addr: u16, _value: u8, _interrupts: &mut Interrupts) {}

    fn read_chr(&mut self, addr: u16) -> u8 {
        self.base().chr_read(addr)
    }

    fn write_chr(&mut self, addr: u16, value: u8) {
        self.base_mut().chr_write(addr, value);
    }

    fn read_nametable(&mut self, addr: u16) -> u8 {
        self.base().nt_read(addr)
    }

    fn write_nametable(&mut self, addr: u16, value: u8) {
        self.base_mut().nt_write(addr, value);
    }

    /// Expansion area $4020-$5FFF. Open bus on most boards.
    fn read_expansion(&mut self, _addr: u16) -> u8 {
        0
    }

    fn write_expansion(&mut self, _addr: u16, _value: u8, _interrupts: &mut Interrupts) {}

    fn read_sram(&mut self, addr: u16) -> u8 {
        self.base().sram_read(addr)
    }

    fn write_sram(&mut self, addr: u16, value: u8) {
        self.base_mut().sram_write(addr, value);
    }

    /// Called once per CPU bus cycle, after the other components clock.
    fn on_cpu_clock(&mut self, _interrupts: &mut Interrupts) {}

    /// Called once per PPU dot.
    fn on_ppu_clock(&mut self) {}

    /// Called at the end of every scanline. `rendering` is true when the
    /// PPU is actively fetching (background or sprites enabled, visible
    /// or pre-render line).
    fn on_scanline_tick(&mut self, _interrupts: &mut Interrupts, _rendering: bool) {}

    /// Called whenever the PPU's VRAM address changes.
    fn on_ppu_address_update(&mut self, _addr: u16) {}

    /// Whether this board mixes its own audio into the APU output.
    fn external_audio_enabled(&self) -> bool {
        false
    }

    /// Current external audio level, added to the APU mix.
    fn external_audio_sample(&self) -> f64 {
        0.0
    }

    /// Frame-sequencer envelope clock for external audio hardware.
    fn clock_external_envelope(&mut self) {}

    /// Frame-sequencer length/sweep clock for external audio hardware.
    fn clock_external_duration(&mut self) {}

    /// Per-CPU-cycle clock for external audio hardware.
    fn clock_external_single(&mut self, _is_clocking_duration: bool) {}

    /// Whether save RAM has unsaved changes that should be persisted.
    fn sram_save_required(&self) -> bool {
        self.base().has_battery() && self.base().sram_dirty()
    }

    fn sram_buffer(&self) -> &[u8] {
        self.base().sram()
    }

    fn load_sram(&mut self, data: &[u8]) {
        self.base_mut().load_sram(data);
    }

    /// Content hash of the loaded cartridge image.
    fn crc(&self) -> u32 {
        self.base().crc()
    }

    fn save_state(&self, w: &mut StateWriter) {
        self.base().save_state(w);
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.base_mut().load_state(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;

    fn make_base(prg_banks: u8, chr_banks: u8) -> BoardBase {
        let data = crate::cartridge::tests::make_ines(prg_banks, chr_banks, 0, 0);
        BoardBase::new(&Cartridge::parse(&data).expect("parse"))
    }

    #[test]
    fn prg_16k_mirrors_through_32k_window() {
        let base = make_base(1, 1);
        // 16K PRG: $8000 and $C000 read the same bytes
        assert_eq!(base.prg_read(0x8000), base.prg_read(0xC000));
        assert_eq!(base.prg_read(0x9234), base.prg_read(0xD234));
    }

    #[test]
    fn prg_bank_switch_moves_window() {
        let mut base = make_base(2, 1);
        let first = base.prg_read(0x8000);
        base.switch_prg_16k(0, 1);
        let second = base.prg_read(0x8000);
        assert_ne!(first, second);
        // Bank numbers wrap modulo ROM size
        base.switch_prg_16k(0, 3);
        assert_eq!(base.prg_read(0x8000), second);
    }

    #[test]
    fn chr_ram_when_no_chr_banks() {
        let mut base = make_base(1, 0);
        assert!(base.chr_is_ram());
        base.chr_write(0x1234, 0x5A);
        assert_eq!(base.chr_read(0x1234), 0x5A);
    }

    #[test]
    fn chr_rom_ignores_writes() {
        let mut base = make_base(1, 1);
        let before = base.chr_read(0x0000);
        base.chr_write(0x0000, !before);
        assert_eq!(base.chr_read(0x0000), before);
    }

    #[test]
    fn horizontal_mirroring_pairs_tables() {
        let mut base = make_base(1, 1);
        base.set_mirroring(Mirroring::Horizontal);
        base.nt_write(0x2000, 0x11);
        assert_eq!(base.nt_read(0x2400), 0x11); // NT1 mirrors NT0
        assert_eq!(base.nt_read(0x2800), 0x00);
        base.nt_write(0x2800, 0x22);
        assert_eq!(base.nt_read(0x2C00), 0x22); // NT3 mirrors NT2
    }

    #[test]
    fn vertical_mirroring_pairs_tables() {
        let mut base = make_base(1, 1);
        base.set_mirroring(Mirroring::Vertical);
        base.nt_write(0x2000, 0x33);
        assert_eq!(base.nt_read(0x2800), 0x33); // NT2 mirrors NT0
        assert_eq!(base.nt_read(0x2400), 0x00);
    }

    #[test]
    fn four_screen_keeps_tables_distinct() {
        let mut base = make_base(1, 1);
        base.set_mirroring(Mirroring::FourScreen);
        base.nt_write(0x2000, 1);
        base.nt_write(0x2400, 2);
        base.nt_write(0x2800, 3);
        base.nt_write(0x2C00, 4);
        assert_eq!(base.nt_read(0x2000), 1);
        assert_eq!(base.nt_read(0x2400), 2);
        assert_eq!(base.nt_read(0x2800), 3);
        assert_eq!(base.nt_read(0x2C00), 4);
    }

    #[test]
    fn sram_dirty_only_with_battery() {
        let mut base = make_base(1, 1);
        base.sram_write(0x6000, 0xAA);
        assert!(!base.sram_dirty(), "no battery, nothing to persist");

        let data = crate::cartridge::tests::make_ines(1, 1, 0x02, 0);
        let mut battery = BoardBase::new(&Cartridge::parse(&data).expect("parse"));
        battery.sram_write(0x6000, 0xAA);
        assert!(battery.sram_dirty());
    }

    #[test]
    fn base_state_round_trips() {
        let mut base = make_base(2, 0);
        base.switch_prg_16k(0, 1);
        base.chr_write(0x0100, 0x77);
        base.nt_write(0x2000, 0x42);
        base.sram_write(0x6010, 0x24);

        let mut w = StateWriter::new();
        base.save_state(&mut w);
        let bytes = w.into_bytes();

        let mut other = make_base(2, 0);
        let mut r = StateReader::new(&bytes);
        other.load_state(&mut r).expect("load");
        assert_eq!(other.prg_read(0x8000), base.prg_read(0x8000));
        assert_eq!(other.chr_read(0x0100), 0x77);
        assert_eq!(other.nt_read(0x2000), 0x42);
        assert_eq!(other.sram_read(0x6010), 0x24);
    }
}
