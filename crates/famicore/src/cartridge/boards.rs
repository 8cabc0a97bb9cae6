//! Concrete board implementations.
//!
//! Each board owns a [`BoardBase`] for the common wiring and implements
//! its own bank-switching registers on top. The set here covers the
//! discrete-logic families plus the two Nintendo MMC ASICs that dominate
//! the library, and the Irem 74161 board as a switched-CHR example.

use famicore_core::{StateReader, StateTruncated, StateWriter};

use crate::cartridge::board::{Board, BoardBase, Mirroring};
use crate::cartridge::Cartridge;
use crate::interrupts::{Interrupts, IRQ_BOARD};

/// NROM (mapper 0): no bank switching.
///
/// - PRG: 16 KB mirrored at $8000-$FFFF, or 32 KB straight
/// - CHR: 8 KB ROM, or RAM when the header declares no CHR banks
pub struct Nrom {
    base: BoardBase,
}

impl Nrom {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        Self {
            base: BoardBase::new(cart),
        }
    }
}

impl Board for Nrom {
    fn base(&self) -> &BoardBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BoardBase {
        &mut self.base
    }

    fn hard_reset(&mut self) {
        self.base.hard_reset();
    }
}

/// MMC1 (mapper 1, SxROM): serial shift-register bank switching.
///
/// Five writes to $8000-$FFFF load one bit each; the fifth dispatches the
/// value to one of four internal registers selected by address bits
/// 14-13. A write with bit 7 set resets the shift register and forces
/// PRG mode 3 (fix last bank).
pub struct Mmc1 {
    base: BoardBase,
    shift_register: u8,
    shift_count: u8,
    control: u8,
    chr_bank_0: u8,
    chr_bank_1: u8,
    prg_bank: u8,
}

impl Mmc1 {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        let mut board = Self {
            base: BoardBase::new(cart),
            shift_register: 0,
            shift_count: 0,
            control: 0x0C,
            chr_bank_0: 0,
            chr_bank_1: 0,
            prg_bank: 0,
        };
        board.apply_banks();
        board
    }

    fn apply_banks(&mut self) {
        match self.control & 0x03 {
            0 => self.base.set_mirroring(Mirroring::SingleScreenLower),
            1 => self.base.set_mirroring(Mirroring::SingleScreenUpper),
            2 => self.base.set_mirroring(Mirroring::Vertical),
            _ => self.base.set_mirroring(Mirroring::Horizontal),
        }

        match (self.control >> 2) & 0x03 {
            0 | 1 => {
                // 32 KB mode: bit 0 of the bank number is ignored
                self.base
                    .switch_prg_32k(usize::from(self.prg_bank & 0x0E) >> 1);
            }
            2 => {
                // Fix first bank at $8000, switch $C000
                self.base.switch_prg_16k(0, 0);
                self.base.switch_prg_16k(1, usize::from(self.prg_bank & 0x0F));
            }
            _ => {
                // Switch $8000, fix last bank at $C000
                self.base.switch_prg_16k(0, usize::from(self.prg_bank & 0x0F));
                let last = self.base.prg_16k_count() - 1;
                self.base.switch_prg_16k(1, last);
            }
        }

        if self.control & 0x10 == 0 {
            // 8 KB CHR mode: bit 0 ignored
            self.base.switch_chr_8k(usize::from(self.chr_bank_0 & 0x1E) >> 1);
        } else {
            self.base.switch_chr_4k(0, usize::from(self.chr_bank_0));
            self.base.switch_chr_4k(1, usize::from(self.chr_bank_1));
        }
    }
}

impl Board for Mmc1 {
    fn base(&self) -> &BoardBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BoardBase {
        &mut self.base
    }

    fn hard_reset(&mut self) {
        self.base.hard_reset();
        self.shift_register = 0;
        self.shift_count = 0;
        self.control = 0x0C;
        self.chr_bank_0 = 0;
        self.chr_bank_1 = 0;
        self.prg_bank = 0;
        self.apply_banks();
    }

    fn write_prg(&mut self, addr: u16, value: u8, _interrupts: &mut Interrupts) {
        if value & 0x80 != 0 {
            self.shift_register = 0;
            self.shift_count = 0;
            self.control |= 0x0C;
            self.apply_banks();
            return;
        }

        // LSB first
        self.shift_register |= (value & 1) << self.shift_count;
        self.shift_count += 1;

        if self.shift_count == 5 {
            let data = self.shift_register;
            match (addr >> 13) & 0x03 {
                0 => self.control = data,
                1 => self.chr_bank_0 = data,
                2 => self.chr_bank_1 = data,
                _ => self.prg_bank = data,
            }
            self.shift_register = 0;
            self.shift_count = 0;
            self.apply_banks();
        }
    }

    fn save_state(&self, w: &mut StateWriter) {
        self.base.save_state(w);
        w.write_u8(self.shift_register);
        w.write_u8(self.shift_count);
        w.write_u8(self.control);
        w.write_u8(self.chr_bank_0);
        w.write_u8(self.chr_bank_1);
        w.write_u8(self.prg_bank);
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.base.load_state(r)?;
        self.shift_register = r.read_u8()?;
        self.shift_count = r.read_u8()?;
        self.control = r.read_u8()?;
        self.chr_bank_0 = r.read_u8()?;
        self.chr_bank_1 = r.read_u8()?;
        self.prg_bank = r.read_u8()?;
        Ok(())
    }
}

/// UxROM (mapper 2): 16 KB PRG switching, last bank fixed.
///
/// Discrete-logic board with bus conflicts: the written value is ANDed
/// with the ROM byte at the written address.
pub struct UxRom {
    base: BoardBase,
}

impl UxRom {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        let mut board = Self {
            base: BoardBase::new(cart),
        };
        board.reset_banks();
        board
    }

    fn reset_banks(&mut self) {
        self.base.switch_prg_16k(0, 0);
        let last = self.base.prg_16k_count() - 1;
        self.base.switch_prg_16k(1, last);
    }
}

impl Board for UxRom {
    fn base(&self) -> &BoardBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BoardBase {
        &mut self.base
    }

    fn hard_reset(&mut self) {
        self.base.hard_reset();
        self.reset_banks();
    }

    fn write_prg(&mut self, addr: u16, value: u8, _interrupts: &mut Interrupts) {
        let rom_byte = self.base.prg_read(addr);
        self.base.switch_prg_16k(0, usize::from(value & rom_byte));
    }
}

/// CNROM (mapper 3): 8 KB CHR switching, bus conflicts.
pub struct CnRom {
    base: BoardBase,
}

impl CnRom {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        Self {
            base: BoardBase::new(cart),
        }
    }
}

impl Board for CnRom {
    fn base(&self) -> &BoardBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BoardBase {
        &mut self.base
    }

    fn hard_reset(&mut self) {
        self.base.hard_reset();
    }

    fn write_prg(&mut self, addr: u16, value: u8, _interrupts: &mut Interrupts) {
        let rom_byte = self.base.prg_read(addr);
        self.base.switch_chr_8k(usize::from(value & rom_byte));
    }
}

/// MMC3 (mapper 4, TxROM): 8 KB PRG windows, 1 KB CHR windows, dynamic
/// mirroring, PRG RAM protection, and a scanline IRQ counter.
///
/// The IRQ counter is clocked by the per-scanline hook while the PPU is
/// rendering; the pending flag is mirrored onto the machine's IRQ source
/// bits each CPU cycle.
pub struct Mmc3 {
    base: BoardBase,
    bank_select: u8,
    registers: [u8; 8],
    four_screen: bool,
    prg_ram_enable: bool,
    prg_ram_write_protect: bool,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
}

impl Mmc3 {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        let four_screen = cart.header.mirroring == Mirroring::FourScreen;
        let mut board = Self {
            base: BoardBase::new(cart),
            bank_select: 0,
            registers: [0; 8],
            four_screen,
            prg_ram_enable: true,
            prg_ram_write_protect: false,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
        };
        board.apply_banks();
        board
    }

    fn apply_banks(&mut self) {
        let last = self.base.prg_8k_count() - 1;
        let second_last = last.saturating_sub(1);
        let r6 = usize::from(self.registers[6] & 0x3F);
        let r7 = usize::from(self.registers[7] & 0x3F);

        if self.bank_select & 0x40 == 0 {
            self.base.switch_prg_8k(0, r6);
            self.base.switch_prg_8k(1, r7);
            self.base.switch_prg_8k(2, second_last);
        } else {
            self.base.switch_prg_8k(0, second_last);
            self.base.switch_prg_8k(1, r7);
            self.base.switch_prg_8k(2, r6);
        }
        self.base.switch_prg_8k(3, last);

        let r = &self.registers;
        if self.bank_select & 0x80 == 0 {
            // 2K,2K,1K,1K,1K,1K
            self.base.switch_chr_1k(0, usize::from(r[0] & 0xFE));
            self.base.switch_chr_1k(1, usize::from(r[0] | 1));
            self.base.switch_chr_1k(2, usize::from(r[1] & 0xFE));
            self.base.switch_chr_1k(3, usize::from(r[1] | 1));
            self.base.switch_chr_1k(4, usize::from(r[2]));
            self.base.switch_chr_1k(5, usize::from(r[3]));
            self.base.switch_chr_1k(6, usize::from(r[4]));
            self.base.switch_chr_1k(7, usize::from(r[5]));
        } else {
            // Inverted: 1K,1K,1K,1K,2K,2K
            self.base.switch_chr_1k(0, usize::from(r[2]));
            self.base.switch_chr_1k(1, usize::from(r[3]));
            self.base.switch_chr_1k(2, usize::from(r[4]));
            self.base.switch_chr_1k(3, usize::from(r[5]));
            self.base.switch_chr_1k(4, usize::from(r[0] & 0xFE));
            self.base.switch_chr_1k(5, usize::from(r[0] | 1));
            self.base.switch_chr_1k(6, usize::from(r[1] & 0xFE));
            self.base.switch_chr_1k(7, usize::from(r[1] | 1));
        }
    }

    fn clock_irq_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }
}

impl Board for Mmc3 {
    fn base(&self) -> &BoardBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BoardBase {
        &mut self.base
    }

    fn hard_reset(&mut self) {
        self.base.hard_reset();
        self.bank_select = 0;
        self.registers = [0; 8];
        self.prg_ram_enable = true;
        self.prg_ram_write_protect = false;
        self.irq_latch = 0;
        self.irq_counter = 0;
        self.irq_reload = false;
        self.irq_enabled = false;
        self.irq_pending = false;
        self.apply_banks();
    }

    fn read_sram(&mut self, addr: u16) -> u8 {
        if self.prg_ram_enable {
            self.base.sram_read(addr)
        } else {
            0
        }
    }

    fn write_sram(&mut self, addr: u16, value: u8) {
        if self.prg_ram_enable && !self.prg_ram_write_protect {
            self.base.sram_write(addr, value);
        }
    }

    fn write_prg(&mut self, addr: u16, value: u8, interrupts: &mut Interrupts) {
        match addr & 0xE001 {
            0x8000 => {
                self.bank_select = value;
                self.apply_banks();
            }
            0x8001 => {
                self.registers[usize::from(self.bank_select & 0x07)] = value;
                self.apply_banks();
            }
            0xA000 => {
                // Four-screen boards hardwire their VRAM arrangement
                if !self.four_screen {
                    self.base.set_mirroring(if value & 1 == 0 {
                        Mirroring::Vertical
                    } else {
                        Mirroring::Horizontal
                    });
                }
            }
            0xA001 => {
                self.prg_ram_write_protect = value & 0x40 != 0;
                self.prg_ram_enable = value & 0x80 != 0;
            }
            0xC000 => self.irq_latch = value,
            0xC001 => self.irq_reload = true,
            0xE000 => {
                self.irq_enabled = false;
                self.irq_pending = false;
                interrupts.clear_irq(IRQ_BOARD);
            }
            0xE001 => self.irq_enabled = true,
            _ => {}
        }
    }

    fn on_cpu_clock(&mut self, interrupts: &mut Interrupts) {
        if self.irq_pending {
            interrupts.assert_irq(IRQ_BOARD);
        }
    }

    fn on_scanline_tick(&mut self, _interrupts: &mut Interrupts, rendering: bool) {
        if rendering {
            self.clock_irq_counter();
        }
    }

    fn save_state(&self, w: &mut StateWriter) {
        self.base.save_state(w);
        w.write_u8(self.bank_select);
        w.write_bytes(&self.registers);
        w.write_bool(self.prg_ram_enable);
        w.write_bool(self.prg_ram_write_protect);
        w.write_u8(self.irq_latch);
        w.write_u8(self.irq_counter);
        w.write_bool(self.irq_reload);
        w.write_bool(self.irq_enabled);
        w.write_bool(self.irq_pending);
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.base.load_state(r)?;
        self.bank_select = r.read_u8()?;
        r.read_exact(&mut self.registers)?;
        self.prg_ram_enable = r.read_bool()?;
        self.prg_ram_write_protect = r.read_bool()?;
        self.irq_latch = r.read_u8()?;
        self.irq_counter = r.read_u8()?;
        self.irq_reload = r.read_bool()?;
        self.irq_enabled = r.read_bool()?;
        self.irq_pending = r.read_bool()?;
        Ok(())
    }
}

/// AxROM (mapper 7): 32 KB PRG switching with single-screen mirroring
/// selected by bit 4. Bus conflicts apply.
pub struct AxRom {
    base: BoardBase,
}

impl AxRom {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        let mut board = Self {
            base: BoardBase::new(cart),
        };
        board.base.set_mirroring(Mirroring::SingleScreenLower);
        board
    }
}

impl Board for AxRom {
    fn base(&self) -> &BoardBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BoardBase {
        &mut self.base
    }

    fn hard_reset(&mut self) {
        self.base.hard_reset();
        self.base.set_mirroring(Mirroring::SingleScreenLower);
    }

    fn write_prg(&mut self, addr: u16, value: u8, _interrupts: &mut Interrupts) {
        let effective = value & self.base.prg_read(addr);
        self.base.switch_prg_32k(usize::from(effective & 0x07));
        self.base.set_mirroring(if effective & 0x10 != 0 {
            Mirroring::SingleScreenUpper
        } else {
            Mirroring::SingleScreenLower
        });
    }
}

/// GxROM (mapper 66): 32 KB PRG (bits 4-5) and 8 KB CHR (bits 0-1)
/// switching from one register.
pub struct GxRom {
    base: BoardBase,
}

impl GxRom {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        Self {
            base: BoardBase::new(cart),
        }
    }
}

impl Board for GxRom {
    fn base(&self) -> &BoardBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BoardBase {
        &mut self.base
    }

    fn hard_reset(&mut self) {
        self.base.hard_reset();
    }

    fn write_prg(&mut self, _addr: u16, value: u8, _interrupts: &mut Interrupts) {
        self.base.switch_prg_32k(usize::from((value >> 4) & 0x03));
        self.base.switch_chr_8k(usize::from(value & 0x03));
    }
}

/// Irem 74161 (mapper 77): one write switches both the 32 KB PRG bank
/// (low nibble) and the 2 KB CHR ROM window at PPU $0000 (high nibble).
/// The remaining 6 KB of pattern space is CHR RAM, and the board carries
/// enough VRAM for four-screen nametables.
pub struct Irem74161 {
    base: BoardBase,
    chr_rom: Vec<u8>,
    chr_ram: [u8; 0x2000],
    chr_bank: usize,
}

impl Irem74161 {
    #[must_use]
    pub fn new(cart: &Cartridge) -> Self {
        Self {
            base: BoardBase::new(cart),
            chr_rom: cart.chr_rom.clone(),
            chr_ram: [0; 0x2000],
            chr_bank: 0,
        }
    }

    fn chr_2k_rom_count(&self) -> usize {
        (self.chr_rom.len() / 0x0800).max(1)
    }
}

impl Board for Irem74161 {
    fn base(&self) -> &BoardBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BoardBase {
        &mut self.base
    }

    fn hard_reset(&mut self) {
        self.base.hard_reset();
        self.chr_ram = [0; 0x2000];
        self.chr_bank = 0;
    }

    fn write_prg(&mut self, _addr: u16, value: u8, _interrupts: &mut Interrupts) {
        self.chr_bank = usize::from((value >> 4) & 0x0F) % self.chr_2k_rom_count();
        self.base.switch_prg_32k(usize::from(value & 0x0F));
    }

    fn read_chr(&mut self, addr: u16) -> u8 {
        let addr = addr & 0x1FFF;
        if addr < 0x0800 {
            if self.chr_rom.is_empty() {
                self.chr_ram[usize::from(addr)]
            } else {
                self.chr_rom[self.chr_bank * 0x0800 + usize::from(addr)]
            }
        } else {
            self.chr_ram[usize::from(addr)]
        }
    }

    fn write_chr(&mut self, addr: u16, value: u8) {
        let addr = addr & 0x1FFF;
        if addr >= 0x0800 || self.chr_rom.is_empty() {
            self.chr_ram[usize::from(addr)] = value;
        }
    }

    fn save_state(&self, w: &mut StateWriter) {
        self.base.save_state(w);
        w.write_bytes(&self.chr_ram);
        w.write_u32(self.chr_bank as u32);
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.base.load_state(r)?;
        r.read_exact(&mut self.chr_ram)?;
        self.chr_bank = r.read_u32()? as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::tests::make_ines;
    use crate::cartridge::{load_board, Cartridge};

    fn board_for(mapper: u8, prg_banks: u8, chr_banks: u8) -> Box<dyn Board> {
        let data = make_ines(prg_banks, chr_banks, (mapper & 0x0F) << 4, mapper & 0xF0);
        load_board(&data).expect("board loads")
    }

    #[test]
    fn uxrom_fixes_last_bank() {
        let mut board = board_for(2, 4, 0);
        let mut ints = Interrupts::new();
        let fixed = board.read_prg(0xC000);
        board.write_prg(0x8000, 0, &mut ints);
        assert_eq!(board.read_prg(0xC000), fixed, "$C000 bank must stay fixed");
    }

    #[test]
    fn cnrom_switches_chr() {
        let mut board = board_for(3, 1, 2);
        let mut ints = Interrupts::new();
        let bank0 = board.read_chr(0x0000);
        // The written value is ANDed with ROM (bus conflict); PRG test
        // pattern makes $8001 hold 0x01.
        board.write_prg(0x8001, 0x01, &mut ints);
        let bank1 = board.read_chr(0x0000);
        assert_ne!(bank0, bank1);
    }

    #[test]
    fn mmc1_serial_loads_after_five_writes() {
        let mut board = board_for(1, 4, 1);
        let mut ints = Interrupts::new();
        let before = board.read_chr(0x0000);
        // Load 0b00001 into the CHR-0 register ($A000-$BFFF), 4 KB mode on
        // first: set control = 0x10 (4K CHR mode) via $8000-$9FFF
        for bit in [0, 0, 1, 0, 1] {
            board.write_prg(0x8000, bit, &mut ints);
        }
        // control = 0b10100: CHR mode 1, PRG mode 1
        for bit in [1, 0, 0, 0, 0] {
            board.write_prg(0xA000, bit, &mut ints);
        }
        assert_ne!(board.read_chr(0x0000), before);
    }

    #[test]
    fn mmc1_reset_bit_forces_fix_last() {
        let data = make_ines(4, 1, 0x10, 0);
        let cart = Cartridge::parse(&data).expect("parse");
        let mut board = Mmc1::new(&cart);
        let mut ints = Interrupts::new();
        board.write_prg(0x8000, 0x80, &mut ints);
        assert_eq!(board.control & 0x0C, 0x0C);
        assert_eq!(board.shift_count, 0);
    }

    #[test]
    fn mmc3_irq_counts_scanlines() {
        let mut board = board_for(4, 4, 1);
        let mut ints = Interrupts::new();
        board.write_prg(0xC000, 3, &mut ints); // latch = 3
        board.write_prg(0xC001, 0, &mut ints); // reload
        board.write_prg(0xE001, 0, &mut ints); // enable

        // Reload happens on the first clock, then 3 more to reach zero
        for _ in 0..3 {
            board.on_scanline_tick(&mut ints, true);
            board.on_cpu_clock(&mut ints);
            assert_eq!(ints.irq_flags & IRQ_BOARD, 0);
        }
        board.on_scanline_tick(&mut ints, true);
        board.on_cpu_clock(&mut ints);
        assert_ne!(ints.irq_flags & IRQ_BOARD, 0);

        // $E000 acknowledges and disables
        board.write_prg(0xE000, 0, &mut ints);
        assert_eq!(ints.irq_flags & IRQ_BOARD, 0);
    }

    #[test]
    fn mmc3_ignores_scanlines_while_blanked() {
        let mut board = board_for(4, 4, 1);
        let mut ints = Interrupts::new();
        board.write_prg(0xC000, 0, &mut ints);
        board.write_prg(0xC001, 0, &mut ints);
        board.write_prg(0xE001, 0, &mut ints);
        for _ in 0..10 {
            board.on_scanline_tick(&mut ints, false);
            board.on_cpu_clock(&mut ints);
        }
        assert_eq!(ints.irq_flags & IRQ_BOARD, 0);
    }

    #[test]
    fn axrom_selects_single_screen() {
        let data = make_ines(8, 0, 0x70, 0);
        let cart = Cartridge::parse(&data).expect("parse");
        let mut board = AxRom::new(&cart);
        let mut ints = Interrupts::new();
        assert_eq!(board.base().mirroring(), Mirroring::SingleScreenLower);
        // ROM bytes are the address pattern; $8010 holds 0x10
        board.write_prg(0x8010, 0x10, &mut ints);
        assert_eq!(board.base().mirroring(), Mirroring::SingleScreenUpper);
    }

    #[test]
    fn irem_write_switches_prg_and_chr_together() {
        let mut board = board_for(77, 8, 2);
        let mut ints = Interrupts::new();
        let prg_before = board.read_prg(0x8000);
        let chr_before = board.read_chr(0x0000);
        board.write_prg(0x8000, 0x11, &mut ints); // PRG bank 1, CHR bank 1
        assert_ne!(board.read_prg(0x8000), prg_before);
        assert_ne!(board.read_chr(0x0000), chr_before);
    }

    #[test]
    fn irem_upper_chr_is_ram() {
        let mut board = board_for(77, 8, 2);
        board.write_chr(0x0900, 0x5A);
        assert_eq!(board.read_chr(0x0900), 0x5A);
        // The ROM window below $0800 ignores writes
        let rom_byte = board.read_chr(0x0100);
        board.write_chr(0x0100, !rom_byte);
        assert_eq!(board.read_chr(0x0100), rom_byte);
    }
}
