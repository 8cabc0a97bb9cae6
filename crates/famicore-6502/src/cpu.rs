//! 6502 fetch/decode/execute core.
//!
//! One call to [`Mos6502::clock`] runs one whole instruction and then
//! services pending interrupts. Timing is expressed entirely as bus
//! traffic: each addressing mode issues the documented sequence of reads
//! (including dummy reads and the conditional page-cross re-read), each
//! operation issues its writes (read-modify-write instructions write the
//! unmodified value first), and interrupt entry performs the two dummy
//! reads, three pushes and two vector fetches of the real chip.
//!
//! Addressing-mode suffixes follow the access class of the instruction:
//! `_r` for read instructions (page crossing costs one extra read), `_w`
//! for write instructions (the fix-up read always happens), `_rw` for
//! read-modify-write instructions (dummy read at the unfixed address,
//! then the real read).

use famicore_core::{Bus, StateReader, StateTruncated, StateWriter};

use crate::flags::{C, D, I, N, V, Z};
use crate::registers::Registers;

/// MOS 6502 CPU core.
pub struct Mos6502 {
    /// Register file.
    pub regs: Registers,
    /// Memory operand latch, filled by the addressing-mode step.
    m: u8,
    /// Opcode currently executing.
    opcode: u8,
}

impl Mos6502 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            m: 0,
            opcode: 0,
        }
    }

    /// Power-on reset. PC is loaded from the reset vector by the machine
    /// (the hardware fetch happens before the first instruction, outside
    /// normal bus clocking).
    pub fn hard_reset(&mut self) {
        self.regs = Registers::new();
        self.m = 0;
        self.opcode = 0;
    }

    /// Soft reset (console reset button): I is set, S drops by 3, PC is
    /// reloaded from the reset vector through normal (clocked) reads.
    pub fn soft_reset<B: Bus>(&mut self, bus: &mut B) {
        self.regs.p.set(I, true);
        bus.set_irq_disable(true);
        self.regs.s = self.regs.s.wrapping_sub(3);
        let lo = bus.read(0xFFFC);
        self.regs.set_pcl(lo);
        let hi = bus.read(0xFFFD);
        self.regs.set_pch(hi);
    }

    /// Execute one instruction, then service pending interrupts.
    pub fn clock<B: Bus>(&mut self, bus: &mut B) {
        self.opcode = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        match self.opcode {
            0x00 => self.brk(bus),
            0x01 => {
                self.indirect_x_r(bus);
                self.ora();
            }
            0x02 => self.implied(bus), // JAM
            0x03 => {
                self.indirect_x_w(bus);
                self.slo(bus);
            }
            0x04 => self.zero_page_r(bus), // DOP
            0x05 => {
                self.zero_page_r(bus);
                self.ora();
            }
            0x06 => {
                self.zero_page_rw(bus);
                self.asl_m(bus);
            }
            0x07 => {
                self.zero_page_w(bus);
                self.slo(bus);
            }
            0x08 => {
                self.implied(bus);
                self.php(bus);
            }
            0x09 => {
                self.immediate(bus);
                self.ora();
            }
            0x0A => {
                self.implied(bus);
                self.asl_a();
            }
            0x0B => {
                self.immediate(bus);
                self.anc();
            }
            0x0C => self.absolute_r(bus), // TOP
            0x0D => {
                self.absolute_r(bus);
                self.ora();
            }
            0x0E => {
                self.absolute_rw(bus);
                self.asl_m(bus);
            }
            0x0F => {
                self.absolute_w(bus);
                self.slo(bus);
            }
            0x10 => {
                let taken = !self.regs.p.get(N);
                self.branch(bus, taken);
            }
            0x11 => {
                self.indirect_y_r(bus);
                self.ora();
            }
            0x12 => {} // JAM
            0x13 => {
                self.indirect_y_w(bus);
                self.slo(bus);
            }
            0x14 => self.zero_page_x_r(bus), // DOP
            0x15 => {
                self.zero_page_x_r(bus);
                self.ora();
            }
            0x16 => {
                self.zero_page_x_rw(bus);
                self.asl_m(bus);
            }
            0x17 => {
                self.zero_page_x_w(bus);
                self.slo(bus);
            }
            0x18 => {
                self.implied(bus);
                self.regs.p.set(C, false);
            }
            0x19 => {
                self.absolute_y_r(bus);
                self.ora();
            }
            0x1A => self.implied(bus), // NOP
            0x1B => {
                self.absolute_y_w(bus);
                self.slo(bus);
            }
            0x1C => self.absolute_x_r(bus), // TOP
            0x1D => {
                self.absolute_x_r(bus);
                self.ora();
            }
            0x1E => {
                self.absolute_x_rw(bus);
                self.asl_m(bus);
            }
            0x1F => {
                self.absolute_x_w(bus);
                self.slo(bus);
            }
            0x20 => self.jsr(bus),
            0x21 => {
                self.indirect_x_r(bus);
                self.and();
            }
            0x22 => self.implied(bus), // JAM
            0x23 => {
                self.indirect_x_w(bus);
                self.rla(bus);
            }
            0x24 => {
                self.zero_page_r(bus);
                self.bit();
            }
            0x25 => {
                self.zero_page_r(bus);
                self.and();
            }
            0x26 => {
                self.zero_page_rw(bus);
                self.rol_m(bus);
            }
            0x27 => {
                self.zero_page_w(bus);
                self.rla(bus);
            }
            0x28 => {
                self.implied(bus);
                self.plp(bus);
            }
            0x29 => {
                self.immediate(bus);
                self.and();
            }
            0x2A => {
                self.implied(bus);
                self.rol_a();
            }
            0x2B => {
                self.immediate(bus);
                self.anc();
            }
            0x2C => {
                self.absolute_r(bus);
                self.bit();
            }
            0x2D => {
                self.absolute_r(bus);
                self.and();
            }
            0x2E => {
                self.absolute_rw(bus);
                self.rol_m(bus);
            }
            0x2F => {
                self.absolute_w(bus);
                self.rla(bus);
            }
            0x30 => {
                let taken = self.regs.p.get(N);
                self.branch(bus, taken);
            }
            0x31 => {
                self.indirect_y_r(bus);
                self.and();
            }
            0x32 => {} // JAM
            0x33 => {
                self.indirect_y_w(bus);
                self.rla(bus);
            }
            0x34 => self.zero_page_x_r(bus), // DOP
            0x35 => {
                self.zero_page_x_r(bus);
                self.and();
            }
            0x36 => {
                self.zero_page_x_rw(bus);
                self.rol_m(bus);
            }
            0x37 => {
                self.zero_page_x_w(bus);
                self.rla(bus);
            }
            0x38 => {
                self.implied(bus);
                self.regs.p.set(C, true);
            }
            0x39 => {
                self.absolute_y_r(bus);
                self.and();
            }
            0x3A => self.implied(bus), // NOP
            0x3B => {
                self.absolute_y_w(bus);
                self.rla(bus);
            }
            0x3C => self.absolute_x_r(bus), // TOP
            0x3D => {
                self.absolute_x_r(bus);
                self.and();
            }
            0x3E => {
                self.absolute_x_rw(bus);
                self.rol_m(bus);
            }
            0x3F => {
                self.absolute_x_w(bus);
                self.rla(bus);
            }
            0x40 => {
                self.implied(bus);
                self.rti(bus);
            }
            0x41 => {
                self.indirect_x_r(bus);
                self.eor();
            }
            0x42 => self.implied(bus), // JAM
            0x43 => {
                self.indirect_x_w(bus);
                self.sre(bus);
            }
            0x44 => self.zero_page_r(bus), // DOP
            0x45 => {
                self.zero_page_r(bus);
                self.eor();
            }
            0x46 => {
                self.zero_page_rw(bus);
                self.lsr_m(bus);
            }
            0x47 => {
                self.zero_page_w(bus);
                self.sre(bus);
            }
            0x48 => {
                self.implied(bus);
                self.pha(bus);
            }
            0x49 => {
                self.immediate(bus);
                self.eor();
            }
            0x4A => {
                self.implied(bus);
                self.lsr_a();
            }
            0x4B => {
                self.immediate(bus);
                self.alr();
            }
            0x4C => {
                // JMP absolute
                self.absolute_w(bus);
                self.regs.pc = self.regs.ea;
            }
            0x4D => {
                self.absolute_r(bus);
                self.eor();
            }
            0x4E => {
                self.absolute_rw(bus);
                self.lsr_m(bus);
            }
            0x4F => {
                self.absolute_w(bus);
                self.sre(bus);
            }
            0x50 => {
                let taken = !self.regs.p.get(V);
                self.branch(bus, taken);
            }
            0x51 => {
                self.indirect_y_r(bus);
                self.eor();
            }
            0x52 => {} // JAM
            0x53 => {
                self.indirect_y_w(bus);
                self.sre(bus);
            }
            0x54 => self.zero_page_x_r(bus), // DOP
            0x55 => {
                self.zero_page_x_r(bus);
                self.eor();
            }
            0x56 => {
                self.zero_page_x_rw(bus);
                self.lsr_m(bus);
            }
            0x57 => {
                self.zero_page_x_w(bus);
                self.sre(bus);
            }
            0x58 => {
                self.implied(bus);
                self.regs.p.set(I, false);
                bus.set_irq_disable(false);
            }
            0x59 => {
                self.absolute_y_r(bus);
                self.eor();
            }
            0x5A => self.implied(bus), // NOP
            0x5B => {
                self.absolute_y_w(bus);
                self.sre(bus);
            }
            0x5C => self.absolute_x_r(bus), // TOP
            0x5D => {
                self.absolute_x_r(bus);
                self.eor();
            }
            0x5E => {
                self.absolute_x_rw(bus);
                self.lsr_m(bus);
            }
            0x5F => {
                self.absolute_x_w(bus);
                self.sre(bus);
            }
            0x60 => {
                self.implied(bus);
                self.rts(bus);
            }
            0x61 => {
                self.indirect_x_r(bus);
                self.adc();
            }
            0x62 => self.implied(bus), // JAM
            0x63 => {
                self.indirect_x_w(bus);
                self.rra(bus);
            }
            0x64 => self.zero_page_r(bus), // DOP
            0x65 => {
                self.zero_page_r(bus);
                self.adc();
            }
            0x66 => {
                self.zero_page_rw(bus);
                self.ror_m(bus);
            }
            0x67 => {
                self.zero_page_w(bus);
                self.rra(bus);
            }
            0x68 => {
                self.implied(bus);
                self.pla(bus);
            }
            0x69 => {
                self.immediate(bus);
                self.adc();
            }
            0x6A => {
                self.implied(bus);
                self.ror_a();
            }
            0x6B => {
                self.immediate(bus);
                self.arr();
            }
            0x6C => self.jmp_indirect(bus),
            0x6D => {
                self.absolute_r(bus);
                self.adc();
            }
            0x6E => {
                self.absolute_rw(bus);
                self.ror_m(bus);
            }
            0x6F => {
                self.absolute_w(bus);
                self.rra(bus);
            }
            0x70 => {
                let taken = self.regs.p.get(V);
                self.branch(bus, taken);
            }
            0x71 => {
                self.indirect_y_r(bus);
                self.adc();
            }
            0x72 => {} // JAM
            0x73 => {
                self.indirect_y_w(bus);
                self.rra(bus);
            }
            0x74 => self.zero_page_x_r(bus), // DOP
            0x75 => {
                self.zero_page_x_r(bus);
                self.adc();
            }
            0x76 => {
                self.zero_page_x_rw(bus);
                self.ror_m(bus);
            }
            0x77 => {
                self.zero_page_x_w(bus);
                self.rra(bus);
            }
            0x78 => {
                self.implied(bus);
                self.regs.p.set(I, true);
                bus.set_irq_disable(true);
            }
            0x79 => {
                self.absolute_y_r(bus);
                self.adc();
            }
            0x7A => self.implied(bus), // NOP
            0x7B => {
                self.absolute_y_w(bus);
                self.rra(bus);
            }
            0x7C => self.absolute_x_r(bus), // TOP
            0x7D => {
                self.absolute_x_r(bus);
                self.adc();
            }
            0x7E => {
                self.absolute_x_rw(bus);
                self.ror_m(bus);
            }
            0x7F => {
                self.absolute_x_w(bus);
                self.rra(bus);
            }
            0x80 => self.immediate(bus), // DOP
            0x81 => {
                self.indirect_x_w(bus);
                self.sta(bus);
            }
            0x82 => self.immediate(bus), // DOP
            0x83 => {
                self.indirect_x_w(bus);
                self.sax(bus);
            }
            0x84 => {
                self.zero_page_w(bus);
                self.sty(bus);
            }
            0x85 => {
                self.zero_page_w(bus);
                self.sta(bus);
            }
            0x86 => {
                self.zero_page_w(bus);
                self.stx(bus);
            }
            0x87 => {
                self.zero_page_w(bus);
                self.sax(bus);
            }
            0x88 => {
                self.implied(bus);
                self.dey();
            }
            0x89 => self.immediate(bus), // DOP
            0x8A => {
                self.implied(bus);
                self.txa();
            }
            0x8B => {
                self.immediate(bus);
                self.xaa();
            }
            0x8C => {
                self.absolute_w(bus);
                self.sty(bus);
            }
            0x8D => {
                self.absolute_w(bus);
                self.sta(bus);
            }
            0x8E => {
                self.absolute_w(bus);
                self.stx(bus);
            }
            0x8F => {
                self.absolute_w(bus);
                self.sax(bus);
            }
            0x90 => {
                let taken = !self.regs.p.get(C);
                self.branch(bus, taken);
            }
            0x91 => {
                self.indirect_y_w(bus);
                self.sta(bus);
            }
            0x92 => {} // JAM
            0x93 => {
                self.indirect_y_w(bus);
                self.ahx(bus);
            }
            0x94 => {
                self.zero_page_x_w(bus);
                self.sty(bus);
            }
            0x95 => {
                self.zero_page_x_w(bus);
                self.sta(bus);
            }
            0x96 => {
                self.zero_page_y_w(bus);
                self.stx(bus);
            }
            0x97 => {
                self.zero_page_y_w(bus);
                self.sax(bus);
            }
            0x98 => {
                self.implied(bus);
                self.tya();
            }
            0x99 => {
                self.absolute_y_w(bus);
                self.sta(bus);
            }
            0x9A => {
                self.implied(bus);
                self.regs.s = self.regs.x;
            }
            0x9B => {
                self.absolute_y_w(bus);
                self.xas(bus);
            }
            0x9C => {
                self.absolute_w(bus);
                self.shy(bus);
            }
            0x9D => {
                self.absolute_x_w(bus);
                self.sta(bus);
            }
            0x9E => {
                self.absolute_w(bus);
                self.shx(bus);
            }
            0x9F => {
                self.absolute_y_w(bus);
                self.ahx(bus);
            }
            0xA0 => {
                self.immediate(bus);
                self.ldy();
            }
            0xA1 => {
                self.indirect_x_r(bus);
                self.lda();
            }
            0xA2 => {
                self.immediate(bus);
                self.ldx();
            }
            0xA3 => {
                self.indirect_x_r(bus);
                self.lax();
            }
            0xA4 => {
                self.zero_page_r(bus);
                self.ldy();
            }
            0xA5 => {
                self.zero_page_r(bus);
                self.lda();
            }
            0xA6 => {
                self.zero_page_r(bus);
                self.ldx();
            }
            0xA7 => {
                self.zero_page_r(bus);
                self.lax();
            }
            0xA8 => {
                self.implied(bus);
                self.tay();
            }
            0xA9 => {
                self.immediate(bus);
                self.lda();
            }
            0xAA => {
                self.implied(bus);
                self.tax();
            }
            0xAB => {
                self.immediate(bus);
                self.lax();
            }
            0xAC => {
                self.absolute_r(bus);
                self.ldy();
            }
            0xAD => {
                self.absolute_r(bus);
                self.lda();
            }
            0xAE => {
                self.absolute_r(bus);
                self.ldx();
            }
            0xAF => {
                self.absolute_r(bus);
                self.lax();
            }
            0xB0 => {
                let taken = self.regs.p.get(C);
                self.branch(bus, taken);
            }
            0xB1 => {
                self.indirect_y_r(bus);
                self.lda();
            }
            0xB2 => {} // JAM
            0xB3 => {
                self.indirect_y_r(bus);
                self.lax();
            }
            0xB4 => {
                self.zero_page_x_r(bus);
                self.ldy();
            }
            0xB5 => {
                self.zero_page_x_r(bus);
                self.lda();
            }
            0xB6 => {
                self.zero_page_y_r(bus);
                self.ldx();
            }
            0xB7 => {
                self.zero_page_y_r(bus);
                self.lax();
            }
            0xB8 => {
                self.implied(bus);
                self.regs.p.set(V, false);
            }
            0xB9 => {
                self.absolute_y_r(bus);
                self.lda();
            }
            0xBA => {
                self.implied(bus);
                self.tsx();
            }
            0xBB => {
                self.absolute_y_r(bus);
                self.lar();
            }
            0xBC => {
                self.absolute_x_r(bus);
                self.ldy();
            }
            0xBD => {
                self.absolute_x_r(bus);
                self.lda();
            }
            0xBE => {
                self.absolute_y_r(bus);
                self.ldx();
            }
            0xBF => {
                self.absolute_y_r(bus);
                self.lax();
            }
            0xC0 => {
                self.immediate(bus);
                self.cpy();
            }
            0xC1 => {
                self.indirect_x_r(bus);
                self.cmp();
            }
            0xC2 => self.immediate(bus), // DOP
            0xC3 => {
                self.indirect_x_r(bus);
                self.dcp(bus);
            }
            0xC4 => {
                self.zero_page_r(bus);
                self.cpy();
            }
            0xC5 => {
                self.zero_page_r(bus);
                self.cmp();
            }
            0xC6 => {
                self.zero_page_rw(bus);
                self.dec(bus);
            }
            0xC7 => {
                self.zero_page_r(bus);
                self.dcp(bus);
            }
            0xC8 => {
                self.implied(bus);
                self.iny();
            }
            0xC9 => {
                self.immediate(bus);
                self.cmp();
            }
            0xCA => {
                self.implied(bus);
                self.dex();
            }
            0xCB => {
                self.immediate(bus);
                self.axs();
            }
            0xCC => {
                self.absolute_r(bus);
                self.cpy();
            }
            0xCD => {
                self.absolute_r(bus);
                self.cmp();
            }
            0xCE => {
                self.absolute_rw(bus);
                self.dec(bus);
            }
            0xCF => {
                self.absolute_r(bus);
                self.dcp(bus);
            }
            0xD0 => {
                let taken = !self.regs.p.get(Z);
                self.branch(bus, taken);
            }
            0xD1 => {
                self.indirect_y_r(bus);
                self.cmp();
            }
            0xD2 => {} // JAM
            0xD3 => {
                self.indirect_y_rw(bus);
                self.dcp(bus);
            }
            0xD4 => self.zero_page_x_r(bus), // DOP
            0xD5 => {
                self.zero_page_x_r(bus);
                self.cmp();
            }
            0xD6 => {
                self.zero_page_x_rw(bus);
                self.dec(bus);
            }
            0xD7 => {
                self.zero_page_x_rw(bus);
                self.dcp(bus);
            }
            0xD8 => {
                self.implied(bus);
                self.regs.p.set(D, false);
            }
            0xD9 => {
                self.absolute_y_r(bus);
                self.cmp();
            }
            0xDA => self.implied(bus), // NOP
            0xDB => {
                self.absolute_y_rw(bus);
                self.dcp(bus);
            }
            0xDC => self.absolute_x_r(bus), // TOP
            0xDD => {
                self.absolute_x_r(bus);
                self.cmp();
            }
            0xDE => {
                self.absolute_x_rw(bus);
                self.dec(bus);
            }
            0xDF => {
                self.absolute_x_rw(bus);
                self.dcp(bus);
            }
            0xE0 => {
                self.immediate(bus);
                self.cpx();
            }
            0xE1 => {
                self.indirect_x_r(bus);
                self.sbc();
            }
            0xE2 => self.immediate(bus), // DOP
            0xE3 => {
                self.indirect_x_w(bus);
                self.isc(bus);
            }
            0xE4 => {
                self.zero_page_r(bus);
                self.cpx();
            }
            0xE5 => {
                self.zero_page_r(bus);
                self.sbc();
            }
            0xE6 => {
                self.zero_page_rw(bus);
                self.inc(bus);
            }
            0xE7 => {
                self.zero_page_w(bus);
                self.isc(bus);
            }
            0xE8 => {
                self.implied(bus);
                self.inx();
            }
            0xE9 => {
                self.immediate(bus);
                self.sbc();
            }
            0xEA => self.implied(bus), // NOP
            0xEB => {
                // Undocumented alias of SBC immediate
                self.immediate(bus);
                self.sbc();
            }
            0xEC => {
                self.absolute_r(bus);
                self.cpx();
            }
            0xED => {
                self.absolute_r(bus);
                self.sbc();
            }
            0xEE => {
                self.absolute_rw(bus);
                self.inc(bus);
            }
            0xEF => {
                self.absolute_w(bus);
                self.isc(bus);
            }
            0xF0 => {
                let taken = self.regs.p.get(Z);
                self.branch(bus, taken);
            }
            0xF1 => {
                self.indirect_y_r(bus);
                self.sbc();
            }
            0xF2 => {} // JAM
            0xF3 => {
                self.indirect_y_w(bus);
                self.isc(bus);
            }
            0xF4 => self.zero_page_x_r(bus), // DOP
            0xF5 => {
                self.zero_page_x_r(bus);
                self.sbc();
            }
            0xF6 => {
                self.zero_page_x_rw(bus);
                self.inc(bus);
            }
            0xF7 => {
                self.zero_page_x_w(bus);
                self.isc(bus);
            }
            0xF8 => {
                self.implied(bus);
                self.regs.p.set(D, true);
            }
            0xF9 => {
                self.absolute_y_r(bus);
                self.sbc();
            }
            0xFA => self.implied(bus), // NOP
            0xFB => {
                self.absolute_y_w(bus);
                self.isc(bus);
            }
            0xFC => self.absolute_x_r(bus), // TOP
            0xFD => {
                self.absolute_x_r(bus);
                self.sbc();
            }
            0xFE => {
                self.absolute_x_rw(bus);
                self.inc(bus);
            }
            0xFF => {
                self.absolute_x_w(bus);
                self.isc(bus);
            }
        }

        // NMI is serviced unconditionally; IRQ only when detected (the
        // bus already folded the I flag into the level detector).
        if bus.nmi_detected() {
            self.interrupt(bus);
            bus.clear_nmi_detected();
        } else if bus.irq_detected() {
            self.interrupt(bus);
        }
    }

    // === Addressing modes ===

    fn indirect_x_r<B: Bus>(&mut self, bus: &mut B) {
        let mut ptr = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        bus.read(u16::from(ptr));
        ptr = ptr.wrapping_add(self.regs.x);
        let lo = bus.read(u16::from(ptr));
        self.regs.set_eal(lo);
        ptr = ptr.wrapping_add(1);
        let hi = bus.read(u16::from(ptr));
        self.regs.set_eah(hi);
        self.m = bus.read(self.regs.ea);
    }

    fn indirect_x_w<B: Bus>(&mut self, bus: &mut B) {
        let mut ptr = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        bus.read(u16::from(ptr));
        ptr = ptr.wrapping_add(self.regs.x);
        let lo = bus.read(u16::from(ptr));
        self.regs.set_eal(lo);
        ptr = ptr.wrapping_add(1);
        let hi = bus.read(u16::from(ptr));
        self.regs.set_eah(hi);
    }

    fn indirect_y_r<B: Bus>(&mut self, bus: &mut B) {
        let mut ptr = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let lo = bus.read(u16::from(ptr));
        self.regs.set_eal(lo);
        ptr = ptr.wrapping_add(1);
        let hi = bus.read(u16::from(ptr));
        self.regs.set_eah(hi);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
        self.m = bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.y {
            // Page crossed: fix the high byte and read again
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
            self.m = bus.read(self.regs.ea);
        }
    }

    fn indirect_y_w<B: Bus>(&mut self, bus: &mut B) {
        let mut ptr = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let lo = bus.read(u16::from(ptr));
        self.regs.set_eal(lo);
        ptr = ptr.wrapping_add(1);
        let hi = bus.read(u16::from(ptr));
        self.regs.set_eah(hi);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
        self.m = bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.y {
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
        }
    }

    fn indirect_y_rw<B: Bus>(&mut self, bus: &mut B) {
        let mut ptr = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let lo = bus.read(u16::from(ptr));
        self.regs.set_eal(lo);
        ptr = ptr.wrapping_add(1);
        let hi = bus.read(u16::from(ptr));
        self.regs.set_eah(hi);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
        bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.y {
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
        }
        self.m = bus.read(self.regs.ea);
    }

    fn zero_page_r<B: Bus>(&mut self, bus: &mut B) {
        self.regs.ea = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.m = bus.read(self.regs.ea);
    }

    fn zero_page_w<B: Bus>(&mut self, bus: &mut B) {
        self.regs.ea = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
    }

    fn zero_page_rw<B: Bus>(&mut self, bus: &mut B) {
        self.regs.ea = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.m = bus.read(self.regs.ea);
    }

    fn zero_page_x_r<B: Bus>(&mut self, bus: &mut B) {
        self.regs.ea = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        bus.read(self.regs.ea);
        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.x));
        self.m = bus.read(self.regs.ea);
    }

    fn zero_page_x_w<B: Bus>(&mut self, bus: &mut B) {
        self.regs.ea = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        bus.read(self.regs.ea);
        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.x));
    }

    fn zero_page_x_rw<B: Bus>(&mut self, bus: &mut B) {
        self.regs.ea = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        bus.read(self.regs.ea);
        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.x));
        self.m = bus.read(self.regs.ea);
    }

    fn zero_page_y_r<B: Bus>(&mut self, bus: &mut B) {
        self.regs.ea = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        bus.read(self.regs.ea);
        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
        self.m = bus.read(self.regs.ea);
    }

    fn zero_page_y_w<B: Bus>(&mut self, bus: &mut B) {
        self.regs.ea = u16::from(bus.read(self.regs.pc));
        self.regs.pc = self.regs.pc.wrapping_add(1);
        bus.read(self.regs.ea);
        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
    }

    fn immediate<B: Bus>(&mut self, bus: &mut B) {
        self.m = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
    }

    fn implied<B: Bus>(&mut self, bus: &mut B) {
        // Dummy read of the next opcode byte, PC not advanced
        bus.read(self.regs.pc);
    }

    fn absolute_r<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.m = bus.read(self.regs.ea);
    }

    fn absolute_w<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);
    }

    fn absolute_rw<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.m = bus.read(self.regs.ea);
    }

    fn absolute_x_r<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.x));
        self.m = bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.x {
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
            self.m = bus.read(self.regs.ea);
        }
    }

    fn absolute_x_w<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.x));
        self.m = bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.x {
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
        }
    }

    fn absolute_x_rw<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.x));
        bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.x {
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
        }
        self.m = bus.read(self.regs.ea);
    }

    fn absolute_y_r<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
        self.m = bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.y {
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
            self.m = bus.read(self.regs.ea);
        }
    }

    fn absolute_y_w<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
        self.m = bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.y {
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
        }
    }

    fn absolute_y_rw<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
        bus.read(self.regs.ea);
        if self.regs.eal() < self.regs.y {
            self.regs.set_eah(self.regs.eah().wrapping_add(1));
        }
        self.m = bus.read(self.regs.ea);
    }

    // === Stack ===

    fn push<B: Bus>(&mut self, bus: &mut B, value: u8) {
        bus.write(self.regs.stack_addr(), value);
        self.regs.s = self.regs.s.wrapping_sub(1);
    }

    fn pull<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.regs.s = self.regs.s.wrapping_add(1);
        bus.read(self.regs.stack_addr())
    }

    // === Control flow ===

    /// Service an interrupt (NMI or IRQ). The vector was resolved during
    /// φ2 of the previous cycle; polling stays suspended through the two
    /// vector fetches so the sequence cannot be re-entered.
    fn interrupt<B: Bus>(&mut self, bus: &mut B) {
        bus.read(self.regs.pc);
        bus.read(self.regs.pc);

        self.push(bus, self.regs.pch());
        self.push(bus, self.regs.pcl());
        self.push(bus, self.regs.p.bits(false));

        let vector = bus.interrupt_vector();
        bus.set_interrupt_suspend(true);
        let lo = bus.read(vector);
        self.regs.set_pcl(lo);
        self.regs.p.set(I, true);
        bus.set_irq_disable(true);
        let hi = bus.read(vector.wrapping_add(1));
        self.regs.set_pch(hi);
        bus.set_interrupt_suspend(false);
    }

    fn brk<B: Bus>(&mut self, bus: &mut B) {
        bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        self.push(bus, self.regs.pch());
        self.push(bus, self.regs.pcl());
        self.push(bus, self.regs.p.bits(true));

        // A pending NMI hijacks BRK here: the vector was resolved during
        // the pushes.
        let vector = bus.interrupt_vector();
        bus.set_interrupt_suspend(true);
        let lo = bus.read(vector);
        self.regs.set_pcl(lo);
        self.regs.p.set(I, true);
        bus.set_irq_disable(true);
        let hi = bus.read(vector.wrapping_add(1));
        self.regs.set_pch(hi);
        bus.set_interrupt_suspend(false);
    }

    fn branch<B: Bus>(&mut self, bus: &mut B, condition: bool) {
        let offset = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        if condition {
            bus.set_interrupt_suspend(true);
            bus.read(self.regs.pc);
            self.regs.set_pcl(self.regs.pcl().wrapping_add(offset));
            bus.set_interrupt_suspend(false);
            if offset >= 0x80 {
                if self.regs.pcl() >= offset {
                    bus.read(self.regs.pc);
                    self.regs.set_pch(self.regs.pch().wrapping_sub(1));
                }
            } else if self.regs.pcl() < offset {
                bus.read(self.regs.pc);
                self.regs.set_pch(self.regs.pch().wrapping_add(1));
            }
        }
    }

    fn jmp_indirect<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);

        let target_lo = bus.read(self.regs.ea);
        // Only the low byte increments — the "JMP ($nnFF)" page-wrap bug
        self.regs.set_eal(self.regs.eal().wrapping_add(1));
        let target_hi = bus.read(self.regs.ea);
        self.regs.set_pch(target_hi);
        self.regs.set_pcl(target_lo);
    }

    fn jsr<B: Bus>(&mut self, bus: &mut B) {
        let lo = bus.read(self.regs.pc);
        self.regs.set_eal(lo);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);

        self.push(bus, self.regs.pch());
        self.push(bus, self.regs.pcl());

        let hi = bus.read(self.regs.pc);
        self.regs.set_eah(hi);
        self.regs.pc = self.regs.ea;
    }

    fn rti<B: Bus>(&mut self, bus: &mut B) {
        bus.read(self.regs.stack_addr());
        let p = self.pull(bus);
        self.regs.p.set_bits(p);
        bus.set_irq_disable(self.regs.p.get(I));
        let lo = self.pull(bus);
        self.regs.set_pcl(lo);
        let hi = self.pull(bus);
        self.regs.set_pch(hi);
    }

    fn rts<B: Bus>(&mut self, bus: &mut B) {
        bus.read(self.regs.stack_addr());
        let lo = self.pull(bus);
        self.regs.set_pcl(lo);
        let hi = self.pull(bus);
        self.regs.set_pch(hi);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        bus.read(self.regs.pc);
    }

    // === Arithmetic and logic ===

    fn adc_value(&mut self, value: u8) {
        let sum = u32::from(self.regs.a) + u32::from(value) + u32::from(self.regs.p.get(C));
        let overflow = (sum ^ u32::from(self.regs.a)) & (sum ^ u32::from(value)) & 0x80 != 0;
        self.regs.p.set(V, overflow);
        self.regs.p.set(N, sum & 0x80 != 0);
        self.regs.p.set(Z, sum & 0xFF == 0);
        self.regs.p.set(C, sum > 0xFF);
        self.regs.a = sum as u8;
    }

    fn adc(&mut self) {
        self.adc_value(self.m);
    }

    fn sbc(&mut self) {
        self.adc_value(self.m ^ 0xFF);
    }

    fn and(&mut self) {
        self.regs.a &= self.m;
        self.regs.p.set_nz(self.regs.a);
    }

    fn ora(&mut self) {
        self.regs.a |= self.m;
        self.regs.p.set_nz(self.regs.a);
    }

    fn eor(&mut self) {
        self.regs.a ^= self.m;
        self.regs.p.set_nz(self.regs.a);
    }

    fn bit(&mut self) {
        self.regs.p.set(N, self.m & 0x80 != 0);
        self.regs.p.set(V, self.m & 0x40 != 0);
        self.regs.p.set(Z, self.m & self.regs.a == 0);
    }

    fn compare(&mut self, register: u8) {
        let diff = register.wrapping_sub(self.m);
        self.regs.p.set(N, diff & 0x80 != 0);
        self.regs.p.set(C, register >= self.m);
        self.regs.p.set(Z, diff == 0);
    }

    fn cmp(&mut self) {
        self.compare(self.regs.a);
    }

    fn cpx(&mut self) {
        self.compare(self.regs.x);
    }

    fn cpy(&mut self) {
        self.compare(self.regs.y);
    }

    // === Shifts and rotates ===

    fn asl_a(&mut self) {
        self.regs.p.set(C, self.regs.a & 0x80 != 0);
        self.regs.a <<= 1;
        self.regs.p.set_nz(self.regs.a);
    }

    fn asl_m<B: Bus>(&mut self, bus: &mut B) {
        self.regs.p.set(C, self.m & 0x80 != 0);
        bus.write(self.regs.ea, self.m);
        self.m <<= 1;
        bus.write(self.regs.ea, self.m);
        self.regs.p.set_nz(self.m);
    }

    fn lsr_a(&mut self) {
        self.regs.p.set(C, self.regs.a & 0x01 != 0);
        self.regs.a >>= 1;
        self.regs.p.set_nz(self.regs.a);
    }

    fn lsr_m<B: Bus>(&mut self, bus: &mut B) {
        self.regs.p.set(C, self.m & 0x01 != 0);
        bus.write(self.regs.ea, self.m);
        self.m >>= 1;
        bus.write(self.regs.ea, self.m);
        self.regs.p.set_nz(self.m);
    }

    fn rol_a(&mut self) {
        let result = (self.regs.a << 1) | u8::from(self.regs.p.get(C));
        self.regs.p.set(C, self.regs.a & 0x80 != 0);
        self.regs.a = result;
        self.regs.p.set_nz(result);
    }

    fn rol_m<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.m);
        let result = (self.m << 1) | u8::from(self.regs.p.get(C));
        bus.write(self.regs.ea, result);
        self.regs.p.set(C, self.m & 0x80 != 0);
        self.regs.p.set_nz(result);
    }

    fn ror_a(&mut self) {
        let result = (self.regs.a >> 1) | (u8::from(self.regs.p.get(C)) << 7);
        self.regs.p.set(C, self.regs.a & 0x01 != 0);
        self.regs.a = result;
        self.regs.p.set_nz(result);
    }

    fn ror_m<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.m);
        let result = (self.m >> 1) | (u8::from(self.regs.p.get(C)) << 7);
        bus.write(self.regs.ea, result);
        self.regs.p.set(C, self.m & 0x01 != 0);
        self.regs.p.set_nz(result);
    }

    // === Increment / decrement ===

    fn inc<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.m);
        self.m = self.m.wrapping_add(1);
        bus.write(self.regs.ea, self.m);
        self.regs.p.set_nz(self.m);
    }

    fn dec<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.m);
        self.m = self.m.wrapping_sub(1);
        bus.write(self.regs.ea, self.m);
        self.regs.p.set_nz(self.m);
    }

    fn inx(&mut self) {
        self.regs.x = self.regs.x.wrapping_add(1);
        self.regs.p.set_nz(self.regs.x);
    }

    fn dex(&mut self) {
        self.regs.x = self.regs.x.wrapping_sub(1);
        self.regs.p.set_nz(self.regs.x);
    }

    fn iny(&mut self) {
        self.regs.y = self.regs.y.wrapping_add(1);
        self.regs.p.set_nz(self.regs.y);
    }

    fn dey(&mut self) {
        self.regs.y = self.regs.y.wrapping_sub(1);
        self.regs.p.set_nz(self.regs.y);
    }

    // === Loads, stores, transfers ===

    fn lda(&mut self) {
        self.regs.a = self.m;
        self.regs.p.set_nz(self.regs.a);
    }

    fn ldx(&mut self) {
        self.regs.x = self.m;
        self.regs.p.set_nz(self.regs.x);
    }

    fn ldy(&mut self) {
        self.regs.y = self.m;
        self.regs.p.set_nz(self.regs.y);
    }

    fn sta<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.regs.a);
    }

    fn stx<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.regs.x);
    }

    fn sty<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.regs.y);
    }

    fn tax(&mut self) {
        self.regs.x = self.regs.a;
        self.regs.p.set_nz(self.regs.x);
    }

    fn tay(&mut self) {
        self.regs.y = self.regs.a;
        self.regs.p.set_nz(self.regs.y);
    }

    fn tsx(&mut self) {
        self.regs.x = self.regs.s;
        self.regs.p.set_nz(self.regs.x);
    }

    fn txa(&mut self) {
        self.regs.a = self.regs.x;
        self.regs.p.set_nz(self.regs.a);
    }

    fn tya(&mut self) {
        self.regs.a = self.regs.y;
        self.regs.p.set_nz(self.regs.a);
    }

    // === Stack instructions ===

    fn pha<B: Bus>(&mut self, bus: &mut B) {
        self.push(bus, self.regs.a);
    }

    fn php<B: Bus>(&mut self, bus: &mut B) {
        let bits = self.regs.p.bits(true);
        self.push(bus, bits);
    }

    fn pla<B: Bus>(&mut self, bus: &mut B) {
        bus.read(self.regs.stack_addr());
        self.regs.a = self.pull(bus);
        self.regs.p.set_nz(self.regs.a);
    }

    fn plp<B: Bus>(&mut self, bus: &mut B) {
        bus.read(self.regs.stack_addr());
        let p = self.pull(bus);
        self.regs.p.set_bits(p);
        bus.set_irq_disable(self.regs.p.get(I));
    }

    // === Undocumented opcodes ===

    fn slo<B: Bus>(&mut self, bus: &mut B) {
        let value = bus.read(self.regs.ea);
        self.regs.p.set(C, value & 0x80 != 0);
        bus.write(self.regs.ea, value);
        let shifted = value << 1;
        bus.write(self.regs.ea, shifted);
        self.regs.a |= shifted;
        self.regs.p.set_nz(self.regs.a);
    }

    fn rla<B: Bus>(&mut self, bus: &mut B) {
        let value = bus.read(self.regs.ea);
        bus.write(self.regs.ea, value);
        let rotated = (value << 1) | u8::from(self.regs.p.get(C));
        bus.write(self.regs.ea, rotated);
        self.regs.p.set(C, value & 0x80 != 0);
        self.regs.a &= rotated;
        self.regs.p.set_nz(self.regs.a);
    }

    fn sre<B: Bus>(&mut self, bus: &mut B) {
        let value = bus.read(self.regs.ea);
        self.regs.p.set(C, value & 0x01 != 0);
        bus.write(self.regs.ea, value);
        let shifted = value >> 1;
        bus.write(self.regs.ea, shifted);
        self.regs.a ^= shifted;
        self.regs.p.set_nz(self.regs.a);
    }

    fn rra<B: Bus>(&mut self, bus: &mut B) {
        let value = bus.read(self.regs.ea);
        bus.write(self.regs.ea, value);
        let rotated = (value >> 1) | (u8::from(self.regs.p.get(C)) << 7);
        bus.write(self.regs.ea, rotated);
        self.regs.p.set(C, value & 0x01 != 0);
        self.adc_value(rotated);
    }

    fn dcp<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.m);
        self.m = self.m.wrapping_sub(1);
        bus.write(self.regs.ea, self.m);
        self.compare(self.regs.a);
    }

    fn isc<B: Bus>(&mut self, bus: &mut B) {
        let value = bus.read(self.regs.ea);
        bus.write(self.regs.ea, value);
        let incremented = value.wrapping_add(1);
        bus.write(self.regs.ea, incremented);
        self.adc_value(incremented ^ 0xFF);
    }

    fn anc(&mut self) {
        self.regs.a &= self.m;
        self.regs.p.set_nz(self.regs.a);
        self.regs.p.set(C, self.regs.a & 0x80 != 0);
    }

    fn alr(&mut self) {
        self.regs.a &= self.m;
        self.regs.p.set(C, self.regs.a & 0x01 != 0);
        self.regs.a >>= 1;
        self.regs.p.set_nz(self.regs.a);
    }

    fn arr(&mut self) {
        self.regs.a = ((self.m & self.regs.a) >> 1) | (u8::from(self.regs.p.get(C)) << 7);
        self.regs.p.set_nz(self.regs.a);
        self.regs.p.set(C, self.regs.a & 0x40 != 0);
        self.regs
            .p
            .set(V, ((self.regs.a << 1) ^ self.regs.a) & 0x40 != 0);
    }

    fn axs(&mut self) {
        let diff = i32::from(self.regs.a & self.regs.x) - i32::from(self.m);
        self.regs.p.set(N, diff & 0x80 != 0);
        self.regs.p.set(Z, diff & 0xFF == 0);
        self.regs.p.set(C, diff >= 0);
        self.regs.x = diff as u8;
    }

    fn lax(&mut self) {
        self.regs.a = self.m;
        self.regs.x = self.m;
        self.regs.p.set_nz(self.regs.x);
    }

    fn lar(&mut self) {
        self.regs.s &= self.m;
        self.regs.a = self.regs.s;
        self.regs.x = self.regs.s;
        self.regs.p.set_nz(self.regs.s);
    }

    fn xaa(&mut self) {
        self.regs.a = self.regs.x & self.m;
        self.regs.p.set_nz(self.regs.a);
    }

    fn sax<B: Bus>(&mut self, bus: &mut B) {
        bus.write(self.regs.ea, self.regs.x & self.regs.a);
    }

    fn ahx<B: Bus>(&mut self, bus: &mut B) {
        let value = self.regs.a & self.regs.x & 7;
        bus.write(self.regs.ea, value);
    }

    fn shx<B: Bus>(&mut self, bus: &mut B) {
        let value = self.regs.x & self.regs.eah().wrapping_add(1);
        bus.read(self.regs.ea);
        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.y));
        if self.regs.eal() < self.regs.y {
            self.regs.set_eah(value);
        }
        bus.write(self.regs.ea, value);
    }

    fn shy<B: Bus>(&mut self, bus: &mut B) {
        let value = self.regs.y & self.regs.eah().wrapping_add(1);
        bus.read(self.regs.ea);
        self.regs.set_eal(self.regs.eal().wrapping_add(self.regs.x));
        if self.regs.eal() < self.regs.x {
            self.regs.set_eah(value);
        }
        bus.write(self.regs.ea, value);
    }

    fn xas<B: Bus>(&mut self, bus: &mut B) {
        self.regs.s = self.regs.a & self.regs.x;
        bus.write(self.regs.ea, self.regs.s);
    }

    // === Snapshot ===

    pub fn save_state(&self, w: &mut StateWriter) {
        w.write_u8(self.regs.a);
        w.write_u8(self.regs.x);
        w.write_u8(self.regs.y);
        w.write_u8(self.regs.s);
        w.write_u16(self.regs.pc);
        w.write_u16(self.regs.ea);
        w.write_u8(self.regs.p.0);
        w.write_u8(self.m);
        w.write_u8(self.opcode);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.regs.a = r.read_u8()?;
        self.regs.x = r.read_u8()?;
        self.regs.y = r.read_u8()?;
        self.regs.s = r.read_u8()?;
        self.regs.pc = r.read_u16()?;
        self.regs.ea = r.read_u16()?;
        self.regs.p.0 = r.read_u8()?;
        self.m = r.read_u8()?;
        self.opcode = r.read_u8()?;
        Ok(())
    }
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}
