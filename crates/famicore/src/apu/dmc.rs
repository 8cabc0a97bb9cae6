//! DMC (delta modulation) channel.
//!
//! Streams 1-bit delta-encoded sample bytes from PRG space via DMA. The
//! channel never touches the bus itself: when its byte buffer runs dry it
//! reports that a fetch is needed, the DMA arbiter steals the cycles, and
//! the fetched byte is handed back through [`Dmc::receive_dma_byte`].

use famicore_core::{StateReader, StateTruncated, StateWriter};

use crate::interrupts::{Interrupts, IRQ_DMC};

/// DMC timer periods (CPU cycles per output bit) per TV system.
const FREQUENCY_TABLE: [[i32; 16]; 3] = [
    [428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54],
    [398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50],
    [428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54],
];

/// DMC channel state.
pub struct Dmc {
    /// Sample-end IRQ has fired (bit 7 of $4015).
    pub irq_occurred: bool,
    /// IRQ enabled ($4010 bit 7).
    pub irq_enabled: bool,
    /// Loop the sample at end ($4010 bit 6).
    pub looping: bool,
    /// Output unit is consuming a byte.
    enabled: bool,
    /// A fetched byte is waiting in the buffer.
    pub buffer_full: bool,
    /// Start address reload value ($4012).
    pub dma_addr_refresh: u16,
    /// Byte count reload value ($4013).
    pub dma_size_refresh: u16,
    /// Bytes remaining in the current sample.
    pub dma_size: u16,
    /// Bits left in the output shift register.
    bits: u8,
    /// Output shift register.
    byte: u8,
    /// Current fetch address.
    pub dma_addr: u16,
    /// Fetched byte awaiting the output unit.
    buffer: u8,
    /// 7-bit output level.
    pub output: u8,
    cycles: i32,
    freq_timer: usize,
}

impl Dmc {
    #[must_use]
    pub fn new(system_index: usize) -> Self {
        Self {
            irq_occurred: false,
            irq_enabled: false,
            looping: false,
            enabled: false,
            buffer_full: false,
            dma_addr_refresh: 0xC000,
            dma_size_refresh: 0,
            dma_size: 0,
            bits: 1,
            byte: 1,
            dma_addr: 0,
            buffer: 0,
            output: 0,
            cycles: FREQUENCY_TABLE[system_index][0],
            freq_timer: 0,
        }
    }

    pub fn hard_reset(&mut self, system_index: usize) {
        *self = Self::new(system_index);
    }

    /// Per-CPU-cycle clock. Returns true when the output unit consumed
    /// the buffer and more bytes remain — the caller must assert a DMC
    /// DMA to refill it.
    pub fn clock_single(&mut self, system_index: usize) -> bool {
        let mut request_dma = false;

        self.cycles -= 1;
        if self.cycles <= 0 {
            self.cycles = FREQUENCY_TABLE[system_index][self.freq_timer];
            if self.enabled {
                if self.byte & 0x01 != 0 {
                    if self.output <= 0x7D {
                        self.output += 2;
                    }
                } else if self.output >= 0x02 {
                    self.output -= 2;
                }
                self.byte >>= 1;
            }
            self.bits -= 1;
            if self.bits == 0 {
                self.bits = 8;
                if self.buffer_full {
                    self.buffer_full = false;
                    self.enabled = true;
                    self.byte = self.buffer;
                    if self.dma_size > 0 {
                        request_dma = true;
                    }
                } else {
                    self.enabled = false;
                }
            }
        }

        request_dma
    }

    /// Deliver the byte fetched by the DMA arbiter.
    pub fn receive_dma_byte(&mut self, value: u8, interrupts: &mut Interrupts) {
        self.buffer_full = true;
        self.buffer = value;

        // Address wraps from $FFFF back to $8000
        self.dma_addr = if self.dma_addr == 0xFFFF {
            0x8000
        } else {
            self.dma_addr + 1
        };
        if self.dma_size > 0 {
            self.dma_size -= 1;
        }

        if self.dma_size == 0 {
            if self.looping {
                self.dma_addr = self.dma_addr_refresh;
                self.dma_size = self.dma_size_refresh;
            } else if self.irq_enabled {
                interrupts.assert_irq(IRQ_DMC);
                self.irq_occurred = true;
            }
        }
    }

    /// $4010 write: IRQ enable, loop flag, rate index.
    pub fn write_control(&mut self, value: u8, interrupts: &mut Interrupts) {
        self.irq_enabled = value & 0x80 != 0;
        self.looping = value & 0x40 != 0;
        if !self.irq_enabled {
            self.irq_occurred = false;
            interrupts.clear_irq(IRQ_DMC);
        }
        self.freq_timer = usize::from(value & 0x0F);
    }

    /// $4011 write: direct 7-bit output load.
    pub fn write_output(&mut self, value: u8) {
        self.output = value & 0x7F;
    }

    /// $4012 write: sample start address = $C000 + value * 64.
    pub fn write_address(&mut self, value: u8) {
        self.dma_addr_refresh = (u16::from(value) << 6) | 0xC000;
    }

    /// $4013 write: sample length = value * 16 + 1 bytes.
    pub fn write_length(&mut self, value: u8) {
        self.dma_size_refresh = (u16::from(value) << 4) | 0x0001;
    }

    /// $4015 bit 4. Enabling restarts the sample when it has finished;
    /// disabling stops the fetch engine. Returns true when an immediate
    /// DMA assert is needed (buffer empty with bytes to fetch).
    pub fn set_enabled(&mut self, enabled: bool, interrupts: &mut Interrupts) -> bool {
        if enabled {
            if self.dma_size == 0 {
                self.dma_size = self.dma_size_refresh;
                self.dma_addr = self.dma_addr_refresh;
            }
        } else {
            self.dma_size = 0;
        }
        self.irq_occurred = false;
        interrupts.clear_irq(IRQ_DMC);

        !self.buffer_full && self.dma_size > 0
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.write_bool(self.irq_occurred);
        w.write_bool(self.irq_enabled);
        w.write_bool(self.looping);
        w.write_bool(self.enabled);
        w.write_bool(self.buffer_full);
        w.write_u16(self.dma_addr_refresh);
        w.write_u16(self.dma_size_refresh);
        w.write_u16(self.dma_size);
        w.write_u8(self.bits);
        w.write_u8(self.byte);
        w.write_u16(self.dma_addr);
        w.write_u8(self.buffer);
        w.write_u8(self.output);
        w.write_i32(self.cycles);
        w.write_u32(self.freq_timer as u32);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.irq_occurred = r.read_bool()?;
        self.irq_enabled = r.read_bool()?;
        self.looping = r.read_bool()?;
        self.enabled = r.read_bool()?;
        self.buffer_full = r.read_bool()?;
        self.dma_addr_refresh = r.read_u16()?;
        self.dma_size_refresh = r.read_u16()?;
        self.dma_size = r.read_u16()?;
        self.bits = r.read_u8()?;
        self.byte = r.read_u8()?;
        self.dma_addr = r.read_u16()?;
        self.buffer = r.read_u8()?;
        self.output = r.read_u8()?;
        self.cycles = r.read_i32()?;
        self.freq_timer = r.read_u32()? as usize & 0x0F;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_and_length_formulas() {
        let mut ints = Interrupts::new();
        let mut dmc = Dmc::new(0);
        dmc.write_address(0x00);
        assert_eq!(dmc.dma_addr_refresh, 0xC000);
        dmc.write_address(0x01);
        assert_eq!(dmc.dma_addr_refresh, 0xC040);
        dmc.write_address(0xFF);
        assert_eq!(dmc.dma_addr_refresh, 0xFFC0);

        dmc.write_length(0x00);
        assert_eq!(dmc.dma_size_refresh, 1);
        dmc.write_length(0x01);
        assert_eq!(dmc.dma_size_refresh, 17);
        dmc.write_length(0xFF);
        assert_eq!(dmc.dma_size_refresh, 4081);
        let _ = ints;
    }

    #[test]
    fn enable_restarts_finished_sample() {
        let mut ints = Interrupts::new();
        let mut dmc = Dmc::new(0);
        dmc.write_address(0x00);
        dmc.write_length(0x01);
        let wants_dma = dmc.set_enabled(true, &mut ints);
        assert!(wants_dma);
        assert_eq!(dmc.dma_size, 17);
        assert_eq!(dmc.dma_addr, 0xC000);
    }

    #[test]
    fn disable_stops_fetching() {
        let mut ints = Interrupts::new();
        let mut dmc = Dmc::new(0);
        dmc.write_length(0x01);
        dmc.set_enabled(true, &mut ints);
        assert!(dmc.dma_size > 0);
        let wants_dma = dmc.set_enabled(false, &mut ints);
        assert_eq!(dmc.dma_size, 0);
        assert!(!wants_dma);
    }

    #[test]
    fn loop_restarts_address_and_size() {
        let mut ints = Interrupts::new();
        let mut dmc = Dmc::new(0);
        dmc.write_control(0x40, &mut ints); // loop, no IRQ
        dmc.write_address(0x00);
        dmc.write_length(0x00); // 1 byte
        dmc.set_enabled(true, &mut ints);

        dmc.receive_dma_byte(0xAA, &mut ints);
        assert_eq!(dmc.dma_size, 1, "loop should reload the size");
        assert_eq!(dmc.dma_addr, 0xC000, "loop should reload the address");
        assert!(!dmc.irq_occurred);
    }

    #[test]
    fn sample_end_raises_irq_when_enabled() {
        let mut ints = Interrupts::new();
        let mut dmc = Dmc::new(0);
        dmc.write_control(0x80, &mut ints); // IRQ, no loop
        dmc.write_address(0x00);
        dmc.write_length(0x00);
        dmc.set_enabled(true, &mut ints);

        dmc.receive_dma_byte(0x00, &mut ints);
        assert!(dmc.irq_occurred);
        assert_ne!(ints.irq_flags & IRQ_DMC, 0);

        // Clearing the IRQ enable acknowledges the flag
        dmc.write_control(0x00, &mut ints);
        assert!(!dmc.irq_occurred);
        assert_eq!(ints.irq_flags & IRQ_DMC, 0);
    }

    #[test]
    fn delta_bits_move_output_by_two() {
        let mut ints = Interrupts::new();
        let mut dmc = Dmc::new(0);
        dmc.write_output(64);
        dmc.write_length(0x01);
        dmc.set_enabled(true, &mut ints);
        dmc.receive_dma_byte(0xFF, &mut ints); // all 1-bits: ramp up

        // One full timer period per output bit
        let mut ticks = 0;
        while dmc.bits != 8 || !dmc.enabled {
            dmc.clock_single(0);
            ticks += 1;
            assert!(ticks < 10_000, "output unit should load the buffer");
        }
        let before = dmc.output;
        for _ in 0..428 {
            dmc.clock_single(0);
        }
        assert_eq!(dmc.output, before + 2);
    }

    #[test]
    fn output_clamps_at_limits() {
        let mut ints = Interrupts::new();
        let mut dmc = Dmc::new(0);
        dmc.write_output(0x7C);
        dmc.enabled = true;
        dmc.byte = 0xFF;
        dmc.bits = 8;
        dmc.buffer_full = false;
        for _ in 0..(428 * 8) {
            dmc.clock_single(0);
        }
        assert!(dmc.output <= 0x7F);
    }
}
