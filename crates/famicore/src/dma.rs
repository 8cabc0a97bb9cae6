//! DMA arbiter state and wait-cycle arithmetic.
//!
//! Two DMA sources exist: the 256-pair OAM bulk copy triggered by $4014,
//! and the single-byte DMC sample fetch. Either can be asserted while the
//! other is mid-transfer; the extra wait cycles inserted in each case are
//! a function of CPU cycle parity, the bus direction at assert time, and
//! how far the in-flight transfer has progressed. Games rely on these
//! exact counts.
//!
//! The transfer engine itself lives on the bus (transfers are made of
//! real, component-clocking bus cycles); this module owns the state and
//! the arithmetic.

use famicore_core::{StateReader, StateTruncated, StateWriter};

/// DMA arbiter state.
pub struct Dma {
    /// Wait cycles before a pending DMC fetch engages. Never negative.
    pub dmc_wait_cycles: i32,
    /// Wait cycles before a pending OAM transfer engages. Never negative.
    pub oam_wait_cycles: i32,
    /// DMC fetch requested.
    pub dmc_on: bool,
    /// OAM transfer requested.
    pub oam_on: bool,
    /// DMC fetch in progress.
    pub dmc_occurring: bool,
    /// OAM transfer in progress.
    pub oam_occurring: bool,
    /// Post-OAM settle counter (counts down from 5 after a transfer).
    pub oam_finish_counter: i32,
    /// Current OAM source address.
    pub oam_address: u16,
    /// Progress through the OAM transfer, in bus cycles (0-512).
    pub oam_cycle: i32,
    /// Transfer data latch.
    pub latch: u8,
}

impl Dma {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dmc_wait_cycles: 0,
            oam_wait_cycles: 0,
            dmc_on: false,
            oam_on: false,
            dmc_occurring: false,
            oam_occurring: false,
            oam_finish_counter: 0,
            oam_address: 0,
            oam_cycle: 0,
            latch: 0,
        }
    }

    pub fn hard_reset(&mut self) {
        *self = Self::new();
    }

    pub fn soft_reset(&mut self) {
        *self = Self::new();
    }

    /// Assert a DMC sample fetch. `odd_cycle` is the APU's CPU-cycle
    /// parity; `bus_rw` is true when the current bus access is a read.
    pub fn assert_dmc(&mut self, odd_cycle: bool, bus_rw: bool) {
        if self.oam_occurring {
            if self.oam_cycle < 508 {
                // Mid-OAM: parity decides whether an alignment cycle is
                // needed
                self.dmc_wait_cycles = if odd_cycle { 0 } else { 1 };
            } else {
                // OAM transfer about to finish: its remaining cycles
                // determine the wait
                self.dmc_wait_cycles = 4 - (512 - self.oam_cycle);
            }
        } else if self.dmc_occurring {
            // Re-asserting mid-fetch does nothing
            return;
        } else {
            self.dmc_wait_cycles = if bus_rw { 3 } else { 2 };
            // Just after an OAM transfer the bus needs one more cycle
            if self.oam_finish_counter == 3 {
                self.dmc_wait_cycles += 1;
            }
        }
        self.dmc_on = true;
    }

    /// Assert an OAM bulk copy from `page << 8`.
    pub fn assert_oam(&mut self, page: u8, odd_cycle: bool, bus_rw: bool) {
        self.oam_address = u16::from(page) << 8;
        if self.dmc_occurring {
            self.oam_wait_cycles = if bus_rw { 1 } else { 0 };
        } else if self.oam_occurring {
            // OAM inside OAM cannot happen; ignore
            return;
        } else {
            self.oam_wait_cycles = if odd_cycle { 1 } else { 2 };
        }
        self.oam_on = true;
        self.oam_finish_counter = 0;
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.write_i32(self.dmc_wait_cycles);
        w.write_i32(self.oam_wait_cycles);
        w.write_bool(self.dmc_on);
        w.write_bool(self.oam_on);
        w.write_bool(self.dmc_occurring);
        w.write_bool(self.oam_occurring);
        w.write_i32(self.oam_finish_counter);
        w.write_u16(self.oam_address);
        w.write_i32(self.oam_cycle);
        w.write_u8(self.latch);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.dmc_wait_cycles = r.read_i32()?;
        self.oam_wait_cycles = r.read_i32()?;
        self.dmc_on = r.read_bool()?;
        self.oam_on = r.read_bool()?;
        self.dmc_occurring = r.read_bool()?;
        self.oam_occurring = r.read_bool()?;
        self.oam_finish_counter = r.read_i32()?;
        self.oam_address = r.read_u16()?;
        self.oam_cycle = r.read_i32()?;
        self.latch = r.read_u8()?;
        Ok(())
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}
