//! Interrupt lines and edge/level detection.
//!
//! NMI is edge-triggered from the PPU's vblank logic: the detector polls
//! the line during φ2 of every bus cycle, and a low→high transition
//! latches a pending NMI. The line is dropped again immediately — the
//! hardware pulse is narrower than one CPU cycle. IRQ is level-triggered:
//! pending whenever the CPU's interrupt-disable flag is clear and any
//! source bit is raised.
//!
//! Polling is suspended during the final cycles of branch and
//! BRK/interrupt sequences so those sequences cannot be re-entered.

use famicore_core::{StateReader, StateTruncated, StateWriter};

/// APU frame counter IRQ source.
pub const IRQ_APU: u32 = 0x1;
/// Cartridge board IRQ source.
pub const IRQ_BOARD: u32 = 0x2;
/// DMC sample-end IRQ source.
pub const IRQ_DMC: u32 = 0x4;

/// Interrupt controller state.
pub struct Interrupts {
    /// Current NMI line level (driven by the PPU's vblank window logic).
    pub nmi_current: bool,
    /// Previous line level, for edge detection.
    pub nmi_old: bool,
    /// Latched pending NMI.
    pub nmi_detected: bool,
    /// IRQ source bitmask (`IRQ_APU` | `IRQ_BOARD` | `IRQ_DMC`).
    pub irq_flags: u32,
    /// Level-detected IRQ pending.
    pub irq_detected: bool,
    /// Vector consumed by the last two cycles of BRK/IRQ/NMI.
    pub interrupt_vector: u16,
    /// Polling suspended (final cycles of branch/interrupt sequences).
    pub interrupt_suspend: bool,
    /// Mirror of the CPU's interrupt-disable flag, updated by the CPU
    /// whenever the flag changes.
    pub irq_disable: bool,
    /// NMI generation enabled ($2000 bit 7).
    pub nmi_enabled: bool,
    /// Previous NMI-enable value, for the re-enable-during-vblank case.
    pub nmi_enabled_old: bool,
    /// Vblank flag as visible through $2002.
    pub vbl_flag: bool,
    /// Vblank shadow flag, set/cleared at exact scanline boundaries and
    /// copied into `vbl_flag` one dot later.
    pub vbl_flag_temp: bool,
}

impl Interrupts {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nmi_current: false,
            nmi_old: false,
            nmi_detected: false,
            irq_flags: 0,
            irq_detected: false,
            interrupt_vector: 0,
            interrupt_suspend: false,
            irq_disable: true,
            nmi_enabled: false,
            nmi_enabled_old: false,
            vbl_flag: false,
            vbl_flag_temp: false,
        }
    }

    pub fn hard_reset(&mut self) {
        *self = Self::new();
    }

    /// Poll the interrupt lines. Called during φ2 of every bus cycle.
    pub fn poll(&mut self) {
        if self.interrupt_suspend {
            return;
        }
        // Rising edge latches the NMI request
        if self.nmi_current && !self.nmi_old {
            self.nmi_detected = true;
        }
        // Both samples drop: the line is a narrow pulse ___|-|___
        self.nmi_old = false;
        self.nmi_current = false;

        self.irq_detected = !self.irq_disable && self.irq_flags != 0;

        self.interrupt_vector = if self.nmi_detected { 0xFFFA } else { 0xFFFE };
    }

    /// Raise an IRQ source.
    pub fn assert_irq(&mut self, source: u32) {
        self.irq_flags |= source;
    }

    /// Clear an IRQ source.
    pub fn clear_irq(&mut self, source: u32) {
        self.irq_flags &= !source;
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.write_bool(self.nmi_current);
        w.write_bool(self.nmi_old);
        w.write_bool(self.nmi_detected);
        w.write_u32(self.irq_flags);
        w.write_bool(self.irq_detected);
        w.write_u16(self.interrupt_vector);
        w.write_bool(self.interrupt_suspend);
        w.write_bool(self.irq_disable);
        w.write_bool(self.nmi_enabled);
        w.write_bool(self.nmi_enabled_old);
        w.write_bool(self.vbl_flag);
        w.write_bool(self.vbl_flag_temp);
    }

    pub fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateTruncated> {
        self.nmi_current = r.read_bool()?;
        self.nmi_old = r.read_bool()?;
        self.nmi_detected = r.read_bool()?;
        self.irq_flags = r.read_u32()?;
        self.irq_detected = r.read_bool()?;
        self.interrupt_vector = r.read_u16()?;
        self.interrupt_suspend = r.read_bool()?;
        self.irq_disable = r.read_bool()?;
        self.nmi_enabled = r.read_bool()?;
        self.nmi_enabled_old = r.read_bool()?;
        self.vbl_flag = r.read_bool()?;
        self.vbl_flag_temp = r.read_bool()?;
        Ok(())
    }
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_edge_latches_nmi() {
        let mut ints = Interrupts::new();
        ints.nmi_current = true;
        ints.poll();
        assert!(ints.nmi_detected);
        // Line dropped after the poll
        assert!(!ints.nmi_current);
        assert_eq!(ints.interrupt_vector, 0xFFFA);
    }

    #[test]
    fn level_without_edge_does_not_latch() {
        let mut ints = Interrupts::new();
        ints.nmi_current = true;
        ints.nmi_old = true;
        ints.poll();
        assert!(!ints.nmi_detected);
    }

    #[test]
    fn irq_masked_by_disable_flag() {
        let mut ints = Interrupts::new();
        ints.assert_irq(IRQ_APU);
        ints.irq_disable = true;
        ints.poll();
        assert!(!ints.irq_detected);
        ints.irq_disable = false;
        ints.poll();
        assert!(ints.irq_detected);
        assert_eq!(ints.interrupt_vector, 0xFFFE);
    }

    #[test]
    fn suspend_freezes_detection() {
        let mut ints = Interrupts::new();
        ints.interrupt_suspend = true;
        ints.nmi_current = true;
        ints.poll();
        assert!(!ints.nmi_detected);
        // Line level survives the suspended poll
        assert!(ints.nmi_current);
    }

    #[test]
    fn irq_sources_combine() {
        let mut ints = Interrupts::new();
        ints.irq_disable = false;
        ints.assert_irq(IRQ_APU);
        ints.assert_irq(IRQ_DMC);
        ints.clear_irq(IRQ_APU);
        ints.poll();
        assert!(ints.irq_detected, "remaining source keeps the level high");
        ints.clear_irq(IRQ_DMC);
        ints.poll();
        assert!(!ints.irq_detected);
    }
}
