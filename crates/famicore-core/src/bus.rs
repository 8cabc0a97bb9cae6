//! Memory bus interface.

/// Memory bus interface.
///
/// The CPU performs every memory access through this trait. One call to
/// `read` or `write` is one bus cycle — the implementation is expected to
/// advance every other component (video, audio, DMA, interrupt sampling)
/// before dispatching the access, so side effects land on the exact cycle
/// the hardware would produce them.
///
/// The interrupt accessors expose the machine's interrupt controller to
/// the CPU: the lines are sampled by the bus during φ2 of each cycle, and
/// the CPU consumes the latched result between instructions. Buses without
/// interrupt sources (e.g. flat test RAM) can rely on the defaults.
pub trait Bus {
    /// Read a byte from the given address.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);

    /// Whether an NMI edge has been latched.
    fn nmi_detected(&self) -> bool {
        false
    }

    /// Acknowledge the latched NMI (called once the CPU services it).
    fn clear_nmi_detected(&mut self) {}

    /// Whether a maskable interrupt is pending.
    fn irq_detected(&self) -> bool {
        false
    }

    /// The interrupt vector resolved during φ2 of the previous cycle.
    fn interrupt_vector(&self) -> u16 {
        0xFFFE
    }

    /// Suspend or resume interrupt polling. The CPU raises this around the
    /// final cycles of branch and interrupt sequences, where the hardware
    /// does not poll the lines.
    fn set_interrupt_suspend(&mut self, _suspended: bool) {}

    /// Mirror of the CPU's interrupt-disable flag. The level detector
    /// folds this in at poll time, which preserves the one-instruction
    /// delay after CLI/SEI/PLP change the flag.
    fn set_irq_disable(&mut self, _disabled: bool) {}
}
