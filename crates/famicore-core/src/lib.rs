//! Core traits and types for cycle-accurate emulation.
//!
//! Everything advances in units of one bus cycle. The CPU drives the
//! machine: every byte it reads or writes is one cycle, and the bus
//! implementation clocks every other component from inside that access.

mod bus;
mod clock;
mod state;
mod tickable;
mod ticks;

pub use bus::Bus;
pub use clock::MasterClock;
pub use state::{StateReader, StateTruncated, StateWriter};
pub use tickable::Tickable;
pub use ticks::Ticks;
