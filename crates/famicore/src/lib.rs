//! Cycle-accurate NES/Famicom emulation core.
//!
//! The machine advances in units of one CPU bus cycle: every memory
//! access the 6502 performs clocks the picture unit three times (four
//! every fifth cycle on PAL-B), the sound unit once, the DMA arbiter
//! once, and the cartridge board's hook once, before the access itself
//! dispatches. Mid-scanline register writes, DMA cycle stealing and
//! interrupt polling windows all fall out of that ordering.
//!
//! Host integration is limited to narrow contracts: an audio sink
//! draining a circular sample buffer, a video sink receiving one
//! framebuffer per frame, pollable input sources, and a block of
//! frame-boundary request flags.

pub mod apu;
mod bus;
#[cfg(feature = "native")]
pub mod capture;
pub mod cartridge;
mod config;
mod dma;
mod emulator;
pub mod input;
mod interrupts;
pub mod io;
mod nes;
mod palette;
pub mod ppu;
pub mod snapshot;
pub mod sram;

pub use bus::NesBus;
pub use config::TvSystem;
pub use emulator::{Emulator, Requests};
pub use interrupts::{Interrupts, IRQ_APU, IRQ_BOARD, IRQ_DMC};
pub use nes::Nes;
