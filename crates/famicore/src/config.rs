//! TV timing standard configuration.

use famicore_core::MasterClock;

/// TV timing standard — determines frame geometry, CPU clock, and the
/// APU's sequencer/rate tables.
///
/// Dendy is the 1992 Russian famiclone: PAL frame geometry with an
/// NTSC-speed CPU and no PAL CPU/PPU clock skew, so NTSC-timed games run
/// on 50 Hz displays.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TvSystem {
    /// NTSC: 262 scanlines, 1,789,772.67 Hz CPU, odd-frame dot skip.
    #[default]
    Ntsc,
    /// PAL-B: 312 scanlines, 1,662,607 Hz CPU, extra PPU clock every
    /// fifth CPU cycle.
    PalB,
    /// Dendy: 312 scanlines, 1,773,448 Hz CPU, vblank starts at 291.
    Dendy,
}

impl TvSystem {
    /// Index into the per-system APU rate/sequence tables.
    #[must_use]
    pub const fn table_index(self) -> usize {
        match self {
            Self::Ntsc => 0,
            Self::PalB => 1,
            Self::Dendy => 2,
        }
    }

    /// CPU frequency in Hz.
    #[must_use]
    pub const fn cpu_hz(self) -> f64 {
        match self {
            Self::Ntsc => 1_789_772.67,
            Self::PalB => 1_662_607.0,
            Self::Dendy => 1_773_448.0,
        }
    }

    /// CPU clock for frame-pacing purposes.
    #[must_use]
    pub fn master_clock(self) -> MasterClock {
        MasterClock::new(self.cpu_hz() as u64)
    }

    /// Nominal display frame rate.
    #[must_use]
    pub const fn frames_per_second(self) -> f64 {
        match self {
            Self::Ntsc => 60.0988,
            Self::PalB | Self::Dendy => 50.07,
        }
    }

    /// Total scanlines per frame (including pre-render).
    #[must_use]
    pub const fn scanlines_per_frame(self) -> u16 {
        match self {
            Self::Ntsc => 262,
            Self::PalB | Self::Dendy => 312,
        }
    }

    /// Scanline on which the vblank flag is raised.
    #[must_use]
    pub const fn vblank_start_line(self) -> u16 {
        match self {
            Self::Ntsc | Self::PalB => 241,
            // 51 idle scanlines before the 20-line vblank window
            Self::Dendy => 291,
        }
    }

    /// Pre-render scanline (vblank flag cleared here).
    #[must_use]
    pub const fn pre_render_line(self) -> u16 {
        self.scanlines_per_frame() - 1
    }

    /// Whether odd frames skip one dot when rendering is enabled.
    #[must_use]
    pub const fn has_odd_frame_skip(self) -> bool {
        matches!(self, Self::Ntsc)
    }

    /// Whether the PPU receives an extra clock every fifth CPU cycle
    /// (PAL's 3.2:1 PPU:CPU ratio).
    #[must_use]
    pub const fn has_pal_extra_clock(self) -> bool {
        matches!(self, Self::PalB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntsc_geometry() {
        assert_eq!(TvSystem::Ntsc.scanlines_per_frame(), 262);
        assert_eq!(TvSystem::Ntsc.vblank_start_line(), 241);
        assert_eq!(TvSystem::Ntsc.pre_render_line(), 261);
        assert!(TvSystem::Ntsc.has_odd_frame_skip());
        assert!(!TvSystem::Ntsc.has_pal_extra_clock());
    }

    #[test]
    fn dendy_delays_vblank() {
        assert_eq!(TvSystem::Dendy.scanlines_per_frame(), 312);
        assert_eq!(TvSystem::Dendy.vblank_start_line(), 291);
        assert!(!TvSystem::Dendy.has_pal_extra_clock());
    }
}
