//! Trait for components that can be advanced by clock ticks.

use crate::Ticks;

/// A component that can be advanced by clock ticks.
///
/// For a whole machine the natural quantum is whatever its driving
/// component consumes in one step — for a CPU-driven console, one
/// instruction (a handful of bus cycles). Implementations document their
/// quantum.
pub trait Tickable {
    /// Advance the component by one step.
    fn tick(&mut self);

    /// Advance the component by multiple steps.
    ///
    /// Default implementation calls `tick()` in a loop. Components may
    /// override for efficiency, but must produce identical results.
    fn tick_n(&mut self, count: Ticks) {
        for _ in 0..count.get() {
            self.tick();
        }
    }
}
