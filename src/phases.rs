//! Synthetic sleep-phase generation
//!
//! Phases are not measured; they are synthesized from the total session length
//! by repeatedly emitting light → medium → deep → REM cycles with randomized
//! lengths until the remaining budget can no longer hold a cycle.
//!
//! Randomness is supplied through [`RangeDraw`] so callers own their source and
//! tests can script exact draws.

use crate::types::{PhaseKind, SleepPhase};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Sessions shorter than this (minutes) get no phase breakdown
pub const MIN_PHASE_MINUTES: u32 = 30;

/// A new cycle only starts while more than this many minutes remain
pub const CYCLE_BUDGET_FLOOR: u32 = 20;

/// Draw ranges (inclusive, minutes) in emission order within a cycle
pub const PHASE_DRAW_RANGES: [(PhaseKind, u32, u32); 4] = [
    (PhaseKind::Light, 5, 15),
    (PhaseKind::Medium, 20, 35),
    (PhaseKind::Deep, 15, 40),
    (PhaseKind::Rem, 10, 25),
];

/// Source of bounded integer draws
pub trait RangeDraw {
    /// Return a value in `min..=max`
    fn draw(&mut self, min: u32, max: u32) -> u32;
}

/// [`RangeDraw`] backed by any `rand` generator
#[derive(Debug, Clone)]
pub struct RngDraw<R> {
    rng: R,
}

impl<R: Rng> RngDraw<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngDraw<StdRng> {
    /// Generator seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Reproducible generator for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> RangeDraw for RngDraw<R> {
    fn draw(&mut self, min: u32, max: u32) -> u32 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}

/// Phase sequence synthesizer
pub struct PhaseGenerator;

impl PhaseGenerator {
    /// Generate an ordered phase sequence for `total_minutes` of sleep.
    ///
    /// The sum of the returned durations never exceeds `total_minutes`; the
    /// leftover below [`CYCLE_BUDGET_FLOOR`] is discarded.
    pub fn generate(total_minutes: u32, draw: &mut dyn RangeDraw) -> Vec<SleepPhase> {
        if total_minutes < MIN_PHASE_MINUTES {
            return Vec::new();
        }

        let mut phases = Vec::new();
        let mut remaining = total_minutes;
        let mut cycle_index = 1;

        while remaining > CYCLE_BUDGET_FLOOR {
            for (kind, min, max) in PHASE_DRAW_RANGES {
                let duration = draw.draw(min, max).min(remaining);
                if duration > 0 {
                    phases.push(SleepPhase {
                        kind,
                        duration_minutes: duration,
                        cycle_index,
                    });
                    remaining -= duration;
                }
            }
            cycle_index += 1;
        }

        debug!(
            total_minutes,
            phases = phases.len(),
            cycles = cycle_index - 1,
            discarded = remaining,
            "generated sleep phases"
        );

        phases
    }
}
