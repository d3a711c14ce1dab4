//! Phase-based sleep scoring
//!
//! Turns a phase sequence into a 0-100 score built from four independent tiers
//! (duration, deep sleep, REM sleep, cycle count) plus diagnostic messages.

use crate::history::saturating_sum;
use crate::types::{PhaseKind, PhaseReport, ScoreBand, SleepPhase};
use std::collections::{BTreeMap, BTreeSet};

/// Sleep shorter than this (minutes) is flagged as too short
pub const SHORT_SLEEP_MINUTES: u32 = 360;

/// Deep or REM totals below this (minutes) are flagged
pub const MIN_STAGE_MINUTES: u32 = 30;

/// Fewer cycles than this are flagged
pub const MIN_HEALTHY_CYCLES: u32 = 4;

pub const MSG_INSUFFICIENT_DATA: &str = "Insufficient data";
pub const MSG_TOO_SHORT: &str = "Sleep was too short";
pub const MSG_LOW_DEEP: &str = "Too little deep sleep";
pub const MSG_LOW_REM: &str = "Too little REM sleep";
pub const MSG_EXCELLENT: &str = "Excellent sleep quality";

/// (threshold, points) tiers, checked top-down with `>=`
const DURATION_TIERS: [(u32, u32); 3] = [(420, 40), (360, 30), (300, 20)];
const DURATION_FLOOR_POINTS: u32 = 10;
const DEEP_TIERS: [(u32, u32); 3] = [(90, 30), (60, 25), (30, 20)];
const DEEP_NONZERO_POINTS: u32 = 10;
const REM_TIERS: [(u32, u32); 3] = [(90, 20), (60, 15), (30, 10)];
const REM_NONZERO_POINTS: u32 = 5;
const CYCLE_TIERS: [(u32, u32); 4] = [(5, 10), (4, 8), (3, 5), (2, 3)];

const MAX_SCORE: u32 = 100;

/// Scorer for synthetic phase sequences
pub struct PhaseScorer;

impl PhaseScorer {
    /// Score a phase sequence.
    ///
    /// An empty sequence scores 0 with a single "insufficient data" message.
    pub fn score(phases: &[SleepPhase]) -> PhaseReport {
        if phases.is_empty() {
            return PhaseReport {
                total_score: 0,
                band: ScoreBand::Poor,
                messages: vec![MSG_INSUFFICIENT_DATA.to_string()],
                phase_totals: BTreeMap::new(),
                total_duration: 0,
                deep_minutes: 0,
                rem_minutes: 0,
                cycle_count: 0,
            };
        }

        let mut phase_totals: BTreeMap<PhaseKind, u32> = BTreeMap::new();
        for phase in phases {
            let total = phase_totals.entry(phase.kind).or_insert(0);
            *total = total.saturating_add(phase.duration_minutes);
        }

        let total_duration = saturating_sum(phases.iter().map(|p| p.duration_minutes));
        let deep_minutes = phase_totals.get(&PhaseKind::Deep).copied().unwrap_or(0);
        let rem_minutes = phase_totals.get(&PhaseKind::Rem).copied().unwrap_or(0);
        let cycle_count = phases
            .iter()
            .map(|p| p.cycle_index)
            .collect::<BTreeSet<_>>()
            .len() as u32;

        let score = duration_points(total_duration)
            + deep_points(deep_minutes)
            + rem_points(rem_minutes)
            + cycle_points(cycle_count);
        let total_score = score.min(MAX_SCORE);

        PhaseReport {
            total_score,
            band: ScoreBand::from_score(total_score),
            messages: diagnostics(total_duration, deep_minutes, rem_minutes, cycle_count),
            phase_totals,
            total_duration,
            deep_minutes,
            rem_minutes,
            cycle_count,
        }
    }
}

fn tier(value: u32, tiers: &[(u32, u32)]) -> Option<u32> {
    tiers
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, points)| *points)
}

fn duration_points(total_minutes: u32) -> u32 {
    tier(total_minutes, &DURATION_TIERS).unwrap_or(DURATION_FLOOR_POINTS)
}

fn deep_points(deep_minutes: u32) -> u32 {
    match tier(deep_minutes, &DEEP_TIERS) {
        Some(points) => points,
        None if deep_minutes > 0 => DEEP_NONZERO_POINTS,
        None => 0,
    }
}

fn rem_points(rem_minutes: u32) -> u32 {
    match tier(rem_minutes, &REM_TIERS) {
        Some(points) => points,
        None if rem_minutes > 0 => REM_NONZERO_POINTS,
        None => 0,
    }
}

fn cycle_points(cycles: u32) -> u32 {
    tier(cycles, &CYCLE_TIERS).unwrap_or(0)
}

fn diagnostics(total: u32, deep: u32, rem: u32, cycles: u32) -> Vec<String> {
    let mut messages = Vec::new();

    if total < SHORT_SLEEP_MINUTES {
        messages.push(MSG_TOO_SHORT.to_string());
    }
    if deep < MIN_STAGE_MINUTES {
        messages.push(MSG_LOW_DEEP.to_string());
    }
    if rem < MIN_STAGE_MINUTES {
        messages.push(MSG_LOW_REM.to_string());
    }
    if cycles < MIN_HEALTHY_CYCLES {
        messages.push(format!("Too few sleep cycles ({cycles})"));
    }

    if messages.is_empty() {
        messages.push(MSG_EXCELLENT.to_string());
    }
    messages
}
