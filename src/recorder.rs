//! Sleep tracking state machine
//!
//! `Idle → Tracking → Idle`. The elapsed counter only moves on external
//! one-second ticks; stopping finalizes a [`SleepSession`] with its coarse
//! quality and, for sessions longer than 30 minutes, a synthetic phase
//! breakdown.

use crate::phases::{PhaseGenerator, RangeDraw, MIN_PHASE_MINUTES};
use crate::quality::QualityMapper;
use crate::types::{SleepSession, DATE_FORMAT, TIME_FORMAT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Start time recorded when the tracking start was never captured
const UNKNOWN_START_TIME: &str = "00:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingState {
    #[default]
    Idle,
    Tracking,
}

/// Elapsed tracking time with second → minute → hour carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Elapsed {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Elapsed {
    fn tick(&mut self) {
        self.seconds += 1;
        if self.seconds >= 60 {
            self.seconds = 0;
            self.minutes += 1;
        }
        if self.minutes >= 60 {
            self.minutes = 0;
            self.hours += 1;
        }
    }

    /// Same carry as `seconds` calls to `tick`, computed directly
    fn add_seconds(&mut self, seconds: u64) {
        let total = u64::from(self.hours)
            .saturating_mul(3600)
            .saturating_add(u64::from(self.minutes) * 60 + u64::from(self.seconds))
            .saturating_add(seconds);
        self.hours = u32::try_from(total / 3600).unwrap_or(u32::MAX);
        self.minutes = ((total / 60) % 60) as u32;
        self.seconds = (total % 60) as u32;
    }

    /// Whole minutes elapsed (seconds are dropped)
    pub fn total_minutes(&self) -> u32 {
        self.hours.saturating_mul(60).saturating_add(self.minutes)
    }

    /// `HH:MM:SS`
    pub fn display(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Owns the tracking state and produces finalized sessions
#[derive(Debug, Clone, Default)]
pub struct SessionRecorder {
    state: TrackingState,
    started_at: Option<NaiveDateTime>,
    elapsed: Elapsed,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == TrackingState::Tracking
    }

    pub fn elapsed(&self) -> Elapsed {
        self.elapsed
    }

    pub fn started_at(&self) -> Option<NaiveDateTime> {
        self.started_at
    }

    /// Begin tracking at `now`. Returns `false` (no-op) when already tracking.
    pub fn start(&mut self, now: NaiveDateTime) -> bool {
        if self.is_tracking() {
            debug!("start ignored: already tracking");
            return false;
        }

        self.state = TrackingState::Tracking;
        self.started_at = Some(now);
        self.elapsed = Elapsed::default();
        info!(started_at = %now, "sleep tracking started");
        true
    }

    /// Advance the elapsed counter by one second. Ignored while idle.
    pub fn on_tick(&mut self) {
        if self.is_tracking() {
            self.elapsed.tick();
        }
    }

    /// Deliver `seconds` ticks at once
    pub fn advance(&mut self, seconds: u64) {
        if self.is_tracking() {
            self.elapsed.add_seconds(seconds);
        }
    }

    /// Finalize the session at `now` and return to idle.
    ///
    /// Returns `None` (no-op) when not tracking. The caller owns appending the
    /// session to history and persisting it.
    pub fn stop(&mut self, now: NaiveDateTime, draw: &mut dyn RangeDraw) -> Option<SleepSession> {
        if !self.is_tracking() {
            debug!("stop ignored: not tracking");
            return None;
        }

        let Elapsed { hours, minutes, .. } = self.elapsed;
        let quality_10 = QualityMapper::map(hours, minutes);

        let total_minutes = self.elapsed.total_minutes();
        let phases = if total_minutes > MIN_PHASE_MINUTES {
            PhaseGenerator::generate(total_minutes, draw)
        } else {
            Vec::new()
        };

        let start_time = self
            .started_at
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| UNKNOWN_START_TIME.to_string());

        let session = SleepSession {
            id: Uuid::new_v4().to_string(),
            date: now.format(DATE_FORMAT).to_string(),
            start_time,
            end_time: now.format(TIME_FORMAT).to_string(),
            duration_hours: hours,
            duration_minutes: minutes,
            quality_10,
            phases,
            created_at: Some(now),
        };

        info!(
            id = %session.id,
            duration_minutes = total_minutes,
            quality_10,
            phases = session.phases.len(),
            "sleep tracking stopped"
        );

        self.state = TrackingState::Idle;
        self.started_at = None;
        self.elapsed = Elapsed::default();

        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::RngDraw;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 16)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_tick_carry() {
        let mut elapsed = Elapsed::default();
        for _ in 0..3661 {
            elapsed.tick();
        }
        assert_eq!(
            elapsed,
            Elapsed {
                hours: 1,
                minutes: 1,
                seconds: 1
            }
        );
        assert_eq!(elapsed.display(), "01:01:01");
        assert_eq!(elapsed.total_minutes(), 61);
    }

    #[test]
    fn test_state_transitions() {
        let mut recorder = SessionRecorder::new();
        let mut draw = RngDraw::seeded(3);
        assert_eq!(recorder.state(), TrackingState::Idle);

        // stop while idle is a no-op
        assert!(recorder.stop(at(7, 0), &mut draw).is_none());

        assert!(recorder.start(at(23, 0)));
        assert!(recorder.is_tracking());
        recorder.advance(90);

        // start while tracking keeps the first start and counter
        assert!(!recorder.start(at(23, 30)));
        assert_eq!(recorder.started_at(), Some(at(23, 0)));
        assert_eq!(recorder.elapsed().minutes, 1);

        assert!(recorder.stop(at(7, 0), &mut draw).is_some());
        assert_eq!(recorder.state(), TrackingState::Idle);
        assert_eq!(recorder.elapsed(), Elapsed::default());
    }

    #[test]
    fn test_ticks_ignored_while_idle() {
        let mut recorder = SessionRecorder::new();
        recorder.on_tick();
        recorder.advance(120);
        assert_eq!(recorder.elapsed(), Elapsed::default());
    }

    #[test]
    fn test_stop_builds_session() {
        let mut recorder = SessionRecorder::new();
        let mut draw = RngDraw::seeded(11);
        recorder.start(at(0, 15));
        recorder.advance(7 * 3600 + 30 * 60 + 12);

        let session = recorder.stop(at(7, 45), &mut draw).unwrap();
        assert_eq!(session.date, "2024-01-16");
        assert_eq!(session.start_time, "00:15");
        assert_eq!(session.end_time, "07:45");
        assert_eq!(session.duration_hours, 7);
        assert_eq!(session.duration_minutes, 30);
        assert_eq!(session.quality_10, 8);
        assert!(session.has_phases());
        let phase_sum: u32 = session.phases.iter().map(|p| p.duration_minutes).sum();
        assert!(phase_sum <= 450);
        assert_eq!(session.created_at, Some(at(7, 45)));
        assert!(!session.id.is_empty());
    }

    #[test]
    fn test_short_session_has_no_phases() {
        let mut recorder = SessionRecorder::new();
        let mut draw = RngDraw::seeded(5);
        recorder.start(at(13, 0));
        recorder.advance(30 * 60);

        let session = recorder.stop(at(13, 30), &mut draw).unwrap();
        assert_eq!(session.total_minutes(), 30);
        assert!(session.phases.is_empty());
        assert_eq!(session.quality_10, 1);
    }

    #[test]
    fn test_bulk_advance_matches_ticks() {
        let mut ticked = Elapsed::default();
        let mut bulk = Elapsed::default();
        for step in [59u64, 1, 3599, 61, 7200] {
            for _ in 0..step {
                ticked.tick();
            }
            bulk.add_seconds(step);
            assert_eq!(bulk, ticked);
        }

        let mut huge = Elapsed::default();
        huge.add_seconds(u64::MAX);
        assert_eq!(huge.hours, u32::MAX);
        assert_eq!(huge.total_minutes(), u32::MAX);
    }
}
