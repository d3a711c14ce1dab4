//! Digital-habits sleep assessment
//!
//! A separate scoring path for sleep intervals reported with screen-time
//! figures. Quality here is a 0-100 score driven by screen time alone and is
//! unrelated to the tracker's 1-10 scale. Weekly statistics use Monday-first
//! calendar days.

use crate::error::EngineError;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Screen time (minutes) above which a reduction is advised
pub const SCREEN_TIME_LIMIT: u32 = 120;

/// Sleep shorter than this (hours) is flagged
pub const SHORT_SLEEP_HOURS: f64 = 6.5;

/// Quality points lost per minute of screen time
const SCREEN_PENALTY_PER_MINUTE: f64 = 0.25;

/// Entries returned by [`HabitLog::user_history`]
pub const USER_HISTORY_LIMIT: usize = 10;

pub const MSG_REDUCE_SCREEN_TIME: &str = "Reduce screen time before bed";
pub const MSG_SLEEP_LONGER: &str = "Sleep is shorter than normal, increase its duration";
pub const MSG_HABITS_NORMAL: &str = "Habits look normal";

/// Self-reported evening device usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigitalHabits {
    pub screen_time_minutes: u32,
    pub social_media_minutes: u32,
    pub gaming_minutes: u32,
}

/// Result of assessing one reported interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitAssessment {
    /// Start as written, without its offset
    pub start: NaiveDateTime,
    /// End as written, without its offset
    pub end: NaiveDateTime,
    /// Full English weekday name of the start
    pub day_of_week: String,
    /// Rounded to 2 decimals
    pub duration_hours: f64,
    /// 0-100, rounded to 1 decimal
    pub quality_score: f64,
    pub habits: DigitalHabits,
    pub recommendations: Vec<String>,
}

/// A reported time, with or without a UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedTime {
    Offset(DateTime<FixedOffset>),
    Local(NaiveDateTime),
}

impl ReportedTime {
    /// Wall-clock time as written
    pub fn wall_clock(&self) -> NaiveDateTime {
        match self {
            ReportedTime::Offset(dt) => dt.naive_local(),
            ReportedTime::Local(dt) => *dt,
        }
    }

    /// Seconds from `self` to `later`. `None` when only one side has an offset.
    pub fn seconds_until(&self, later: &ReportedTime) -> Option<i64> {
        match (self, later) {
            (ReportedTime::Offset(a), ReportedTime::Offset(b)) => Some((*b - *a).num_seconds()),
            (ReportedTime::Local(a), ReportedTime::Local(b)) => Some((*b - *a).num_seconds()),
            _ => None,
        }
    }
}

/// Parse an ISO-8601 / RFC 3339 time. A trailing `Z` is accepted and
/// offsets are kept.
pub fn parse_instant(value: &str) -> Option<ReportedTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(ReportedTime::Offset(dt));
    }
    let with_offset = ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M%:z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
        .map(ReportedTime::Offset);
    with_offset.or_else(|| {
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(ReportedTime::Local)
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Assess a sleep interval with its digital habits
pub fn assess(start: &str, end: &str, habits: DigitalHabits) -> Result<HabitAssessment, EngineError> {
    let start_at = parse_instant(start)
        .ok_or_else(|| EngineError::InvalidSession(format!("unparsable start time: {start:?}")))?;
    let end_at = parse_instant(end)
        .ok_or_else(|| EngineError::InvalidSession(format!("unparsable end time: {end:?}")))?;

    let seconds = start_at.seconds_until(&end_at).ok_or_else(|| {
        EngineError::InvalidSession(
            "start and end must both carry a UTC offset or both omit it".to_string(),
        )
    })?;
    if seconds <= 0 {
        return Err(EngineError::InvalidSession(
            "start time must be before end time".to_string(),
        ));
    }

    let duration_hours = round_to(seconds as f64 / 3600.0, 2);
    let start_dt = start_at.wall_clock();

    let penalty = f64::from(habits.screen_time_minutes) * SCREEN_PENALTY_PER_MINUTE;
    let quality_score = round_to((100.0 - penalty).clamp(0.0, 100.0), 1);

    let mut recommendations = Vec::new();
    if habits.screen_time_minutes > SCREEN_TIME_LIMIT {
        recommendations.push(MSG_REDUCE_SCREEN_TIME.to_string());
    }
    if duration_hours < SHORT_SLEEP_HOURS {
        recommendations.push(MSG_SLEEP_LONGER.to_string());
    }
    if recommendations.is_empty() {
        recommendations.push(MSG_HABITS_NORMAL.to_string());
    }

    debug!(duration_hours, quality_score, "habits assessed");

    Ok(HabitAssessment {
        start: start_dt,
        end: end_at.wall_clock(),
        day_of_week: weekday_name(start_dt.weekday()).to_string(),
        duration_hours,
        quality_score,
        habits,
        recommendations,
    })
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// A logged assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitEntry {
    pub id: u64,
    pub user_id: u64,
    pub weekday: Weekday,
    pub assessment: HabitAssessment,
}

/// One Monday-first calendar row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayStat {
    pub day: String,
    pub avg_hours: f64,
    pub record_count: usize,
}

/// In-memory log of habit assessments across users
#[derive(Debug, Clone, Default)]
pub struct HabitLog {
    entries: Vec<HabitEntry>,
}

impl HabitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Assess and log an interval for `user_id`; ids are sequential from 1
    pub fn record(
        &mut self,
        user_id: u64,
        start: &str,
        end: &str,
        habits: DigitalHabits,
    ) -> Result<&HabitEntry, EngineError> {
        let assessment = assess(start, end, habits)?;
        let entry = HabitEntry {
            id: self.entries.len() as u64 + 1,
            user_id,
            weekday: assessment.start.weekday(),
            assessment,
        };
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// The user's last [`USER_HISTORY_LIMIT`] entries, oldest first
    pub fn user_history(&self, user_id: u64) -> Vec<&HabitEntry> {
        let mine: Vec<&HabitEntry> = self.entries.iter().filter(|e| e.user_id == user_id).collect();
        let skip = mine.len().saturating_sub(USER_HISTORY_LIMIT);
        mine.into_iter().skip(skip).collect()
    }

    /// Average hours per weekday, Monday first. Empty when nothing is logged.
    pub fn calendar_week_stats(&self) -> Vec<WeekdayStat> {
        if self.entries.is_empty() {
            return Vec::new();
        }

        let mut day = Weekday::Mon;
        let mut stats = Vec::with_capacity(7);
        for _ in 0..7 {
            let hours: Vec<f64> = self
                .entries
                .iter()
                .filter(|e| e.weekday == day)
                .map(|e| e.assessment.duration_hours)
                .collect();
            let avg_hours = if hours.is_empty() {
                0.0
            } else {
                round_to(hours.iter().sum::<f64>() / hours.len() as f64, 2)
            };
            stats.push(WeekdayStat {
                day: weekday_name(day).to_string(),
                avg_hours,
                record_count: hours.len(),
            });
            day = day.succ();
        }
        stats
    }
}
