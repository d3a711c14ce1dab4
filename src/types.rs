//! Core types for Somna
//!
//! This module defines the data structures shared by every stage of the engine:
//! stored sleep sessions and their synthetic phases, plus the derived views
//! (phase reports, weekly buckets, summaries) computed from a history.

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Calendar date format used by stored sessions
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time-of-day format used by stored sessions
pub const TIME_FORMAT: &str = "%H:%M";

/// Sleep phase classification (synthetic, not sensor-derived)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Light,
    Medium,
    Deep,
    Rem,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Light => "light",
            PhaseKind::Medium => "medium",
            PhaseKind::Deep => "deep",
            PhaseKind::Rem => "rem",
        }
    }

    /// Human-readable label for display
    pub fn label(&self) -> &'static str {
        match self {
            PhaseKind::Light => "Light sleep",
            PhaseKind::Medium => "Medium sleep",
            PhaseKind::Deep => "Deep sleep",
            PhaseKind::Rem => "REM sleep",
        }
    }
}

/// One synthetic sub-interval of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepPhase {
    #[serde(rename = "type")]
    pub kind: PhaseKind,
    /// Phase length in minutes (always > 0)
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    /// 1-based cycle this phase belongs to
    #[serde(rename = "cycle")]
    pub cycle_index: u32,
}

/// A completed sleep-tracking interval
///
/// Deserialization goes through [`crate::history::StoredSession`] so legacy
/// records are normalized exactly once, at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "crate::history::StoredSession")]
pub struct SleepSession {
    /// Stable record identifier
    pub id: String,
    /// Calendar date the session was finalized (YYYY-MM-DD)
    pub date: String,
    /// Tracking start time of day (HH:MM)
    pub start_time: String,
    /// Tracking end time of day (HH:MM)
    pub end_time: String,
    pub duration_hours: u32,
    /// Always < 60
    pub duration_minutes: u32,
    /// Coarse quality estimate (1-10)
    pub quality_10: u8,
    /// Synthetic phase breakdown; empty when too short or not yet computed
    #[serde(rename = "sleep_phases")]
    pub phases: Vec<SleepPhase>,
    /// When the session was finalized (local time)
    #[serde(rename = "timestamp")]
    pub created_at: Option<NaiveDateTime>,
}

impl SleepSession {
    /// Total recorded duration in minutes
    pub fn total_minutes(&self) -> u32 {
        self.duration_hours
            .saturating_mul(60)
            .saturating_add(self.duration_minutes)
    }

    /// Parsed calendar date, `None` when the stored value is malformed
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, DATE_FORMAT).ok()
    }

    /// Hour component of the start time, `None` when unparsable
    pub fn start_hour(&self) -> Option<u32> {
        hour_of(&self.start_time)
    }

    /// Hour component of the end time, `None` when unparsable
    pub fn end_hour(&self) -> Option<u32> {
        hour_of(&self.end_time)
    }

    pub fn has_phases(&self) -> bool {
        !self.phases.is_empty()
    }

    /// One-line summary used by recent-record listings
    pub fn summary_line(&self) -> String {
        format!(
            "{} - {}h {}m - {}/10",
            self.date, self.duration_hours, self.duration_minutes, self.quality_10
        )
    }
}

fn hour_of(time: &str) -> Option<u32> {
    time.split(':').next()?.trim().parse().ok()
}

/// Render a minute count as `Hh Mm`
pub fn format_duration(total_minutes: u32) -> String {
    format!("{}h {}m", total_minutes / 60, total_minutes % 60)
}

/// Qualitative band for a 0-100 phase score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ScoreBand {
    pub fn from_score(score: u32) -> Self {
        if score >= 80 {
            ScoreBand::Excellent
        } else if score >= 60 {
            ScoreBand::Good
        } else if score >= 40 {
            ScoreBand::Fair
        } else {
            ScoreBand::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreBand::Excellent => "excellent",
            ScoreBand::Good => "good",
            ScoreBand::Fair => "fair",
            ScoreBand::Poor => "poor",
        }
    }
}

/// Result of scoring a phase sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// Overall score (0-100)
    pub total_score: u32,
    pub band: ScoreBand,
    /// Diagnostic messages, or a single positive message
    pub messages: Vec<String>,
    /// Minutes per phase kind
    pub phase_totals: BTreeMap<PhaseKind, u32>,
    pub total_duration: u32,
    pub deep_minutes: u32,
    pub rem_minutes: u32,
    /// Number of distinct cycle indices
    pub cycle_count: u32,
}

/// One day of the rolling weekly view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyBucket {
    /// Short weekday name (Mon..Sun)
    pub day_label: String,
    pub weekday: Weekday,
    pub date: NaiveDate,
    pub duration_hours: u32,
    pub duration_minutes: u32,
    /// Floor average of the day's quality, 5 when the day is empty
    pub quality_10: u8,
    pub record_count: usize,
}

impl WeeklyBucket {
    pub fn total_minutes(&self) -> u32 {
        self.duration_hours
            .saturating_mul(60)
            .saturating_add(self.duration_minutes)
    }
}

/// Totals for the current calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodaySummary {
    pub date: NaiveDate,
    pub total_minutes: u32,
    /// Floor average quality, 5 when nothing was recorded today
    pub average_quality: u8,
    pub record_count: usize,
}

/// Whole-history statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub record_count: usize,
    pub average_minutes: u32,
    pub average_quality: u8,
    pub total_minutes: u32,
}

/// Recommendations bundle returned to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    pub recommendations: Vec<String>,
    pub daily_tip: String,
    pub quick_tips: Vec<String>,
}
