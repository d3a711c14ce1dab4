//! Rolling weekly view
//!
//! Seven buckets keyed by offset from the reference day, newest first
//! (today, yesterday, ... 6 days ago). Not a Monday-first calendar week; see
//! [`crate::habits::HabitLog::calendar_week_stats`] for that convention.

use crate::history::{floor_average_quality, saturating_sum, History, DEFAULT_QUALITY};
use crate::types::{SleepSession, WeeklyBucket};
use chrono::{Datelike, Duration, NaiveDate};
use tracing::debug;

/// Number of days in the rolling view
pub const WEEK_DAYS: i64 = 7;

/// Rolling 7-day aggregator
pub struct WeeklyAggregator;

impl WeeklyAggregator {
    /// Build exactly seven buckets going backward from `reference_date`.
    ///
    /// Days without sessions produce a zero-duration bucket with quality 5.
    /// Sessions with malformed dates never match any day.
    pub fn aggregate(history: &History, reference_date: NaiveDate) -> Vec<WeeklyBucket> {
        let buckets: Vec<WeeklyBucket> = (0..WEEK_DAYS)
            .map(|offset| {
                let date = reference_date - Duration::days(offset);
                let day: Vec<&SleepSession> = history.on_date(date).collect();
                build_bucket(date, &day)
            })
            .collect();

        debug!(
            reference = %reference_date,
            filled = buckets.iter().filter(|b| b.record_count > 0).count(),
            "weekly aggregation"
        );
        buckets
    }
}

fn build_bucket(date: NaiveDate, sessions: &[&SleepSession]) -> WeeklyBucket {
    let weekday = date.weekday();

    if sessions.is_empty() {
        return WeeklyBucket {
            day_label: weekday.to_string(),
            weekday,
            date,
            duration_hours: 0,
            duration_minutes: 0,
            quality_10: DEFAULT_QUALITY,
            record_count: 0,
        };
    }

    let hours = saturating_sum(sessions.iter().map(|s| s.duration_hours));
    let minutes = saturating_sum(sessions.iter().map(|s| s.duration_minutes));

    WeeklyBucket {
        day_label: weekday.to_string(),
        weekday,
        date,
        duration_hours: hours.saturating_add(minutes / 60),
        duration_minutes: minutes % 60,
        quality_10: floor_average_quality(sessions.iter().copied()),
        record_count: sessions.len(),
    }
}
