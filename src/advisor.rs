//! Personalized sleep recommendations
//!
//! Recommendations are derived from a window of the most recent sessions:
//! average duration, average quality, and bed/wake time regularity. Specific
//! findings come first; general advice pads the list to a minimum length.

use crate::history::{floor_average_quality, saturating_sum, History};
use crate::phases::RangeDraw;
use tracing::debug;

/// Sessions required before any personalized advice is given
pub const MIN_RECORDS_FOR_ADVICE: usize = 3;

/// Number of most recent sessions averaged
pub const RECOMMENDATION_WINDOW: usize = 7;

/// Lists shorter than this are padded with general advice
pub const MIN_RECOMMENDATIONS: usize = 5;

/// Lists are truncated to this length
pub const MAX_RECOMMENDATIONS: usize = 10;

/// Minimum parsable hours before a regularity check applies
const MIN_REGULARITY_SAMPLES: usize = 3;

/// Allowed spread (hours) between earliest and latest bed/wake hour
const MAX_HOUR_SPREAD: u32 = 2;

pub const MSG_COLLECT_MORE: &str = "Collect more sleep data (at least 3 records)";
pub const MSG_SLEEP_LONGER: &str = "Increase your sleep duration to 7-9 hours";
pub const MSG_GO_TO_BED_EARLIER: &str = "Try going to bed 30-60 minutes earlier";
pub const MSG_SLEEP_TOO_LONG: &str = "You sleep too long (more than 9 hours)";
pub const MSG_SET_ALARM: &str = "Set an alarm for 8-9 hours after bedtime";
pub const MSG_EXCELLENT_DURATION: &str = "Excellent sleep duration";
pub const MSG_LOW_QUALITY: &str = "Your sleep quality is low";
pub const MSG_KEEP_ROOM_COOL: &str = "Keep the bedroom at 18-20°C";
pub const MSG_EXCELLENT_QUALITY: &str = "Excellent sleep quality";
pub const MSG_AVERAGE_QUALITY: &str = "Your sleep quality is average";
pub const MSG_IRREGULAR_BEDTIME: &str = "Your bedtime is irregular";
pub const MSG_IRREGULAR_WAKE: &str = "Wake up at the same time every day";

/// Ordered general advice used for padding
pub const GENERAL_ADVICE: [&str; 5] = [
    "Put electronic devices away 1-2 hours before bed",
    "Avoid caffeine after 2 PM",
    "Don't eat heavy meals within 3 hours of bedtime",
    "Regular exercise improves sleep",
    "Stay hydrated during the day",
];

/// Catalog for the rotating daily tip
pub const DAILY_TIPS: [&str; 10] = [
    "Tonight, try reading a paper book before bed",
    "Air out the bedroom before going to sleep",
    "Try a short meditation before bed",
    "Start a sleep diary",
    "Keep a consistent wake-up time",
    "Avoid heavy food before bed",
    "A warm bath helps you relax",
    "White noise can help you fall asleep",
    "Get some sunlight in the morning",
    "If you can't fall asleep within 20 minutes, get up",
];

/// Fixed quick tips
pub const QUICK_TIPS: [&str; 5] = [
    "Turn off notifications before bed",
    "Use night mode on your devices",
    "Try lavender aromatherapy",
    "Wear socks if your feet get cold",
    "Read paper books before sleep",
];

const SHORT_AVERAGE_MINUTES: u32 = 360;
const LONG_AVERAGE_MINUTES: u32 = 540;
const IDEAL_AVERAGE_MINUTES: (u32, u32) = (420, 480);
const LOW_QUALITY: u8 = 5;
const HIGH_QUALITY: u8 = 8;

/// Recommendation generator
pub struct RecommendationEngine;

impl RecommendationEngine {
    /// Recommendations for `history`, most specific first.
    ///
    /// Fewer than [`MIN_RECORDS_FOR_ADVICE`] sessions yields a single
    /// "collect more data" message; otherwise between
    /// [`MIN_RECOMMENDATIONS`] and [`MAX_RECOMMENDATIONS`] entries.
    pub fn recommend(history: &History) -> Vec<String> {
        Self::recommend_with_window(history, RECOMMENDATION_WINDOW)
    }

    /// Same as [`Self::recommend`] averaging over the last `window_size` sessions
    pub fn recommend_with_window(history: &History, window_size: usize) -> Vec<String> {
        if history.len() < MIN_RECORDS_FOR_ADVICE {
            return vec![MSG_COLLECT_MORE.to_string()];
        }

        let window = history.recent_window(window_size.max(1));
        let count = window.len() as u32;
        let total_minutes = saturating_sum(window.iter().map(|s| s.total_minutes()));
        let avg_minutes = total_minutes / count;
        let avg_quality = floor_average_quality(window);

        let mut recommendations: Vec<String> = Vec::new();
        recommendations.extend(duration_advice(avg_minutes).iter().map(|m| m.to_string()));
        recommendations.extend(quality_advice(avg_quality).iter().map(|m| m.to_string()));

        let bed_hours: Vec<u32> = window.iter().filter_map(|s| s.start_hour()).collect();
        if is_irregular(&bed_hours) {
            recommendations.push(MSG_IRREGULAR_BEDTIME.to_string());
        }
        let wake_hours: Vec<u32> = window.iter().filter_map(|s| s.end_hour()).collect();
        if is_irregular(&wake_hours) {
            recommendations.push(MSG_IRREGULAR_WAKE.to_string());
        }

        if recommendations.len() < MIN_RECOMMENDATIONS {
            let missing = MIN_RECOMMENDATIONS - recommendations.len();
            recommendations.extend(GENERAL_ADVICE.iter().take(missing).map(|m| m.to_string()));
        }
        recommendations.truncate(MAX_RECOMMENDATIONS);

        debug!(
            window = window.len(),
            avg_minutes,
            avg_quality,
            count = recommendations.len(),
            "recommendations computed"
        );
        recommendations
    }

    /// One tip picked from [`DAILY_TIPS`]
    pub fn daily_tip(draw: &mut dyn RangeDraw) -> String {
        let index = draw.draw(0, DAILY_TIPS.len() as u32 - 1) as usize;
        DAILY_TIPS[index.min(DAILY_TIPS.len() - 1)].to_string()
    }

    pub fn quick_tips() -> Vec<String> {
        QUICK_TIPS.iter().map(|t| t.to_string()).collect()
    }
}

fn duration_advice(avg_minutes: u32) -> &'static [&'static str] {
    if avg_minutes < SHORT_AVERAGE_MINUTES {
        &[MSG_SLEEP_LONGER, MSG_GO_TO_BED_EARLIER]
    } else if avg_minutes > LONG_AVERAGE_MINUTES {
        &[MSG_SLEEP_TOO_LONG, MSG_SET_ALARM]
    } else if (IDEAL_AVERAGE_MINUTES.0..=IDEAL_AVERAGE_MINUTES.1).contains(&avg_minutes) {
        &[MSG_EXCELLENT_DURATION]
    } else {
        // 360-419 and 481-540 get no duration-specific advice
        &[]
    }
}

fn quality_advice(avg_quality: u8) -> &'static [&'static str] {
    if avg_quality < LOW_QUALITY {
        &[MSG_LOW_QUALITY, MSG_KEEP_ROOM_COOL]
    } else if avg_quality >= HIGH_QUALITY {
        &[MSG_EXCELLENT_QUALITY]
    } else {
        &[MSG_AVERAGE_QUALITY]
    }
}

fn is_irregular(hours: &[u32]) -> bool {
    if hours.len() < MIN_REGULARITY_SAMPLES {
        return false;
    }
    match (hours.iter().min(), hours.iter().max()) {
        (Some(min), Some(max)) => max - min > MAX_HOUR_SPREAD,
        _ => false,
    }
}
