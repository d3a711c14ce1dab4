//! Session history and record ingestion
//!
//! The history is an ordered, append-only list of sessions (insertion order is
//! creation order) that only shrinks through retention or a full clear.
//! Stored records are normalized once on the way in: legacy `quality` (1-5)
//! values become `quality_10`, missing ids are assigned, and timestamps are
//! parsed leniently. Non-string date/time fields are read as empty strings;
//! a record that still cannot be read is skipped without affecting the rest.

use crate::types::{HistoryStats, SleepPhase, SleepSession, TodaySummary, DATE_FORMAT};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use tracing::warn;
use uuid::Uuid;

/// Quality assumed for records that carry none
pub const DEFAULT_QUALITY: u8 = 5;

/// On-disk record shape, tolerant of legacy and partially-written records
#[derive(Debug, Clone, Deserialize)]
pub struct StoredSession {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    start_time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    end_time: String,
    #[serde(default)]
    duration_hours: u32,
    #[serde(default)]
    duration_minutes: u32,
    #[serde(default)]
    quality_10: Option<u8>,
    /// Legacy 1-5 scale
    #[serde(default)]
    quality: Option<u8>,
    #[serde(default)]
    sleep_phases: Option<Vec<SleepPhase>>,
    #[serde(default, alias = "created_at")]
    timestamp: Option<String>,
}

/// Strings pass through; `null`, numbers and other values become `""`
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        _ => Ok(String::new()),
    }
}

impl StoredSession {
    /// Whether this record predates the 1-10 quality field
    pub fn is_legacy(&self) -> bool {
        self.quality_10.is_none() && self.quality.is_some()
    }
}

impl From<StoredSession> for SleepSession {
    fn from(stored: StoredSession) -> Self {
        let quality_10 = stored
            .quality_10
            .or_else(|| stored.quality.map(|q| q.saturating_mul(2)))
            .unwrap_or(DEFAULT_QUALITY)
            .clamp(1, 10);

        // carry whole hours out of an over-full minute field
        let duration_hours = stored.duration_hours.saturating_add(stored.duration_minutes / 60);
        let duration_minutes = stored.duration_minutes % 60;

        SleepSession {
            id: stored
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            date: stored.date,
            start_time: stored.start_time,
            end_time: stored.end_time,
            duration_hours,
            duration_minutes,
            quality_10,
            phases: stored.sleep_phases.unwrap_or_default(),
            created_at: stored.timestamp.as_deref().and_then(parse_timestamp),
        }
    }
}

/// Parse an ISO-8601 local timestamp, with or without fractional seconds or offset
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_local())
}

/// Ordered sleep session history owned by a single engine
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct History {
    sessions: Vec<SleepSession>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sessions(sessions: Vec<SleepSession>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &[SleepSession] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn push(&mut self, session: SleepSession) {
        self.sessions.push(session);
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn last(&self) -> Option<&SleepSession> {
        self.sessions.last()
    }

    /// Keep only sessions matching `keep`; returns how many were removed
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&SleepSession) -> bool,
    {
        let before = self.sessions.len();
        self.sessions.retain(keep);
        before - self.sessions.len()
    }

    /// Most recent sessions, at most `n`, in chronological order
    pub fn recent_window(&self, n: usize) -> &[SleepSession] {
        let start = self.sessions.len().saturating_sub(n);
        &self.sessions[start..]
    }

    /// Index of the session an analysis request should look at: the latest
    /// one with phases, otherwise the latest one overall
    pub fn analysis_target(&self) -> Option<usize> {
        self.sessions
            .iter()
            .rposition(SleepSession::has_phases)
            .or_else(|| self.sessions.len().checked_sub(1))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut SleepSession> {
        self.sessions.get_mut(index)
    }

    /// Sessions whose stored date equals `date`
    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &SleepSession> + '_ {
        let key = date.format(DATE_FORMAT).to_string();
        self.sessions.iter().filter(move |s| s.date == key)
    }

    /// Totals for `date`
    pub fn day_summary(&self, date: NaiveDate) -> TodaySummary {
        let day: Vec<&SleepSession> = self.on_date(date).collect();
        let total_minutes = saturating_sum(day.iter().map(|s| s.total_minutes()));
        TodaySummary {
            date,
            total_minutes,
            average_quality: floor_average_quality(day.iter().copied()),
            record_count: day.len(),
        }
    }

    /// The `n` most recently created sessions, newest first
    pub fn recent(&self, n: usize) -> Vec<&SleepSession> {
        let mut sorted: Vec<&SleepSession> = self.sessions.iter().collect();
        // stable sort keeps insertion order among equal or missing timestamps
        sorted.sort_by_key(|s| Reverse(s.created_at));
        sorted.truncate(n);
        sorted
    }

    /// Whole-history statistics
    pub fn stats(&self) -> HistoryStats {
        let record_count = self.sessions.len();
        let total_minutes = saturating_sum(self.sessions.iter().map(|s| s.total_minutes()));
        let average_minutes = if record_count > 0 {
            total_minutes / record_count as u32
        } else {
            0
        };

        HistoryStats {
            record_count,
            average_minutes,
            average_quality: floor_average_quality(self.sessions.iter()),
            total_minutes,
        }
    }

    /// Load history from its JSON array form.
    ///
    /// Fails only when the document is not a JSON array. Records that cannot
    /// be read are skipped with a warning.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<Value> = serde_json::from_str(json)?;
        let sessions = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value::<SleepSession>(record) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(index, error = %e, "skipping unreadable sleep record");
                    None
                }
            })
            .collect();
        Ok(Self { sessions })
    }

    /// Serialize history to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Sum that stops at `u32::MAX` instead of overflowing
pub fn saturating_sum<I>(values: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    values.into_iter().fold(0u32, u32::saturating_add)
}

/// Floor average of `quality_10`, [`DEFAULT_QUALITY`] when empty
pub fn floor_average_quality<'a, I>(sessions: I) -> u8
where
    I: IntoIterator<Item = &'a SleepSession>,
{
    let (sum, count) = sessions
        .into_iter()
        .fold((0u32, 0u32), |(sum, count), s| {
            (sum.saturating_add(u32::from(s.quality_10)), count + 1)
        });
    if count == 0 {
        DEFAULT_QUALITY
    } else {
        (sum / count) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn session(date: &str, hours: u32, minutes: u32, quality: u8, created: Option<&str>) -> SleepSession {
        SleepSession {
            id: format!("{date}-{hours}{minutes}"),
            date: date.to_string(),
            start_time: "23:00".to_string(),
            end_time: "07:00".to_string(),
            duration_hours: hours,
            duration_minutes: minutes,
            quality_10: quality,
            phases: vec![],
            created_at: created.and_then(parse_timestamp),
        }
    }

    #[test]
    fn test_legacy_quality_migration() {
        let json = r#"[
            {"date": "2024-01-15", "start_time": "23:00", "end_time": "07:00",
             "duration_hours": 8, "duration_minutes": 0, "quality": 4},
            {"date": "2024-01-16", "duration_hours": 6, "duration_minutes": 10, "quality_10": 7, "quality": 2},
            {"date": "2024-01-17", "duration_hours": 5, "duration_minutes": 0}
        ]"#;
        let history = History::from_json(json).unwrap();
        let qualities: Vec<u8> = history.sessions().iter().map(|s| s.quality_10).collect();
        assert_eq!(qualities, vec![8, 7, DEFAULT_QUALITY]);
        assert!(history.sessions().iter().all(|s| !s.id.is_empty()));
    }

    #[test]
    fn test_stored_record_shape_loads() {
        let json = r#"[{
            "date": "2024-01-15",
            "start_time": "23:12",
            "end_time": "06:40",
            "duration_hours": 7,
            "duration_minutes": 28,
            "quality_10": 8,
            "sleep_phases": [
                {"type": "light", "duration": 12, "cycle": 1},
                {"type": "deep", "duration": 31, "cycle": 1}
            ],
            "timestamp": "2024-01-15T06:40:02.512345"
        }]"#;
        let history = History::from_json(json).unwrap();
        let s = &history.sessions()[0];
        assert_eq!(s.phases.len(), 2);
        assert_eq!(s.phases[1].duration_minutes, 31);
        assert!(s.created_at.is_some());

        // round trip keeps the stored shape
        let value: serde_json::Value = serde_json::from_str(&history.to_json().unwrap()).unwrap();
        assert_eq!(value[0]["sleep_phases"][0]["type"], "light");
        assert_eq!(value[0]["quality_10"], 8);
        assert!(value[0].get("quality").is_none());
    }

    #[test]
    fn test_unparsable_timestamp_is_tolerated() {
        let json = r#"[{"date": "2024-01-15", "duration_hours": 1, "duration_minutes": 75, "timestamp": "yesterday"}]"#;
        let history = History::from_json(json).unwrap();
        let s = &history.sessions()[0];
        assert!(s.created_at.is_none());
        assert_eq!((s.duration_hours, s.duration_minutes), (2, 15));
    }

    #[test]
    fn test_recent_window() {
        let history = History::from_sessions(
            (1..=9)
                .map(|d| session(&format!("2024-01-0{d}"), 7, 0, 7, None))
                .collect(),
        );
        let window = history.recent_window(7);
        assert_eq!(window.len(), 7);
        assert_eq!(window[0].date, "2024-01-03");
        assert_eq!(history.recent_window(20).len(), 9);
    }

    #[test]
    fn test_analysis_target_prefers_phased_record() {
        let mut history = History::new();
        assert_eq!(history.analysis_target(), None);

        history.push(session("2024-01-01", 7, 0, 7, None));
        assert_eq!(history.analysis_target(), Some(0));

        let mut phased = session("2024-01-02", 7, 0, 7, None);
        phased.phases = vec![SleepPhase {
            kind: crate::types::PhaseKind::Light,
            duration_minutes: 10,
            cycle_index: 1,
        }];
        history.push(phased);
        history.push(session("2024-01-03", 0, 20, 1, None));
        assert_eq!(history.analysis_target(), Some(1));
    }

    #[test]
    fn test_day_summary_and_stats() {
        let history = History::from_sessions(vec![
            session("2024-01-15", 6, 40, 7, None),
            session("2024-01-16", 1, 30, 2, None),
            session("2024-01-16", 0, 45, 1, None),
        ]);
        let day = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let summary = history.day_summary(day);
        assert_eq!(summary.total_minutes, 135);
        assert_eq!(summary.record_count, 2);
        assert_eq!(summary.average_quality, 1);

        let empty = history.day_summary(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(empty.total_minutes, 0);
        assert_eq!(empty.average_quality, DEFAULT_QUALITY);

        let stats = history.stats();
        assert_eq!(stats.record_count, 3);
        assert_eq!(stats.total_minutes, 535);
        assert_eq!(stats.average_minutes, 178);
        assert_eq!(stats.average_quality, 3);

        assert_eq!(History::new().stats().average_quality, DEFAULT_QUALITY);
    }

    #[test]
    fn test_recent_orders_by_creation_time() {
        let history = History::from_sessions(vec![
            session("2024-01-14", 7, 0, 7, Some("2024-01-14T07:00:00")),
            session("2024-01-15", 7, 0, 7, None),
            session("2024-01-16", 7, 0, 7, Some("2024-01-16T07:00:00")),
            session("2024-01-13", 7, 0, 7, Some("2024-01-13T07:00:00")),
        ]);
        let dates: Vec<&str> = history.recent(3).iter().map(|s| s.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-16", "2024-01-14", "2024-01-13"]);
    }

    #[test]
    fn test_malformed_fields_do_not_fail_the_array() {
        let json = r#"[
            {"date": "2024-01-15", "start_time": "23:00", "end_time": "07:00",
             "duration_hours": 8, "duration_minutes": 0, "quality_10": 8},
            {"date": null, "start_time": 2300, "end_time": ["07:00"],
             "duration_hours": 6, "duration_minutes": 0, "quality_10": 6},
            {"date": "2024-01-16", "duration_hours": "seven", "quality_10": 7},
            "not a record",
            {"date": "2024-01-17", "duration_hours": 7, "duration_minutes": 30, "quality_10": 9}
        ]"#;
        let history = History::from_json(json).unwrap();

        let dates: Vec<&str> = history.sessions().iter().map(|s| s.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-15", "", "2024-01-17"]);

        let blank = &history.sessions()[1];
        assert!(blank.parsed_date().is_none());
        assert!(blank.start_hour().is_none());
        assert_eq!(blank.end_time, "");
        assert_eq!(blank.total_minutes(), 360);
    }

    #[test]
    fn test_non_array_document_is_an_error() {
        assert!(History::from_json(r#"{"date": "2024-01-15"}"#).is_err());
    }

    #[test]
    fn test_huge_stored_durations_saturate() {
        let json = r#"[
            {"date": "2024-01-15", "duration_hours": 4294967295, "duration_minutes": 4294967295, "quality_10": 8},
            {"date": "2024-01-15", "duration_hours": 4294967295, "duration_minutes": 0, "quality_10": 8}
        ]"#;
        let history = History::from_json(json).unwrap();
        assert_eq!(history.sessions()[0].duration_hours, u32::MAX);
        assert_eq!(history.sessions()[0].total_minutes(), u32::MAX);

        let stats = history.stats();
        assert_eq!(stats.total_minutes, u32::MAX);
        assert_eq!(stats.average_minutes, u32::MAX / 2);

        let day = history.day_summary(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(day.total_minutes, u32::MAX);
        assert_eq!(saturating_sum([u32::MAX, 1, 2]), u32::MAX);
    }
}
