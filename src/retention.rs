//! Age-based history retention

use crate::history::History;
use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

/// Default retention horizon in days
pub const RETENTION_DAYS: u32 = 7;

/// Prunes sessions older than the retention horizon
pub struct RetentionManager;

impl RetentionManager {
    /// Remove sessions dated strictly before `reference_date - horizon_days`.
    ///
    /// Sessions with unparsable dates are dropped. A horizon reaching past the
    /// earliest representable date keeps every dated session. Returns the
    /// number of removed sessions; callers persist only when this is non-zero.
    pub fn prune(history: &mut History, reference_date: NaiveDate, horizon_days: u32) -> usize {
        let cutoff = reference_date.checked_sub_signed(Duration::days(i64::from(horizon_days)));
        let mut malformed = 0usize;

        let removed = history.retain(|session| match session.parsed_date() {
            Some(date) => cutoff.map_or(true, |cutoff| date >= cutoff),
            None => {
                malformed += 1;
                false
            }
        });

        if malformed > 0 {
            warn!(malformed, "dropped sessions with unparsable dates");
        }
        debug!(?cutoff, removed, remaining = history.len(), "retention pass");
        removed
    }
}
