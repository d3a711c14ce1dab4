//! Coarse duration-based quality mapping
//!
//! Used when no phase detail exists; always stored on the session at stop time.

/// Duration to 1-10 quality mapper
pub struct QualityMapper;

impl QualityMapper {
    /// Map an elapsed duration to a quality score in `1..=10`.
    ///
    /// | hours `t`     | score                      |
    /// |---------------|----------------------------|
    /// | `t <= 3`      | `clamp(floor(t), 1, 3)`    |
    /// | `3 < t <= 6`  | `clamp(floor(t) + 1, 4, 6)`|
    /// | `6 < t <= 9`  | `clamp(floor(t) + 1, 7, 9)`|
    /// | `t > 9`       | `10`                       |
    pub fn map(hours: u32, minutes: u32) -> u8 {
        // compare in whole minutes to keep the band edges exact
        let total_minutes = hours.saturating_mul(60).saturating_add(minutes);
        let whole_hours = total_minutes / 60;

        let score = if total_minutes <= 3 * 60 {
            whole_hours.clamp(1, 3)
        } else if total_minutes <= 6 * 60 {
            (whole_hours + 1).clamp(4, 6)
        } else if total_minutes <= 9 * 60 {
            (whole_hours + 1).clamp(7, 9)
        } else {
            10
        };
        score as u8
    }
}
